use nalgebra::{DefaultAllocator, DimName, OPoint, Scalar, allocator::Allocator};
use simba::simd::SimdValue;

use super::{FloatType, WorldPoint, WorldVector};

/// Min/max axis aligned bounding box, generic over the point type so that one
/// value can also hold 4 boxes in SIMD lanes.
#[derive(Clone, Debug, PartialEq)]
pub struct Aabb<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> Aabb<Point> {
    pub fn new(min: Point, max: Point) -> Aabb<Point> {
        Aabb { min, max }
    }

    pub fn map<Point2, F: FnMut(&Point) -> Point2>(&self, mut f: F) -> Aabb<Point2> {
        Aabb {
            min: f(&self.min),
            max: f(&self.max),
        }
    }

    pub fn zip_map<Point2, Point3, F: FnMut(&Point, &Point2) -> Point3>(
        &self,
        rhs: &Aabb<Point2>,
        mut f: F,
    ) -> Aabb<Point3> {
        Aabb {
            min: f(&self.min, &rhs.min),
            max: f(&self.max, &rhs.max),
        }
    }

    pub fn zip_apply<Point2, F: FnMut(&mut Point, &Point2)>(
        &mut self,
        rhs: &Aabb<Point2>,
        mut f: F,
    ) {
        f(&mut self.min, &rhs.min);
        f(&mut self.max, &rhs.max);
    }
}

impl<T: Scalar, D: DimName> Aabb<OPoint<T, D>>
where
    DefaultAllocator: Allocator<D>,
{
    pub fn map_coords<T2: Scalar, F: FnMut(T) -> T2>(&self, mut f: F) -> Aabb<OPoint<T2, D>> {
        self.map(|x| x.map(&mut f))
    }

    pub fn zip_map_coords<T2: Scalar, T3: Scalar, F: FnMut(T, T2) -> T3>(
        &self,
        rhs: &Aabb<OPoint<T2, D>>,
        mut f: F,
    ) -> Aabb<OPoint<T3, D>> {
        self.zip_map(rhs, |x, y| OPoint {
            coords: x.coords.zip_map(&y.coords, &mut f),
        })
    }

    pub fn zip_apply_coords<T2: Scalar, F: FnMut(&mut T, T2)>(
        &mut self,
        rhs: &Aabb<OPoint<T2, D>>,
        mut f: F,
    ) {
        self.zip_apply(rhs, |x, y| x.coords.zip_apply(&y.coords, &mut f))
    }
}

impl Aabb<WorldPoint> {
    /// The inverted box: growing it by any point yields that point's box.
    pub fn empty() -> Self {
        Aabb {
            min: WorldPoint::new(FloatType::MAX, FloatType::MAX, FloatType::MAX),
            max: WorldPoint::new(FloatType::MIN, FloatType::MIN, FloatType::MIN),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn from_points(points: impl IntoIterator<Item = WorldPoint>) -> Option<Self> {
        let mut result = Self::empty();
        let mut any = false;
        for p in points {
            result.grow_to_point(&p);
            any = true;
        }
        any.then_some(result)
    }

    pub fn grow_to_point(&mut self, p: &WorldPoint) {
        self.min = self.min.coords.zip_map(&p.coords, FloatType::min).into();
        self.max = self.max.coords.zip_map(&p.coords, FloatType::max).into();
    }

    pub fn grow_to_box(&mut self, b: &Self) {
        if !b.is_empty() {
            self.grow_to_point(&b.min);
            self.grow_to_point(&b.max);
        }
    }

    pub fn center(&self) -> WorldPoint {
        ((self.min.coords + self.max.coords) * 0.5).into()
    }

    /// Half size on each axis.
    pub fn extent(&self) -> WorldVector {
        (self.max - self.min) * 0.5
    }

    pub fn size(&self) -> WorldVector {
        self.max - self.min
    }

    pub fn expanded_by(&self, amount: FloatType) -> Self {
        let delta = WorldVector::new(amount, amount, amount);
        Aabb {
            min: self.min - delta,
            max: self.max + delta,
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: &WorldPoint) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

impl<T: SimdValue + Scalar, D: DimName> SimdValue for Aabb<OPoint<T, D>>
where
    T::Element: SimdValue + Scalar,
    DefaultAllocator: Allocator<D>,
{
    const LANES: usize = T::LANES;

    type Element = Aabb<OPoint<T::Element, D>>;

    type SimdBool = T::SimdBool;

    fn splat(val: Self::Element) -> Self {
        val.map_coords(|x| T::splat(x))
    }

    fn extract(&self, i: usize) -> Self::Element {
        self.map_coords(|x| x.extract(i))
    }

    unsafe fn extract_unchecked(&self, i: usize) -> Self::Element {
        unsafe { self.map_coords(|x| x.extract_unchecked(i)) }
    }

    fn replace(&mut self, i: usize, val: Self::Element) {
        self.zip_apply_coords(&val, |x, y| x.replace(i, y.clone()));
    }

    unsafe fn replace_unchecked(&mut self, i: usize, val: Self::Element) {
        unsafe {
            self.zip_apply_coords(&val, |x, y| x.replace_unchecked(i, y.clone()));
        }
    }

    fn select(self, cond: Self::SimdBool, other: Self) -> Self {
        self.zip_map_coords(&other, |x, y| x.select(cond, y.clone()))
    }
}
