use std::ops::{Index, IndexMut};

use nalgebra::{DefaultAllocator, DimName, OPoint, Scalar, allocator::Allocator};
use simba::simd::SimdValue;

use super::{EPSILON, FloatType, TexturePoint, WorldPoint, WorldVector};

#[derive(Clone, Debug, PartialEq)]
pub struct Triangle<Point>([Point; 3]);

impl<Point> Triangle<Point> {
    pub fn new(a: Point, b: Point, c: Point) -> Triangle<Point> {
        Triangle([a, b, c])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.0.iter()
    }

    pub fn map<Point2, F: FnMut(&Point) -> Point2>(&self, mut f: F) -> Triangle<Point2> {
        Triangle([f(&self[0]), f(&self[1]), f(&self[2])])
    }

    pub fn zip_map<Point2, Point3, F: FnMut(&Point, &Point2) -> Point3>(
        &self,
        rhs: &Triangle<Point2>,
        mut f: F,
    ) -> Triangle<Point3> {
        Triangle([
            f(&self.0[0], &rhs.0[0]),
            f(&self.0[1], &rhs.0[1]),
            f(&self.0[2], &rhs.0[2]),
        ])
    }

    pub fn zip_apply<Point2, F: FnMut(&mut Point, &Point2)>(
        &mut self,
        rhs: &Triangle<Point2>,
        mut f: F,
    ) {
        f(&mut self.0[0], &rhs.0[0]);
        f(&mut self.0[1], &rhs.0[1]);
        f(&mut self.0[2], &rhs.0[2]);
    }
}

impl<Point: Default> Default for Triangle<Point> {
    fn default() -> Self {
        Triangle([Default::default(), Default::default(), Default::default()])
    }
}

impl<Point> Index<usize> for Triangle<Point> {
    type Output = Point;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<Point> IndexMut<usize> for Triangle<Point> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<T: Scalar, D: DimName> Triangle<OPoint<T, D>>
where
    DefaultAllocator: Allocator<D>,
{
    pub fn map_coords<T2: Scalar, F: FnMut(T) -> T2>(&self, mut f: F) -> Triangle<OPoint<T2, D>> {
        self.map(|x| x.map(&mut f))
    }

    pub fn zip_map_coords<T2: Scalar, T3: Scalar, F: FnMut(T, T2) -> T3>(
        &self,
        rhs: &Triangle<OPoint<T2, D>>,
        mut f: F,
    ) -> Triangle<OPoint<T3, D>> {
        self.zip_map(rhs, |x, y| OPoint {
            coords: x.coords.zip_map(&y.coords, &mut f),
        })
    }

    pub fn zip_apply_coords<T2: Scalar, F: FnMut(&mut T, T2)>(
        &mut self,
        rhs: &Triangle<OPoint<T2, D>>,
        mut f: F,
    ) {
        self.zip_apply(rhs, |x, y| x.coords.zip_apply(&y.coords, &mut f))
    }
}

impl Triangle<WorldPoint> {
    /// Returns a normal vector of the triangle, not normalized.
    pub fn normal(&self) -> WorldVector {
        (self[1] - self[0]).cross(&(self[2] - self[0]))
    }

    pub fn area(&self) -> FloatType {
        self.normal().norm() * 0.5
    }

    pub fn centroid(&self) -> WorldPoint {
        ((self[0].coords + self[1].coords + self[2].coords) / 3.0).into()
    }
}

impl<T: SimdValue + Scalar, D: DimName> SimdValue for Triangle<OPoint<T, D>>
where
    T::Element: Scalar,
    DefaultAllocator: Allocator<D>,
{
    const LANES: usize = T::LANES;
    type Element = Triangle<OPoint<T::Element, D>>;
    type SimdBool = T::SimdBool;

    fn splat(val: Self::Element) -> Self {
        val.map_coords(T::splat)
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

/// Weights of a point relative to a triangle's three vertices.
#[derive(Copy, Clone, Debug, Default)]
pub struct BarycentricWeights {
    pub w: [FloatType; 3],
}

impl BarycentricWeights {
    pub fn interpolate_uv(&self, a: &TexturePoint, b: &TexturePoint, c: &TexturePoint) -> TexturePoint {
        (a.coords * self.w[0] + b.coords * self.w[1] + c.coords * self.w[2]).into()
    }

    /// Index of the vertex the weighted point lies closest to.
    /// Matches vertex order on ties.
    pub fn largest_index(&self) -> usize {
        if self.w[1] > self.w[0] {
            if self.w[2] > self.w[1] { 2 } else { 1 }
        } else if self.w[2] > self.w[0] {
            2
        } else {
            0
        }
    }
}

/// Solves for the barycentric weights of `p` within the given triangle.
/// Returns `None` for degenerate triangles or when a weight falls outside
/// `[-tolerance, 1 + tolerance]`.
pub fn barycentric_weights(
    v0: &WorldPoint,
    v1: &WorldPoint,
    v2: &WorldPoint,
    p: &WorldPoint,
    tolerance: FloatType,
) -> Option<BarycentricWeights> {
    let e10 = v1 - v0;
    let e20 = v2 - v0;
    let normal = e10.cross(&e20);
    let denominator = normal.norm_squared();
    if denominator < EPSILON {
        return None;
    }

    let vp = p - v0;
    let w1 = vp.cross(&e20).dot(&normal) / denominator;
    let w2 = e10.cross(&vp).dot(&normal) / denominator;
    let w0 = 1.0 - w1 - w2;

    let in_range = |w: FloatType| w >= -tolerance && w <= 1.0 + tolerance;
    (in_range(w0) && in_range(w1) && in_range(w2)).then_some(BarycentricWeights { w: [w0, w1, w2] })
}
