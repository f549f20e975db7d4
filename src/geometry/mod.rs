mod aabb;
mod ray_box_intersection;
mod triangle;

pub use aabb::Aabb;
pub use triangle::{BarycentricWeights, Triangle, barycentric_weights};

use simba::simd::SimdValue;

pub type FloatType = f32;
pub type SimdFloatType = simba::simd::WideF32x4;
pub type SimdMaskType = simba::simd::WideBoolF32x4;

/// Triangles and bounding volumes are tested 4 at a time.
pub const SIMD_LANES: usize = 4;

pub type WorldPoint = nalgebra::Point3<FloatType>;
pub type WorldVector = nalgebra::Vector3<FloatType>;
pub type WorldMatrix = nalgebra::Matrix4<FloatType>;
pub type WorldPoint4 = nalgebra::Point3<SimdFloatType>;
pub type WorldVector4 = nalgebra::Vector3<SimdFloatType>;
pub type TexturePoint = nalgebra::Point2<FloatType>;
pub type WorldBox = Aabb<WorldPoint>;
pub type WorldBox4 = Aabb<WorldPoint4>;

pub const EPSILON: FloatType = 1e-6;

/// Tolerance band around triangle planes and edges used by the segment/triangle kernel.
pub const SURFACE_TOLERANCE: FloatType = 1e-4;

/// Tolerance for recovering barycentric weights from a hit position.
pub const BARYCENTRIC_TOLERANCE: FloatType = 1e-2;

/// A line segment with every component replicated into 4 SIMD lanes,
/// precomputed once per query and tested against boxes and triangle packs.
#[derive(Clone, Debug)]
pub struct SegmentSoa {
    pub start: WorldPoint4,
    pub end: WorldPoint4,
    pub direction: WorldVector4,
    /// Componentwise inverse of the direction.
    /// Zeros in direction get turned into positive infinity regardless of the sign of the zero.
    pub inv_direction: WorldVector4,
}

impl SegmentSoa {
    pub fn new(start: WorldPoint, end: WorldPoint) -> SegmentSoa {
        let direction = end - start;
        let inv_direction =
            direction.map(|x| if x == 0.0 { f32::INFINITY } else { 1.0 / x });

        SegmentSoa {
            start: start.map(SimdFloatType::splat),
            end: end.map(SimdFloatType::splat),
            direction: direction.map(SimdFloatType::splat),
            inv_direction: inv_direction.map(SimdFloatType::splat),
        }
    }
}

/// Center/extent representation of an axis aligned box, used by the octree.
/// All math on this type is scalar.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoxCenterExtent {
    pub center: WorldPoint,
    pub extent: WorldVector,
}

impl BoxCenterExtent {
    pub fn new(center: WorldPoint, extent: WorldVector) -> BoxCenterExtent {
        BoxCenterExtent { center, extent }
    }

    pub fn from_box(b: &WorldBox) -> BoxCenterExtent {
        BoxCenterExtent {
            center: b.center(),
            extent: b.extent(),
        }
    }

    pub fn to_box(&self) -> WorldBox {
        Aabb::new(self.center - self.extent, self.center + self.extent)
    }

    /// Two boxes intersect when the projected distance between their centers
    /// stays within the sum of their extents on every axis.
    pub fn intersects(&self, other: &BoxCenterExtent) -> bool {
        let center_difference = (self.center - other.center).abs();
        let composite_extent = self.extent + other.extent;
        center_difference.x <= composite_extent.x
            && center_difference.y <= composite_extent.y
            && center_difference.z <= composite_extent.z
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert2::assert;

    #[test]
    fn segment_soa_inverts_direction() {
        let seg = SegmentSoa::new(WorldPoint::new(0.0, 0.0, 0.0), WorldPoint::new(2.0, 0.0, -4.0));
        assert!(seg.inv_direction.x.extract(0) == 0.5);
        assert!(seg.inv_direction.y.extract(0) == f32::INFINITY);
        assert!(seg.inv_direction.z.extract(3) == -0.25);
    }

    #[test]
    fn center_extent_round_trip() {
        let b = WorldBox::new(WorldPoint::new(-1.0, 2.0, 3.0), WorldPoint::new(3.0, 4.0, 7.0));
        let ce = BoxCenterExtent::from_box(&b);
        assert!(ce.center == WorldPoint::new(1.0, 3.0, 5.0));
        assert!(ce.extent == WorldVector::new(2.0, 1.0, 2.0));
        assert!(ce.to_box().min == b.min);
        assert!(ce.to_box().max == b.max);
    }

    #[test]
    fn center_extent_intersection_is_inclusive() {
        let a = BoxCenterExtent::new(WorldPoint::origin(), WorldVector::new(1.0, 1.0, 1.0));
        let touching = BoxCenterExtent::new(WorldPoint::new(2.0, 0.0, 0.0), WorldVector::new(1.0, 1.0, 1.0));
        let apart = BoxCenterExtent::new(WorldPoint::new(2.5, 0.0, 0.0), WorldVector::new(1.0, 1.0, 1.0));
        assert!(a.intersects(&touching));
        assert!(!a.intersects(&apart));
    }
}
