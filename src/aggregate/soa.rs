//! 4-wide triangle lanes: the structure-of-arrays layout the kDOP leaves
//! store, and the segment/triangle-pack intersection kernel.

use num_traits::zero;
use simba::simd::{SimdBool as _, SimdPartialOrd as _, SimdValue};
// simba has no integer vectors, so the per-lane mesh/LOD ids use wide directly
use wide::i32x4;
use wide::CmpEq as _;

use crate::geometry::{
    EPSILON, FloatType, SIMD_LANES, SegmentSoa, SimdFloatType, SimdMaskType, Triangle, WorldPoint,
    WorldPoint4, WorldVector, WorldVector4,
};
use crate::util::bit_iter;

use super::PayloadIdx;

/// A triangle of the scratch list handed to the kDOP builder. Carries
/// everything the SOA packing step needs and is freed after the build.
#[derive(Clone, Debug)]
pub(crate) struct BuildTriangle {
    pub triangle: Triangle<WorldPoint>,
    pub payload: Option<PayloadIdx>,
    pub primitive_id: i32,
    pub lod_index: i32,
    pub two_sided: bool,
    pub static_and_opaque: bool,
}

impl BuildTriangle {
    pub fn new(
        payload: PayloadIdx,
        triangle: Triangle<WorldPoint>,
        primitive_id: i32,
        lod_index: i32,
        two_sided: bool,
        static_and_opaque: bool,
    ) -> BuildTriangle {
        BuildTriangle {
            triangle,
            payload: Some(payload),
            primitive_id,
            lod_index,
            two_sided,
            static_and_opaque,
        }
    }

    /// Lane filler for leaves whose triangle count is not a multiple of 4.
    /// The degenerate plane can never pass the side test, so no segment ever
    /// hits it.
    fn empty() -> BuildTriangle {
        BuildTriangle {
            triangle: Triangle::new(
                WorldPoint::origin(),
                WorldPoint::origin(),
                WorldPoint::origin(),
            ),
            payload: None,
            primitive_id: -1,
            lod_index: -1,
            two_sided: false,
            static_and_opaque: true,
        }
    }

    pub fn centroid(&self) -> WorldPoint {
        self.triangle.centroid()
    }

    /// Unit plane normal and plane offset (dot(normal, v0)).
    /// Degenerate triangles yield the zero normal.
    fn plane(&self) -> (WorldVector, FloatType) {
        let normal = (self.triangle[1] - self.triangle[2])
            .cross(&(self.triangle[0] - self.triangle[2]))
            .try_normalize(EPSILON)
            .unwrap_or_else(WorldVector::zeros);
        (normal, self.triangle[0].coords.dot(&normal))
    }
}

/// Per-query constants of the lane filter.
#[derive(Clone, Debug)]
pub(crate) struct SegmentFilter {
    pub static_and_opaque_only: bool,
    /// Direct shadowing rays respect backfaces; everything else collides two
    /// sided.
    pub two_sided_collision: bool,
    pub flip_sidedness: bool,
    /// Primitive id of the instigating mesh, -1 when the ray has none.
    pub instigator_primitive: i32,
    pub instigator_lod: i32,
}

/// Four triangles stored with parallel fields, tested against a segment in
/// one step.
#[derive(Clone, Debug)]
pub(crate) struct TrianglePack {
    pub positions: Triangle<WorldPoint4>,
    pub normals: WorldVector4,
    pub plane_d: SimdFloatType,
    pub two_sided: SimdMaskType,
    pub static_and_opaque: SimdMaskType,
    pub primitive_ids: i32x4,
    pub lod_indices: i32x4,
    pub payloads: [Option<PayloadIdx>; SIMD_LANES],
}

impl TrianglePack {
    /// Packs up to 4 build triangles into one SOA value, padding short lanes.
    pub fn pack(triangles: &[BuildTriangle]) -> TrianglePack {
        assert!(!triangles.is_empty() && triangles.len() <= SIMD_LANES);
        let filler = BuildTriangle::empty();
        let lane = |i: usize| triangles.get(i).unwrap_or(&filler);

        let mut positions = Triangle::<WorldPoint4>::splat(lane(0).triangle.clone());
        let mut normals = WorldVector4::zeros();
        let mut plane_d = zero::<SimdFloatType>();
        let mut two_sided = SimdMaskType::splat(false);
        let mut static_and_opaque = SimdMaskType::splat(false);
        let mut primitive_ids = [0i32; SIMD_LANES];
        let mut lod_indices = [0i32; SIMD_LANES];
        let mut payloads = [None; SIMD_LANES];

        for i in 0..SIMD_LANES {
            let source = lane(i);
            let (normal, d) = source.plane();
            positions.replace(i, source.triangle.clone());
            normals.x.replace(i, normal.x);
            normals.y.replace(i, normal.y);
            normals.z.replace(i, normal.z);
            plane_d.replace(i, d);
            two_sided.replace(i, source.two_sided);
            static_and_opaque.replace(i, source.static_and_opaque);
            primitive_ids[i] = source.primitive_id;
            lod_indices[i] = source.lod_index;
            payloads[i] = source.payload;
        }

        TrianglePack {
            positions,
            normals,
            plane_d,
            two_sided,
            static_and_opaque,
            primitive_ids: i32x4::from(primitive_ids),
            lod_indices: i32x4::from(lod_indices),
            payloads,
        }
    }

    /// Signed distances of a point pack from the 4 triangle planes.
    fn plane_distances(&self, point: &WorldPoint4) -> SimdFloatType {
        self.normals.dot(&point.coords) - self.plane_d
    }

    /// Lanes passing the LOD visibility rule: triangles of other primitives
    /// collide only at LOD 0, triangles of the instigating primitive only at
    /// its own LOD.
    fn lod_visible_lanes(&self, filter: &SegmentFilter) -> u64 {
        let same_primitive = self.primitive_ids.cmp_eq(i32x4::splat(filter.instigator_primitive));
        let lod_zero = self.lod_indices.cmp_eq(i32x4::splat(0));
        let same_lod = self.lod_indices.cmp_eq(i32x4::splat(filter.instigator_lod));
        let visible = (!same_primitive & lod_zero) | (same_primitive & same_lod);

        visible
            .to_array()
            .iter()
            .enumerate()
            .filter(|&(_, &lane)| lane != 0)
            .fold(0u64, |bits, (i, _)| bits | 1 << i)
    }

    /// Segment vs 4-triangle intersection test.
    ///
    /// Returns the lane and distance fraction of the nearest qualifying hit
    /// closer than `best_time`, or `None`. `excluded_lanes` removes candidate
    /// lanes (self-shadow suppression). On a tie the lowest lane wins.
    pub fn segment_intersection(
        &self,
        segment: &SegmentSoa,
        filter: &SegmentFilter,
        best_time: FloatType,
        excluded_lanes: u64,
    ) -> Option<(usize, FloatType)> {
        let tolerance = SimdFloatType::splat(crate::geometry::SURFACE_TOLERANCE);

        let start_dist = self.plane_distances(&segment.start);
        let end_dist = self.plane_distances(&segment.end);

        // Both end points on the same side of the plane (or coplanar)?
        let mut mask = (start_dist * end_dist).simd_le(-tolerance);
        if mask.none() {
            return None;
        }

        if filter.static_and_opaque_only {
            mask = mask & self.static_and_opaque;
        }

        if !filter.two_sided_collision {
            // Reject backface hits of non-two-sided triangles
            let dots = self.normals.dot(&segment.direction);
            let modified_dots = if filter.flip_sidedness { -dots } else { dots };
            mask = mask & (modified_dots.simd_ge(zero()) | self.two_sided);
            if mask.none() {
                return None;
            }
        }

        let time = start_dist / (start_dist - end_dist);
        mask = mask & time.simd_ge(zero()) & time.simd_lt(SimdFloatType::splat(best_time));
        if mask.none() {
            return None;
        }

        let intersection = WorldPoint4 {
            coords: segment.start.coords + segment.direction * time,
        };

        // Is the intersection point inside all three edge half-spaces?
        for side in 0..3 {
            let edge = self.positions[(side + 1) % 3].coords.clone()
                - self.positions[side].coords.clone();
            let side_direction = self.normals.cross(&edge);
            let side_w = side_direction.dot(&self.positions[side].coords);
            let dot_w = side_direction.dot(&intersection.coords);
            mask = mask & (dot_w - side_w).simd_lt(tolerance);
            if mask.none() {
                return None;
            }
        }

        let candidate_lanes = mask.bitmask() & self.lod_visible_lanes(filter) & !excluded_lanes;

        let mut best: Option<(usize, FloatType)> = None;
        for lane in bit_iter(candidate_lanes) {
            let lane_time = time.extract(lane);
            if best.is_none_or(|(_, t)| lane_time < t) {
                best = Some((lane, lane_time));
            }
        }
        best
    }

    /// Plane normal of one lane.
    pub fn lane_normal(&self, lane: usize) -> WorldVector {
        WorldVector::new(
            self.normals.x.extract(lane),
            self.normals.y.extract(lane),
            self.normals.z.extract(lane),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert2::assert;
    use test_case::test_case;

    fn unit_triangle_at_z(z: f32) -> Triangle<WorldPoint> {
        Triangle::new(
            WorldPoint::new(-1.0, -1.0, z),
            WorldPoint::new(1.0, -1.0, z),
            WorldPoint::new(0.0, 1.0, z),
        )
    }

    fn build(payload: u32, z: f32) -> BuildTriangle {
        BuildTriangle::new(
            PayloadIdx::from_raw(payload),
            unit_triangle_at_z(z),
            0,
            0,
            false,
            true,
        )
    }

    fn permissive_filter() -> SegmentFilter {
        SegmentFilter {
            static_and_opaque_only: false,
            two_sided_collision: true,
            flip_sidedness: false,
            instigator_primitive: -1,
            instigator_lod: -1,
        }
    }

    fn downward_segment() -> SegmentSoa {
        SegmentSoa::new(WorldPoint::new(0.0, 0.0, 10.0), WorldPoint::new(0.0, 0.0, -10.0))
    }

    #[test]
    fn nearest_lane_wins() {
        let pack = TrianglePack::pack(&[build(0, 0.0), build(1, 5.0), build(2, -5.0)]);
        let (lane, time) = pack
            .segment_intersection(&downward_segment(), &permissive_filter(), 1.0, 0)
            .unwrap();
        assert!(lane == 1); // z = 5 is the closest plane from z = 10
        assert!((time - 0.25).abs() < 1e-5);
    }

    #[test]
    fn padding_lanes_never_hit() {
        let pack = TrianglePack::pack(&[build(0, 0.0)]);
        let (lane, _) = pack
            .segment_intersection(&downward_segment(), &permissive_filter(), 1.0, 0)
            .unwrap();
        assert!(lane == 0);
        assert!(pack.payloads[1].is_none());
    }

    #[test]
    fn best_time_prunes_farther_hits() {
        let pack = TrianglePack::pack(&[build(0, 0.0)]);
        // The hit would be at time 0.5; a best time of 0.3 must reject it
        let result = pack.segment_intersection(&downward_segment(), &permissive_filter(), 0.3, 0);
        assert!(result.is_none());
    }

    #[test]
    fn excluded_lanes_are_skipped() {
        let pack = TrianglePack::pack(&[build(0, 5.0), build(1, 0.0)]);
        let (lane, _) = pack
            .segment_intersection(&downward_segment(), &permissive_filter(), 1.0, 0b01)
            .unwrap();
        assert!(lane == 1);
    }

    #[test]
    fn segment_next_to_triangle_misses() {
        let pack = TrianglePack::pack(&[build(0, 0.0)]);
        let segment =
            SegmentSoa::new(WorldPoint::new(5.0, 5.0, 10.0), WorldPoint::new(5.0, 5.0, -10.0));
        assert!(
            pack.segment_intersection(&segment, &permissive_filter(), 1.0, 0)
                .is_none()
        );
    }

    /// One sided collision: the triangle's normal points along -Z (winding is
    /// clockwise seen from above), so a downward segment front-face hits,
    /// and flipping sidedness turns it into a rejected backface hit.
    #[test_case(false, true ; "front_face_hits")]
    #[test_case(true, false ; "flipped_sidedness_rejects")]
    fn backface_culling(flip: bool, expect_hit: bool) {
        let pack = TrianglePack::pack(&[build(0, 0.0)]);
        let filter = SegmentFilter {
            two_sided_collision: false,
            flip_sidedness: flip,
            ..permissive_filter()
        };
        let result = pack.segment_intersection(&downward_segment(), &filter, 1.0, 0);
        assert!(result.is_some() == expect_hit);
    }

    #[test]
    fn two_sided_triangle_ignores_backface_test() {
        let mut triangle = build(0, 0.0);
        triangle.two_sided = true;
        let pack = TrianglePack::pack(&[triangle]);
        let filter = SegmentFilter {
            two_sided_collision: false,
            flip_sidedness: true,
            ..permissive_filter()
        };
        assert!(
            pack.segment_intersection(&downward_segment(), &filter, 1.0, 0)
                .is_some()
        );
    }

    #[test]
    fn static_and_opaque_only_filters_lanes() {
        let mut masked = build(0, 0.0);
        masked.static_and_opaque = false;
        let pack = TrianglePack::pack(&[masked, build(1, -2.0)]);
        let filter = SegmentFilter {
            static_and_opaque_only: true,
            ..permissive_filter()
        };
        let (lane, _) = pack
            .segment_intersection(&downward_segment(), &filter, 1.0, 0)
            .unwrap();
        assert!(lane == 1);
    }

    /// Only LOD 0 of other primitives is visible; the instigating primitive
    /// collides at its own LOD.
    #[test_case(7, 1, 0 ; "other_primitive_lod1_hidden")]
    #[test_case(3, 1, 1 ; "own_lod1_visible")]
    fn lod_visibility_rule(primitive: i32, lod: i32, expected_lane: usize) {
        let mut lod0 = build(0, 0.0);
        lod0.primitive_id = 9;
        lod0.lod_index = 0;
        let mut lod1 = build(1, 2.0);
        lod1.primitive_id = primitive;
        lod1.lod_index = lod;
        let pack = TrianglePack::pack(&[lod0, lod1]);

        let filter = SegmentFilter {
            instigator_primitive: 3,
            instigator_lod: 1,
            ..permissive_filter()
        };
        let (lane, _) = pack
            .segment_intersection(&downward_segment(), &filter, 1.0, 0)
            .unwrap();
        assert!(lane == expected_lane);
    }
}
