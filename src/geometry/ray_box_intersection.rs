use simba::simd::SimdValue;

use crate::util::simba::{SimbaWorkarounds as _, fast_max, fast_min};

use super::{SegmentSoa, SimdFloatType, WorldBox4};

impl WorldBox4 {
    /// Calculates segment intersection with the box pack.
    /// Returns minimum and maximum distance fraction along the segment;
    /// a lane intersects when min <= max. The caller clamps against the
    /// segment range and the best hit found so far.
    pub fn segment_intersection(&self, segment: &SegmentSoa) -> (SimdFloatType, SimdFloatType) {
        // Componentwise distance fractions along the segment to the box's min and max corners.
        // The multiplication is NAN if the segment starts inside the slab bounding plane
        // and is parallel to it. In this case we blend to +-infinity, so that the range
        // becomes infinite on that axis.
        let to_box_min = (self.min - segment.start)
            .component_mul(&segment.inv_direction)
            .map(|x| SimdFloatType::neg_infinity().select(x.is_nan(), x));
        let to_box_max = (self.max - segment.start)
            .component_mul(&segment.inv_direction)
            .map(|x| SimdFloatType::infinity().select(x.is_nan(), x));

        // Correctly ordered (min_t <= max_t)
        let componentwise_min_t = to_box_min.zip_map(&to_box_max, fast_min);
        let componentwise_max_t = to_box_min.zip_map(&to_box_max, fast_max);

        let min_t = fast_max(
            componentwise_min_t.x,
            fast_max(componentwise_min_t.y, componentwise_min_t.z),
        );
        let max_t = fast_min(
            componentwise_max_t.x,
            fast_min(componentwise_max_t.y, componentwise_max_t.z),
        );

        (min_t, max_t)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::{WorldBox, WorldPoint};
    use assert2::assert;
    use test_case::test_case;

    fn box4() -> WorldBox4 {
        WorldBox4::splat(WorldBox::new(
            WorldPoint::new(5.0, 5.0, 5.0),
            WorldPoint::new(10.0, 10.0, 10.0),
        ))
    }

    /// Asserts that all lanes agree and returns the intersection if one exists
    /// within the segment.
    fn scalar_result(result: (SimdFloatType, SimdFloatType)) -> Option<(f32, f32)> {
        let t1 = result.0.extract(0);
        let t2 = result.1.extract(0);
        for lane in 1..4 {
            assert!(result.0.extract(lane) == t1);
            assert!(result.1.extract(lane) == t2);
        }
        (t1 <= t2 && t2 >= 0.0 && t1 <= 1.0).then_some((t1, t2))
    }

    #[test]
    fn segment_through_box_hits() {
        let seg = SegmentSoa::new(WorldPoint::new(7.0, 7.0, 0.0), WorldPoint::new(7.0, 7.0, 20.0));
        let (t1, t2) = scalar_result(box4().segment_intersection(&seg)).unwrap();
        assert!((t1 - 0.25).abs() < 1e-6);
        assert!((t2 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn segment_starting_inside_clamps_to_negative_entry() {
        let seg = SegmentSoa::new(WorldPoint::new(7.0, 7.0, 7.0), WorldPoint::new(7.0, 7.0, 20.0));
        let (t1, t2) = scalar_result(box4().segment_intersection(&seg)).unwrap();
        assert!(t1 < 0.0);
        assert!(t2 > 0.0);
    }

    #[test_case(0.0, 7.0, 7.0, 0.0, 20.0, 7.0 ; "parallel_outside_x_slab")]
    #[test_case(12.0, 7.0, 7.0, 12.0, 7.0, 20.0 ; "parallel_outside_high_x")]
    #[test_case(0.0, 0.0, 0.0, -5.0, -5.0, -5.0 ; "pointing_away")]
    fn segment_misses(sx: f32, sy: f32, sz: f32, ex: f32, ey: f32, ez: f32) {
        let seg = SegmentSoa::new(WorldPoint::new(sx, sy, sz), WorldPoint::new(ex, ey, ez));
        assert!(scalar_result(box4().segment_intersection(&seg)).is_none());
    }

    /// A segment lying in a slab boundary plane produces 0 * inf = NaN slabs;
    /// the blend must keep the hit.
    #[test]
    fn segment_on_slab_plane_still_hits() {
        let seg = SegmentSoa::new(WorldPoint::new(5.0, 7.0, 0.0), WorldPoint::new(5.0, 7.0, 20.0));
        assert!(scalar_result(box4().segment_intersection(&seg)).is_some());
    }
}
