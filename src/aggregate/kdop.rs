//! The kDOP tree: a binary bounding-volume hierarchy over 4-wide triangle
//! lanes. Built once from the aggregate's scratch triangle list, then queried
//! read-only by any number of threads.

use assert2::debug_assert;
use index_vec::IndexVec;
use itertools::partition;
use simba::simd::{SimdBool as _, SimdPartialOrd as _, SimdValue};

use crate::geometry::{
    FloatType, SIMD_LANES, SegmentSoa, SimdFloatType, WorldBox, WorldBox4, WorldPoint,
    WorldVector,
};

use super::soa::{BuildTriangle, SegmentFilter, TrianglePack};
use super::{MeshIdx, PayloadIdx};

/// Triangle count above which a node keeps splitting.
const MAX_TRIS_PER_LEAF: usize = 4;

index_vec::define_index_type! {
    pub struct KdopNodeIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    pub struct PackIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

const ROOT_NODE: KdopNodeIdx = KdopNodeIdx::from_raw_unchecked(0);

#[derive(Clone, Debug)]
enum NodeContent {
    Inner {
        left: KdopNodeIdx,
        right: KdopNodeIdx,
    },
    Leaf {
        first_pack: PackIdx,
        num_packs: u32,
    },
}

/// A tree node. Lanes 0/1 of `child_bounds` hold the left/right child volumes
/// (for leaves, the leaf's own volume); lanes 2/3 are duplicates that the
/// traversal ignores.
#[derive(Clone, Debug)]
struct KdopNode {
    child_bounds: WorldBox4,
    content: NodeContent,
}

pub(crate) struct KdopTree {
    nodes: IndexVec<KdopNodeIdx, KdopNode>,
    packs: IndexVec<PackIdx, TrianglePack>,
    num_leaves: usize,
}

impl KdopTree {
    pub fn empty() -> KdopTree {
        KdopTree {
            nodes: IndexVec::new(),
            packs: IndexVec::new(),
            num_leaves: 0,
        }
    }

    /// Builds the tree, consuming (and reordering) the scratch triangle list.
    pub fn build(mut triangles: Vec<BuildTriangle>) -> KdopTree {
        let mut tree = KdopTree::empty();
        if triangles.is_empty() {
            return tree;
        }
        tree.nodes
            .raw
            .reserve(2 * triangles.len() / MAX_TRIS_PER_LEAF + 1);
        tree.packs.raw.reserve(triangles.len() / SIMD_LANES + 1);
        tree.split_triangle_list(&mut triangles);
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    /// Triangle capacity of the packed leaves, padding lanes included.
    pub fn num_packed_triangles(&self) -> usize {
        self.packs.len() * SIMD_LANES
    }

    pub fn allocated_bytes(&self) -> usize {
        self.nodes.len() * std::mem::size_of::<KdopNode>()
            + self.packs.len() * std::mem::size_of::<TrianglePack>()
    }

    /// Creates a node from the triangle span and returns its index and tight
    /// bounding box. Splits on the highest-variance centroid axis about the
    /// centroid mean (the splatter method).
    fn split_triangle_list(&mut self, triangles: &mut [BuildTriangle]) -> (KdopNodeIdx, WorldBox) {
        if triangles.len() > MAX_TRIS_PER_LEAF {
            let (axis, mean) = choose_split_plane(triangles);
            let mut split = partition(triangles.iter_mut(), |t| t.centroid()[axis] < mean);
            // Degenerate case: every centroid landed on one side
            if split == 0 || split == triangles.len() {
                split = triangles.len() / 2;
            }
            let (left_triangles, right_triangles) = triangles.split_at_mut(split);

            // Placeholder so this node precedes its children in the arena
            // (node 0 stays the root).
            let node_idx = self.nodes.push(placeholder_node());
            let (left, left_bounds) = self.split_triangle_list(left_triangles);
            let (right, right_bounds) = self.split_triangle_list(right_triangles);

            let mut child_bounds = WorldBox4::splat(left_bounds.clone());
            child_bounds.replace(1, right_bounds.clone());
            self.nodes[node_idx] = KdopNode {
                child_bounds,
                content: NodeContent::Inner { left, right },
            };

            let mut bounds = left_bounds;
            bounds.grow_to_box(&right_bounds);
            (node_idx, bounds)
        } else {
            let first_pack = self.packs.next_idx();
            for chunk in triangles.chunks(SIMD_LANES) {
                self.packs.push(TrianglePack::pack(chunk));
            }
            let num_packs = self.packs.next_idx().raw() - first_pack.raw();

            let mut bounds = WorldBox::empty();
            for triangle in triangles.iter() {
                for vertex in triangle.triangle.iter() {
                    bounds.grow_to_point(vertex);
                }
            }

            let node_idx = self.nodes.push(KdopNode {
                child_bounds: WorldBox4::splat(bounds.clone()),
                content: NodeContent::Leaf {
                    first_pack,
                    num_packs,
                },
            });
            self.num_leaves += 1;
            (node_idx, bounds)
        }
    }

    /// Checks the segment against the whole tree starting from the root.
    pub fn line_check(&self, check: &mut LineCheck) -> bool {
        if self.is_empty() {
            return false;
        }
        self.line_check_node(ROOT_NODE, check)
    }

    /// Checks the segment against one node's subtree. Also the entry point for
    /// coherent-cache probes that resume from a remembered node.
    pub fn line_check_node(&self, node_idx: KdopNodeIdx, check: &mut LineCheck) -> bool {
        let node = &self.nodes[node_idx];
        match node.content {
            NodeContent::Inner { left, right } => {
                let (min_t, max_t) = node.child_bounds.segment_intersection(&check.segment);
                let current_best = SimdFloatType::splat(check.result.time);
                let hit_mask = max_t.simd_ge(num_traits::zero())
                    & max_t.simd_ge(min_t)
                    & min_t.simd_lt(current_best);
                let bits = hit_mask.bitmask();
                let left_hit = bits & 1 != 0;
                let right_hit = bits & 2 != 0;

                match (left_hit, right_hit) {
                    (false, false) => false,
                    (true, false) => self.line_check_node(left, check),
                    (false, true) => self.line_check_node(right, check),
                    (true, true) => {
                        // Descend into the closer child first; the farther one
                        // only if it can still produce a closer hit.
                        let left_t = min_t.extract(0);
                        let right_t = min_t.extract(1);
                        let (near, far, far_t) = if left_t < right_t {
                            (left, right, right_t)
                        } else {
                            (right, left, left_t)
                        };
                        let mut hit = self.line_check_node(near, check);
                        if far_t < check.result.time && (!hit || check.find_closest) {
                            hit |= self.line_check_node(far, check);
                        }
                        hit
                    }
                }
            }
            NodeContent::Leaf {
                first_pack,
                num_packs,
            } => self.line_check_leaf(node_idx, first_pack, num_packs, check),
        }
    }

    fn line_check_leaf(
        &self,
        node_idx: KdopNodeIdx,
        first_pack: PackIdx,
        num_packs: u32,
        check: &mut LineCheck,
    ) -> bool {
        let mut any_hit = false;
        for offset in 0..num_packs as usize {
            let pack = &self.packs[first_pack + offset];
            let excluded = check.excluded_lanes(pack);
            if let Some((lane, time)) = pack.segment_intersection(
                &check.segment,
                &check.filter,
                check.result.time,
                excluded,
            ) {
                let Some(payload) = pack.payloads[lane] else {
                    debug_assert!(false, "padding lane produced a hit");
                    continue;
                };
                check.result.time = time;
                check.result.payload = Some(payload);
                check.result.normal = pack.lane_normal(lane);
                check.result.hit_node = Some(node_idx);
                any_hit = true;
                if !check.find_closest {
                    break;
                }
            }
        }
        any_hit
    }
}

fn placeholder_node() -> KdopNode {
    KdopNode {
        child_bounds: WorldBox4::splat(WorldBox::empty()),
        content: NodeContent::Leaf {
            first_pack: PackIdx::from_raw(0),
            num_packs: 0,
        },
    }
}

/// Picks the split axis with the highest centroid variance and returns the
/// centroid mean along it.
fn choose_split_plane(triangles: &[BuildTriangle]) -> (usize, FloatType) {
    let count = triangles.len() as FloatType;
    let mut best = (0usize, 0.0, -1.0);
    for axis in 0..3 {
        let mean = triangles
            .iter()
            .map(|t| t.centroid()[axis])
            .sum::<FloatType>()
            / count;
        let variance = triangles
            .iter()
            .map(|t| {
                let deviation = t.centroid()[axis] - mean;
                deviation * deviation
            })
            .sum::<FloatType>()
            / count;
        if variance >= best.2 {
            best = (axis, mean, variance);
        }
    }
    (best.0, best.1)
}

/// The aggregated state of one segment query: the precomputed segment, the
/// lane filter, self-shadow suppression, and the best result so far.
pub(crate) struct LineCheck<'a> {
    pub segment: SegmentSoa,
    pub filter: SegmentFilter,
    pub find_closest: bool,
    /// When set, lanes owned by this mesh are never candidates.
    pub exclude_mesh: Option<MeshIdx>,
    payload_owner: &'a dyn Fn(PayloadIdx) -> MeshIdx,
    pub result: CheckResult,
}

#[derive(Clone, Debug)]
pub(crate) struct CheckResult {
    /// Best hit time as a fraction of the segment, 1.0 = no hit yet.
    pub time: FloatType,
    pub payload: Option<PayloadIdx>,
    pub normal: WorldVector,
    pub hit_node: Option<KdopNodeIdx>,
}

impl<'a> LineCheck<'a> {
    pub fn new(
        start: WorldPoint,
        end: WorldPoint,
        filter: SegmentFilter,
        find_closest: bool,
        exclude_mesh: Option<MeshIdx>,
        payload_owner: &'a dyn Fn(PayloadIdx) -> MeshIdx,
    ) -> LineCheck<'a> {
        LineCheck {
            segment: SegmentSoa::new(start, end),
            filter,
            find_closest,
            exclude_mesh,
            payload_owner,
            result: CheckResult {
                time: 1.0,
                payload: None,
                normal: WorldVector::zeros(),
                hit_node: None,
            },
        }
    }

    /// Bit mask of the pack's lanes suppressed by self-shadowing.
    fn excluded_lanes(&self, pack: &TrianglePack) -> u64 {
        let Some(excluded_mesh) = self.exclude_mesh else {
            return 0;
        };
        let mut bits = 0u64;
        for (lane, payload) in pack.payloads.iter().enumerate() {
            if let Some(payload) = payload {
                if (self.payload_owner)(*payload) == excluded_mesh {
                    bits |= 1 << lane;
                }
            }
        }
        bits
    }
}
