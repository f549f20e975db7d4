//! Generic loose octree: a spatial container of arbitrary elements keyed by
//! bounding box. Child bounds are deliberately expanded beyond their tight
//! half-extent so elements near a split plane don't thrash between siblings.
//!
//! Nodes live in an arena and reference children by index, so teardown is a
//! single buffer drop and traversal never follows owning pointers.

use assert2::debug_assert;
use index_vec::IndexVec;

use crate::geometry::{BoxCenterExtent, FloatType, WorldPoint, WorldVector};
use crate::util::Stats;

/// Per-tree policy: how to compute element bounds and how eagerly to subdivide.
pub trait OctreeSemantics {
    type Element: Clone;

    fn bounding_box(element: &Self::Element) -> BoxCenterExtent;

    const MAX_ELEMENTS_PER_LEAF: usize;
    const MAX_NODE_DEPTH: u32;
    /// Node bounds are expanded by their extent divided by this.
    const LOOSENESS_DENOMINATOR: FloatType;
}

index_vec::define_index_type! {
    pub struct OctreeNodeIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

const ROOT_NODE: OctreeNodeIdx = OctreeNodeIdx::from_raw_unchecked(0);

/// A reference to one of the 8 children of an octree node.
/// The low three bits select the positive side of the X/Y/Z split planes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChildRef(u8);

impl ChildRef {
    fn new(positive_x: bool, positive_y: bool, positive_z: bool) -> ChildRef {
        ChildRef((positive_x as u8) | (positive_y as u8) << 1 | (positive_z as u8) << 2)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn positive_x(self) -> bool {
        self.0 & 1 != 0
    }

    fn positive_y(self) -> bool {
        self.0 & 2 != 0
    }

    fn positive_z(self) -> bool {
        self.0 & 4 != 0
    }

    pub fn all() -> impl Iterator<Item = ChildRef> {
        (0u8..8).map(ChildRef)
    }
}

/// A subset of a node's children. Three bits per side of each axis: a child is
/// in the subset when all the bits of its own subset are set.
#[derive(Copy, Clone, Debug, Default)]
struct ChildSubset(u8);

impl ChildSubset {
    fn single(child: ChildRef) -> ChildSubset {
        // The positive bits are the child index, the negative bits its complement.
        ChildSubset((child.0 & 0b111) | (!child.0 & 0b111) << 3)
    }

    fn contains(self, child: ChildRef) -> bool {
        let single = Self::single(child);
        self.0 & single.0 == single.0
    }
}

/// The context of a node, derived while walking down from the root:
/// the node's loose bounds and the geometry of its children.
#[derive(Clone, Debug)]
pub struct NodeContext {
    pub bounds: BoxCenterExtent,
    /// Loose extent of the node's children.
    child_extent: FloatType,
    /// Offset of the children's centers from this node's center.
    child_center_offset: FloatType,
    looseness_denominator: FloatType,
}

impl NodeContext {
    fn new(bounds: BoxCenterExtent, looseness_denominator: FloatType) -> NodeContext {
        // A child's tight extent is half its parent's, expanded by 1/looseness.
        let tight_child_extent = bounds.extent.x * 0.5;
        let loose_child_extent = tight_child_extent * (1.0 + 1.0 / looseness_denominator);
        NodeContext {
            bounds,
            child_extent: loose_child_extent,
            child_center_offset: bounds.extent.x - loose_child_extent,
            looseness_denominator,
        }
    }

    fn child_context(&self, child: ChildRef) -> NodeContext {
        let sign = |positive: bool| if positive { 1.0 } else { -1.0 };
        let center = WorldPoint::new(
            self.bounds.center.x + self.child_center_offset * sign(child.positive_x()),
            self.bounds.center.y + self.child_center_offset * sign(child.positive_y()),
            self.bounds.center.z + self.child_center_offset * sign(child.positive_z()),
        );
        let extent = WorldVector::new(self.child_extent, self.child_extent, self.child_extent);
        NodeContext::new(BoxCenterExtent::new(center, extent), self.looseness_denominator)
    }

    /// Which children's loose bounds intersect the query box.
    fn intersecting_children(&self, query: &BoxCenterExtent) -> ChildSubset {
        let query_min = query.center - query.extent;
        let query_max = query.center + query.extent;

        let positive_bounds_min = |axis: usize| {
            self.bounds.center[axis] + self.child_center_offset - self.child_extent
        };
        let negative_bounds_max = |axis: usize| {
            self.bounds.center[axis] - self.child_center_offset + self.child_extent
        };

        let mut bits = 0u8;
        for axis in 0..3 {
            if query_max[axis] > positive_bounds_min(axis) {
                bits |= 1 << axis;
            }
            if query_min[axis] <= negative_bounds_max(axis) {
                bits |= 1 << (axis + 3);
            }
        }
        ChildSubset(bits)
    }

    /// The single child whose loose bounds fully contain the query box, if any.
    fn containing_child(&self, query: &BoxCenterExtent) -> Option<ChildRef> {
        for axis in 0..3 {
            let negative_center = self.bounds.center[axis] - self.child_center_offset;
            let positive_center = self.bounds.center[axis] + self.child_center_offset;
            let negative_difference = query.center[axis] - negative_center;
            let positive_difference = positive_center - query.center[axis];
            let min_difference = negative_difference.min(positive_difference);
            if query.extent[axis] + min_difference > self.child_extent {
                return None;
            }
        }
        Some(ChildRef::new(
            self.bounds.center.x < query.center.x,
            self.bounds.center.y < query.center.y,
            self.bounds.center.z < query.center.z,
        ))
    }
}

struct Node<E> {
    elements: Vec<E>,
    children: [Option<OctreeNodeIdx>; 8],
    is_leaf: bool,
}

impl<E> Node<E> {
    fn new_leaf() -> Node<E> {
        Node {
            elements: Vec::new(),
            children: [None; 8],
            is_leaf: true,
        }
    }
}

pub struct Octree<S: OctreeSemantics> {
    nodes: IndexVec<OctreeNodeIdx, Node<S::Element>>,
    root_context: NodeContext,
    /// The extent of a leaf at the maximum allowed depth; leaves at or below
    /// this never subdivide, even when over the element budget.
    min_leaf_extent: FloatType,
}

impl<S: OctreeSemantics> Octree<S> {
    pub fn new(origin: WorldPoint, extent: FloatType) -> Octree<S> {
        let mut nodes = IndexVec::new();
        nodes.push(Node::new_leaf());
        let bounds = BoxCenterExtent::new(origin, WorldVector::new(extent, extent, extent));
        let per_level_shrink = (1.0 + 1.0 / S::LOOSENESS_DENOMINATOR) / 2.0;
        Octree {
            nodes,
            root_context: NodeContext::new(bounds, S::LOOSENESS_DENOMINATOR),
            min_leaf_extent: extent * per_level_shrink.powi(S::MAX_NODE_DEPTH as i32),
        }
    }

    pub fn add_element(&mut self, element: S::Element) {
        let context = self.root_context.clone();
        self.add_element_to_node(ROOT_NODE, context, element);
    }

    fn add_element_to_node(
        &mut self,
        start_node: OctreeNodeIdx,
        start_context: NodeContext,
        element: S::Element,
    ) {
        let element_bounds = S::bounding_box(&element);

        let mut node_idx = start_node;
        let mut context = start_context;
        loop {
            if self.nodes[node_idx].is_leaf {
                let over_budget =
                    self.nodes[node_idx].elements.len() + 1 > S::MAX_ELEMENTS_PER_LEAF;
                if over_budget && context.bounds.extent.x > self.min_leaf_extent {
                    // Turn the leaf into an interior node and push its elements
                    // back down, potentially creating children for them.
                    let former_elements = std::mem::take(&mut self.nodes[node_idx].elements);
                    self.nodes[node_idx].is_leaf = false;
                    for former in former_elements {
                        self.add_element_to_node(node_idx, context.clone(), former);
                    }
                    // Fall through with the same node, now interior.
                } else {
                    self.nodes[node_idx].elements.push(element);
                    return;
                }
            } else {
                match context.containing_child(&element_bounds) {
                    None => {
                        // No single child fully contains the element; it
                        // straddles a split plane and stays at this node.
                        self.nodes[node_idx].elements.push(element);
                        return;
                    }
                    Some(child) => {
                        let child_idx = match self.nodes[node_idx].children[child.index()] {
                            Some(existing) => existing,
                            None => {
                                let created = self.nodes.push(Node::new_leaf());
                                self.nodes[node_idx].children[child.index()] = Some(created);
                                created
                            }
                        };
                        context = context.child_context(child);
                        node_idx = child_idx;
                    }
                }
            }
        }
    }

    /// Lazily iterates over the elements whose bounding boxes intersect the
    /// query box. Forward-only; each matching element is produced exactly once.
    pub fn elements_intersecting_box(&self, query: BoxCenterExtent) -> ElementBoxIter<'_, S> {
        let mut iter = ElementBoxIter {
            tree: self,
            query,
            node_stack: Vec::new(),
            current: None,
            element_cursor: 0,
        };
        iter.enter_node(ROOT_NODE, self.root_context.clone());
        iter
    }

    pub fn num_elements(&self) -> usize {
        self.nodes.iter().map(|n| n.elements.len()).sum()
    }

    /// Writes octree shape diagnostics to the log.
    pub fn dump_stats(&self) {
        let mut num_leaves = 0;
        let mut per_node = Stats::default();
        for node in self.nodes.iter() {
            if node.is_leaf {
                num_leaves += 1;
            }
            per_node.add_sample(node.elements.len());
        }
        log::debug!(
            "octree: {} nodes ({} leaves), {} elements, per node: {}",
            self.nodes.len(),
            num_leaves,
            self.num_elements(),
            per_node,
        );
    }
}

pub struct ElementBoxIter<'a, S: OctreeSemantics> {
    tree: &'a Octree<S>,
    query: BoxCenterExtent,
    node_stack: Vec<(OctreeNodeIdx, NodeContext)>,
    current: Option<OctreeNodeIdx>,
    element_cursor: usize,
}

impl<'a, S: OctreeSemantics> ElementBoxIter<'a, S> {
    /// Makes a node current and queues its children that overlap the query.
    fn enter_node(&mut self, node_idx: OctreeNodeIdx, context: NodeContext) {
        debug_assert!(self.element_cursor == 0);
        let node = &self.tree.nodes[node_idx];
        if !node.is_leaf {
            let subset = context.intersecting_children(&self.query);
            for child in ChildRef::all() {
                if subset.contains(child) {
                    if let Some(child_idx) = node.children[child.index()] {
                        self.node_stack.push((child_idx, context.child_context(child)));
                    }
                }
            }
        }
        self.current = Some(node_idx);
    }
}

impl<'a, S: OctreeSemantics> Iterator for ElementBoxIter<'a, S> {
    type Item = &'a S::Element;

    fn next(&mut self) -> Option<&'a S::Element> {
        let tree = self.tree;
        loop {
            let node_idx = self.current?;
            let elements = &tree.nodes[node_idx].elements;

            while self.element_cursor < elements.len() {
                let element = &elements[self.element_cursor];
                self.element_cursor += 1;
                if S::bounding_box(element).intersects(&self.query) {
                    return Some(element);
                }
            }

            self.element_cursor = 0;
            match self.node_stack.pop() {
                Some((next_idx, context)) => {
                    self.current = None;
                    self.enter_node(next_idx, context);
                }
                None => {
                    self.current = None;
                    return None;
                }
            }
        }
    }
}
