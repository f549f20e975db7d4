use std::time::Duration;

use crate::aggregate::kdop::KdopNodeIdx;
use crate::aggregate::{MappingIdx, MeshIdx};
use crate::geometry::{FloatType, WorldPoint, WorldVector};
use crate::material::LinearColor;
use crate::mesh::StaticLightingVertex;

bitflags::bitflags! {
    /// Per-ray tracing behavior. The flags are orthogonal and compose freely.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TraceFlags: u8 {
        /// Never report hits against the ray's own mesh.
        const SELF_SHADOW_DISABLE     = 0b0000_0001;
        /// Only collide with static, fully opaque materials.
        const STATIC_AND_OPAQUE_ONLY  = 0b0000_0010;
        /// Invert the backface test.
        const FLIP_SIDEDNESS          = 0b0000_0100;
    }
}

impl Default for TraceFlags {
    fn default() -> Self {
        TraceFlags::empty()
    }
}

/// Opaque handle of the light a shadow ray belongs to. Purely informational
/// at this layer.
pub type LightId = u32;

/// A line segment queried against the aggregate mesh.
///
/// `direction` is the unnormalized `end - start`. The only sanctioned
/// mutations are the two clip operations, which narrow the segment to a known
/// intersection during closest-hit refinement.
#[derive(Clone, Debug)]
pub struct LightRay {
    pub start: WorldPoint,
    pub end: WorldPoint,
    pub direction: WorldVector,
    /// Mapping the ray originates from, used for self-shadow handling.
    pub mapping: Option<MappingIdx>,
    /// Mesh of the originating mapping.
    pub mesh: Option<MeshIdx>,
    pub light: Option<LightId>,
    pub trace_flags: TraceFlags,
}

impl LightRay {
    pub fn new(start: WorldPoint, end: WorldPoint, trace_flags: TraceFlags) -> LightRay {
        LightRay {
            start,
            end,
            direction: end - start,
            mapping: None,
            mesh: None,
            light: None,
            trace_flags,
        }
    }

    pub fn length(&self) -> FloatType {
        self.direction.norm()
    }

    /// Clips the ray so it goes from the intersection point to the original end.
    pub fn clip_against_intersection_from_end(&mut self, intersection: WorldPoint) {
        self.start = intersection;
        self.direction = self.end - self.start;
    }

    /// Clips the ray so it goes from the original start to the intersection point.
    pub fn clip_against_intersection_from_start(&mut self, intersection: WorldPoint) {
        self.end = intersection;
        self.direction = self.end - self.start;
    }
}

/// A confirmed hit of a light ray against the scene.
#[derive(Clone, Debug)]
pub struct LightRayHit {
    /// Differential geometry at the intersection point.
    pub vertex: StaticLightingVertex,
    pub mesh: MeshIdx,
    pub mapping: Option<MappingIdx>,
    /// Index of the hit triangle's vertex closest to the intersection point,
    /// local to the hit mesh.
    pub vertex_index: usize,
    pub element_index: usize,
}

/// The outcome of an `intersect_light_ray` query. `transmission` is
/// meaningful whether or not the ray hit, as long as transmission was
/// requested.
#[derive(Clone, Debug)]
pub struct LightRayIntersection {
    pub hit: Option<LightRayHit>,
    pub transmission: LinearColor,
}

impl LightRayIntersection {
    pub fn none() -> LightRayIntersection {
        LightRayIntersection {
            hit: None,
            transmission: LinearColor::WHITE,
        }
    }

    pub fn intersects(&self) -> bool {
        self.hit.is_some()
    }
}

/// Per-thread scratch state for coherent ray batches.
///
/// Boolean visibility queries store the kDOP node that settled them; the next
/// ray of the batch probes that node before a full root descent, which pays
/// off when consecutive rays are spatially close (shadow rays from adjacent
/// texels to the same light). Never shared between threads.
#[derive(Clone, Debug, Default)]
pub struct CoherentRayCache {
    pub num_first_hit_rays_traced: u64,
    pub num_boolean_rays_traced: u64,
    pub first_hit_ray_time: Duration,
    pub boolean_ray_time: Duration,
    pub(crate) node: Option<KdopNodeIdx>,
}

impl CoherentRayCache {
    /// Invalidates the cached node between unrelated ray batches.
    /// Counters and timers keep accumulating.
    pub fn clear(&mut self) {
        self.node = None;
    }
}
