pub mod aggregate;
pub mod geometry;
pub mod material;
pub mod mesh;
pub mod octree;
pub mod ray;
mod util;

pub use aggregate::{AggregateMesh, MappingIdx, MeshIdx, SceneConfig, TraceSettings};
pub use ray::{CoherentRayCache, LightRay, LightRayIntersection, TraceFlags};
