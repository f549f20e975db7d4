//! The aggregate scene mesh: all shadow casting mesh instances merged into
//! shared vertex/UV pools and one kDOP tree, queried by light rays.

pub mod kdop;
mod ray_intersection;
mod soa;

pub use ray_intersection::TraceSettings;

use assert2::debug_assert;
use bon::bon;
use index_vec::IndexVec;

use crate::geometry::{FloatType, TexturePoint, WorldBox, WorldPoint};
use crate::mesh::{Mesh, MeshFlags, world_triangle};
use kdop::KdopTree;
use soa::BuildTriangle;

/// Triangles with less area than this don't make it into the kDOP.
const TRIANGLE_AREA_THRESHOLD: FloatType = 1e-5;

index_vec::define_index_type! {
    /// Handle of a mesh instance registered with the aggregate.
    pub struct MeshIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    /// Handle of a lightmap mapping registered with the aggregate.
    pub struct MappingIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    pub struct MeshInfoIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    pub struct PayloadIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

/// Where a mesh's vertices begin inside the aggregate's shared pools.
#[derive(Copy, Clone, Debug)]
pub struct MeshInfo {
    pub base_index: u32,
    pub mesh: MeshIdx,
}

/// Provenance of one kDOP triangle: owning mesh/mapping, material element and
/// the triangle's vertex positions in the shared pools (global indices).
#[derive(Clone, Debug)]
pub struct TrianglePayload {
    pub mesh_info: MeshInfoIdx,
    pub mapping: Option<MappingIdx>,
    pub element_index: usize,
    pub vertex_indices: [u32; 3],
}

/// How a mesh's surface parameterization maps to its static lighting cache.
#[derive(Copy, Clone, Debug)]
pub enum MappingSpec {
    /// Lightmap texels addressed through a UV channel of the mesh.
    Texture { lightmap_uv_index: usize },
    /// Per-vertex lighting, no lightmap UVs.
    Vertex,
}

#[derive(Copy, Clone, Debug)]
pub struct Mapping {
    pub mesh: MeshIdx,
    pub lightmap_uv_index: Option<usize>,
}

/// Scene-wide constants consumed by the aggregate. Passed in explicitly; there
/// is no process-wide configuration.
#[derive(Clone, Debug)]
pub struct SceneConfig {
    /// Scale of the level, applied to fixed world-space offsets.
    pub level_scale: FloatType,
    /// How far past an intersection a restarted visibility ray begins, to
    /// avoid re-hitting the same triangle.
    pub visibility_ray_offset_distance: FloatType,
    /// Optional sub-region biasing the secondary surface-area accumulator.
    /// Never filters ray queries.
    pub importance_volume: Option<WorldBox>,
}

#[bon]
impl SceneConfig {
    #[builder]
    pub fn new(
        #[builder(default = 1.0)] level_scale: FloatType,
        #[builder(default = 0.1)] visibility_ray_offset_distance: FloatType,
        importance_volume: Option<WorldBox>,
    ) -> SceneConfig {
        SceneConfig {
            level_scale,
            visibility_ray_offset_distance,
            importance_volume,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        SceneConfig::builder().build()
    }
}

/// The whole scene as one triangle soup behind a kDOP tree.
///
/// Lifecycle: `add_mesh` during single-threaded scene import, then one
/// `prepare_for_raytracing`, after which the aggregate is immutable and
/// `intersect_light_ray` may be called concurrently from any number of
/// threads.
pub struct AggregateMesh {
    pub(crate) config: SceneConfig,

    pub(crate) meshes: IndexVec<MeshIdx, Mesh>,
    pub(crate) mappings: IndexVec<MappingIdx, Mapping>,

    /// Parallel, index-aligned pools shared by every merged mesh.
    pub(crate) vertices: Vec<WorldPoint>,
    pub(crate) uvs: Vec<TexturePoint>,
    pub(crate) lightmap_uvs: Vec<TexturePoint>,

    pub(crate) mesh_infos: IndexVec<MeshInfoIdx, MeshInfo>,
    pub(crate) payloads: IndexVec<PayloadIdx, TrianglePayload>,

    /// Build-time scratch, handed to the kDOP builder and then freed.
    build_triangles: Vec<BuildTriangle>,
    pub(crate) tree: KdopTree,

    scene_bounds: WorldBox,
    scene_surface_area: FloatType,
    scene_surface_area_within_importance_volume: FloatType,
    prepared: bool,
}

impl AggregateMesh {
    pub fn new(config: SceneConfig) -> AggregateMesh {
        AggregateMesh {
            config,
            meshes: IndexVec::new(),
            mappings: IndexVec::new(),
            vertices: Vec::new(),
            uvs: Vec::new(),
            lightmap_uvs: Vec::new(),
            mesh_infos: IndexVec::new(),
            payloads: IndexVec::new(),
            build_triangles: Vec::new(),
            tree: KdopTree::empty(),
            scene_bounds: WorldBox::empty(),
            scene_surface_area: 0.0,
            scene_surface_area_within_importance_volume: 0.0,
            prepared: false,
        }
    }

    /// Pre-sizes the pools ahead of a known number of `add_mesh` calls.
    pub fn reserve_memory(&mut self, num_meshes: usize, num_vertices: usize, num_triangles: usize) {
        log::debug!(
            "reserving memory for {num_meshes} meshes, {num_vertices} vertices, {num_triangles} triangles"
        );
        self.meshes.raw.reserve(num_meshes);
        self.mesh_infos.raw.reserve(num_meshes);
        self.vertices.reserve(num_vertices);
        self.uvs.reserve(num_vertices);
        self.lightmap_uvs.reserve(num_vertices);
        self.payloads.raw.reserve(num_triangles);
        self.build_triangles.reserve(num_triangles);
    }

    /// Merges a mesh instance into the aggregate. Instances without the
    /// `CASTS_SHADOW` flag are registered (their handle stays valid for ray
    /// construction) but contribute no triangles.
    pub fn add_mesh(
        &mut self,
        mesh: Mesh,
        mapping: Option<MappingSpec>,
    ) -> (MeshIdx, Option<MappingIdx>) {
        debug_assert!(!self.prepared, "add_mesh after prepare_for_raytracing");

        let mesh_idx = self.meshes.next_idx();
        let lightmap_uv_index = match mapping {
            Some(MappingSpec::Texture { lightmap_uv_index }) => Some(lightmap_uv_index),
            Some(MappingSpec::Vertex) | None => None,
        };
        let mapping_idx = mapping.map(|_| {
            self.mappings.push(Mapping {
                mesh: mesh_idx,
                lightmap_uv_index,
            })
        });

        if mesh.flags.contains(MeshFlags::CASTS_SHADOW) {
            self.scene_bounds.grow_to_box(mesh.bounding_box());
            self.merge_triangles(&mesh, mesh_idx, mapping_idx, lightmap_uv_index);
        }

        self.meshes.push(mesh);
        (mesh_idx, mapping_idx)
    }

    fn merge_triangles(
        &mut self,
        mesh: &Mesh,
        mesh_idx: MeshIdx,
        mapping_idx: Option<MappingIdx>,
        lightmap_uv_index: Option<usize>,
    ) {
        let base_index = self.vertices.len();
        let mesh_info_idx = self.mesh_infos.push(MeshInfo {
            base_index: base_index as u32,
            mesh: mesh_idx,
        });
        let num_vertices = mesh.num_vertices();
        self.vertices
            .resize(base_index + num_vertices, WorldPoint::origin());
        self.uvs
            .resize(base_index + num_vertices, TexturePoint::origin());
        self.lightmap_uvs
            .resize(base_index + num_vertices, TexturePoint::origin());

        let mesh_is_movable = mesh.flags.contains(MeshFlags::MOVABLE);
        for triangle_index in 0..mesh.num_triangles() {
            let (v0, v1, v2, element_index) = mesh.geometry.triangle(triangle_index);
            let local_indices = mesh.geometry.triangle_indices(triangle_index);

            for (local_index, vertex) in local_indices.into_iter().zip([&v0, &v1, &v2]) {
                let global = base_index + local_index;
                self.vertices[global] = vertex.world_position;
                self.uvs[global] = vertex.texture_coordinates[mesh.texture_coordinate_index];
                if let Some(channel) = lightmap_uv_index {
                    self.lightmap_uvs[global] = vertex.texture_coordinates[channel];
                }
            }

            let element = mesh.element(element_index);
            let two_sided = element.is_two_sided() || mesh.is_casting_shadow_as_two_sided();
            let static_and_opaque =
                !element.masked && !element.translucent && !mesh_is_movable;

            let triangle = world_triangle(&v0, &v1, &v2);
            let triangle_area = triangle.area();

            // Zero area triangles stay out of the kDOP but still count toward
            // the surface area totals.
            if triangle_area > TRIANGLE_AREA_THRESHOLD
                && mesh.is_element_casting_shadow(element_index)
            {
                let payload_idx = self.payloads.push(TrianglePayload {
                    mesh_info: mesh_info_idx,
                    mapping: mapping_idx,
                    element_index,
                    vertex_indices: local_indices.map(|i| (base_index + i) as u32),
                });
                self.build_triangles.push(BuildTriangle::new(
                    payload_idx,
                    triangle,
                    mesh.primitive_id,
                    mesh.lod_index,
                    two_sided,
                    static_and_opaque,
                ));
            }

            self.scene_surface_area += triangle_area;
            let inside_importance_volume = match &self.config.importance_volume {
                None => true,
                Some(volume) => [&v0, &v1, &v2]
                    .iter()
                    .any(|v| volume.contains_point(&v.world_position)),
            };
            if inside_importance_volume {
                self.scene_surface_area_within_importance_volume += triangle_area;
            }
        }
    }

    /// Builds the kDOP tree and frees the build scratch. One-shot and
    /// irreversible; no further `add_mesh` calls are valid.
    pub fn prepare_for_raytracing(&mut self) {
        debug_assert!(!self.prepared, "prepare_for_raytracing called twice");

        let build_triangles = std::mem::take(&mut self.build_triangles);
        let num_build_triangles = build_triangles.len();
        self.tree = KdopTree::build(build_triangles);
        self.prepared = true;

        let packed_triangles = self.tree.num_packed_triangles();
        log::debug!(
            "static lighting kDOP: {} nodes, {} leaves, {} triangles, {} vertices",
            self.tree.num_nodes(),
            self.tree.num_leaves(),
            packed_triangles,
            self.vertices.len(),
        );
        if packed_triangles > 0 {
            log::debug!(
                "static lighting kDOP: {:.3}% wasted space in leaves",
                (packed_triangles - num_build_triangles) as f32 / packed_triangles as f32 * 100.0,
            );
        }
    }

    /// Scene bounds, expanded slightly so geometry lying exactly on the box
    /// is still comfortably inside.
    pub fn bounds(&self) -> WorldBox {
        if self.payloads.is_empty() {
            WorldBox::new(WorldPoint::origin(), WorldPoint::origin())
        } else {
            self.scene_bounds.expanded_by(10.0 * self.config.level_scale)
        }
    }

    pub fn surface_area(&self) -> FloatType {
        self.scene_surface_area
    }

    pub fn surface_area_within_importance_volume(&self) -> FloatType {
        self.scene_surface_area_within_importance_volume
    }

    pub fn mesh(&self, mesh: MeshIdx) -> &Mesh {
        &self.meshes[mesh]
    }

    pub fn mapping(&self, mapping: MappingIdx) -> &Mapping {
        &self.mappings[mapping]
    }

    pub fn mesh_info(&self, mesh_info: MeshInfoIdx) -> &MeshInfo {
        &self.mesh_infos[mesh_info]
    }

    pub fn triangle_payloads(&self) -> impl Iterator<Item = &TrianglePayload> {
        self.payloads.iter()
    }

    pub(crate) fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Constructs a light ray originating from a mapping of this scene.
    /// The ray's mesh is derived from the mapping.
    pub fn light_ray(
        &self,
        start: WorldPoint,
        end: WorldPoint,
        mapping: Option<MappingIdx>,
        light: Option<crate::ray::LightId>,
        trace_flags: crate::ray::TraceFlags,
    ) -> crate::ray::LightRay {
        crate::ray::LightRay {
            start,
            end,
            direction: end - start,
            mapping,
            mesh: mapping.map(|m| self.mappings[m].mesh),
            light,
            trace_flags,
        }
    }

    /// Writes memory accounting for the merged scene to the log.
    pub fn dump_stats(&self) {
        const MEGABYTE: f32 = 1048576.0;
        let size_of = |len: usize, item: usize| len * item;
        let tree_bytes = self.tree.allocated_bytes();
        let vertex_bytes = size_of(self.vertices.len(), std::mem::size_of::<WorldPoint>());
        let uv_bytes = size_of(self.uvs.len(), std::mem::size_of::<TexturePoint>());
        let payload_bytes = size_of(self.payloads.len(), std::mem::size_of::<TrianglePayload>());
        let mesh_info_bytes = size_of(self.mesh_infos.len(), std::mem::size_of::<MeshInfo>());

        log::debug!("kDOP tree       : {:7.1}Mb", tree_bytes as f32 / MEGABYTE);
        log::debug!("triangle payloads: {:7.1}Mb", payload_bytes as f32 / MEGABYTE);
        log::debug!("mesh infos      : {:7.1}Mb", mesh_info_bytes as f32 / MEGABYTE);
        log::debug!("vertices        : {:7.1}Mb", vertex_bytes as f32 / MEGABYTE);
        log::debug!("uvs             : {:7.1}Mb", (2 * uv_bytes) as f32 / MEGABYTE);
        log::debug!(
            "total           : {:7.1}Mb",
            (tree_bytes + vertex_bytes + 2 * uv_bytes + payload_bytes + mesh_info_bytes) as f32
                / MEGABYTE
        );
    }
}
