pub mod bsp;
pub mod fluid;
pub mod landscape;
pub mod speedtree;
pub mod static_mesh;
pub mod terrain;

pub use bsp::{BspSurfaceData, BspTriangle};
pub use fluid::FluidSurfaceData;
pub use landscape::{HeightfieldTexel, LANDSCAPE_ZSCALE, LandscapeComponentData};
pub use speedtree::{SpeedTreeData, SpeedTreeElementGeometry, SpeedTreeGeometryKind};
pub use static_mesh::{StaticMeshData, StaticMeshElement, StaticMeshVertex};
pub use terrain::TerrainPatchData;

use std::ops::{Add, Mul, Sub};

use nalgebra::Matrix3;
use thiserror::Error;

use crate::geometry::{
    EPSILON, FloatType, TexturePoint, Triangle, WorldBox, WorldMatrix, WorldPoint, WorldVector,
};
use crate::material::MaterialElement;

/// Number of UV channels carried per vertex.
/// Channel 0 is the material UV; a later channel holds the lightmap UV.
pub const MAX_TEXCOORDS: usize = 4;

/// The vertex data used to build static lighting.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticLightingVertex {
    pub world_position: WorldPoint,
    pub world_tangent_x: WorldVector,
    pub world_tangent_y: WorldVector,
    pub world_tangent_z: WorldVector,
    pub texture_coordinates: [TexturePoint; MAX_TEXCOORDS],
}

impl Default for StaticLightingVertex {
    fn default() -> Self {
        StaticLightingVertex {
            world_position: WorldPoint::origin(),
            world_tangent_x: WorldVector::zeros(),
            world_tangent_y: WorldVector::zeros(),
            world_tangent_z: WorldVector::zeros(),
            texture_coordinates: [TexturePoint::origin(); MAX_TEXCOORDS],
        }
    }
}

impl StaticLightingVertex {
    /// Generates the X and Y tangents from the Z tangent such that the basis
    /// is orthonormal. A normal of (0,0,1) yields X (1,0,0) and Y (0,1,0).
    pub fn generate_vertex_tangents(&mut self) {
        let candidate = self.world_tangent_z.cross(&WorldVector::new(0.0, -1.0, 0.0));
        self.world_tangent_x = if candidate.norm_squared() < EPSILON {
            // The normal was nearly parallel to the Y axis, use the X axis instead
            self.world_tangent_z
                .cross(&WorldVector::new(1.0, 0.0, 0.0))
                .normalize()
        } else {
            candidate.normalize()
        };
        self.world_tangent_y = self.world_tangent_z.cross(&self.world_tangent_x);
    }
}

// Operators used for linear combinations of static lighting vertices.
impl Add for &StaticLightingVertex {
    type Output = StaticLightingVertex;

    fn add(self, rhs: &StaticLightingVertex) -> StaticLightingVertex {
        let mut result = StaticLightingVertex {
            world_position: (self.world_position.coords + rhs.world_position.coords).into(),
            world_tangent_x: self.world_tangent_x + rhs.world_tangent_x,
            world_tangent_y: self.world_tangent_y + rhs.world_tangent_y,
            world_tangent_z: self.world_tangent_z + rhs.world_tangent_z,
            ..Default::default()
        };
        for i in 0..MAX_TEXCOORDS {
            result.texture_coordinates[i] =
                (self.texture_coordinates[i].coords + rhs.texture_coordinates[i].coords).into();
        }
        result
    }
}

impl Sub for &StaticLightingVertex {
    type Output = StaticLightingVertex;

    fn sub(self, rhs: &StaticLightingVertex) -> StaticLightingVertex {
        let mut result = StaticLightingVertex {
            world_position: (self.world_position.coords - rhs.world_position.coords).into(),
            world_tangent_x: self.world_tangent_x - rhs.world_tangent_x,
            world_tangent_y: self.world_tangent_y - rhs.world_tangent_y,
            world_tangent_z: self.world_tangent_z - rhs.world_tangent_z,
            ..Default::default()
        };
        for i in 0..MAX_TEXCOORDS {
            result.texture_coordinates[i] =
                (self.texture_coordinates[i].coords - rhs.texture_coordinates[i].coords).into();
        }
        result
    }
}

impl Mul<FloatType> for &StaticLightingVertex {
    type Output = StaticLightingVertex;

    fn mul(self, rhs: FloatType) -> StaticLightingVertex {
        let mut result = StaticLightingVertex {
            world_position: (self.world_position.coords * rhs).into(),
            world_tangent_x: self.world_tangent_x * rhs,
            world_tangent_y: self.world_tangent_y * rhs,
            world_tangent_z: self.world_tangent_z * rhs,
            ..Default::default()
        };
        for i in 0..MAX_TEXCOORDS {
            result.texture_coordinates[i] = (self.texture_coordinates[i].coords * rhs).into();
        }
        result
    }
}

/// Stable identifier of the source object a mesh was created from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct ObjectGuid(pub [u32; 4]);

impl std::fmt::Display for ObjectGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08X}{:08X}{:08X}{:08X}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

bitflags::bitflags! {
    /// Per-instance lighting behavior flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MeshFlags: u8 {
        /// The instance contributes shadow casting triangles to the scene.
        const CASTS_SHADOW       = 0b0000_0001;
        /// The instance never shadows itself.
        const SELF_SHADOW_DISABLE = 0b0000_0010;
        /// The instance only shadows itself, never other meshes.
        const SELF_SHADOW_ONLY   = 0b0000_0100;
        /// All triangles cast shadows as if two sided.
        const TWO_SIDED_SHADOW   = 0b0000_1000;
        /// The instance can move at runtime and is excluded from
        /// static-and-opaque-only traces.
        const MOVABLE            = 0b0001_0000;
    }
}

impl Default for MeshFlags {
    fn default() -> Self {
        MeshFlags::CASTS_SHADOW
    }
}

#[derive(Debug, Error)]
pub enum MeshDataError {
    #[error("vertex index {index} out of range ({num_vertices} vertices)")]
    VertexIndexOutOfRange { index: usize, num_vertices: usize },
    #[error("index buffer length {len} is not divisible by 3")]
    IndexCountNotTriangles { len: usize },
    #[error("element index {index} out of range ({num_elements} elements)")]
    ElementIndexOutOfRange { index: usize, num_elements: usize },
    #[error("element ranges cover {covered} triangles, geometry has {num_triangles}")]
    ElementRangesMismatch { covered: usize, num_triangles: usize },
    #[error("heightfield has {actual} samples, expected {expected}")]
    HeightfieldSizeMismatch { expected: usize, actual: usize },
    #[error("grid must have at least one quad per axis")]
    DegenerateGrid,
    #[error("mesh must have at least one material element")]
    NoElements,
    #[error("uv channel {index} out of range (expected < {max})", max = MAX_TEXCOORDS)]
    InvalidUvChannel { index: usize },
    #[error("local to world transform is singular")]
    SingularTransform,
    #[error("surface axes are parallel")]
    DegenerateSurfaceAxes,
}

/// Geometry source of a mesh instance. Each variant synthesizes triangles and
/// vertices from its own raw representation; all accessors are O(1) and
/// re-entrant.
#[derive(Clone, Debug)]
pub enum MeshGeometry {
    Bsp(BspSurfaceData),
    StaticMesh(StaticMeshData),
    Terrain(TerrainPatchData),
    Landscape(LandscapeComponentData),
    SpeedTree(SpeedTreeData),
    Fluid(FluidSurfaceData),
}

impl MeshGeometry {
    pub fn num_triangles(&self) -> usize {
        match self {
            MeshGeometry::Bsp(d) => d.num_triangles(),
            MeshGeometry::StaticMesh(d) => d.num_triangles(),
            MeshGeometry::Terrain(d) => d.num_triangles(),
            MeshGeometry::Landscape(d) => d.num_triangles(),
            MeshGeometry::SpeedTree(d) => d.num_triangles(),
            MeshGeometry::Fluid(d) => d.num_triangles(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        match self {
            MeshGeometry::Bsp(d) => d.num_vertices(),
            MeshGeometry::StaticMesh(d) => d.num_vertices(),
            MeshGeometry::Terrain(d) => d.num_vertices(),
            MeshGeometry::Landscape(d) => d.num_vertices(),
            MeshGeometry::SpeedTree(d) => d.num_vertices(),
            MeshGeometry::Fluid(d) => d.num_vertices(),
        }
    }

    /// Accesses a triangle's vertices and the element it belongs to.
    pub fn triangle(
        &self,
        triangle_index: usize,
    ) -> (
        StaticLightingVertex,
        StaticLightingVertex,
        StaticLightingVertex,
        usize,
    ) {
        match self {
            MeshGeometry::Bsp(d) => d.triangle(triangle_index),
            MeshGeometry::StaticMesh(d) => d.triangle(triangle_index),
            MeshGeometry::Terrain(d) => d.triangle(triangle_index),
            MeshGeometry::Landscape(d) => d.triangle(triangle_index),
            MeshGeometry::SpeedTree(d) => d.triangle(triangle_index),
            MeshGeometry::Fluid(d) => d.triangle(triangle_index),
        }
    }

    /// Accesses a triangle's vertex indices, local to this mesh.
    pub fn triangle_indices(&self, triangle_index: usize) -> [usize; 3] {
        match self {
            MeshGeometry::Bsp(d) => d.triangle_indices(triangle_index),
            MeshGeometry::StaticMesh(d) => d.triangle_indices(triangle_index),
            MeshGeometry::Terrain(d) => d.triangle_indices(triangle_index),
            MeshGeometry::Landscape(d) => d.triangle_indices(triangle_index),
            MeshGeometry::SpeedTree(d) => d.triangle_indices(triangle_index),
            MeshGeometry::Fluid(d) => d.triangle_indices(triangle_index),
        }
    }
}

/// A mesh instance registered for static lighting.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub guid: ObjectGuid,
    /// Identifies the source primitive component; all LODs of one component
    /// share a value. Used by the LOD visibility rule during tracing.
    pub primitive_id: i32,
    pub lod_index: i32,
    pub flags: MeshFlags,
    /// UV channel holding the material UV.
    pub texture_coordinate_index: usize,
    pub elements: Vec<MaterialElement>,
    pub geometry: MeshGeometry,
    bounding_box: WorldBox,
}

impl Mesh {
    pub fn new(
        guid: ObjectGuid,
        primitive_id: i32,
        lod_index: i32,
        flags: MeshFlags,
        texture_coordinate_index: usize,
        elements: Vec<MaterialElement>,
        geometry: MeshGeometry,
    ) -> Result<Mesh, MeshDataError> {
        if elements.is_empty() {
            return Err(MeshDataError::NoElements);
        }
        if texture_coordinate_index >= MAX_TEXCOORDS {
            return Err(MeshDataError::InvalidUvChannel {
                index: texture_coordinate_index,
            });
        }

        let mut bounding_box = WorldBox::empty();
        for triangle_index in 0..geometry.num_triangles() {
            let (v0, v1, v2, element_index) = geometry.triangle(triangle_index);
            if element_index >= elements.len() {
                return Err(MeshDataError::ElementIndexOutOfRange {
                    index: element_index,
                    num_elements: elements.len(),
                });
            }
            bounding_box.grow_to_point(&v0.world_position);
            bounding_box.grow_to_point(&v1.world_position);
            bounding_box.grow_to_point(&v2.world_position);
        }

        Ok(Mesh {
            guid,
            primitive_id,
            lod_index,
            flags,
            texture_coordinate_index,
            elements,
            geometry,
            bounding_box,
        })
    }

    pub fn num_triangles(&self) -> usize {
        self.geometry.num_triangles()
    }

    pub fn num_vertices(&self) -> usize {
        self.geometry.num_vertices()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn bounding_box(&self) -> &WorldBox {
        &self.bounding_box
    }

    pub fn element(&self, element_index: usize) -> &MaterialElement {
        &self.elements[element_index]
    }

    pub fn is_element_casting_shadow(&self, element_index: usize) -> bool {
        self.elements[element_index].casts_shadow
    }

    pub fn is_casting_shadow_as_two_sided(&self) -> bool {
        self.flags.contains(MeshFlags::TWO_SIDED_SHADOW)
    }

    pub fn evaluate_masked_collision(&self, uv: &TexturePoint, element_index: usize) -> bool {
        self.elements[element_index].evaluate_masked_collision(uv)
    }
}

/// Inverse transpose of the upper 3x3 of a transform, for carrying normals to
/// world space.
pub(crate) fn normal_matrix(local_to_world: &WorldMatrix) -> Option<Matrix3<FloatType>> {
    let linear: Matrix3<FloatType> = local_to_world.fixed_view::<3, 3>(0, 0).into_owned();
    linear.try_inverse().map(|inverse| inverse.transpose())
}

/// Builds a world-space triangle from three synthesized vertices.
pub(crate) fn world_triangle(
    v0: &StaticLightingVertex,
    v1: &StaticLightingVertex,
    v2: &StaticLightingVertex,
) -> Triangle<WorldPoint> {
    Triangle::new(v0.world_position, v1.world_position, v2.world_position)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert2::{assert, let_assert};

    #[test]
    fn generated_tangents_are_orthonormal() {
        let mut v = StaticLightingVertex {
            world_tangent_z: WorldVector::new(0.0, 0.0, 1.0),
            ..Default::default()
        };
        v.generate_vertex_tangents();
        assert!(v.world_tangent_x == WorldVector::new(1.0, 0.0, 0.0));
        assert!(v.world_tangent_y == WorldVector::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn generated_tangents_handle_y_aligned_normal() {
        let mut v = StaticLightingVertex {
            world_tangent_z: WorldVector::new(0.0, 1.0, 0.0),
            ..Default::default()
        };
        v.generate_vertex_tangents();
        assert!(v.world_tangent_x.norm() > 0.99);
        assert!(v.world_tangent_x.dot(&v.world_tangent_z).abs() < 1e-6);
        assert!(v.world_tangent_y.dot(&v.world_tangent_z).abs() < 1e-6);
    }

    #[test]
    fn vertex_linear_combination() {
        let mut a = StaticLightingVertex::default();
        a.world_position = WorldPoint::new(1.0, 0.0, 0.0);
        a.texture_coordinates[0] = TexturePoint::new(0.0, 1.0);
        let mut b = StaticLightingVertex::default();
        b.world_position = WorldPoint::new(3.0, 2.0, 0.0);
        b.texture_coordinates[0] = TexturePoint::new(1.0, 0.0);

        let mid = &(&a + &b) * 0.5;
        assert!(mid.world_position == WorldPoint::new(2.0, 1.0, 0.0));
        assert!(mid.texture_coordinates[0] == TexturePoint::new(0.5, 0.5));
    }

    #[test]
    fn mesh_rejects_out_of_range_element() {
        let geometry = MeshGeometry::Bsp(
            BspSurfaceData::new(
                vec![
                    StaticLightingVertex::default(),
                    StaticLightingVertex::default(),
                    StaticLightingVertex::default(),
                ],
                vec![BspTriangle {
                    indices: [0, 1, 2],
                    element_index: 1,
                }],
            )
            .unwrap(),
        );
        let_assert!(
            Err(MeshDataError::ElementIndexOutOfRange { index: 1, .. }) = Mesh::new(
                ObjectGuid::default(),
                0,
                0,
                MeshFlags::default(),
                0,
                vec![crate::material::MaterialElement::opaque()],
                geometry,
            )
        );
    }

    #[test]
    fn mesh_requires_elements() {
        let geometry = MeshGeometry::Bsp(BspSurfaceData::new(vec![], vec![]).unwrap());
        let_assert!(
            Err(MeshDataError::NoElements) = Mesh::new(
                ObjectGuid::default(),
                0,
                0,
                MeshFlags::default(),
                0,
                vec![],
                geometry,
            )
        );
    }
}
