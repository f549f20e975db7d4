use nalgebra::Matrix3;

use crate::geometry::{FloatType, TexturePoint, WorldMatrix, WorldPoint, WorldVector};

use super::{MAX_TEXCOORDS, MeshDataError, StaticLightingVertex, normal_matrix};

/// Raw vertex of a static mesh LOD, in local space.
#[derive(Clone, Debug)]
pub struct StaticMeshVertex {
    pub position: WorldPoint,
    pub tangent_x: WorldVector,
    pub tangent_y: WorldVector,
    pub tangent_z: WorldVector,
    pub texture_coordinates: [TexturePoint; MAX_TEXCOORDS],
}

/// Contiguous triangle range of the index buffer sharing one material slot.
#[derive(Copy, Clone, Debug)]
pub struct StaticMeshElement {
    pub first_triangle: usize,
    pub num_triangles: usize,
}

/// One LOD of a static mesh placed in the world.
/// Vertices stay in local space; positions and tangents are transformed on
/// every access so instances can share the same raw buffers.
#[derive(Clone, Debug)]
pub struct StaticMeshData {
    vertices: Vec<StaticMeshVertex>,
    indices: Vec<u32>,
    elements: Vec<StaticMeshElement>,
    local_to_world: WorldMatrix,
    normals_to_world: Matrix3<FloatType>,
    /// A mirroring transform flips the winding, which would otherwise turn
    /// every triangle inside out.
    reverse_winding: bool,
}

impl StaticMeshData {
    pub fn new(
        vertices: Vec<StaticMeshVertex>,
        indices: Vec<u32>,
        elements: Vec<StaticMeshElement>,
        local_to_world: WorldMatrix,
    ) -> Result<StaticMeshData, MeshDataError> {
        if indices.len() % 3 != 0 {
            return Err(MeshDataError::IndexCountNotTriangles { len: indices.len() });
        }
        for &index in &indices {
            if index as usize >= vertices.len() {
                return Err(MeshDataError::VertexIndexOutOfRange {
                    index: index as usize,
                    num_vertices: vertices.len(),
                });
            }
        }

        let num_triangles = indices.len() / 3;
        let covered: usize = elements.iter().map(|e| e.num_triangles).sum();
        let in_bounds = elements
            .iter()
            .all(|e| e.first_triangle + e.num_triangles <= num_triangles);
        if covered != num_triangles || !in_bounds {
            return Err(MeshDataError::ElementRangesMismatch {
                covered,
                num_triangles,
            });
        }

        let linear: Matrix3<FloatType> = local_to_world.fixed_view::<3, 3>(0, 0).into_owned();
        let normals_to_world = normal_matrix(&local_to_world).ok_or(MeshDataError::SingularTransform)?;

        Ok(StaticMeshData {
            vertices,
            indices,
            elements,
            local_to_world,
            normals_to_world,
            reverse_winding: linear.determinant() < 0.0,
        })
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    fn element_for_triangle(&self, triangle_index: usize) -> usize {
        self.elements
            .iter()
            .position(|e| {
                triangle_index >= e.first_triangle
                    && triangle_index < e.first_triangle + e.num_triangles
            })
            .unwrap_or(0)
    }

    fn transformed_vertex(&self, vertex_index: usize) -> StaticLightingVertex {
        let raw = &self.vertices[vertex_index];
        let transform_normal =
            |v: &WorldVector| (self.normals_to_world * v).try_normalize(0.0).unwrap_or(*v);
        StaticLightingVertex {
            world_position: self.local_to_world.transform_point(&raw.position),
            world_tangent_x: transform_normal(&raw.tangent_x),
            world_tangent_y: transform_normal(&raw.tangent_y),
            world_tangent_z: transform_normal(&raw.tangent_z),
            texture_coordinates: raw.texture_coordinates,
        }
    }

    pub fn triangle(
        &self,
        triangle_index: usize,
    ) -> (
        StaticLightingVertex,
        StaticLightingVertex,
        StaticLightingVertex,
        usize,
    ) {
        let [i0, i1, i2] = self.triangle_indices(triangle_index);
        (
            self.transformed_vertex(i0),
            self.transformed_vertex(i1),
            self.transformed_vertex(i2),
            self.element_for_triangle(triangle_index),
        )
    }

    pub fn triangle_indices(&self, triangle_index: usize) -> [usize; 3] {
        let base = triangle_index * 3;
        let i0 = self.indices[base] as usize;
        let i1 = self.indices[base + 1] as usize;
        let i2 = self.indices[base + 2] as usize;
        if self.reverse_winding {
            [i2, i1, i0]
        } else {
            [i0, i1, i2]
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert2::{assert, let_assert};

    fn raw_vertex(x: f32, y: f32, z: f32) -> StaticMeshVertex {
        StaticMeshVertex {
            position: WorldPoint::new(x, y, z),
            tangent_x: WorldVector::new(1.0, 0.0, 0.0),
            tangent_y: WorldVector::new(0.0, 1.0, 0.0),
            tangent_z: WorldVector::new(0.0, 0.0, 1.0),
            texture_coordinates: [TexturePoint::origin(); MAX_TEXCOORDS],
        }
    }

    fn quad_vertices() -> Vec<StaticMeshVertex> {
        vec![
            raw_vertex(0.0, 0.0, 0.0),
            raw_vertex(1.0, 0.0, 0.0),
            raw_vertex(0.0, 1.0, 0.0),
            raw_vertex(1.0, 1.0, 0.0),
        ]
    }

    fn single_element(num_triangles: usize) -> Vec<StaticMeshElement> {
        vec![StaticMeshElement {
            first_triangle: 0,
            num_triangles,
        }]
    }

    #[test]
    fn transforms_positions_and_normals() {
        let translation = WorldMatrix::new_translation(&WorldVector::new(10.0, 0.0, 0.0));
        let data = StaticMeshData::new(
            quad_vertices(),
            vec![0, 1, 2, 1, 3, 2],
            single_element(2),
            translation,
        )
        .unwrap();

        let (v0, _v1, _v2, element) = data.triangle(0);
        assert!(element == 0);
        assert!(v0.world_position == WorldPoint::new(10.0, 0.0, 0.0));
        assert!(v0.world_tangent_z == WorldVector::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn mirrored_transform_reverses_winding() {
        let mirror = WorldMatrix::new_nonuniform_scaling(&WorldVector::new(-1.0, 1.0, 1.0));
        let data = StaticMeshData::new(
            quad_vertices(),
            vec![0, 1, 2, 1, 3, 2],
            single_element(2),
            mirror,
        )
        .unwrap();
        assert!(data.triangle_indices(0) == [2, 1, 0]);
    }

    #[test]
    fn nonuniform_scale_renormalizes_tangents() {
        let scale = WorldMatrix::new_nonuniform_scaling(&WorldVector::new(4.0, 1.0, 1.0));
        let data = StaticMeshData::new(
            quad_vertices(),
            vec![0, 1, 2],
            single_element(1),
            scale,
        )
        .unwrap();
        let (v0, ..) = data.triangle(0);
        assert!((v0.world_tangent_z.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn element_lookup_by_range() {
        let elements = vec![
            StaticMeshElement {
                first_triangle: 0,
                num_triangles: 1,
            },
            StaticMeshElement {
                first_triangle: 1,
                num_triangles: 1,
            },
        ];
        let data = StaticMeshData::new(
            quad_vertices(),
            vec![0, 1, 2, 1, 3, 2],
            elements,
            WorldMatrix::identity(),
        )
        .unwrap();
        assert!(data.triangle(0).3 == 0);
        assert!(data.triangle(1).3 == 1);
    }

    #[test]
    fn rejects_partial_element_coverage() {
        let_assert!(
            Err(MeshDataError::ElementRangesMismatch { covered: 1, .. }) = StaticMeshData::new(
                quad_vertices(),
                vec![0, 1, 2, 1, 3, 2],
                single_element(1),
                WorldMatrix::identity(),
            )
        );
    }

    #[test]
    fn rejects_truncated_index_buffer() {
        let_assert!(
            Err(MeshDataError::IndexCountNotTriangles { len: 4 }) = StaticMeshData::new(
                quad_vertices(),
                vec![0, 1, 2, 1],
                single_element(1),
                WorldMatrix::identity(),
            )
        );
    }
}
