use super::{MeshDataError, StaticLightingVertex};

/// The kind of geometry a speedtree element was generated from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpeedTreeGeometryKind {
    Branch,
    Frond,
    LeafCard,
    Billboard,
}

/// Triangle range of one speedtree element. Elements line up with the mesh's
/// material elements by position.
#[derive(Copy, Clone, Debug)]
pub struct SpeedTreeElementGeometry {
    pub kind: SpeedTreeGeometryKind,
    pub first_triangle: usize,
    pub num_triangles: usize,
}

/// A speedtree instance, already expanded to world-space triangles by the
/// importer (leaf cards and billboards are flattened at their bake-time
/// orientation).
#[derive(Clone, Debug)]
pub struct SpeedTreeData {
    vertices: Vec<StaticLightingVertex>,
    indices: Vec<u32>,
    element_geometry: Vec<SpeedTreeElementGeometry>,
}

impl SpeedTreeData {
    pub fn new(
        vertices: Vec<StaticLightingVertex>,
        indices: Vec<u32>,
        element_geometry: Vec<SpeedTreeElementGeometry>,
    ) -> Result<SpeedTreeData, MeshDataError> {
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
        let covered: usize = element_geometry.iter().map(|e| e.num_triangles).sum();
        let in_bounds = element_geometry
            .iter()
            .all(|e| e.first_triangle + e.num_triangles <= num_triangles);
        if covered != num_triangles || !in_bounds {
            return Err(MeshDataError::ElementRangesMismatch {
                covered,
                num_triangles,
            });
        }
        Ok(SpeedTreeData {
            vertices,
            indices,
            element_geometry,
        })
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn element_kind(&self, element_index: usize) -> SpeedTreeGeometryKind {
        self.element_geometry[element_index].kind
    }

    fn element_for_triangle(&self, triangle_index: usize) -> usize {
        self.element_geometry
            .iter()
            .position(|e| {
                triangle_index >= e.first_triangle
                    && triangle_index < e.first_triangle + e.num_triangles
            })
            .unwrap_or(0)
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
            self.vertices[i0].clone(),
            self.vertices[i1].clone(),
            self.vertices[i2].clone(),
            self.element_for_triangle(triangle_index),
        )
    }

    pub fn triangle_indices(&self, triangle_index: usize) -> [usize; 3] {
        let base = triangle_index * 3;
        [
            self.indices[base] as usize,
            self.indices[base + 1] as usize,
            self.indices[base + 2] as usize,
        ]
    }
}
