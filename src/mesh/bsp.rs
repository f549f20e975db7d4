use super::{MeshDataError, StaticLightingVertex};

/// One triangle of a BSP surface batch, indexing into the batch's own vertex pool.
#[derive(Copy, Clone, Debug)]
pub struct BspTriangle {
    pub indices: [u32; 3],
    pub element_index: u32,
}

/// A batch of coplanar-grouped BSP surfaces that are lit together.
/// Vertices are already in world space; the surface importer bakes the brush
/// transforms before handing the batch over.
#[derive(Clone, Debug)]
pub struct BspSurfaceData {
    vertices: Vec<StaticLightingVertex>,
    triangles: Vec<BspTriangle>,
}

impl BspSurfaceData {
    pub fn new(
        vertices: Vec<StaticLightingVertex>,
        triangles: Vec<BspTriangle>,
    ) -> Result<BspSurfaceData, MeshDataError> {
        for triangle in &triangles {
            for &index in &triangle.indices {
                if index as usize >= vertices.len() {
                    return Err(MeshDataError::VertexIndexOutOfRange {
                        index: index as usize,
                        num_vertices: vertices.len(),
                    });
                }
            }
        }
        Ok(BspSurfaceData {
            vertices,
            triangles,
        })
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
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
        let triangle = &self.triangles[triangle_index];
        (
            self.vertices[triangle.indices[0] as usize].clone(),
            self.vertices[triangle.indices[1] as usize].clone(),
            self.vertices[triangle.indices[2] as usize].clone(),
            triangle.element_index as usize,
        )
    }

    pub fn triangle_indices(&self, triangle_index: usize) -> [usize; 3] {
        let triangle = &self.triangles[triangle_index];
        triangle.indices.map(|i| i as usize)
    }
}
