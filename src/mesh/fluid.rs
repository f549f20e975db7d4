use crate::geometry::{EPSILON, FloatType, TexturePoint, WorldPoint, WorldVector};

use super::{MeshDataError, StaticLightingVertex};

/// A fluid surface at rest: a rectangular grid of cells spanned by two edge
/// vectors. The simulation's displacement is irrelevant for baking, so only
/// the rest plane is traced.
#[derive(Clone, Debug)]
pub struct FluidSurfaceData {
    origin: WorldPoint,
    /// Full extent of the surface along its first edge.
    axis_x: WorldVector,
    /// Full extent of the surface along its second edge.
    axis_y: WorldVector,
    cells_x: usize,
    cells_y: usize,
    plane_normal: WorldVector,
}

impl FluidSurfaceData {
    pub fn new(
        origin: WorldPoint,
        axis_x: WorldVector,
        axis_y: WorldVector,
        cells_x: usize,
        cells_y: usize,
    ) -> Result<FluidSurfaceData, MeshDataError> {
        if cells_x == 0 || cells_y == 0 {
            return Err(MeshDataError::DegenerateGrid);
        }
        let plane_normal = axis_x
            .cross(&axis_y)
            .try_normalize(EPSILON)
            .ok_or(MeshDataError::DegenerateSurfaceAxes)?;
        Ok(FluidSurfaceData {
            origin,
            axis_x,
            axis_y,
            cells_x,
            cells_y,
            plane_normal,
        })
    }

    pub fn num_triangles(&self) -> usize {
        self.cells_x * self.cells_y * 2
    }

    pub fn num_vertices(&self) -> usize {
        (self.cells_x + 1) * (self.cells_y + 1)
    }

    fn xy_to_vertex_index(&self, x: usize, y: usize) -> usize {
        y * (self.cells_x + 1) + x
    }

    fn synthesize_vertex(&self, vertex_index: usize) -> StaticLightingVertex {
        let x = vertex_index % (self.cells_x + 1);
        let y = vertex_index / (self.cells_x + 1);
        let u = x as FloatType / self.cells_x as FloatType;
        let v = y as FloatType / self.cells_y as FloatType;

        let mut vertex = StaticLightingVertex {
            world_position: self.origin + self.axis_x * u + self.axis_y * v,
            world_tangent_z: self.plane_normal,
            ..Default::default()
        };
        vertex.generate_vertex_tangents();
        vertex.texture_coordinates[0] = TexturePoint::new(u, v);
        vertex.texture_coordinates[1] = TexturePoint::new(u, v);
        vertex
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
            self.synthesize_vertex(i0),
            self.synthesize_vertex(i1),
            self.synthesize_vertex(i2),
            0,
        )
    }

    pub fn triangle_indices(&self, triangle_index: usize) -> [usize; 3] {
        let cell = triangle_index / 2;
        let second_half = triangle_index % 2 == 1;
        let x = cell % self.cells_x;
        let y = cell / self.cells_x;

        let a = self.xy_to_vertex_index(x, y);
        let b = self.xy_to_vertex_index(x + 1, y);
        let c = self.xy_to_vertex_index(x, y + 1);
        let d = self.xy_to_vertex_index(x + 1, y + 1);

        if second_half { [b, d, c] } else { [a, b, c] }
    }
}
