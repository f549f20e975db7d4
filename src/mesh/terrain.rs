use crate::geometry::{FloatType, TexturePoint, WorldMatrix, WorldPoint, WorldVector};

use super::{MeshDataError, StaticLightingVertex, normal_matrix};

/// A terrain component patch: a regular quad grid with one height sample per
/// grid vertex. Vertices and normals are synthesized from the height grid on
/// demand instead of being stored densely.
#[derive(Clone, Debug)]
pub struct TerrainPatchData {
    num_quads_x: usize,
    num_quads_y: usize,
    /// Row-major, (num_quads_x + 1) * (num_quads_y + 1) samples.
    heights: Vec<FloatType>,
    local_to_world: WorldMatrix,
    normals_to_world: nalgebra::Matrix3<FloatType>,
}

impl TerrainPatchData {
    pub fn new(
        num_quads_x: usize,
        num_quads_y: usize,
        heights: Vec<FloatType>,
        local_to_world: WorldMatrix,
    ) -> Result<TerrainPatchData, MeshDataError> {
        if num_quads_x == 0 || num_quads_y == 0 {
            return Err(MeshDataError::DegenerateGrid);
        }
        let expected = (num_quads_x + 1) * (num_quads_y + 1);
        if heights.len() != expected {
            return Err(MeshDataError::HeightfieldSizeMismatch {
                expected,
                actual: heights.len(),
            });
        }
        let normals_to_world =
            normal_matrix(&local_to_world).ok_or(MeshDataError::SingularTransform)?;
        Ok(TerrainPatchData {
            num_quads_x,
            num_quads_y,
            heights,
            local_to_world,
            normals_to_world,
        })
    }

    pub fn num_triangles(&self) -> usize {
        self.num_quads_x * self.num_quads_y * 2
    }

    pub fn num_vertices(&self) -> usize {
        (self.num_quads_x + 1) * (self.num_quads_y + 1)
    }

    pub fn vertex_index_to_xy(&self, vertex_index: usize) -> (usize, usize) {
        (
            vertex_index % (self.num_quads_x + 1),
            vertex_index / (self.num_quads_x + 1),
        )
    }

    pub fn quad_index_to_xy(&self, quad_index: usize) -> (usize, usize) {
        (quad_index % self.num_quads_x, quad_index / self.num_quads_x)
    }

    fn xy_to_vertex_index(&self, x: usize, y: usize) -> usize {
        y * (self.num_quads_x + 1) + x
    }

    fn height_at(&self, x: usize, y: usize) -> FloatType {
        self.heights[self.xy_to_vertex_index(x, y)]
    }

    fn synthesize_vertex(&self, vertex_index: usize) -> StaticLightingVertex {
        let (x, y) = self.vertex_index_to_xy(vertex_index);
        let local = WorldPoint::new(x as FloatType, y as FloatType, self.height_at(x, y));

        // Central differences, clamped at the patch border
        let x_lo = x.saturating_sub(1);
        let x_hi = (x + 1).min(self.num_quads_x);
        let y_lo = y.saturating_sub(1);
        let y_hi = (y + 1).min(self.num_quads_y);
        let slope_x = (self.height_at(x_hi, y) - self.height_at(x_lo, y)) / (x_hi - x_lo) as FloatType;
        let slope_y = (self.height_at(x, y_hi) - self.height_at(x, y_lo)) / (y_hi - y_lo) as FloatType;
        let local_normal = WorldVector::new(-slope_x, -slope_y, 1.0);

        let mut vertex = StaticLightingVertex {
            world_position: self.local_to_world.transform_point(&local),
            world_tangent_z: (self.normals_to_world * local_normal)
                .try_normalize(0.0)
                .unwrap_or(WorldVector::new(0.0, 0.0, 1.0)),
            ..Default::default()
        };
        vertex.generate_vertex_tangents();
        vertex.texture_coordinates[0] = TexturePoint::new(x as FloatType, y as FloatType);
        vertex.texture_coordinates[1] = TexturePoint::new(
            x as FloatType / self.num_quads_x as FloatType,
            y as FloatType / self.num_quads_y as FloatType,
        );
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
        let quad_index = triangle_index / 2;
        let second_half = triangle_index % 2 == 1;
        let (x, y) = self.quad_index_to_xy(quad_index);

        let a = self.xy_to_vertex_index(x, y);
        let b = self.xy_to_vertex_index(x + 1, y);
        let c = self.xy_to_vertex_index(x, y + 1);
        let d = self.xy_to_vertex_index(x + 1, y + 1);

        // The diagonal alternates with quad parity so long slopes don't get a
        // uniform stair-step bias.
        let flipped = (x + y) % 2 == 1;
        match (flipped, second_half) {
            (false, false) => [a, b, d],
            (false, true) => [a, d, c],
            (true, false) => [a, b, c],
            (true, true) => [b, d, c],
        }
    }
}
