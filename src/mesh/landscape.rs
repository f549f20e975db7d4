use crate::geometry::{FloatType, TexturePoint, WorldMatrix, WorldPoint, WorldVector};

use super::{MeshDataError, StaticLightingVertex, normal_matrix};

/// Vertical scale applied to the packed 16-bit height channel.
pub const LANDSCAPE_ZSCALE: FloatType = 1.0 / 128.0;

/// One heightfield texel. The R and G bytes pack a 16-bit height sample
/// recentred at 32768, the B and A bytes pack the XY slope of the normal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeightfieldTexel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl HeightfieldTexel {
    pub fn from_height_and_normal(height: FloatType, normal: &WorldVector) -> HeightfieldTexel {
        let packed_height =
            ((height / LANDSCAPE_ZSCALE + 32768.0).clamp(0.0, 65535.0)) as u16;
        let pack_slope = |v: FloatType| (((v + 1.0) * 127.5).clamp(0.0, 255.0)) as u8;
        HeightfieldTexel {
            r: (packed_height >> 8) as u8,
            g: (packed_height & 0xFF) as u8,
            b: pack_slope(normal.x),
            a: pack_slope(normal.y),
        }
    }

    pub fn height(&self) -> FloatType {
        let packed = ((self.r as u16) << 8) | self.g as u16;
        (packed as FloatType - 32768.0) * LANDSCAPE_ZSCALE
    }

    pub fn normal(&self) -> WorldVector {
        let x = self.b as FloatType / 127.5 - 1.0;
        let y = self.a as FloatType / 127.5 - 1.0;
        let z = (1.0 - (x * x + y * y)).max(0.0).sqrt();
        WorldVector::new(x, y, z)
    }
}

/// A landscape component: a square quad grid whose vertices live in a packed
/// heightfield texture, one texel per vertex. Positions and tangent bases are
/// reconstructed from the texel channels on demand, trading per-vertex storage
/// for a little decode work.
#[derive(Clone, Debug)]
pub struct LandscapeComponentData {
    num_quads: usize,
    /// Row-major, (num_quads + 1)^2 texels.
    texels: Vec<HeightfieldTexel>,
    local_to_world: WorldMatrix,
    normals_to_world: nalgebra::Matrix3<FloatType>,
}

impl LandscapeComponentData {
    pub fn new(
        num_quads: usize,
        texels: Vec<HeightfieldTexel>,
        local_to_world: WorldMatrix,
    ) -> Result<LandscapeComponentData, MeshDataError> {
        if num_quads == 0 {
            return Err(MeshDataError::DegenerateGrid);
        }
        let expected = (num_quads + 1) * (num_quads + 1);
        if texels.len() != expected {
            return Err(MeshDataError::HeightfieldSizeMismatch {
                expected,
                actual: texels.len(),
            });
        }
        let normals_to_world =
            normal_matrix(&local_to_world).ok_or(MeshDataError::SingularTransform)?;
        Ok(LandscapeComponentData {
            num_quads,
            texels,
            local_to_world,
            normals_to_world,
        })
    }

    pub fn num_triangles(&self) -> usize {
        self.num_quads * self.num_quads * 2
    }

    pub fn num_vertices(&self) -> usize {
        (self.num_quads + 1) * (self.num_quads + 1)
    }

    pub fn vertex_index_to_xy(&self, vertex_index: usize) -> (usize, usize) {
        (
            vertex_index % (self.num_quads + 1),
            vertex_index / (self.num_quads + 1),
        )
    }

    pub fn quad_index_to_xy(&self, quad_index: usize) -> (usize, usize) {
        (quad_index % self.num_quads, quad_index / self.num_quads)
    }

    fn xy_to_vertex_index(&self, x: usize, y: usize) -> usize {
        y * (self.num_quads + 1) + x
    }

    fn synthesize_vertex(&self, vertex_index: usize) -> StaticLightingVertex {
        let (x, y) = self.vertex_index_to_xy(vertex_index);
        let texel = &self.texels[vertex_index];
        let local = WorldPoint::new(x as FloatType, y as FloatType, texel.height());

        let mut vertex = StaticLightingVertex {
            world_position: self.local_to_world.transform_point(&local),
            world_tangent_z: (self.normals_to_world * texel.normal())
                .try_normalize(0.0)
                .unwrap_or(WorldVector::new(0.0, 0.0, 1.0)),
            ..Default::default()
        };
        vertex.generate_vertex_tangents();
        vertex.texture_coordinates[0] = TexturePoint::new(x as FloatType, y as FloatType);
        vertex.texture_coordinates[1] = TexturePoint::new(
            x as FloatType / self.num_quads as FloatType,
            y as FloatType / self.num_quads as FloatType,
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

        if second_half { [b, d, c] } else { [a, b, c] }
    }
}
