use std::ops::Mul;

use thiserror::Error;

use crate::geometry::TexturePoint;

/// Linear-space RGB color, used for transmission accumulation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl LinearColor {
    pub const WHITE: LinearColor = LinearColor {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub const BLACK: LinearColor = LinearColor {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn new(r: f32, g: f32, b: f32) -> LinearColor {
        LinearColor { r, g, b }
    }
}

impl Mul for LinearColor {
    type Output = LinearColor;

    fn mul(self, rhs: LinearColor) -> LinearColor {
        LinearColor {
            r: self.r * rhs.r,
            g: self.g * rhs.g,
            b: self.b * rhs.b,
        }
    }
}

/// Binary coverage grid for masked materials, sampled with wrapped UVs.
/// `true` texels are opaque, `false` texels are holes.
#[derive(Clone, Debug)]
pub struct OpacityMask {
    width: usize,
    height: usize,
    texels: Vec<bool>,
}

#[derive(Debug, Error)]
pub enum OpacityMaskError {
    #[error("mask has {actual} texels, expected {expected} for {width}x{height}")]
    SizeMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
    #[error("mask dimensions must be non-zero")]
    ZeroSized,
}

impl OpacityMask {
    pub fn new(width: usize, height: usize, texels: Vec<bool>) -> Result<OpacityMask, OpacityMaskError> {
        if width == 0 || height == 0 {
            return Err(OpacityMaskError::ZeroSized);
        }
        if texels.len() != width * height {
            return Err(OpacityMaskError::SizeMismatch {
                width,
                height,
                expected: width * height,
                actual: texels.len(),
            });
        }
        Ok(OpacityMask {
            width,
            height,
            texels,
        })
    }

    /// Point-samples the mask at a wrapped UV coordinate.
    pub fn sample(&self, uv: &TexturePoint) -> bool {
        let wrap = |v: f32, n: usize| {
            let t = v.rem_euclid(1.0);
            ((t * n as f32) as usize).min(n - 1)
        };
        let x = wrap(uv.x, self.width);
        let y = wrap(uv.y, self.height);
        self.texels[y * self.width + x]
    }
}

/// Per-element material state consumed by the ray tracer.
/// Elements are the material slots of a mesh; every triangle carries the
/// index of the element it belongs to.
#[derive(Clone, Debug)]
pub struct MaterialElement {
    pub casts_shadow: bool,
    /// Backfaces of this element are visible, so backface hits count.
    pub two_sided: bool,
    /// Samples accept lighting from both sides even if the material itself is one sided.
    pub use_two_sided_lighting: bool,
    pub masked: bool,
    pub translucent: bool,
    /// Masked shadow casting even for otherwise opaque materials, applied to
    /// direct shadowing rays only.
    pub cast_shadow_as_masked: bool,
    /// Only blocks indirect light; direct shadowing rays pass through.
    pub shadow_indirect_only: bool,
    /// Transmission of translucent elements.
    pub transmission: LinearColor,
    pub opacity_mask: Option<OpacityMask>,
}

impl MaterialElement {
    /// Fully opaque, shadow casting, one sided element.
    pub fn opaque() -> MaterialElement {
        MaterialElement {
            casts_shadow: true,
            two_sided: false,
            use_two_sided_lighting: false,
            masked: false,
            translucent: false,
            cast_shadow_as_masked: false,
            shadow_indirect_only: false,
            transmission: LinearColor::WHITE,
            opacity_mask: None,
        }
    }

    pub fn is_two_sided(&self) -> bool {
        self.two_sided || self.use_two_sided_lighting
    }

    /// Whether a hit on this element at the given UV is on an opaque part.
    /// Elements without a mask are fully opaque.
    pub fn evaluate_masked_collision(&self, uv: &TexturePoint) -> bool {
        match &self.opacity_mask {
            Some(mask) => mask.sample(uv),
            None => true,
        }
    }
}
