use simba::simd::{SimdValue, WideBoolF32x4, WideF32x4};

/// Operations missing from simba's wide wrappers.
pub trait SimbaWorkarounds: SimdValue {
    fn is_nan(self) -> Self::SimdBool;

    fn infinity() -> Self;
    fn neg_infinity() -> Self;
}

impl SimbaWorkarounds for WideF32x4 {
    #[inline(always)]
    fn is_nan(self) -> Self::SimdBool {
        WideBoolF32x4(self.0.is_nan())
    }

    #[inline(always)]
    fn infinity() -> Self {
        Self::splat(f32::INFINITY)
    }

    #[inline(always)]
    fn neg_infinity() -> Self {
        Self::splat(f32::NEG_INFINITY)
    }
}

pub fn fast_min(a: WideF32x4, b: WideF32x4) -> WideF32x4 {
    WideF32x4(a.0.fast_min(b.0))
}

pub fn fast_max(a: WideF32x4, b: WideF32x4) -> WideF32x4 {
    WideF32x4(a.0.fast_max(b.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use simba::simd::SimdBool as _;

    #[test]
    fn is_nan_mask() {
        let v = WideF32x4::from([1.0, f32::NAN, 0.0, f32::NAN]);
        assert!(v.is_nan().bitmask() == 0b1010);
    }

    #[test]
    fn fast_min_max_ignore_order() {
        let a = WideF32x4::from([1.0, 5.0, -2.0, 0.0]);
        let b = WideF32x4::from([2.0, 4.0, -3.0, 0.0]);
        assert!(fast_min(a, b).extract(0) == 1.0);
        assert!(fast_min(a, b).extract(2) == -3.0);
        assert!(fast_max(a, b).extract(1) == 5.0);
    }
}
