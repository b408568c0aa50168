//! Fused requantization parameters for quantized matrix multiplication.
//!
//! The integer GEMM accumulates `i32` sums of zero-point-adjusted products.
//! Converting an accumulator back into the u8 output domain applies one fused
//! factor, `input_scale * kernel_scale / output_scale`, then the output zero
//! point and clamp bounds. The factor is carried both as the original f32 and
//! in Q31 fixed point (multiplier + right shift), the form the microkernels
//! consume. The fixed-point pipeline has no integer headroom to grow values,
//! so only factors strictly below 1.0 are representable; operator creation
//! rejects anything else.

/// Fused requantization record, computed once at operator creation and
/// immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequantizationParams {
    /// Fused rescale factor in (0, 1).
    pub scale: f32,
    /// Q31 multiplier: the scale's mantissa positioned in
    /// `[0x4000_0000, 0x7FFF_FF80]`.
    pub multiplier: i32,
    /// Right shift paired with the multiplier, in `[0, 31]`.
    pub shift: u32,
    /// Zero point of the input activations.
    pub input_zero_point: u8,
    /// Zero point of the packed kernel weights.
    pub kernel_zero_point: u8,
    /// Zero point added after rescaling.
    pub output_zero_point: u8,
    /// Lower output clamp bound.
    pub output_min: u8,
    /// Upper output clamp bound.
    pub output_max: u8,
}

impl RequantizationParams {
    /// Derive the Q31 representation of a fused scale.
    ///
    /// The multiplier is the scale's 24-bit mantissa shifted into Q31; the
    /// exponent becomes the right shift. `multiplier * 2^-(31 + shift)`
    /// reproduces the f32 scale exactly. Errors if the scale lies outside
    /// (0, 1), or below ~2^-32 where the shift would leave `[0, 31]`.
    pub fn try_from_scale(
        scale: f32,
        input_zero_point: u8,
        kernel_zero_point: u8,
        output_zero_point: u8,
        output_min: u8,
        output_max: u8,
    ) -> Result<Self, String> {
        if !scale.is_normal() || scale <= 0.0 || scale >= 1.0 {
            return Err(format!(
                "requantization scale {scale:.7e} must lie in (0, 1)"
            ));
        }
        let scale_bits = scale.to_bits();
        let exponent = scale_bits >> 23;
        if exponent < 95 {
            return Err(format!(
                "requantization scale {scale:.7e} is too small for Q31 fixed point"
            ));
        }
        let multiplier = (((scale_bits & 0x007F_FFFF) | 0x0080_0000) << 7) as i32;
        let shift = 126 - exponent;
        debug_assert!((0x4000_0000..=0x7FFF_FF80).contains(&multiplier));
        debug_assert!(shift < 32);
        Ok(Self {
            scale,
            multiplier,
            shift,
            input_zero_point,
            kernel_zero_point,
            output_zero_point,
            output_min,
            output_max,
        })
    }

    /// Scalar reference requantization: rescale an accumulator, add the
    /// output zero point, clamp into `[output_min, output_max]`.
    ///
    /// Rounds to nearest with ties away from zero, matching the
    /// `vqrdmulh`/rounding-shift sequence the vectorized kernels use. This
    /// function is the numeric contract those kernels must reproduce bit for
    /// bit.
    pub fn requantize(&self, acc: i32) -> u8 {
        let product = i64::from(acc) * i64::from(self.multiplier);
        let q31 = ((product + (1i64 << 30)) >> 31) as i32;
        let mask = ((1u32 << self.shift) - 1) as i32;
        let threshold = mask >> 1;
        let remainder = (q31 & mask) - i32::from(q31 < 0);
        let mut out = (q31 >> self.shift) + i32::from(remainder > threshold);
        out = out.max(i32::from(self.output_min) - i32::from(self.output_zero_point));
        out = out.min(i32::from(self.output_max) - i32::from(self.output_zero_point));
        (out + i32::from(self.output_zero_point)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(scale: f32) -> RequantizationParams {
        RequantizationParams::try_from_scale(scale, 0, 0, 128, 0, 255).unwrap()
    }

    #[test]
    fn test_q31_reconstructs_scale_exactly() {
        for scale in [0.5f32, 0.25, 0.125, 0.009765625, 1.0 / 3.0, 0.9999999] {
            let p = params(scale);
            let reconstructed =
                f64::from(p.multiplier) * (2f64).powi(-31 - p.shift as i32);
            assert_eq!(reconstructed, f64::from(scale), "scale {scale}");
        }
    }

    #[test]
    fn test_multiplier_range() {
        for scale in [0.5f32, 0.25, 2.9e-10, 0.75, 0.999] {
            let p = params(scale);
            assert!(p.multiplier >= 0x4000_0000, "scale {scale}");
            assert!(p.multiplier <= 0x7FFF_FF80, "scale {scale}");
            assert!(p.shift < 32, "scale {scale}");
        }
    }

    #[test]
    fn test_rejects_scale_at_or_above_one() {
        assert!(RequantizationParams::try_from_scale(1.0, 0, 0, 0, 0, 255).is_err());
        assert!(RequantizationParams::try_from_scale(2.0, 0, 0, 0, 0, 255).is_err());
    }

    #[test]
    fn test_rejects_scale_below_q31_window() {
        // exponent < 95 leaves no representable shift
        assert!(RequantizationParams::try_from_scale(1.0e-10, 0, 0, 0, 0, 255).is_err());
        assert!(RequantizationParams::try_from_scale(f32::MIN_POSITIVE / 2.0, 0, 0, 0, 0, 255)
            .is_err());
    }

    #[test]
    fn test_requantize_zero_accumulator_yields_zero_point() {
        let p = params(0.25);
        assert_eq!(p.requantize(0), 128);
    }

    #[test]
    fn test_requantize_exact_quarters() {
        let p = params(0.25);
        assert_eq!(p.requantize(8), 130); // 8 * 0.25 = 2
        assert_eq!(p.requantize(-8), 126);
    }

    #[test]
    fn test_requantize_ties_away_from_zero() {
        let p = params(0.25);
        // 6 * 0.25 = 1.5 -> 2; -6 * 0.25 = -1.5 -> -2
        assert_eq!(p.requantize(6), 130);
        assert_eq!(p.requantize(-6), 126);
    }

    #[test]
    fn test_requantize_clamps() {
        let p = RequantizationParams::try_from_scale(0.5, 0, 0, 128, 100, 200).unwrap();
        assert_eq!(p.requantize(i32::MAX / 2), 200);
        assert_eq!(p.requantize(i32::MIN / 2), 100);
    }

    #[test]
    fn test_requantize_tracks_real_arithmetic() {
        let p = params(0.1237);
        for acc in [-100_000, -777, -3, 0, 5, 999, 123_456] {
            let real = f64::from(acc) * f64::from(p.scale);
            let expected = (real.round() as i32 + 128).clamp(0, 255);
            let got = i32::from(p.requantize(acc));
            assert!(
                (got - expected).abs() <= 1,
                "acc {acc}: got {got}, expected about {expected}"
            );
        }
    }
}
