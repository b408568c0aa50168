//! Validation predicates for operator creation and binding.
//!
//! All functions return `Result<(), String>` so call sites can log the
//! message and convert it into their own error variant. No side effects;
//! pure predicate logic.

/// Validate a quantization scale: finite, normal, and positive.
///
/// Subnormal values are rejected along with zero, NaN, and infinities: the
/// Q31 requantization derivation needs a full mantissa and a representable
/// exponent.
#[inline]
pub fn validate_scale(tensor: &str, scale: f32) -> Result<(), String> {
    if !scale.is_normal() || scale <= 0.0 {
        return Err(format!(
            "{tensor} scale {scale:.7e} must be finite, normal, and positive"
        ));
    }
    Ok(())
}

/// Validate the logical operator shape.
#[inline]
pub fn validate_channels(input_channels: usize, output_channels: usize) -> Result<(), String> {
    if input_channels == 0 {
        return Err("input channels must be non-zero".into());
    }
    if output_channels == 0 {
        return Err("output channels must be non-zero".into());
    }
    Ok(())
}

/// Validate a slice length against the element count its shape implies.
#[inline]
pub fn validate_len(name: &str, actual: usize, expected: usize) -> Result<(), String> {
    if actual != expected {
        return Err(format!("{name} has {actual} elements, shape requires {expected}"));
    }
    Ok(())
}

/// Validate the output clamp range.
#[inline]
pub fn validate_clamp_range(output_min: u8, output_max: u8) -> Result<(), String> {
    if output_min > output_max {
        return Err(format!(
            "output clamp range [{output_min}, {output_max}] is empty"
        ));
    }
    Ok(())
}

/// Validate the per-call batch size.
#[inline]
pub fn validate_batch_size(batch_size: usize) -> Result<(), String> {
    if batch_size == 0 {
        return Err("batch size must be non-zero".into());
    }
    Ok(())
}

/// Validate that a row-major buffer covers `rows` rows of `cols` elements at
/// the given per-row stride.
#[inline]
pub fn validate_row_buffer(
    name: &str,
    len: usize,
    rows: usize,
    stride: usize,
    cols: usize,
) -> Result<(), String> {
    if stride < cols {
        return Err(format!(
            "{name} stride {stride} is smaller than the row width {cols}"
        ));
    }
    if rows == 0 {
        return Ok(());
    }
    let required = (rows - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(cols))
        .ok_or_else(|| format!("{name} extent overflows"))?;
    if len < required {
        return Err(format!(
            "{name} has {len} elements, {rows} rows at stride {stride} require {required}"
        ));
    }
    Ok(())
}
