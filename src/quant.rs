use crate::error::{EstimateError, Result};

/// Quantization levels ordered from best quality to most compressed.
pub const QUANT_HIERARCHY: &[&str] = &[
    "F32", "F16", "BF16", "Q8_0", "Q6_K", "Q5_K_M", "Q4_K_M", "Q4_0", "Q3_K_M", "Q2_K",
];

/// Bits per weight for a named quantization level (case-insensitive).
pub fn quant_bits(quant: &str) -> Option<f64> {
    let bits = match quant.to_ascii_uppercase().as_str() {
        "F32" => 32.0,
        "F16" | "BF16" => 16.0,
        "Q8_0" => 8.0,
        "Q6_K" => 6.0,
        "Q5_K_M" => 5.0,
        "Q4_K_M" | "Q4_0" => 4.0,
        "Q3_K_M" => 3.5,
        "Q2_K" => 2.5,
        _ => return None,
    };
    Some(bits)
}

pub fn parse_quant(quant: &str) -> Result<f64> {
    quant_bits(quant).ok_or_else(|| EstimateError::UnknownQuantization(quant.to_string()))
}

/// The most precise preset whose bits do not exceed `bits`.
pub fn nearest_quant_at_or_below(bits: f64) -> Option<&'static str> {
    QUANT_HIERARCHY
        .iter()
        .copied()
        .find(|q| quant_bits(q).is_some_and(|b| b <= bits))
}
