//! Closed-form estimators for memory footprint, offload bandwidth and
//! throughput.
//!
//! Every function here is total over `f64`: out-of-domain input is not
//! rejected, it flows through IEEE-754 arithmetic. Callers that need
//! validated input go through [`crate::hardware::HardwareConfig::validate`]
//! and [`crate::plan::ModelConfig::validate`] first.

use crate::calibration::{
    ACTIVATION_OVERHEAD_RATIO, BITS_PER_BYTE, FULL_GPU_CPU_FACTOR, KV_CACHE_FACTOR,
    MAX_TOKENS_PER_SEC, MIN_TOKENS_PER_SEC,
};

/// Weight footprint in GB for `param_count` billion parameters.
pub fn weight_size_gb(param_count: f64, bits_per_weight: f64) -> f64 {
    param_count * bits_per_weight / BITS_PER_BYTE
}

/// Approximate VRAM needed in GB: weights + KV cache + activations.
///
/// The KV-cache term is a flat empirical multiplier, not derived from layer
/// or hidden-dimension counts.
pub fn calculate_vram(
    param_count: f64,
    bits_per_weight: f64,
    context_length: u32,
    batch_size: u32,
) -> f64 {
    let model_size = weight_size_gb(param_count, bits_per_weight);
    let kv_cache = param_count * context_length as f64 * batch_size as f64 * KV_CACHE_FACTOR;
    let activations = model_size * ACTIVATION_OVERHEAD_RATIO;
    model_size + kv_cache + activations
}

/// Memory-bandwidth-bound tokens/sec, scaled by `cpu_factor` when below 1.0
/// and clamped to `[0, 1000]`.
pub fn calculate_performance(bandwidth: f64, model_size_gb: f64, cpu_factor: f64) -> f64 {
    if model_size_gb <= 0.0 {
        return 0.0;
    }

    let mut tps = bandwidth / model_size_gb;
    if cpu_factor < FULL_GPU_CPU_FACTOR {
        tps *= cpu_factor;
    }

    tps.clamp(MIN_TOKENS_PER_SEC, MAX_TOKENS_PER_SEC)
}

/// Effective bandwidth when `gpu_layers` of `total_layers` live in VRAM and
/// the rest in system RAM.
///
/// A split is a pipeline: every token passes through both devices, so the
/// result is the layer-weighted harmonic mean and always lies between the
/// two bandwidths. A zero device bandwidth yields zero.
pub fn calculate_offload_bandwidth(
    gpu_bandwidth: f64,
    ram_bandwidth: f64,
    gpu_layers: i32,
    total_layers: i32,
) -> f64 {
    if total_layers <= 0 || gpu_layers >= total_layers {
        return gpu_bandwidth;
    }
    if gpu_layers <= 0 {
        return ram_bandwidth;
    }

    let gpu_ratio = gpu_layers as f64 / total_layers as f64;
    let ram_ratio = 1.0 - gpu_ratio;

    1.0 / (gpu_ratio / gpu_bandwidth + ram_ratio / ram_bandwidth)
}

/// True when the model fits neither in VRAM alone nor, with offload
/// allowed, in VRAM and system RAM combined.
pub fn is_out_of_memory(
    model_size_gb: f64,
    vram_gb: f64,
    system_ram_gb: f64,
    allow_offload: bool,
) -> bool {
    if model_size_gb <= vram_gb {
        return false;
    }
    if allow_offload && model_size_gb <= vram_gb + system_ram_gb {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn vram_sums_weights_kv_cache_and_activations() {
        // 3.5 GB weights + 0.057344 GB KV + 0.175 GB activations
        let vram = calculate_vram(7.0, 4.0, 4096, 1);
        assert_abs_diff_eq!(vram, 3.732344, epsilon = 1e-12);
    }

    #[test]
    fn vram_without_context_is_weights_plus_activations() {
        assert_abs_diff_eq!(calculate_vram(8.0, 16.0, 0, 4), 16.8, epsilon = 1e-12);
        assert_abs_diff_eq!(calculate_vram(8.0, 16.0, 8192, 0), 16.8, epsilon = 1e-12);
    }

    #[test]
    fn vram_kv_cache_scales_with_batch() {
        let single = calculate_vram(70.0, 4.0, 32768, 1);
        let quad = calculate_vram(70.0, 4.0, 32768, 4);
        let kv_single = 70.0 * 32768.0 * KV_CACHE_FACTOR;
        assert_abs_diff_eq!(quad - single, 3.0 * kv_single, epsilon = 1e-9);
    }

    #[test]
    fn performance_is_bandwidth_over_size() {
        assert_abs_diff_eq!(
            calculate_performance(1000.0, 3.5, 1.0),
            1000.0 / 3.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn performance_applies_cpu_factor_below_one() {
        assert_abs_diff_eq!(
            calculate_performance(100.0, 4.0, 0.5),
            12.5,
            epsilon = 1e-12
        );
        // Factors at or above 1.0 never boost throughput.
        assert_abs_diff_eq!(
            calculate_performance(100.0, 4.0, 1.5),
            25.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn performance_zero_or_negative_size_is_zero() {
        assert_eq!(calculate_performance(1000.0, 0.0, 1.0), 0.0);
        assert_eq!(calculate_performance(1000.0, -2.0, 0.3), 0.0);
    }

    #[test]
    fn performance_is_capped() {
        assert_eq!(calculate_performance(2000.0, 0.5, 1.0), MAX_TOKENS_PER_SEC);
    }

    #[test]
    fn offload_edge_cases() {
        assert_eq!(calculate_offload_bandwidth(900.0, 60.0, 10, 0), 900.0);
        assert_eq!(calculate_offload_bandwidth(900.0, 60.0, 10, -1), 900.0);
        assert_eq!(calculate_offload_bandwidth(900.0, 60.0, 32, 32), 900.0);
        assert_eq!(calculate_offload_bandwidth(900.0, 60.0, 40, 32), 900.0);
        assert_eq!(calculate_offload_bandwidth(900.0, 60.0, 0, 32), 60.0);
        assert_eq!(calculate_offload_bandwidth(900.0, 60.0, -3, 32), 60.0);
    }

    #[test]
    fn offload_half_split_is_harmonic_mean() {
        let bw = calculate_offload_bandwidth(1000.0, 100.0, 16, 32);
        assert_abs_diff_eq!(bw, 1.0 / (0.5 / 1000.0 + 0.5 / 100.0), epsilon = 1e-9);
        // Well below the arithmetic mean of 550.
        assert!(bw < 200.0);
    }

    #[test]
    fn offload_zero_ram_bandwidth_stalls() {
        assert_eq!(calculate_offload_bandwidth(1000.0, 0.0, 16, 32), 0.0);
    }

    #[test]
    fn out_of_memory_policy() {
        assert!(!is_out_of_memory(10.0, 8.0, 4.0, true));
        assert!(is_out_of_memory(10.0, 8.0, 1.0, true));
        assert!(is_out_of_memory(10.0, 8.0, 4.0, false));
        assert!(!is_out_of_memory(8.0, 8.0, 0.0, false));
        assert!(!is_out_of_memory(12.0, 8.0, 4.0, true));
    }

    proptest! {
        #[test]
        fn prop_vram_monotonic_in_each_input(
            p in 0.1f64..200.0,
            b in 2.0f64..16.0,
            c in 0u32..131_072,
            batch in 0u32..64,
            dp in 0.0f64..50.0,
            db in 0.0f64..8.0,
            dc in 0u32..8192,
            dbatch in 0u32..8,
        ) {
            let base = calculate_vram(p, b, c, batch);
            prop_assert!(calculate_vram(p + dp, b, c, batch) >= base);
            prop_assert!(calculate_vram(p, b + db, c, batch) >= base);
            prop_assert!(calculate_vram(p, b, c + dc, batch) >= base);
            prop_assert!(calculate_vram(p, b, c, batch + dbatch) >= base);
        }

        #[test]
        fn prop_performance_bounded(
            bw in 0.0f64..5000.0,
            size in -10.0f64..500.0,
            factor in 0.0f64..1.5,
        ) {
            let tps = calculate_performance(bw, size, factor);
            prop_assert!((0.0..=1000.0).contains(&tps), "tps {tps} out of range");
        }

        #[test]
        fn prop_performance_full_gpu_matches_ratio(
            bw in 1.0f64..1000.0,
            size in 1.0f64..500.0,
        ) {
            prop_assert_eq!(calculate_performance(bw, size, 1.0), bw / size);
        }

        #[test]
        fn prop_offload_bounded_by_devices(
            g in 1.0f64..4000.0,
            r in 1.0f64..400.0,
            total in 1i32..160,
            split in 0.0f64..1.0,
        ) {
            let layers = (split * total as f64).round() as i32;
            let bw = calculate_offload_bandwidth(g, r, layers, total);
            let lo = g.min(r) * (1.0 - 1e-12);
            let hi = g.max(r) * (1.0 + 1e-12);
            prop_assert!(bw >= lo && bw <= hi, "{bw} outside [{lo}, {hi}]");
        }

        #[test]
        fn prop_offload_all_layers_is_gpu(g in 1.0f64..4000.0, r in 1.0f64..400.0, n in 1i32..200) {
            prop_assert_eq!(calculate_offload_bandwidth(g, r, n, n), g);
            prop_assert_eq!(calculate_offload_bandwidth(g, r, 0, n), r);
        }

        #[test]
        fn prop_engine_is_deterministic(
            p in 0.1f64..200.0,
            b in 2.0f64..16.0,
            c in 0u32..65_536,
            bw in 1.0f64..2000.0,
        ) {
            prop_assert_eq!(
                calculate_vram(p, b, c, 1).to_bits(),
                calculate_vram(p, b, c, 1).to_bits()
            );
            let size = weight_size_gb(p, b);
            prop_assert_eq!(
                calculate_performance(bw, size, 0.4).to_bits(),
                calculate_performance(bw, size, 0.4).to_bits()
            );
        }
    }
}
