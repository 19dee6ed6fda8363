//! Composes the engine the way a front end does: model size, effective
//! bandwidth, tokens/sec, then the out-of-memory check.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::{FIT_HEADROOM_RATIO, LOW_CORE_COUNT, MAX_TOKENS_PER_SEC};
use crate::cpu::get_cpu_factor;
use crate::engine::{
    calculate_offload_bandwidth, calculate_performance, calculate_vram, is_out_of_memory,
    weight_size_gb,
};
use crate::error::{EstimateError, Result};
use crate::hardware::{HardwareConfig, MemoryTopology};
use crate::quant::{QUANT_HIERARCHY, quant_bits};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Billions of parameters.
    pub param_count_b: f64,
    pub bits_per_weight: f64,
    pub context_length: u32,
    pub batch_size: u32,
    pub total_layers: i32,
    /// Layers placed in VRAM. `None` places as many as fit.
    pub gpu_layers: Option<i32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            param_count_b: 8.0,
            bits_per_weight: 4.0,
            context_length: 4096,
            batch_size: 1,
            total_layers: 32,
            gpu_layers: None,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.param_count_b.is_finite() || self.param_count_b <= 0.0 {
            return Err(EstimateError::invalid(
                "param_count_b",
                format!("{} must be positive", self.param_count_b),
            ));
        }
        if !self.bits_per_weight.is_finite() || self.bits_per_weight <= 0.0 {
            return Err(EstimateError::invalid(
                "bits_per_weight",
                format!("{} must be positive", self.bits_per_weight),
            ));
        }
        if self.total_layers < 1 {
            return Err(EstimateError::invalid("total_layers", "need at least one layer"));
        }
        if let Some(layers) = self.gpu_layers {
            if !(0..=self.total_layers).contains(&layers) {
                return Err(EstimateError::invalid(
                    "gpu_layers",
                    format!("{layers} outside 0-{}", self.total_layers),
                ));
            }
        }
        Ok(())
    }
}

/// Execution path: where the layers live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunMode {
    Gpu,        // All layers in VRAM or the unified pool
    CpuOffload, // Split between VRAM and system RAM
    CpuOnly,    // No layers on the GPU
}

impl RunMode {
    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Gpu => "GPU",
            RunMode::CpuOffload => "CPU+GPU",
            RunMode::CpuOnly => "CPU",
        }
    }
}

/// Memory headroom rating. Perfect requires every layer on the GPU;
/// CPU paths cap lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum FitLevel {
    Perfect,  // Fits on GPU with headroom
    Good,     // Fits, but tight on GPU or comfortable when offloaded
    Marginal, // Fits only by leaning on system RAM
    TooTight, // Out of memory
}

impl FitLevel {
    pub fn label(&self) -> &'static str {
        match self {
            FitLevel::Perfect => "Perfect",
            FitLevel::Good => "Good",
            FitLevel::Marginal => "Marginal",
            FitLevel::TooTight => "Too Tight",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            FitLevel::Perfect => "🟢",
            FitLevel::Good => "🟡",
            FitLevel::Marginal => "🟠",
            FitLevel::TooTight => "🔴",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub model_size_gb: f64,
    pub vram_required_gb: f64,
    pub gpu_layers: i32,
    pub total_layers: i32,
    pub effective_bandwidth_gbps: f64,
    pub cpu_factor: f64,
    pub tokens_per_sec: f64,
    pub run_mode: RunMode,
    pub fit_level: FitLevel,
    pub out_of_memory: bool,
    pub memory_available_gb: f64,
    pub utilization_pct: f64,
    pub notes: Vec<String>,
}

impl Estimate {
    pub fn compute(model: &ModelConfig, hw: &HardwareConfig) -> Result<Self> {
        model.validate()?;
        hw.validate()?;

        let mut notes = Vec::new();
        let total_layers = model.total_layers;
        let model_size_gb = weight_size_gb(model.param_count_b, model.bits_per_weight);
        let vram_required_gb = calculate_vram(
            model.param_count_b,
            model.bits_per_weight,
            model.context_length,
            model.batch_size,
        );

        let (gpu_layers, out_of_memory, memory_available_gb) = match hw.topology {
            MemoryTopology::Unified => {
                // One pool: nothing to offload to.
                notes.push("Unified memory: GPU and CPU share the same pool".to_string());
                let pool = hw.gpu_pool_gb();
                let oom = is_out_of_memory(vram_required_gb, pool, 0.0, false);
                (total_layers, oom, pool)
            }
            MemoryTopology::Discrete => {
                let layers = if !hw.allow_offload {
                    if let Some(requested) = model.gpu_layers.filter(|&l| l < total_layers) {
                        notes.push(format!(
                            "Offload is disabled: requested {requested} GPU layers, \
                             placing all {total_layers}"
                        ));
                    }
                    total_layers
                } else {
                    model.gpu_layers.unwrap_or_else(|| {
                        suggest_gpu_layers(vram_required_gb, hw.vram_gb, total_layers)
                    })
                };
                // Only a split placement can spill into system RAM.
                let spills = layers < total_layers;
                let oom = is_out_of_memory(vram_required_gb, hw.vram_gb, hw.system_ram_gb, spills);
                let available = if spills {
                    hw.vram_gb + hw.system_ram_gb
                } else {
                    hw.gpu_pool_gb()
                };
                (layers, oom, available)
            }
        };

        let run_mode = if gpu_layers >= total_layers {
            RunMode::Gpu
        } else if gpu_layers <= 0 {
            RunMode::CpuOnly
        } else {
            RunMode::CpuOffload
        };

        let effective_bandwidth_gbps = calculate_offload_bandwidth(
            hw.gpu_bandwidth_gbps,
            hw.ram_bandwidth_gbps,
            gpu_layers,
            total_layers,
        );
        let cpu_factor = if run_mode == RunMode::Gpu {
            1.0
        } else {
            get_cpu_factor(hw.cpu.generation, hw.cpu.core_count, hw.cpu.is_high_end)
        };
        let tokens_per_sec =
            calculate_performance(effective_bandwidth_gbps, model_size_gb, cpu_factor);

        let utilization_pct = if memory_available_gb > 0.0 {
            (vram_required_gb / memory_available_gb) * 100.0
        } else {
            f64::INFINITY
        };
        let fit_level = score_fit(vram_required_gb, memory_available_gb, run_mode, out_of_memory);

        match run_mode {
            RunMode::Gpu if hw.topology == MemoryTopology::Discrete && !out_of_memory => {
                notes.push("GPU: model loaded into VRAM".to_string());
            }
            RunMode::Gpu => {}
            RunMode::CpuOffload => {
                notes.push(format!(
                    "GPU: {}/{} layers in VRAM, the rest spill to system RAM",
                    gpu_layers, total_layers
                ));
                notes.push("Performance will be significantly reduced".to_string());
            }
            RunMode::CpuOnly => {
                notes.push("No layers on the GPU -- inference will be slow".to_string());
            }
        }
        if run_mode != RunMode::Gpu && hw.cpu.core_count < LOW_CORE_COUNT {
            notes.push("Low CPU core count may bottleneck inference".to_string());
        }
        if out_of_memory {
            notes.push(format!(
                "Out of memory: need {:.1} GB, have {:.1} GB",
                vram_required_gb, memory_available_gb
            ));
            if hw.topology == MemoryTopology::Discrete && run_mode == RunMode::Gpu {
                if hw.allow_offload {
                    notes.push(
                        "All layers pinned to VRAM; fewer GPU layers would spill to system RAM"
                            .to_string(),
                    );
                } else {
                    notes.push(
                        "Offload is disabled; enabling it adds system RAM to the pool".to_string(),
                    );
                }
            }
        }
        if tokens_per_sec >= MAX_TOKENS_PER_SEC {
            notes.push(format!("Throughput capped at {MAX_TOKENS_PER_SEC:.0} tok/s"));
        }

        let estimate = Estimate {
            model_size_gb,
            vram_required_gb,
            gpu_layers,
            total_layers,
            effective_bandwidth_gbps,
            cpu_factor,
            tokens_per_sec,
            run_mode,
            fit_level,
            out_of_memory,
            memory_available_gb,
            utilization_pct,
            notes,
        };
        debug!(
            model_size_gb,
            vram_required_gb,
            gpu_layers,
            tokens_per_sec,
            out_of_memory,
            "estimate computed"
        );
        Ok(estimate)
    }
}

/// Headroom scoring on the pool the run mode uses.
fn score_fit(required: f64, available: f64, run_mode: RunMode, out_of_memory: bool) -> FitLevel {
    if out_of_memory || required > available {
        return FitLevel::TooTight;
    }

    let roomy = available >= required * FIT_HEADROOM_RATIO;
    match run_mode {
        RunMode::Gpu if roomy => FitLevel::Perfect,
        RunMode::Gpu => FitLevel::Good,
        RunMode::CpuOffload if roomy => FitLevel::Good,
        RunMode::CpuOffload => FitLevel::Marginal,
        // CPU-only is always a compromise
        RunMode::CpuOnly => FitLevel::Marginal,
    }
}

/// Most layers whose proportional share of `vram_required_gb` fits in
/// `vram_gb`.
pub fn suggest_gpu_layers(vram_required_gb: f64, vram_gb: f64, total_layers: i32) -> i32 {
    if total_layers <= 0 {
        return 0;
    }
    if vram_required_gb <= vram_gb {
        return total_layers;
    }
    let per_layer = vram_required_gb / total_layers as f64;
    ((vram_gb / per_layer).floor() as i32).clamp(0, total_layers)
}

/// Estimate for every quantization preset, most precise first.
pub fn estimate_all_quants(
    model: &ModelConfig,
    hw: &HardwareConfig,
) -> Result<Vec<(&'static str, Estimate)>> {
    QUANT_HIERARCHY
        .iter()
        .filter_map(|&name| quant_bits(name).map(|bits| (name, bits)))
        .map(|(name, bits)| {
            let quantized = ModelConfig {
                bits_per_weight: bits,
                ..*model
            };
            Estimate::compute(&quantized, hw).map(|e| (name, e))
        })
        .collect()
}

/// The most precise preset that does not run out of memory.
pub fn best_quantization(
    model: &ModelConfig,
    hw: &HardwareConfig,
) -> Result<Option<(&'static str, Estimate)>> {
    Ok(estimate_all_quants(model, hw)?
        .into_iter()
        .find(|(_, e)| !e.out_of_memory))
}

/// Best fit first; within a fit level, faster first.
pub fn rank_by_fit(
    mut estimates: Vec<(&'static str, Estimate)>,
) -> Vec<(&'static str, Estimate)> {
    estimates.sort_by(|(_, a), (_, b)| {
        a.fit_level
            .cmp(&b.fit_level)
            .then_with(|| b.tokens_per_sec.total_cmp(&a.tokens_per_sec))
    });
    estimates
}
