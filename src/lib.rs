pub mod calibration;
pub mod config;
pub mod cpu;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod plan;
pub mod quant;
pub mod sweep;

pub use config::AppConfig;
pub use cpu::{CpuFamily, get_cpu_factor};
pub use engine::{
    calculate_offload_bandwidth, calculate_performance, calculate_vram, is_out_of_memory,
    weight_size_gb,
};
pub use error::{EstimateError, Result};
pub use hardware::{CpuSpec, GpuBackend, HardwareConfig, MemoryTopology, SystemSpecs};
pub use plan::{
    Estimate, FitLevel, ModelConfig, RunMode, best_quantization, estimate_all_quants,
    rank_by_fit, suggest_gpu_layers,
};
pub use quant::{QUANT_HIERARCHY, quant_bits};
pub use sweep::{
    SweepRecord, batch_calculate_performance, batch_calculate_performance_into, sweep_buffer_len,
};
