use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{debug, warn};

use crate::calibration::{MAX_SYSTEM_RAM_GB, MIN_SYSTEM_RAM_GB, SYSTEM_RAM_STEP_GB};
use crate::error::{EstimateError, Result};

/// How GPU memory relates to system RAM. Decides which pools the estimator
/// hands to the engine; the engine itself never sees this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTopology {
    /// One pool shared by CPU and GPU (Apple Silicon and similar).
    Unified,
    /// Separate VRAM; layers that do not fit spill to system RAM.
    Discrete,
}

impl MemoryTopology {
    pub fn label(&self) -> &'static str {
        match self {
            MemoryTopology::Unified => "unified",
            MemoryTopology::Discrete => "discrete",
        }
    }
}

impl fmt::Display for MemoryTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MemoryTopology {
    type Err = EstimateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unified" => Ok(MemoryTopology::Unified),
            "discrete" => Ok(MemoryTopology::Discrete),
            _ => Err(EstimateError::UnknownTopology(s.to_string())),
        }
    }
}

/// Inference backend selection. Display and filtering metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuBackend {
    Auto,
    Cuda,
    Metal,
    Vulkan,
    Rocm,
    Sycl,
}

impl GpuBackend {
    pub const ALL: [GpuBackend; 6] = [
        GpuBackend::Auto,
        GpuBackend::Cuda,
        GpuBackend::Metal,
        GpuBackend::Vulkan,
        GpuBackend::Rocm,
        GpuBackend::Sycl,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            GpuBackend::Auto => "auto",
            GpuBackend::Cuda => "cuda",
            GpuBackend::Metal => "metal",
            GpuBackend::Vulkan => "vulkan",
            GpuBackend::Rocm => "rocm",
            GpuBackend::Sycl => "sycl",
        }
    }
}

impl fmt::Display for GpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GpuBackend {
    type Err = EstimateError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        GpuBackend::ALL
            .into_iter()
            .find(|b| b.label() == lower)
            .ok_or_else(|| EstimateError::UnknownBackend(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuSpec {
    /// Vendor-specific generation code: 1-5 for one family, 10-15 for the other.
    pub generation: i32,
    pub core_count: u32,
    pub is_high_end: bool,
}

impl Default for CpuSpec {
    fn default() -> Self {
        Self {
            generation: 5,
            core_count: 8,
            is_high_end: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub topology: MemoryTopology,
    pub gpu_backend: GpuBackend,
    /// Dedicated VRAM. Ignored for unified memory.
    pub vram_gb: f64,
    pub system_ram_gb: f64,
    /// GPU memory bandwidth, or the shared pool bandwidth when unified.
    pub gpu_bandwidth_gbps: f64,
    pub ram_bandwidth_gbps: f64,
    pub cpu: CpuSpec,
    pub allow_offload: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            topology: MemoryTopology::Discrete,
            gpu_backend: GpuBackend::Auto,
            vram_gb: 24.0,
            system_ram_gb: 32.0,
            gpu_bandwidth_gbps: 1000.0,
            ram_bandwidth_gbps: 64.0,
            cpu: CpuSpec::default(),
            allow_offload: true,
        }
    }
}

impl HardwareConfig {
    /// Reject values the estimator must never pass to the engine.
    pub fn validate(&self) -> Result<()> {
        let ram = self.system_ram_gb;
        if !(MIN_SYSTEM_RAM_GB..=MAX_SYSTEM_RAM_GB).contains(&ram) {
            return Err(EstimateError::invalid(
                "system_ram_gb",
                format!("{ram} GB outside {MIN_SYSTEM_RAM_GB}-{MAX_SYSTEM_RAM_GB} GB"),
            ));
        }
        if ram % SYSTEM_RAM_STEP_GB != 0.0 {
            return Err(EstimateError::invalid(
                "system_ram_gb",
                format!("{ram} GB is not a multiple of {SYSTEM_RAM_STEP_GB} GB"),
            ));
        }
        if !self.vram_gb.is_finite() || self.vram_gb < 0.0 {
            return Err(EstimateError::invalid(
                "vram_gb",
                format!("{} GB must be zero or positive", self.vram_gb),
            ));
        }
        positive("gpu_bandwidth_gbps", self.gpu_bandwidth_gbps)?;
        positive("ram_bandwidth_gbps", self.ram_bandwidth_gbps)?;
        if self.cpu.core_count == 0 {
            return Err(EstimateError::invalid("core_count", "need at least one core"));
        }
        Ok(())
    }

    /// GPU-addressable pool: all of system RAM when unified.
    pub fn gpu_pool_gb(&self) -> f64 {
        match self.topology {
            MemoryTopology::Unified => self.system_ram_gb,
            MemoryTopology::Discrete => self.vram_gb,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EstimateError::invalid(field, format!("{value} must be positive")))
    }
}

/// Round a RAM size onto the selectable grid (multiples of 4 GB, 8-512 GB).
pub fn snap_system_ram(gb: f64) -> f64 {
    ((gb / SYSTEM_RAM_STEP_GB).round() * SYSTEM_RAM_STEP_GB)
        .clamp(MIN_SYSTEM_RAM_GB, MAX_SYSTEM_RAM_GB)
}

/// Installed capacities read from the running machine. Used only to seed
/// defaults; nothing here measures speed.
#[derive(Debug, Clone, Serialize)]
pub struct SystemSpecs {
    pub total_ram_gb: f64,
    pub available_ram_gb: f64,
    pub total_cpu_cores: usize,
    pub cpu_name: String,
    pub has_gpu: bool,
    pub gpu_vram_gb: Option<f64>,
    pub gpu_backend: GpuBackend,
    pub unified_memory: bool,
}

impl SystemSpecs {
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_ram_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let available_ram_gb = sys.available_memory() as f64 / (1024.0 * 1024.0 * 1024.0);

        let total_cpu_cores = sys.cpus().len();
        let cpu_name = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().to_string())
            .unwrap_or_else(|| "Unknown CPU".to_string());

        let (has_gpu, gpu_vram_gb, gpu_backend, unified_memory) = Self::detect_gpu(total_ram_gb);

        let specs = SystemSpecs {
            total_ram_gb,
            available_ram_gb,
            total_cpu_cores,
            cpu_name,
            has_gpu,
            gpu_vram_gb,
            gpu_backend,
            unified_memory,
        };
        debug!(?specs, "detected system");
        specs
    }

    fn detect_gpu(total_ram_gb: f64) -> (bool, Option<f64>, GpuBackend, bool) {
        if let Some(vram) = Self::detect_nvidia_vram() {
            return (true, Some(vram), GpuBackend::Cuda, false);
        }

        // rocm-smi answers but its VRAM output is not parsed
        if let Ok(output) = std::process::Command::new("rocm-smi")
            .arg("--showmeminfo")
            .arg("vram")
            .output()
        {
            if output.status.success() {
                warn!("AMD GPU found but VRAM size unknown");
                return (true, None, GpuBackend::Rocm, false);
            }
        }

        if Self::is_apple_silicon() {
            return (true, Some(total_ram_gb), GpuBackend::Metal, true);
        }

        (false, None, GpuBackend::Auto, false)
    }

    /// Total VRAM across all NVIDIA devices, in GB.
    fn detect_nvidia_vram() -> Option<f64> {
        let output = std::process::Command::new("nvidia-smi")
            .arg("--query-gpu=memory.total")
            .arg("--format=csv,noheader,nounits")
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }

        let text = String::from_utf8(output.stdout).ok()?;
        let mut total_mb = 0.0;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match line.trim().parse::<f64>() {
                Ok(mb) => total_mb += mb,
                Err(_) => {
                    warn!(line, "unparseable nvidia-smi output");
                    return None;
                }
            }
        }
        (total_mb > 0.0).then(|| total_mb / 1024.0)
    }

    fn is_apple_silicon() -> bool {
        // system_profiler only exists on macOS
        let Ok(output) = std::process::Command::new("system_profiler")
            .arg("SPDisplaysDataType")
            .output()
        else {
            return false;
        };
        if !output.status.success() {
            return false;
        }

        String::from_utf8_lossy(&output.stdout).lines().any(|line| {
            let lower = line.to_lowercase();
            lower.contains("apple m") || lower.contains("apple gpu")
        })
    }

    /// Overlay detected capacities onto `base`. Bandwidths and CPU
    /// generation cannot be detected and are kept from `base`.
    pub fn apply_to(&self, base: HardwareConfig) -> HardwareConfig {
        let mut hw = base;
        hw.system_ram_gb = snap_system_ram(self.total_ram_gb);
        if self.total_cpu_cores > 0 {
            hw.cpu.core_count = self.total_cpu_cores as u32;
        }
        if self.unified_memory {
            hw.topology = MemoryTopology::Unified;
        } else if let Some(vram) = self.gpu_vram_gb {
            hw.topology = MemoryTopology::Discrete;
            hw.vram_gb = vram;
        } else if !self.has_gpu {
            hw.topology = MemoryTopology::Discrete;
            hw.vram_gb = 0.0;
        }
        if hw.gpu_backend == GpuBackend::Auto {
            hw.gpu_backend = self.gpu_backend;
        }
        hw
    }

    pub fn display(&self) {
        println!("\n=== System Specifications ===");
        println!("CPU: {} ({} cores)", self.cpu_name, self.total_cpu_cores);
        println!("Total RAM: {:.2} GB", self.total_ram_gb);
        println!("Available RAM: {:.2} GB", self.available_ram_gb);

        if self.has_gpu {
            if self.unified_memory {
                println!(
                    "GPU: Apple Silicon (unified memory, {:.2} GB shared)",
                    self.gpu_vram_gb.unwrap_or(0.0)
                );
            } else {
                match self.gpu_vram_gb {
                    Some(vram) => {
                        println!("GPU: Detected ({:.2} GB VRAM, {})", vram, self.gpu_backend)
                    }
                    None => println!("GPU: Detected (VRAM unknown, {})", self.gpu_backend),
                }
            }
        } else {
            println!("GPU: Not detected");
        }
        println!("RAM setting: {:.0} GB", snap_system_ram(self.total_ram_gb));
        println!();
    }
}
