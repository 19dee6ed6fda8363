mod display;

use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::debug;

use llmperf::quant::parse_quant;
use llmperf::{
    AppConfig, Estimate, GpuBackend, HardwareConfig, MemoryTopology, ModelConfig, SystemSpecs,
    batch_calculate_performance, calculate_offload_bandwidth, estimate_all_quants,
    get_cpu_factor, rank_by_fit,
};

#[derive(Parser)]
#[command(name = "llmperf")]
#[command(
    about = "Estimate VRAM, bandwidth and tokens/sec for local LLM inference",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show detected system hardware
    System,

    /// Estimate memory, throughput and OOM status for one configuration
    Estimate(EstimateArgs),

    /// Evaluate every quantization preset against the hardware
    Fit(EstimateArgs),

    /// Throughput across a range of bits per weight (GPU only)
    Sweep {
        /// Model size in billions of parameters
        #[arg(short, long, default_value_t = 8.0)]
        params: f64,

        /// Memory bandwidth in GB/s
        #[arg(short, long, default_value_t = 1000.0)]
        bandwidth: f64,

        #[arg(long, default_value_t = 2.0)]
        min_bits: f64,

        #[arg(long, default_value_t = 16.0)]
        max_bits: f64,

        #[arg(long, default_value_t = 0.5)]
        step: f64,
    },

    /// CPU scaling factor for a CPU description
    CpuFactor {
        /// Generation code (1-5 or 10-15)
        #[arg(short, long)]
        generation: i32,

        #[arg(short, long)]
        cores: u32,

        #[arg(long)]
        high_end: bool,
    },

    /// Effective bandwidth for a GPU/RAM layer split
    Offload {
        #[arg(long)]
        gpu_bandwidth: f64,

        #[arg(long)]
        ram_bandwidth: f64,

        #[arg(long)]
        gpu_layers: i32,

        #[arg(long)]
        total_layers: i32,
    },

    /// List quantization presets
    Quants,

    /// Print the effective configuration as JSON
    Config(EstimateArgs),
}

#[derive(Args)]
struct EstimateArgs {
    /// JSON config file with model and hardware defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed RAM, cores and GPU pool from the running machine
    #[arg(long)]
    detect: bool,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    hardware: HardwareArgs,
}

#[derive(Args)]
struct ModelArgs {
    /// Model size in billions of parameters
    #[arg(short, long)]
    params: Option<f64>,

    /// Bits per weight
    #[arg(short, long, conflicts_with = "quant")]
    bits: Option<f64>,

    /// Quantization preset (e.g. Q4_K_M), instead of --bits
    #[arg(short, long)]
    quant: Option<String>,

    /// Context length in tokens
    #[arg(short, long)]
    context: Option<u32>,

    #[arg(long)]
    batch: Option<u32>,

    /// Transformer layer count
    #[arg(long)]
    layers: Option<i32>,

    /// Layers to keep in VRAM (default: as many as fit)
    #[arg(long)]
    gpu_layers: Option<i32>,
}

#[derive(Args)]
struct HardwareArgs {
    /// unified or discrete
    #[arg(long)]
    topology: Option<MemoryTopology>,

    /// auto, cuda, metal, vulkan, rocm or sycl
    #[arg(long)]
    backend: Option<GpuBackend>,

    /// Dedicated VRAM in GB
    #[arg(long)]
    vram: Option<f64>,

    /// System RAM in GB (8-512, multiple of 4)
    #[arg(long)]
    ram: Option<f64>,

    /// GPU (or unified pool) bandwidth in GB/s
    #[arg(long)]
    gpu_bandwidth: Option<f64>,

    /// System RAM bandwidth in GB/s
    #[arg(long)]
    ram_bandwidth: Option<f64>,

    /// CPU generation code
    #[arg(long)]
    cpu_gen: Option<i32>,

    #[arg(long)]
    cores: Option<u32>,

    #[arg(long)]
    high_end: bool,

    /// Keep every layer in VRAM
    #[arg(long, conflicts_with = "gpu_layers")]
    no_offload: bool,
}

impl ModelArgs {
    fn apply(&self, model: &mut ModelConfig) -> Result<()> {
        if let Some(p) = self.params {
            model.param_count_b = p;
        }
        if let Some(b) = self.bits {
            model.bits_per_weight = b;
        }
        if let Some(q) = &self.quant {
            model.bits_per_weight = parse_quant(q)?;
        }
        if let Some(c) = self.context {
            model.context_length = c;
        }
        if let Some(b) = self.batch {
            model.batch_size = b;
        }
        if let Some(l) = self.layers {
            model.total_layers = l;
        }
        if self.gpu_layers.is_some() {
            model.gpu_layers = self.gpu_layers;
        }
        Ok(())
    }
}

impl HardwareArgs {
    fn apply(&self, hw: &mut HardwareConfig) {
        if let Some(t) = self.topology {
            hw.topology = t;
        }
        if let Some(b) = self.backend {
            hw.gpu_backend = b;
        }
        if let Some(v) = self.vram {
            hw.vram_gb = v;
        }
        if let Some(r) = self.ram {
            hw.system_ram_gb = r;
        }
        if let Some(bw) = self.gpu_bandwidth {
            hw.gpu_bandwidth_gbps = bw;
        }
        if let Some(bw) = self.ram_bandwidth {
            hw.ram_bandwidth_gbps = bw;
        }
        if let Some(g) = self.cpu_gen {
            hw.cpu.generation = g;
        }
        if let Some(c) = self.cores {
            hw.cpu.core_count = c;
        }
        if self.high_end {
            hw.cpu.is_high_end = true;
        }
        if self.no_offload {
            hw.allow_offload = false;
        }
    }
}

impl EstimateArgs {
    /// File, then detection, then flags; later layers win.
    fn resolve(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load_or_default(self.config.as_deref())
            .with_context(|| format!("loading config {:?}", self.config))?;
        if self.detect {
            config.hardware = SystemSpecs::detect().apply_to(config.hardware);
        }
        self.model.apply(&mut config.model)?;
        self.hardware.apply(&mut config.hardware);
        debug!(?config, "resolved configuration");
        Ok(config)
    }
}

fn check_sweep_args(min_bits: f64, max_bits: f64, step: f64) -> Result<()> {
    ensure!(step.is_finite() && step > 0.0, "--step must be positive, got {step}");
    ensure!(
        min_bits.is_finite() && max_bits.is_finite(),
        "--min-bits and --max-bits must be finite"
    );
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_estimate(args: &EstimateArgs, json: bool) -> Result<()> {
    let config = args.resolve()?;
    let estimate = Estimate::compute(&config.model, &config.hardware)?;

    if json {
        return print_json(&json!({
            "model": config.model,
            "hardware": config.hardware,
            "estimate": estimate,
        }));
    }
    display::display_estimate(&estimate, &config.model, &config.hardware);
    Ok(())
}

fn run_fit(args: &EstimateArgs, json: bool) -> Result<()> {
    let config = args.resolve()?;
    let fits = rank_by_fit(estimate_all_quants(&config.model, &config.hardware)?);

    if json {
        let entries: Vec<_> = fits
            .iter()
            .map(|(quant, e)| json!({ "quant": quant, "estimate": e }))
            .collect();
        return print_json(&json!(entries));
    }
    display::display_quant_fits(&fits);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::System => {
            let specs = SystemSpecs::detect();
            if cli.json {
                print_json(&json!(specs))?;
            } else {
                specs.display();
            }
        }

        Commands::Estimate(args) => run_estimate(&args, cli.json)?,

        Commands::Fit(args) => run_fit(&args, cli.json)?,

        Commands::Sweep {
            params,
            bandwidth,
            min_bits,
            max_bits,
            step,
        } => {
            check_sweep_args(min_bits, max_bits, step)?;
            let records = batch_calculate_performance(bandwidth, params, min_bits, max_bits, step)?;
            if cli.json {
                print_json(&json!(records))?;
            } else {
                display::display_sweep(&records, params, bandwidth);
            }
        }

        Commands::CpuFactor {
            generation,
            cores,
            high_end,
        } => {
            let factor = get_cpu_factor(generation, cores, high_end);
            if cli.json {
                print_json(&json!({ "cpu_factor": factor }))?;
            } else {
                display::display_cpu_factor(generation, cores, high_end, factor);
            }
        }

        Commands::Offload {
            gpu_bandwidth,
            ram_bandwidth,
            gpu_layers,
            total_layers,
        } => {
            let effective =
                calculate_offload_bandwidth(gpu_bandwidth, ram_bandwidth, gpu_layers, total_layers);
            if cli.json {
                print_json(&json!({ "effective_bandwidth_gbps": effective }))?;
            } else {
                display::display_offload(
                    gpu_layers,
                    total_layers,
                    gpu_bandwidth,
                    ram_bandwidth,
                    effective,
                );
            }
        }

        Commands::Quants => {
            if cli.json {
                let presets: Vec<_> = llmperf::QUANT_HIERARCHY
                    .iter()
                    .map(|q| json!({ "quant": q, "bits": llmperf::quant_bits(q) }))
                    .collect();
                print_json(&json!(presets))?;
            } else {
                display::display_quants();
            }
        }

        Commands::Config(args) => {
            let config = args.resolve()?;
            println!("{}", config.to_json()?);
        }
    }

    Ok(())
}
