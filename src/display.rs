use colored::*;
use tabled::{Table, Tabled, settings::Style};

use llmperf::cpu::{CpuFamily, core_bonus, generation_base};
use llmperf::quant::{QUANT_HIERARCHY, nearest_quant_at_or_below, quant_bits};
use llmperf::{Estimate, FitLevel, HardwareConfig, MemoryTopology, ModelConfig, SweepRecord};

#[derive(Tabled)]
struct SweepRow {
    #[tabled(rename = "Bits")]
    bits: String,
    #[tabled(rename = "Nearest preset")]
    preset: String,
    #[tabled(rename = "Weights")]
    size: String,
    #[tabled(rename = "Tokens/s")]
    tps: String,
}

#[derive(Tabled)]
struct QuantFitRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Quant")]
    quant: String,
    #[tabled(rename = "Weights")]
    size: String,
    #[tabled(rename = "VRAM need")]
    vram: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "GPU layers")]
    layers: String,
    #[tabled(rename = "Mem %")]
    mem_use: String,
    #[tabled(rename = "Tokens/s")]
    tps: String,
}

#[derive(Tabled)]
struct QuantRow {
    #[tabled(rename = "Preset")]
    name: String,
    #[tabled(rename = "Bits/weight")]
    bits: String,
}

fn fit_color(level: FitLevel) -> &'static str {
    match level {
        FitLevel::Perfect => "green",
        FitLevel::Good => "yellow",
        FitLevel::Marginal => "magenta",
        FitLevel::TooTight => "red",
    }
}

fn format_pct(pct: f64) -> String {
    if pct.is_finite() {
        format!("{:.1}%", pct)
    } else {
        "-".to_string()
    }
}

pub fn display_sweep(records: &[SweepRecord], param_count_b: f64, bandwidth: f64) {
    if records.is_empty() {
        println!("\n{}", "Empty sweep: check the bit range and step.".yellow());
        return;
    }

    println!(
        "\n{}",
        format!(
            "=== Quantization Sweep: {}B params @ {:.0} GB/s ===",
            param_count_b, bandwidth
        )
        .bold()
        .cyan()
    );
    println!("{} point(s), GPU only\n", records.len());

    let rows: Vec<SweepRow> = records
        .iter()
        .map(|r| SweepRow {
            bits: format!("{:.2}", r.bits),
            preset: nearest_quant_at_or_below(r.bits).unwrap_or("-").to_string(),
            size: format!("{:.2} GB", r.model_size_gb),
            tps: format!("{:.1}", r.tokens_per_sec),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn display_estimate(est: &Estimate, model: &ModelConfig, hw: &HardwareConfig) {
    println!("\n{}", "=== Inference Estimate ===".bold().cyan());
    println!();
    println!("{}: {}B", "Parameters".bold(), model.param_count_b);
    println!("{}: {} bits/weight", "Quantization".bold(), model.bits_per_weight);
    println!("{}: {} tokens", "Context Length".bold(), model.context_length);
    println!("{}: {}", "Batch Size".bold(), model.batch_size);
    println!();

    println!("{}", "Hardware:".bold().underline());
    match hw.topology {
        MemoryTopology::Unified => {
            println!(
                "  Unified memory: {:.0} GB @ {:.0} GB/s",
                hw.system_ram_gb, hw.gpu_bandwidth_gbps
            );
        }
        MemoryTopology::Discrete => {
            println!("  VRAM: {:.1} GB @ {:.0} GB/s", hw.vram_gb, hw.gpu_bandwidth_gbps);
            println!(
                "  System RAM: {:.0} GB @ {:.0} GB/s",
                hw.system_ram_gb, hw.ram_bandwidth_gbps
            );
            println!("  Offload: {}", if hw.allow_offload { "allowed" } else { "disabled" });
        }
    }
    println!("  Backend: {}", hw.gpu_backend);
    println!(
        "  CPU: gen {} ({}), {} cores{}",
        hw.cpu.generation,
        CpuFamily::from_generation(hw.cpu.generation).label(),
        hw.cpu.core_count,
        if hw.cpu.is_high_end { ", high-end" } else { "" }
    );
    println!();

    println!("{}", "Memory:".bold().underline());
    println!("  Weights: {:.2} GB", est.model_size_gb);
    println!(
        "  Required (weights + KV cache + activations): {:.2} GB",
        est.vram_required_gb
    );
    println!(
        "  Utilization: {} ({:.1} / {:.1} GB)",
        format_pct(est.utilization_pct),
        est.vram_required_gb,
        est.memory_available_gb
    );
    println!();

    println!("{}", "Performance:".bold().underline());
    println!("  Run Mode: {}", est.run_mode.label());
    println!("  GPU Layers: {}/{}", est.gpu_layers, est.total_layers);
    println!("  Effective Bandwidth: {:.1} GB/s", est.effective_bandwidth_gbps);
    println!("  CPU Factor: {:.2}", est.cpu_factor);
    println!("  Throughput: {}", format!("{:.1} tok/s", est.tokens_per_sec).bold());
    println!();

    println!(
        "  Status: {} {}",
        est.fit_level.emoji(),
        est.fit_level.label().color(fit_color(est.fit_level))
    );
    if est.out_of_memory {
        println!("  {}", "OUT OF MEMORY".red().bold());
    }
    println!();

    if !est.notes.is_empty() {
        println!("{}", "Notes:".bold().underline());
        for note in &est.notes {
            println!("  {}", note);
        }
        println!();
    }
}

pub fn display_quant_fits(fits: &[(&str, Estimate)]) {
    if fits.is_empty() {
        println!("\n{}", "No quantization presets evaluated.".yellow());
        return;
    }

    println!("\n{}", "=== Quantization Fit Analysis ===".bold().cyan());
    let fitting = fits.iter().filter(|(_, e)| !e.out_of_memory).count();
    println!("{} of {} preset(s) fit\n", fitting, fits.len());

    let rows: Vec<QuantFitRow> = fits
        .iter()
        .map(|(name, e)| QuantFitRow {
            status: format!("{} {}", e.fit_level.emoji(), e.fit_level.label()),
            quant: name.to_string(),
            size: format!("{:.1} GB", e.model_size_gb),
            vram: format!("{:.1} GB", e.vram_required_gb),
            mode: e.run_mode.label().to_string(),
            layers: format!("{}/{}", e.gpu_layers, e.total_layers),
            mem_use: format_pct(e.utilization_pct),
            tps: format!("{:.1}", e.tokens_per_sec),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn display_quants() {
    println!("\n{}", "=== Quantization Presets ===".bold().cyan());
    let rows: Vec<QuantRow> = QUANT_HIERARCHY
        .iter()
        .map(|q| QuantRow {
            name: q.to_string(),
            bits: quant_bits(q).map(|b| format!("{:.1}", b)).unwrap_or_default(),
        })
        .collect();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn display_cpu_factor(generation: i32, core_count: u32, is_high_end: bool, factor: f64) {
    println!("\n{}", "=== CPU Factor ===".bold().cyan());
    println!(
        "  Generation {} ({}): base {:.2}",
        generation,
        CpuFamily::from_generation(generation).label(),
        generation_base(generation)
    );
    println!("  {} cores: +{:.2}", core_count, core_bonus(core_count));
    if is_high_end {
        println!("  High-end SKU: +{:.2}", llmperf::calibration::HIGH_END_BONUS);
    }
    println!("  Factor: {}", format!("{:.2}", factor).bold());
    println!();
}

pub fn display_offload(
    gpu_layers: i32,
    total_layers: i32,
    gpu_bw: f64,
    ram_bw: f64,
    effective: f64,
) {
    println!("\n{}", "=== Offload Bandwidth ===".bold().cyan());
    println!("  GPU: {:.1} GB/s, RAM: {:.1} GB/s", gpu_bw, ram_bw);
    println!("  Layers on GPU: {}/{}", gpu_layers, total_layers);
    println!("  Effective: {}", format!("{:.1} GB/s", effective).bold());
    println!();
}
