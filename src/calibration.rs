//! Empirical constants behind the estimation formulas.
//!
//! These are a calibration table, not a physical model. Changing any value
//! changes every estimate derived from it.

/// Bits in a byte; converts billions of parameters x bits into GB.
pub const BITS_PER_BYTE: f64 = 8.0;

/// KV-cache GB per (billion params x context token x batch slot).
pub const KV_CACHE_FACTOR: f64 = 0.000002;

/// Activation memory as a fraction of the weight footprint.
pub const ACTIVATION_OVERHEAD_RATIO: f64 = 0.05;

/// Sanity ceiling for throughput. Not a physical limit.
pub const MAX_TOKENS_PER_SEC: f64 = 1000.0;
pub const MIN_TOKENS_PER_SEC: f64 = 0.0;

/// CPU factor at or above this value means no CPU-side scaling.
pub const FULL_GPU_CPU_FACTOR: f64 = 1.0;

// Vendor family A: generations 1..=5.
pub const FAMILY_A_FIRST_GEN: i32 = 1;
pub const FAMILY_A_LAST_GEN: i32 = 5;
pub const FAMILY_A_GEN5_BASE: f64 = 0.45;
pub const FAMILY_A_GEN4_BASE: f64 = 0.40;
pub const FAMILY_A_GEN3_BASE: f64 = 0.35;
pub const FAMILY_A_GEN2_BASE: f64 = 0.28;
pub const FAMILY_A_GEN1_BASE: f64 = 0.22;

// Vendor family B: generations 10..=15.
pub const FAMILY_B_FIRST_GEN: i32 = 10;
pub const FAMILY_B_LAST_GEN: i32 = 15;
pub const FAMILY_B_GEN13: i32 = 13;
pub const FAMILY_B_GEN13_BASE: f64 = 0.42;
pub const FAMILY_B_GEN12: i32 = 12;
pub const FAMILY_B_GEN12_BASE: f64 = 0.38;
pub const FAMILY_B_OLDER_BASE: f64 = 0.30;

/// Base factor for generations outside both known bands.
pub const UNKNOWN_GENERATION_BASE: f64 = 0.15;

/// Core-count bonus tiers, highest first. Only the first matching tier applies.
pub const CORE_BONUS_TIERS: &[(u32, f64)] = &[(16, 0.10), (12, 0.07), (8, 0.05), (6, 0.03)];

/// Flat bonus for high-end SKUs.
pub const HIGH_END_BONUS: f64 = 0.05;

pub const MIN_CPU_FACTOR: f64 = 0.1;
pub const MAX_CPU_FACTOR: f64 = 1.0;

// System RAM selector grid.
pub const MIN_SYSTEM_RAM_GB: f64 = 8.0;
pub const MAX_SYSTEM_RAM_GB: f64 = 512.0;
pub const SYSTEM_RAM_STEP_GB: f64 = 4.0;

/// Slack for float error when counting sweep steps.
pub const SWEEP_STEP_EPSILON: f64 = 1e-9;

/// Upper bound on records in one sweep.
pub const MAX_SWEEP_POINTS: usize = 100_000;

/// Pool must exceed the requirement by this ratio for a comfortable fit.
pub const FIT_HEADROOM_RATIO: f64 = 1.2;

/// Below this many cores CPU-side layers are flagged as a bottleneck.
pub const LOW_CORE_COUNT: u32 = 4;
