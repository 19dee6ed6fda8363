//! CPU scaling factor used when part of a model runs from system RAM.

use crate::calibration::{
    CORE_BONUS_TIERS, FAMILY_A_FIRST_GEN, FAMILY_A_GEN1_BASE, FAMILY_A_GEN2_BASE,
    FAMILY_A_GEN3_BASE, FAMILY_A_GEN4_BASE, FAMILY_A_GEN5_BASE, FAMILY_A_LAST_GEN,
    FAMILY_B_FIRST_GEN, FAMILY_B_GEN12, FAMILY_B_GEN12_BASE, FAMILY_B_GEN13,
    FAMILY_B_GEN13_BASE, FAMILY_B_LAST_GEN, FAMILY_B_OLDER_BASE, HIGH_END_BONUS, MAX_CPU_FACTOR,
    MIN_CPU_FACTOR, UNKNOWN_GENERATION_BASE,
};

/// Which calibration band a generation code falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuFamily {
    /// Generation codes 1..=5.
    FamilyA,
    /// Generation codes 10..=15.
    FamilyB,
    Unknown,
}

impl CpuFamily {
    pub fn from_generation(generation: i32) -> Self {
        if (FAMILY_A_FIRST_GEN..=FAMILY_A_LAST_GEN).contains(&generation) {
            CpuFamily::FamilyA
        } else if (FAMILY_B_FIRST_GEN..=FAMILY_B_LAST_GEN).contains(&generation) {
            CpuFamily::FamilyB
        } else {
            CpuFamily::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CpuFamily::FamilyA => "family A (gen 1-5)",
            CpuFamily::FamilyB => "family B (gen 10-15)",
            CpuFamily::Unknown => "unknown",
        }
    }
}

/// Base factor for a generation code before core and SKU bonuses.
pub fn generation_base(generation: i32) -> f64 {
    match CpuFamily::from_generation(generation) {
        CpuFamily::FamilyA => match generation {
            5 => FAMILY_A_GEN5_BASE,
            4 => FAMILY_A_GEN4_BASE,
            3 => FAMILY_A_GEN3_BASE,
            2 => FAMILY_A_GEN2_BASE,
            _ => FAMILY_A_GEN1_BASE,
        },
        CpuFamily::FamilyB => {
            if generation >= FAMILY_B_GEN13 {
                FAMILY_B_GEN13_BASE
            } else if generation >= FAMILY_B_GEN12 {
                FAMILY_B_GEN12_BASE
            } else {
                FAMILY_B_OLDER_BASE
            }
        }
        CpuFamily::Unknown => UNKNOWN_GENERATION_BASE,
    }
}

/// Bonus for the highest core-count tier reached. Tiers do not stack.
pub fn core_bonus(core_count: u32) -> f64 {
    CORE_BONUS_TIERS
        .iter()
        .find(|(min_cores, _)| core_count >= *min_cores)
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0.0)
}

/// Dimensionless CPU factor in `[0.1, 1.0]`.
pub fn get_cpu_factor(generation: i32, core_count: u32, is_high_end: bool) -> f64 {
    let mut factor = generation_base(generation) + core_bonus(core_count);
    if is_high_end {
        factor += HIGH_END_BONUS;
    }
    factor.clamp(MIN_CPU_FACTOR, MAX_CPU_FACTOR)
}
