//! Throughput sweep across quantization levels, GPU only.
//!
//! Bits values are `min_bits + i * step` for an integer index `i`, so the
//! sequence does not drift with repeated float addition and the last value
//! lands on `max_bits` whenever the range is a whole number of steps.

use serde::{Deserialize, Serialize};

use crate::calibration::{FULL_GPU_CPU_FACTOR, MAX_SWEEP_POINTS, SWEEP_STEP_EPSILON};
use crate::engine::{calculate_performance, weight_size_gb};
use crate::error::{EstimateError, Result};

/// Entries per record in the flat buffer layout: bits, model size, tps.
pub const SWEEP_RECORD_WIDTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepRecord {
    pub bits: f64,
    pub model_size_gb: f64,
    pub tokens_per_sec: f64,
}

impl SweepRecord {
    pub fn as_array(&self) -> [f64; SWEEP_RECORD_WIDTH] {
        [self.bits, self.model_size_gb, self.tokens_per_sec]
    }
}

/// Number of records a sweep over `[min_bits, max_bits]` by `step` yields.
/// Degenerate ranges (non-positive step, reversed bounds, NaN) yield zero.
/// Saturates at `usize::MAX` for steps too small to count.
pub fn sweep_len(min_bits: f64, max_bits: f64, step: f64) -> usize {
    if !step.is_finite()
        || step <= 0.0
        || !min_bits.is_finite()
        || !max_bits.is_finite()
        || max_bits < min_bits
    {
        return 0;
    }
    // `as` saturates on overflow and infinity.
    let steps = ((max_bits - min_bits) / step + SWEEP_STEP_EPSILON).floor() as usize;
    steps.saturating_add(1)
}

/// Flat buffer length required by [`batch_calculate_performance_into`].
pub fn sweep_buffer_len(min_bits: f64, max_bits: f64, step: f64) -> usize {
    sweep_len(min_bits, max_bits, step).saturating_mul(SWEEP_RECORD_WIDTH)
}

/// Record count for a sweep, rejecting sweeps over [`MAX_SWEEP_POINTS`].
fn checked_sweep_len(min_bits: f64, max_bits: f64, step: f64) -> Result<usize> {
    let len = sweep_len(min_bits, max_bits, step);
    if len > MAX_SWEEP_POINTS {
        return Err(EstimateError::invalid(
            "step",
            format!(
                "{step} over {min_bits}-{max_bits} bits needs more than \
                 {MAX_SWEEP_POINTS} points"
            ),
        ));
    }
    Ok(len)
}

fn sweep_bits(min_bits: f64, max_bits: f64, step: f64, len: usize) -> impl Iterator<Item = f64> {
    (0..len).map(move |i| (min_bits + i as f64 * step).min(max_bits))
}

fn record(bandwidth: f64, param_count: f64, bits: f64) -> SweepRecord {
    let model_size_gb = weight_size_gb(param_count, bits);
    SweepRecord {
        bits,
        model_size_gb,
        tokens_per_sec: calculate_performance(bandwidth, model_size_gb, FULL_GPU_CPU_FACTOR),
    }
}

/// Tokens/sec for every quantization level from `min_bits` to `max_bits`
/// inclusive. The CPU factor is fixed at 1.0.
///
/// Fails if the range holds more than [`MAX_SWEEP_POINTS`] steps.
pub fn batch_calculate_performance(
    bandwidth: f64,
    param_count: f64,
    min_bits: f64,
    max_bits: f64,
    step: f64,
) -> Result<Vec<SweepRecord>> {
    let len = checked_sweep_len(min_bits, max_bits, step)?;
    Ok(sweep_bits(min_bits, max_bits, step, len)
        .map(|bits| record(bandwidth, param_count, bits))
        .collect())
}

/// Same sweep written as `[bits, model_size, tps]` triples at `index * 3`.
///
/// Returns the number of records written. Fails without touching `out` if it
/// holds fewer than [`sweep_buffer_len`] entries, or if the sweep is longer
/// than [`MAX_SWEEP_POINTS`].
pub fn batch_calculate_performance_into(
    bandwidth: f64,
    param_count: f64,
    min_bits: f64,
    max_bits: f64,
    step: f64,
    out: &mut [f64],
) -> Result<usize> {
    let len = checked_sweep_len(min_bits, max_bits, step)?;
    let needed = len * SWEEP_RECORD_WIDTH;
    if out.len() < needed {
        return Err(EstimateError::BufferTooSmall {
            needed,
            available: out.len(),
        });
    }

    let mut count = 0;
    for (slot, bits) in out
        .chunks_exact_mut(SWEEP_RECORD_WIDTH)
        .zip(sweep_bits(min_bits, max_bits, step, len))
    {
        slot.copy_from_slice(&record(bandwidth, param_count, bits).as_array());
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn half_bit_sweep_from_two_to_sixteen() {
        let records = batch_calculate_performance(1000.0, 8.0, 2.0, 16.0, 0.5).unwrap();
        assert_eq!(records.len(), 29);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.bits, 2.0 + i as f64 * 0.5);
            assert_eq!(r.model_size_gb, 8.0 * r.bits / 8.0);
        }
        assert_eq!(records.first().map(|r| r.bits), Some(2.0));
        assert_eq!(records.last().map(|r| r.bits), Some(16.0));
    }

    #[test]
    fn throughput_rises_as_bits_drop() {
        let records = batch_calculate_performance(400.0, 70.0, 2.0, 16.0, 0.5).unwrap();
        for pair in records.windows(2) {
            assert!(pair[1].model_size_gb >= pair[0].model_size_gb);
            assert!(pair[1].tokens_per_sec <= pair[0].tokens_per_sec);
        }
    }

    #[test]
    fn tenth_bit_steps_hit_upper_bound() {
        let records = batch_calculate_performance(500.0, 7.0, 3.0, 4.0, 0.1).unwrap();
        assert_eq!(records.len(), 11);
        assert_eq!(records.last().map(|r| r.bits), Some(4.0));
    }

    #[test]
    fn partial_last_step_is_dropped() {
        let records = batch_calculate_performance(500.0, 7.0, 2.0, 3.0, 0.4).unwrap();
        let bits: Vec<f64> = records.iter().map(|r| r.bits).collect();
        assert_eq!(bits.len(), 3);
        assert_abs_diff_eq!(bits[2], 2.8, epsilon = 1e-12);
    }

    #[test]
    fn single_point_sweep() {
        let records = batch_calculate_performance(500.0, 7.0, 4.0, 4.0, 1.0).unwrap();
        assert_eq!(records.len(), 1);
        assert_abs_diff_eq!(records[0].tokens_per_sec, 500.0 / 3.5, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_ranges_are_empty() {
        let sweep = |min, max, step| batch_calculate_performance(500.0, 7.0, min, max, step);
        assert!(sweep(2.0, 16.0, 0.0).unwrap().is_empty());
        assert!(sweep(2.0, 16.0, -1.0).unwrap().is_empty());
        assert!(sweep(16.0, 2.0, 0.5).unwrap().is_empty());
        assert!(sweep(f64::NAN, 16.0, 0.5).unwrap().is_empty());
        assert!(sweep(2.0, 16.0, f64::NAN).unwrap().is_empty());
    }

    #[test]
    fn vanishing_step_saturates_instead_of_overflowing() {
        assert_eq!(sweep_len(2.0, 16.0, 1e-300), usize::MAX);
        assert_eq!(sweep_buffer_len(2.0, 16.0, 1e-300), usize::MAX);
        assert_eq!(sweep_len(2.0, 16.0, f64::MIN_POSITIVE), usize::MAX);
    }

    #[test]
    fn vanishing_step_is_rejected() {
        let err = batch_calculate_performance(1000.0, 8.0, 2.0, 16.0, 1e-300).unwrap_err();
        assert!(matches!(err, EstimateError::InvalidInput { field: "step", .. }));

        let mut buf = vec![-1.0; 12];
        let err = batch_calculate_performance_into(1000.0, 8.0, 2.0, 16.0, 1e-300, &mut buf)
            .unwrap_err();
        assert!(matches!(err, EstimateError::InvalidInput { field: "step", .. }));
        assert!(buf.iter().all(|v| *v == -1.0));
    }

    #[test]
    fn sweep_past_point_limit_is_rejected() {
        // About 1.4e10 points.
        assert!(sweep_len(2.0, 16.0, 1e-9) > MAX_SWEEP_POINTS);
        let err = batch_calculate_performance(1000.0, 8.0, 2.0, 16.0, 1e-9).unwrap_err();
        assert!(matches!(err, EstimateError::InvalidInput { field: "step", .. }));
    }

    #[test]
    fn sweep_at_point_limit_is_accepted() {
        let step = 1.0 / (MAX_SWEEP_POINTS - 1) as f64;
        assert_eq!(sweep_len(0.0, 1.0, step), MAX_SWEEP_POINTS);
        let records = batch_calculate_performance(1000.0, 8.0, 0.0, 1.0, step).unwrap();
        assert_eq!(records.len(), MAX_SWEEP_POINTS);
    }

    #[test]
    fn flat_buffer_matches_records() {
        let records = batch_calculate_performance(1000.0, 13.0, 2.0, 16.0, 0.5).unwrap();
        let mut buf = vec![0.0; sweep_buffer_len(2.0, 16.0, 0.5)];
        let written = batch_calculate_performance_into(1000.0, 13.0, 2.0, 16.0, 0.5, &mut buf)
            .expect("buffer sized by sweep_buffer_len");
        assert_eq!(written, 29);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(&buf[i * 3..i * 3 + 3], &r.as_array());
        }
    }

    #[test]
    fn flat_buffer_too_small_is_rejected_untouched() {
        let mut buf = vec![-1.0; 10];
        let err = batch_calculate_performance_into(1000.0, 13.0, 2.0, 16.0, 0.5, &mut buf)
            .unwrap_err();
        assert!(matches!(
            err,
            EstimateError::BufferTooSmall { needed: 87, available: 10 }
        ));
        assert!(buf.iter().all(|v| *v == -1.0));
    }

    #[test]
    fn oversized_buffer_keeps_tail() {
        let mut buf = vec![-1.0; 12];
        let written =
            batch_calculate_performance_into(100.0, 1.0, 4.0, 8.0, 4.0, &mut buf).unwrap();
        assert_eq!(written, 2);
        assert!(buf[6..].iter().all(|v| *v == -1.0));
    }

    proptest! {
        #[test]
        fn prop_record_count_matches_len(
            min in 1.0f64..8.0,
            span in 0.0f64..16.0,
            step in 0.05f64..2.0,
        ) {
            let max = min + span;
            let records = batch_calculate_performance(800.0, 7.0, min, max, step).unwrap();
            prop_assert_eq!(records.len(), sweep_len(min, max, step));
            prop_assert!(!records.is_empty());
            for r in &records {
                prop_assert!(r.bits >= min && r.bits <= max);
            }
        }
    }
}
