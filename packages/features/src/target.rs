//! Target-variable derivation.
//!
//! The primary label compares each duration to a fixed threshold. The
//! auxiliary label compares it to a percentile of the cleaned population's
//! own duration distribution, recomputed for every dataset.

/// `1` when `duration_days` exceeds `threshold_days`, else `0`.
#[must_use]
pub fn exceeds_threshold(duration_days: f64, threshold_days: f64) -> u8 {
    u8::from(duration_days > threshold_days)
}

/// Empirical percentile of `values` with linear interpolation between
/// closest ranks. `None` for an empty input.
///
/// `percentile` is in `[0, 100]`; non-finite values are ignored.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(values: &[f64], percentile: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let rank = (percentile.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - rank.floor();

    Some((sorted[upper] - sorted[lower]).mul_add(fraction, sorted[lower]))
}

/// `1` when `duration_days` is strictly below `cutoff_days`, else `0`.
#[must_use]
pub fn below_cutoff(duration_days: f64, cutoff_days: f64) -> u8 {
    u8::from(duration_days < cutoff_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_strict() {
        assert_eq!(exceeds_threshold(3.0, 3.0), 0);
        assert_eq!(exceeds_threshold(3.01, 3.0), 1);
        assert_eq!(exceeds_threshold(0.5, 3.0), 0);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        assert_eq!(percentile(&values, 100.0), Some(5.0));
        let p95 = percentile(&values, 95.0).unwrap();
        assert!((p95 - 4.8).abs() < 1e-9);
    }

    #[test]
    fn percentile_is_order_independent_and_skips_nan() {
        let values = [5.0, f64::NAN, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        assert_eq!(percentile(&[], 95.0), None);
        assert_eq!(percentile(&[7.0], 95.0), Some(7.0));
    }

    #[test]
    fn cutoff_label() {
        assert_eq!(below_cutoff(4.0, 4.8), 1);
        assert_eq!(below_cutoff(4.8, 4.8), 0);
    }
}
