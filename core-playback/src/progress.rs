//! Progress reconciliation.
//!
//! Two signals arrive independently: buffered ranges from the network side and
//! the playback position from the engine. Both are expressed against the same
//! duration and rounded to whole percentages for display.

use bridge_traits::TimeRanges;

/// `value / duration` clamped into `[0, 1]`; zero while the duration is
/// unknown or not positive.
pub fn fraction_of(value: f64, duration: Option<f64>) -> f64 {
    match duration {
        Some(d) if d > 0.0 && d.is_finite() && value.is_finite() => (value / d).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Display percentage: `round(fraction * 100)`.
pub fn to_percent(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Tracks the buffered end for one asset and keeps the buffered fraction
/// monotonic.
#[derive(Debug, Default, Clone)]
pub struct ProgressReconciler {
    buffered_end: f64,
    buffered_fraction: f64,
}

impl ProgressReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything about the previous asset.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record a `progress` report. Returns the buffered fraction to publish.
    pub fn on_buffered(&mut self, ranges: &TimeRanges, duration: Option<f64>) -> f64 {
        if let Some(end) = ranges.last_end() {
            self.buffered_end = self.buffered_end.max(end);
        }
        self.recompute(duration)
    }

    /// Re-evaluate after the duration changed.
    pub fn on_duration(&mut self, duration: Option<f64>) -> f64 {
        self.recompute(duration)
    }

    pub fn buffered_fraction(&self) -> f64 {
        self.buffered_fraction
    }

    fn recompute(&mut self, duration: Option<f64>) -> f64 {
        let next = fraction_of(self.buffered_end, duration);
        self.buffered_fraction = self.buffered_fraction.max(next);
        self.buffered_fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_zero_without_duration() {
        assert_eq!(fraction_of(3.0, None), 0.0);
        assert_eq!(fraction_of(3.0, Some(0.0)), 0.0);
        assert_eq!(fraction_of(3.0, Some(f64::INFINITY)), 0.0);
    }

    #[test]
    fn fraction_is_clamped() {
        assert_eq!(fraction_of(5.0, Some(10.0)), 0.5);
        assert_eq!(fraction_of(12.0, Some(10.0)), 1.0);
        assert_eq!(fraction_of(-1.0, Some(10.0)), 0.0);
    }

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(to_percent(0.0), 0);
        assert_eq!(to_percent(0.334), 33);
        assert_eq!(to_percent(0.336), 34);
        assert_eq!(to_percent(0.996), 100);
        assert_eq!(to_percent(1.7), 100);
        assert_eq!(to_percent(f64::NAN), 0);
    }

    #[test]
    fn buffered_fraction_never_decreases() {
        let mut reconciler = ProgressReconciler::new();
        assert_eq!(reconciler.on_buffered(&TimeRanges::from_end(4.0), Some(8.0)), 0.5);
        // A shorter report must not move the bar backwards.
        assert_eq!(reconciler.on_buffered(&TimeRanges::from_end(2.0), Some(8.0)), 0.5);
        assert_eq!(reconciler.on_buffered(&TimeRanges::from_end(8.0), Some(8.0)), 1.0);
    }

    #[test]
    fn buffered_end_before_duration_is_applied_later() {
        let mut reconciler = ProgressReconciler::new();
        assert_eq!(reconciler.on_buffered(&TimeRanges::from_end(2.5), None), 0.0);
        assert_eq!(reconciler.on_duration(Some(5.0)), 0.5);
    }

    #[test]
    fn uses_end_of_last_range() {
        let mut reconciler = ProgressReconciler::new();
        let ranges = TimeRanges::new([(0.0, 1.0), (3.0, 6.0)]);
        assert_eq!(reconciler.on_buffered(&ranges, Some(12.0)), 0.5);
    }

    #[test]
    fn reset_starts_over() {
        let mut reconciler = ProgressReconciler::new();
        reconciler.on_buffered(&TimeRanges::from_end(5.0), Some(5.0));
        reconciler.reset();
        assert_eq!(reconciler.buffered_fraction(), 0.0);
    }
}
