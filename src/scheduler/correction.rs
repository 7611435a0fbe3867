// ABOUTME: Correction tier selection for the audio scheduler
// ABOUTME: Mode-dependent thresholds mapping smoothed sync error to a tier

/// Rate nudge used while |error| is below the fast-rate threshold.
pub const SLOW_RATE_ADJUST: f64 = 0.01;

/// Rate nudge used once |error| reaches the fast-rate threshold.
pub const FAST_RATE_ADJUST: f64 = 0.02;

/// While the time filter's own uncertainty is above this, corrections are
/// suppressed entirely and playback continues back-to-back.
pub const FILTER_CONFIDENCE_CAP_US: f64 = 1_500.0;

/// Correction threshold table selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionMode {
    /// Tightest sync: sample edits under 8 ms, rate nudges under 200 ms.
    Sync,
    /// No rate tier; trades sync accuracy for freedom from pitch shift.
    Quality,
    /// Like `Quality` with very wide tolerances, for lone players.
    QualityLocal,
}

/// Threshold table for one correction mode. All values compare against the
/// absolute smoothed sync error in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionThresholds {
    /// Below this, no correction at all.
    pub deadband_ms: f64,
    /// Single-sample edits apply from the deadband up to this bound (only
    /// meaningful when the rate tier exists; otherwise edits run up to the
    /// resync bound).
    pub sample_adjust_below_ms: f64,
    /// Whether the rate tier exists in this mode.
    pub rate_tier: bool,
    /// Within the rate tier, use the fast nudge at or above this error.
    pub fast_rate_above_ms: f64,
    /// At or above this error, hard resync.
    pub resync_above_ms: f64,
}

impl CorrectionThresholds {
    /// Threshold table for a mode.
    pub fn for_mode(mode: CorrectionMode) -> Self {
        match mode {
            CorrectionMode::Sync => Self {
                deadband_ms: 1.0,
                sample_adjust_below_ms: 8.0,
                rate_tier: true,
                fast_rate_above_ms: 35.0,
                resync_above_ms: 200.0,
            },
            CorrectionMode::Quality => Self {
                deadband_ms: 1.0,
                sample_adjust_below_ms: 35.0,
                rate_tier: false,
                fast_rate_above_ms: 35.0,
                resync_above_ms: 35.0,
            },
            CorrectionMode::QualityLocal => Self {
                deadband_ms: 5.0,
                sample_adjust_below_ms: 600.0,
                rate_tier: false,
                fast_rate_above_ms: 35.0,
                resync_above_ms: 600.0,
            },
        }
    }
}

/// The correction applied to the most recent frame, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionMethod {
    /// No correction (fresh anchor or inside the deadband).
    None,
    /// Corrections held off while the time filter settles.
    Wait,
    /// One interpolated sample inserted or deleted at a frame edge.
    SampleAdjust,
    /// Micro rate nudge.
    RateAdjust,
    /// Hard reschedule at the absolute target.
    Resync,
}

/// Correction tier picked for a contiguous frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tier {
    /// Filter too uncertain; schedule back-to-back and wait.
    Wait,
    /// Error inside the deadband; no correction.
    Deadband,
    /// Insert or delete one interpolated edge sample.
    Samples,
    /// Nudge the playback rate.
    Rate {
        /// Use the fast nudge magnitude.
        fast: bool,
    },
    /// Hard resync at the absolute target.
    Resync,
}

/// Pick the tier for a smoothed sync error (signed ms) given the filter's
/// current uncertainty.
pub fn pick_tier(
    smoothed_error_ms: f64,
    filter_error_us: f64,
    thresholds: &CorrectionThresholds,
) -> Tier {
    if filter_error_us > FILTER_CONFIDENCE_CAP_US {
        return Tier::Wait;
    }

    let e = smoothed_error_ms.abs();
    if e < thresholds.deadband_ms {
        Tier::Deadband
    } else if e >= thresholds.resync_above_ms {
        Tier::Resync
    } else if thresholds.rate_tier && e >= thresholds.sample_adjust_below_ms {
        Tier::Rate {
            fast: e >= thresholds.fast_rate_above_ms,
        }
    } else {
        Tier::Samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_mode_tiers() {
        let t = CorrectionThresholds::for_mode(CorrectionMode::Sync);
        assert_eq!(pick_tier(0.5, 0.0, &t), Tier::Deadband);
        assert_eq!(pick_tier(-0.5, 0.0, &t), Tier::Deadband);
        assert_eq!(pick_tier(4.0, 0.0, &t), Tier::Samples);
        assert_eq!(pick_tier(10.0, 0.0, &t), Tier::Rate { fast: false });
        assert_eq!(pick_tier(-50.0, 0.0, &t), Tier::Rate { fast: true });
        assert_eq!(pick_tier(250.0, 0.0, &t), Tier::Resync);
    }

    #[test]
    fn test_quality_mode_has_no_rate_tier() {
        let t = CorrectionThresholds::for_mode(CorrectionMode::Quality);
        assert_eq!(pick_tier(20.0, 0.0, &t), Tier::Samples);
        assert_eq!(pick_tier(40.0, 0.0, &t), Tier::Resync);
    }

    #[test]
    fn test_quality_local_wide_deadband() {
        let t = CorrectionThresholds::for_mode(CorrectionMode::QualityLocal);
        assert_eq!(pick_tier(4.0, 0.0, &t), Tier::Deadband);
        assert_eq!(pick_tier(500.0, 0.0, &t), Tier::Samples);
        assert_eq!(pick_tier(700.0, 0.0, &t), Tier::Resync);
    }

    #[test]
    fn test_uncertain_filter_waits() {
        let t = CorrectionThresholds::for_mode(CorrectionMode::Sync);
        assert_eq!(pick_tier(50.0, 10_000.0, &t), Tier::Wait);
    }
}
