// ABOUTME: Recursive estimator for server clock offset and drift
// ABOUTME: Kalman update over NTP measurements with outlier rejection

/// Measurements whose half-RTT residual exceeds this are discarded outright.
const OUTLIER_MAX_ERROR_US: f64 = 50_000.0;

/// Innovation gate: once converged, a measurement further than this many
/// current-sigma from the prediction is treated as an outlier.
const INNOVATION_GATE: f64 = 5.0;

/// Floor for the innovation gate so a tightly converged filter still
/// tolerates ordinary network jitter.
const INNOVATION_FLOOR_US: f64 = 1_000.0;

/// Floor for the per-measurement standard deviation. A zero `max_error`
/// would otherwise collapse the gain to 1 and snap the offset.
const MEASUREMENT_FLOOR_US: f64 = 100.0;

/// Offset variance growth per elapsed microsecond between measurements.
const PROCESS_NOISE_US2_PER_US: f64 = 1e-4;

/// Gain applied to the filtered innovation when re-estimating drift. Low so
/// the drift estimate converges over tens of seconds rather than snapping.
const DRIFT_GAIN: f64 = 0.1;

/// Default `error` bound below which the filter reports synchronized.
const DEFAULT_CONFIDENCE_BOUND_US: f64 = 25_000.0;

/// Recursive estimator of the offset and drift between the local monotonic
/// clock and the server clock.
///
/// Fed with NTP four-timestamp exchanges reduced to
/// `measurement = ((t2 - t1) + (t3 - t4)) / 2` and
/// `max_error = ((t4 - t1) - (t3 - t2)) / 2`. The state is the offset
/// `t_server - t_local` at the `anchor` local time, the dimensionless drift
/// of that offset, and a one-sigma uncertainty in microseconds.
#[derive(Debug)]
pub struct TimeFilter {
    offset: f64,
    drift: f64,
    error: f64,
    anchor: i64,
    accepted: u32,
    confidence_bound_us: f64,
}

impl TimeFilter {
    /// Create an empty filter with the default confidence bound.
    pub fn new() -> Self {
        Self::with_confidence_bound(DEFAULT_CONFIDENCE_BOUND_US)
    }

    /// Create an empty filter that reports synchronized only once `error`
    /// drops below `bound_us`.
    pub fn with_confidence_bound(bound_us: f64) -> Self {
        Self {
            offset: 0.0,
            drift: 0.0,
            error: 0.0,
            anchor: 0,
            accepted: 0,
            confidence_bound_us: bound_us,
        }
    }

    /// Absorb one measurement.
    ///
    /// `measurement_us` is the symmetric NTP offset estimate, `max_error_us`
    /// the non-negative half round-trip residual bounding its error, and
    /// `t_local_now` the local receive time (t4) in microseconds.
    pub fn update(&mut self, measurement_us: i64, max_error_us: i64, t_local_now: i64) {
        let max_error = max_error_us as f64;
        if !(0.0..=OUTLIER_MAX_ERROR_US).contains(&max_error) {
            log::debug!(
                "time filter: discarding measurement with max_error {}us",
                max_error_us
            );
            return;
        }

        let measurement = measurement_us as f64;

        if self.accepted == 0 {
            self.offset = measurement;
            self.drift = 0.0;
            self.error = max_error.max(MEASUREMENT_FLOOR_US);
            self.anchor = t_local_now;
            self.accepted = 1;
            return;
        }

        let dt = (t_local_now - self.anchor) as f64;
        if dt <= 0.0 {
            return;
        }

        let predicted_offset = self.offset + self.drift * dt;
        let prior_variance = self.error * self.error + PROCESS_NOISE_US2_PER_US * dt;

        let innovation = measurement - predicted_offset;
        if self.accepted >= 2 {
            let gate = INNOVATION_GATE * self.error.max(INNOVATION_FLOOR_US);
            if innovation.abs() > gate {
                log::debug!(
                    "time filter: rejecting innovation {:.0}us (gate {:.0}us)",
                    innovation,
                    gate
                );
                return;
            }
        }

        let measurement_std = max_error.max(MEASUREMENT_FLOOR_US);
        let measurement_variance = measurement_std * measurement_std;
        let gain = prior_variance / (prior_variance + measurement_variance);
        let correction = gain * innovation;

        self.offset = predicted_offset + correction;
        self.drift += DRIFT_GAIN * correction / dt;
        self.error = ((1.0 - gain) * prior_variance).sqrt();
        self.anchor = t_local_now;
        self.accepted += 1;
    }

    /// Convert a server timestamp to local microseconds using the current
    /// estimate, evaluated at local time `t_local_now`.
    ///
    /// Monotone increasing in `t_server` for fixed filter state.
    pub fn compute_client_time(&self, t_server: i64, t_local_now: i64) -> i64 {
        let elapsed = (t_local_now - self.anchor) as f64;
        t_server - (self.offset + self.drift * elapsed).round() as i64
    }

    /// Current one-sigma uncertainty of the offset, in microseconds.
    pub fn error_us(&self) -> f64 {
        self.error
    }

    /// Current drift estimate (dimensionless).
    pub fn drift(&self) -> f64 {
        self.drift
    }

    /// True once at least two measurements have been absorbed and the
    /// uncertainty is inside the confidence bound.
    pub fn is_synchronized(&self) -> bool {
        self.accepted >= 2 && self.error <= self.confidence_bound_us
    }

    /// Discard all state. Used when the session reconnects.
    pub fn reset(&mut self) {
        let bound = self.confidence_bound_us;
        *self = Self::with_confidence_bound(bound);
    }
}

impl Default for TimeFilter {
    fn default() -> Self {
        Self::new()
    }
}
