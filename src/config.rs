// ABOUTME: Client configuration for a Sendspin session
// ABOUTME: Identity, server URL, advertised codecs, and sync tuning knobs

use crate::audio::Codec;
use crate::scheduler::CorrectionMode;
use std::time::Duration;

/// Interval between outgoing `client/time` messages.
pub const TIME_SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Interval between periodic `client/state` reports.
pub const STATE_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Debounce applied after a decoded frame lands before a scheduling pass runs.
pub const SCHEDULE_DEBOUNCE: Duration = Duration::from_millis(50);

/// Configuration for a Sendspin client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity string sent in `client/hello`; generated when not supplied.
    pub player_id: String,
    /// Human-readable label sent in `client/hello`.
    pub client_name: String,
    /// Server base URL (`http://` or `https://`).
    pub base_url: String,
    /// Advertised codec priority, highest preference first.
    pub codecs: Vec<Codec>,
    /// Advertised accepted buffer size in bytes.
    pub buffer_capacity: u32,
    /// Signed static offset added to every scheduled time.
    pub sync_delay_ms: i64,
    /// Fold raw sink latency into time-filter measurements instead of
    /// subtracting the smoothed estimate at schedule time.
    pub use_output_latency_compensation: bool,
    /// Leave the software gain at unity and delegate volume/mute externally.
    pub use_hardware_volume: bool,
    /// Correction tier thresholds used by the scheduler.
    pub correction_mode: CorrectionMode,
}

impl ClientConfig {
    /// Create a configuration for the given server base URL with defaults.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            player_id: uuid::Uuid::new_v4().to_string(),
            client_name: "Sendspin Player".to_string(),
            base_url: base_url.into(),
            codecs: vec![Codec::Opus, Codec::Flac, Codec::Pcm],
            buffer_capacity: 4 * 1024 * 1024,
            sync_delay_ms: 0,
            use_output_latency_compensation: false,
            use_hardware_volume: false,
            correction_mode: CorrectionMode::Sync,
        }
    }

    /// Sync delay as signed seconds.
    pub fn sync_delay_seconds(&self) -> f64 {
        self.sync_delay_ms as f64 / 1_000.0
    }
}
