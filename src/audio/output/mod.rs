// ABOUTME: Audio sink abstraction for scheduled playback
// ABOUTME: Sink clock, latency report, gain, and schedule-at-time primitive

/// cpal-based sink implementation
pub mod cpal_sink;

pub use cpal_sink::CpalSink;

use crate::error::Error;

/// Handle to one scheduled buffer on a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

/// Host audio sink used by the scheduler.
///
/// The sink exposes its own monotone output clock in seconds; every
/// `start_at` is a coordinate on that clock. Implementations render each
/// scheduled buffer beginning at its start time, resampled by `rate`, with
/// the gain stage applied.
pub trait AudioSink {
    /// Current sink time in seconds. Monotone, starts near zero.
    fn current_time(&self) -> f64;

    /// Reported output latency (base + output) in microseconds.
    fn output_latency_us(&self) -> i64;

    /// Set the linear software gain (0.0..=1.0).
    fn set_gain(&mut self, gain: f32);

    /// Set the mute flag on the gain stage.
    fn set_muted(&mut self, muted: bool);

    /// Schedule planar samples to begin playing at sink time `start_at`
    /// seconds, rendered at `rate` (1.0 = nominal).
    fn schedule(
        &mut self,
        channels: Vec<Vec<f32>>,
        start_at: f64,
        rate: f64,
    ) -> Result<SourceId, Error>;

    /// Stop and discard a scheduled source.
    fn cancel(&mut self, id: SourceId);

    /// Stop playback and release the device.
    fn close(&mut self);
}
