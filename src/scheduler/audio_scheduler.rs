// ABOUTME: Synchronized audio scheduler
// ABOUTME: Orders decoded frames and dispatches them to the sink on time

use crate::audio::output::{AudioSink, SourceId};
use crate::audio::AudioFrame;
use crate::persist::LatencyStore;
use crate::scheduler::correction::{
    pick_tier, CorrectionMethod, CorrectionMode, CorrectionThresholds, Tier, FAST_RATE_ADJUST,
    SLOW_RATE_ADJUST,
};
use crate::sync::TimeFilter;

/// Margin added to every computed schedule time so the sink has time to
/// prepare the buffer.
pub const HEADROOM_SECONDS: f64 = 0.200;

/// A jump in the server timeline of at least this much breaks contiguity
/// and forces a resync.
const GAP_THRESHOLD_US: i64 = 100_000;

/// EMA weight for the per-frame sync error.
const SYNC_ERROR_ALPHA: f64 = 0.1;

/// EMA weight for the sink's reported output latency.
const LATENCY_ALPHA: f64 = 0.01;

struct ScheduledSource {
    id: SourceId,
    start_at: f64,
    end_at: f64,
}

/// Orders, drift-corrects, and dispatches decoded frames onto the audio
/// sink with precise start times.
///
/// The scheduler exclusively owns its frame queue and the scheduled-source
/// list. A pass runs when the decode debounce fires; it sorts the queue,
/// converts each server timestamp through the time filter, and schedules
/// back-to-back against the anchor, applying at most one correction tier
/// per frame.
pub struct AudioScheduler<S: AudioSink> {
    sink: Option<S>,
    queue: Vec<AudioFrame>,
    scheduled: Vec<ScheduledSource>,
    /// Sink time where the next contiguous frame lands; 0 = no anchor.
    next_playback_time: f64,
    /// Server timestamp of the end of the last scheduled frame.
    last_scheduled_server_end_us: i64,
    smoothed_sync_error_ms: f64,
    smoothed_output_latency_us: f64,
    resync_count: u32,
    current_playback_rate: f64,
    current_correction: CorrectionMethod,
    thresholds: CorrectionThresholds,
    sync_delay_s: f64,
    latency_compensation: bool,
    latency_store: Box<dyn LatencyStore + Send>,
    latency_key: String,
}

impl<S: AudioSink> AudioScheduler<S> {
    /// Create a scheduler. `latency_key` namespaces the persisted latency
    /// estimate to this session's player identity.
    pub fn new(
        mode: CorrectionMode,
        sync_delay_s: f64,
        latency_compensation: bool,
        latency_store: Box<dyn LatencyStore + Send>,
        latency_key: String,
    ) -> Self {
        let smoothed_output_latency_us = latency_store.load(&latency_key).unwrap_or(0.0);
        Self {
            sink: None,
            queue: Vec::new(),
            scheduled: Vec::new(),
            next_playback_time: 0.0,
            last_scheduled_server_end_us: 0,
            smoothed_sync_error_ms: 0.0,
            smoothed_output_latency_us,
            resync_count: 0,
            current_playback_rate: 1.0,
            current_correction: CorrectionMethod::None,
            thresholds: CorrectionThresholds::for_mode(mode),
            sync_delay_s,
            latency_compensation,
            latency_store,
            latency_key,
        }
    }

    /// Install the audio sink. Idempotent across format updates.
    pub fn attach_sink(&mut self, sink: S) {
        self.sink = Some(sink);
    }

    /// Whether a sink is attached.
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Mutable access to the attached sink.
    pub fn sink_mut(&mut self) -> Option<&mut S> {
        self.sink.as_mut()
    }

    /// Raw (unsmoothed) output latency reported by the sink.
    pub fn raw_output_latency_us(&self) -> Option<i64> {
        self.sink.as_ref().map(AudioSink::output_latency_us)
    }

    /// Set the software gain on the sink, if attached.
    pub fn set_gain(&mut self, gain: f32) {
        if let Some(sink) = self.sink.as_mut() {
            sink.set_gain(gain);
        }
    }

    /// Set the mute flag on the sink, if attached.
    pub fn set_muted(&mut self, muted: bool) {
        if let Some(sink) = self.sink.as_mut() {
            sink.set_muted(muted);
        }
    }

    /// Move a decoded frame into the queue. The caller arms the debounce.
    pub fn enqueue(&mut self, frame: AudioFrame) {
        self.queue.push(frame);
    }

    /// Number of frames awaiting scheduling.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of sources currently scheduled on the sink.
    pub fn scheduled_len(&self) -> usize {
        self.scheduled.len()
    }

    /// Total hard resyncs this session.
    pub fn resync_count(&self) -> u32 {
        self.resync_count
    }

    /// Sink time where the next contiguous frame will land (0 = no anchor).
    pub fn next_playback_time(&self) -> f64 {
        self.next_playback_time
    }

    /// Rate applied to the most recently scheduled frame.
    pub fn current_playback_rate(&self) -> f64 {
        self.current_playback_rate
    }

    /// Correction applied to the most recently scheduled frame.
    pub fn current_correction(&self) -> CorrectionMethod {
        self.current_correction
    }

    /// Smoothed per-frame sync error, milliseconds.
    pub fn smoothed_sync_error_ms(&self) -> f64 {
        self.smoothed_sync_error_ms
    }

    /// Smoothed sink output latency, microseconds.
    pub fn smoothed_output_latency_us(&self) -> f64 {
        self.smoothed_output_latency_us
    }

    /// Run one scheduling pass.
    ///
    /// Returns without scheduling when the sink is missing or the filter is
    /// not yet synchronized; queued frames are held, not dropped.
    pub fn run_pass(&mut self, filter: &TimeFilter, generation: u32, now_us: i64) {
        let Self {
            sink,
            queue,
            scheduled,
            next_playback_time,
            last_scheduled_server_end_us,
            smoothed_sync_error_ms,
            smoothed_output_latency_us,
            resync_count,
            current_playback_rate,
            current_correction,
            thresholds,
            sync_delay_s,
            latency_compensation,
            ..
        } = self;

        let Some(sink) = sink.as_mut() else { return };
        if !filter.is_synchronized() {
            return;
        }

        queue.retain(|f| f.generation == generation);
        queue.sort_by_key(|f| f.server_time);

        let t_sink = sink.current_time();
        scheduled.retain(|s| s.end_at > t_sink);

        let raw_latency = sink.output_latency_us() as f64;
        *smoothed_output_latency_us += LATENCY_ALPHA * (raw_latency - *smoothed_output_latency_us);

        for frame in queue.drain(..) {
            let AudioFrame {
                mut channels,
                sample_rate,
                server_time,
                ..
            } = frame;

            let frame_count = channels.first().map_or(0, Vec::len);
            let duration_s = frame_count as f64 / sample_rate as f64;
            let server_end_us = server_time + (duration_s * 1e6).round() as i64;

            let t_server_client_us = filter.compute_client_time(server_time, now_us);
            let delta_s = (t_server_client_us - now_us) as f64 / 1e6;
            let mut target = t_sink + delta_s + HEADROOM_SECONDS + *sync_delay_s;
            if !*latency_compensation {
                target -= *smoothed_output_latency_us / 1e6;
            }

            let mut rate = 1.0;
            let schedule_at;

            if *next_playback_time == 0.0 {
                // Case A: no anchor, schedule from the absolute timestamp.
                schedule_at = target;
                *current_correction = CorrectionMethod::None;
            } else if (server_time - *last_scheduled_server_end_us).abs() >= GAP_THRESHOLD_US {
                // Case B: gap in the server timeline.
                *resync_count += 1;
                cancel_starting_at_or_after(sink, scheduled, target);
                schedule_at = target;
                *current_correction = CorrectionMethod::Resync;
                log::debug!(
                    "timeline gap at server time {}us, resyncing (count {})",
                    server_time,
                    *resync_count
                );
            } else {
                // Case C: contiguous.
                let sync_error_ms = (*next_playback_time - target) * 1_000.0;
                *smoothed_sync_error_ms = SYNC_ERROR_ALPHA * sync_error_ms
                    + (1.0 - SYNC_ERROR_ALPHA) * *smoothed_sync_error_ms;
                let e = *smoothed_sync_error_ms;

                match pick_tier(e, filter.error_us(), thresholds) {
                    Tier::Wait => {
                        schedule_at = *next_playback_time;
                        *current_correction = CorrectionMethod::Wait;
                    }
                    Tier::Deadband => {
                        schedule_at = *next_playback_time;
                        *current_correction = CorrectionMethod::None;
                    }
                    Tier::Samples => {
                        channels = if e > 0.0 {
                            drop_trailing_sample(&channels)
                        } else {
                            insert_leading_sample(&channels)
                        };
                        schedule_at = *next_playback_time;
                        *current_correction = CorrectionMethod::SampleAdjust;
                    }
                    Tier::Rate { fast } => {
                        let nudge = if fast { FAST_RATE_ADJUST } else { SLOW_RATE_ADJUST };
                        rate = if e > 0.0 { 1.0 + nudge } else { 1.0 - nudge };
                        schedule_at = *next_playback_time;
                        *current_correction = CorrectionMethod::RateAdjust;
                    }
                    Tier::Resync => {
                        cancel_overlapping(sink, scheduled, target);
                        *smoothed_sync_error_ms = 0.0;
                        *resync_count += 1;
                        schedule_at = target;
                        *current_correction = CorrectionMethod::Resync;
                        log::debug!("sync error {:.1}ms, hard resync", e);
                    }
                }
            }

            if schedule_at < t_sink {
                // Late: nothing can start in the past. Drop and re-anchor.
                log::debug!("dropping late frame at server time {}us", server_time);
                *next_playback_time = 0.0;
                *last_scheduled_server_end_us = 0;
                continue;
            }

            let adjusted_count = channels.first().map_or(0, Vec::len);
            let adjusted_duration_s = adjusted_count as f64 / sample_rate as f64;

            match sink.schedule(channels, schedule_at, rate) {
                Ok(id) => {
                    let end_at = schedule_at + adjusted_duration_s / rate;
                    scheduled.push(ScheduledSource {
                        id,
                        start_at: schedule_at,
                        end_at,
                    });
                    *next_playback_time = end_at;
                    *last_scheduled_server_end_us = server_end_us;
                    *current_playback_rate = rate;
                }
                Err(e) => {
                    log::warn!("sink refused frame: {}", e);
                    *next_playback_time = 0.0;
                    *last_scheduled_server_end_us = 0;
                }
            }
        }
    }

    /// Flush everything for a seek: stop scheduled sources, discard the
    /// queue, and reset anchors, EMAs, and counters. The caller bumps the
    /// stream generation; the format, playing flag, and time filter are
    /// untouched.
    pub fn clear(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            for source in self.scheduled.drain(..) {
                sink.cancel(source.id);
            }
        } else {
            self.scheduled.clear();
        }
        self.queue.clear();
        self.next_playback_time = 0.0;
        self.last_scheduled_server_end_us = 0;
        self.smoothed_sync_error_ms = 0.0;
        self.resync_count = 0;
        self.current_playback_rate = 1.0;
        self.current_correction = CorrectionMethod::None;
        self.smoothed_output_latency_us = self
            .latency_store
            .load(&self.latency_key)
            .unwrap_or(0.0);
    }

    /// Tear down at session end: persist the latency estimate, flush, and
    /// close the sink.
    pub fn close(&mut self) {
        if self.sink.is_some() {
            self.latency_store
                .store(&self.latency_key, self.smoothed_output_latency_us);
        }
        self.clear();
        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
    }
}

fn cancel_starting_at_or_after<S: AudioSink>(
    sink: &mut S,
    scheduled: &mut Vec<ScheduledSource>,
    from: f64,
) {
    scheduled.retain(|source| {
        if source.start_at >= from {
            sink.cancel(source.id);
            false
        } else {
            true
        }
    });
}

fn cancel_overlapping<S: AudioSink>(
    sink: &mut S,
    scheduled: &mut Vec<ScheduledSource>,
    target: f64,
) {
    scheduled.retain(|source| {
        if source.end_at > target {
            sink.cancel(source.id);
            false
        } else {
            true
        }
    });
}

/// Copy with one interpolated sample inserted after the first: the renderer
/// is ahead and must be held back by one sample.
fn insert_leading_sample(channels: &[Vec<f32>]) -> Vec<Vec<f32>> {
    channels
        .iter()
        .map(|chan| {
            if chan.len() < 2 {
                return chan.clone();
            }
            let mut out = Vec::with_capacity(chan.len() + 1);
            out.push(chan[0]);
            out.push((chan[0] + chan[1]) / 2.0);
            out.extend_from_slice(&chan[1..]);
            out
        })
        .collect()
}

/// Copy with the last two samples collapsed into their midpoint: the
/// renderer is behind and must gain one sample.
fn drop_trailing_sample(channels: &[Vec<f32>]) -> Vec<Vec<f32>> {
    channels
        .iter()
        .map(|chan| {
            if chan.len() < 2 {
                return chan.clone();
            }
            let n = chan.len();
            let mut out = chan[..n - 1].to_vec();
            out[n - 2] = (chan[n - 2] + chan[n - 1]) / 2.0;
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_leading_sample() {
        let channels = vec![vec![1.0, 3.0, 5.0]];
        let out = insert_leading_sample(&channels);
        assert_eq!(out[0], vec![1.0, 2.0, 3.0, 5.0]);
    }

    #[test]
    fn test_drop_trailing_sample() {
        let channels = vec![vec![1.0, 3.0, 5.0]];
        let out = drop_trailing_sample(&channels);
        assert_eq!(out[0], vec![1.0, 4.0]);
    }

    #[test]
    fn test_short_frames_pass_through() {
        let channels = vec![vec![1.0]];
        assert_eq!(insert_leading_sample(&channels)[0], vec![1.0]);
        assert_eq!(drop_trailing_sample(&channels)[0], vec![1.0]);
    }

    #[test]
    fn test_edits_never_mutate_input() {
        let channels = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let _ = insert_leading_sample(&channels);
        let _ = drop_trailing_sample(&channels);
        assert_eq!(channels[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(channels[1], vec![4.0, 5.0, 6.0]);
    }
}
