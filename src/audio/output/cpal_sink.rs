// ABOUTME: cpal-backed audio sink with a sample-counter clock
// ABOUTME: Renders scheduled sources in the output callback with rate interp

use crate::audio::gain::GainControl;
use crate::audio::output::{AudioSink, SourceId};
use crate::audio::AudioFormat;
use crate::error::Error;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

enum SinkCommand {
    Schedule(ActiveSource),
    Cancel(u64),
    Clear,
}

struct ActiveSource {
    id: u64,
    start_at: f64,
    rate: f64,
    channels: Vec<Vec<f32>>,
    cursor: f64,
}

impl ActiveSource {
    fn frame_len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    fn sample_at(&self, channel: usize, pos: f64) -> f32 {
        let chan = &self.channels[channel.min(self.channels.len() - 1)];
        let idx = pos as usize;
        if idx + 1 >= chan.len() {
            return *chan.last().unwrap_or(&0.0);
        }
        let frac = (pos - idx as f64) as f32;
        chan[idx] * (1.0 - frac) + chan[idx + 1] * frac
    }
}

struct SinkShared {
    frames_rendered: AtomicU64,
    latency_us: AtomicI64,
    last_error: Mutex<Option<String>>,
}

/// Audio sink built on the default cpal output device.
///
/// The sink clock is a rendered-frame counter, so `current_time` advances
/// exactly with the device. Scheduled sources cross to the callback thread
/// over a lock-free queue; the callback mixes every active source that has
/// reached its start time, applying the gain stage and per-source rate.
pub struct CpalSink {
    stream: Option<cpal::Stream>,
    shared: Arc<SinkShared>,
    commands: Arc<SegQueue<SinkCommand>>,
    gain: Arc<GainControl>,
    sample_rate: u32,
    next_source_id: u64,
}

impl CpalSink {
    /// Open the default output device for the given stream format.
    pub fn open(format: &AudioFormat) -> Result<Self, Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Output("no output device available".to_string()))?;

        let channels = format.channels.max(1) as usize;
        let sample_rate = format.sample_rate;
        let config = StreamConfig {
            channels: channels as u16,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(SinkShared {
            frames_rendered: AtomicU64::new(0),
            latency_us: AtomicI64::new(0),
            last_error: Mutex::new(None),
        });
        let commands: Arc<SegQueue<SinkCommand>> = Arc::new(SegQueue::new());
        let gain = Arc::new(GainControl::new());

        let cb_shared = Arc::clone(&shared);
        let cb_commands = Arc::clone(&commands);
        let cb_gain = Arc::clone(&gain);
        let err_shared = Arc::clone(&shared);
        let mut active: Vec<ActiveSource> = Vec::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                    let ts = info.timestamp();
                    if let Some(delta) = ts.playback.duration_since(&ts.callback) {
                        cb_shared
                            .latency_us
                            .store(delta.as_micros() as i64, Ordering::Relaxed);
                    }

                    while let Some(command) = cb_commands.pop() {
                        match command {
                            SinkCommand::Schedule(source) => active.push(source),
                            SinkCommand::Cancel(id) => active.retain(|s| s.id != id),
                            SinkCommand::Clear => active.clear(),
                        }
                    }

                    data.fill(0.0);
                    let base_frame = cb_shared.frames_rendered.load(Ordering::Relaxed);
                    let gain_value = cb_gain.effective_gain();
                    let out_frames = data.len() / channels;

                    for i in 0..out_frames {
                        let t = (base_frame + i as u64) as f64 / sample_rate as f64;
                        for source in active.iter_mut() {
                            if t < source.start_at {
                                continue;
                            }
                            let pos = source.cursor;
                            if pos >= source.frame_len() as f64 {
                                continue;
                            }
                            for ch in 0..channels {
                                data[i * channels + ch] += source.sample_at(ch, pos) * gain_value;
                            }
                            source.cursor += source.rate;
                        }
                    }

                    active.retain(|s| s.cursor < s.frame_len() as f64);
                    cb_shared
                        .frames_rendered
                        .fetch_add(out_frames as u64, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("audio stream error: {}", err);
                    *err_shared.last_error.lock() = Some(err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Output(e.to_string()))?;

        stream.play().map_err(|e| Error::Output(e.to_string()))?;

        Ok(Self {
            stream: Some(stream),
            shared,
            commands,
            gain,
            sample_rate,
            next_source_id: 0,
        })
    }

    /// Last error reported by the stream callback, clearing it.
    pub fn take_error(&self) -> Option<String> {
        self.shared.last_error.lock().take()
    }
}

impl AudioSink for CpalSink {
    fn current_time(&self) -> f64 {
        self.shared.frames_rendered.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn output_latency_us(&self) -> i64 {
        self.shared.latency_us.load(Ordering::Relaxed)
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain.set_gain(gain);
    }

    fn set_muted(&mut self, muted: bool) {
        self.gain.set_muted(muted);
    }

    fn schedule(
        &mut self,
        channels: Vec<Vec<f32>>,
        start_at: f64,
        rate: f64,
    ) -> Result<SourceId, Error> {
        if self.stream.is_none() {
            return Err(Error::Output("sink is closed".to_string()));
        }
        self.next_source_id += 1;
        let id = self.next_source_id;
        self.commands.push(SinkCommand::Schedule(ActiveSource {
            id,
            start_at,
            rate,
            channels,
            cursor: 0.0,
        }));
        Ok(SourceId(id))
    }

    fn cancel(&mut self, id: SourceId) {
        self.commands.push(SinkCommand::Cancel(id.0));
    }

    fn close(&mut self) {
        self.commands.push(SinkCommand::Clear);
        self.stream = None;
    }
}
