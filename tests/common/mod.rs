// ABOUTME: Shared test support
// ABOUTME: Recording mock audio sink with a controllable clock

#![allow(dead_code)]

use sendspin::audio::{AudioSink, SourceId};
use sendspin::error::Error;
use std::sync::{Arc, Mutex};

/// One schedule() call recorded by the mock.
#[derive(Debug, Clone)]
pub struct ScheduledCall {
    pub id: u64,
    pub start_at: f64,
    pub rate: f64,
    pub channels: Vec<Vec<f32>>,
    pub canceled: bool,
}

impl ScheduledCall {
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

#[derive(Debug, Default)]
pub struct MockSinkState {
    pub now: f64,
    pub latency_us: i64,
    pub gain: f32,
    pub muted: bool,
    pub closed: bool,
    pub calls: Vec<ScheduledCall>,
}

/// Recording sink. Clones share state so tests keep a handle while the
/// scheduler owns the sink.
#[derive(Clone)]
pub struct MockSink(pub Arc<Mutex<MockSinkState>>);

impl MockSink {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(MockSinkState {
            gain: 1.0,
            ..Default::default()
        })))
    }

    pub fn set_now(&self, now: f64) {
        self.0.lock().unwrap().now = now;
    }

    pub fn set_latency_us(&self, latency: i64) {
        self.0.lock().unwrap().latency_us = latency;
    }

    /// All schedule() calls, in order, including canceled ones.
    pub fn calls(&self) -> Vec<ScheduledCall> {
        self.0.lock().unwrap().calls.clone()
    }

    /// Schedule() calls that were not canceled.
    pub fn active(&self) -> Vec<ScheduledCall> {
        self.0
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| !c.canceled)
            .cloned()
            .collect()
    }
}

impl AudioSink for MockSink {
    fn current_time(&self) -> f64 {
        self.0.lock().unwrap().now
    }

    fn output_latency_us(&self) -> i64 {
        self.0.lock().unwrap().latency_us
    }

    fn set_gain(&mut self, gain: f32) {
        self.0.lock().unwrap().gain = gain;
    }

    fn set_muted(&mut self, muted: bool) {
        self.0.lock().unwrap().muted = muted;
    }

    fn schedule(
        &mut self,
        channels: Vec<Vec<f32>>,
        start_at: f64,
        rate: f64,
    ) -> Result<SourceId, Error> {
        let mut state = self.0.lock().unwrap();
        let id = state.calls.len() as u64 + 1;
        state.calls.push(ScheduledCall {
            id,
            start_at,
            rate,
            channels,
            canceled: false,
        });
        Ok(SourceId(id))
    }

    fn cancel(&mut self, id: SourceId) {
        let mut state = self.0.lock().unwrap();
        if let Some(call) = state.calls.iter_mut().find(|c| c.id == id.0) {
            call.canceled = true;
        }
    }

    fn close(&mut self) {
        self.0.lock().unwrap().closed = true;
    }
}
