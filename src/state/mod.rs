// ABOUTME: Session state store for a Sendspin client
// ABOUTME: Volume/mute, playback flags, stream generation, cached server state

/// Diff merge for cached server/group state
pub mod merge;

pub use merge::merge_diff;

use crate::audio::AudioFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reported player synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerSyncState {
    /// Playback is locked to the server clock.
    Synchronized,
    /// The player cannot render (sink failure or similar).
    Error,
}

/// Which field of the store changed, delivered to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// `volume` changed
    Volume,
    /// `muted` changed
    Muted,
    /// `player_state` changed
    PlayerState,
    /// `is_playing` changed
    Playing,
    /// `current_format` changed
    Format,
    /// `stream_generation` was bumped
    Generation,
    /// Cached server state was merged
    ServerState,
    /// Cached group state was merged
    GroupState,
}

/// Observer notified on every state mutation. One method, no shared
/// closures; the host adapter drains these into its own UI or bus.
pub trait StateObserver {
    /// Called after the store has been mutated.
    fn state_changed(&mut self, change: StateChange);
}

/// Session state for one Sendspin connection.
pub struct StateStore {
    volume: u8,
    muted: bool,
    player_state: PlayerSyncState,
    is_playing: bool,
    current_format: Option<AudioFormat>,
    stream_generation: u32,
    server_state: Value,
    group_state: Value,
    observer: Option<Box<dyn StateObserver + Send>>,
}

impl StateStore {
    /// Create a store with default values (volume 100, unmuted, idle).
    pub fn new() -> Self {
        Self {
            volume: 100,
            muted: false,
            player_state: PlayerSyncState::Synchronized,
            is_playing: false,
            current_format: None,
            stream_generation: 0,
            server_state: Value::Object(serde_json::Map::new()),
            group_state: Value::Object(serde_json::Map::new()),
            observer: None,
        }
    }

    /// Attach the single observer.
    pub fn set_observer(&mut self, observer: Box<dyn StateObserver + Send>) {
        self.observer = Some(observer);
    }

    fn notify(&mut self, change: StateChange) {
        if let Some(observer) = self.observer.as_mut() {
            observer.state_changed(change);
        }
    }

    /// Current volume, 0..=100.
    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Set the volume, clamped to 0..=100.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
        self.notify(StateChange::Volume);
    }

    /// Current mute flag.
    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Set the mute flag.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.notify(StateChange::Muted);
    }

    /// Reported synchronization state.
    pub fn player_state(&self) -> PlayerSyncState {
        self.player_state
    }

    /// Set the reported synchronization state.
    pub fn set_player_state(&mut self, state: PlayerSyncState) {
        self.player_state = state;
        self.notify(StateChange::PlayerState);
    }

    /// Whether a stream is currently active.
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Mark a stream active or inactive.
    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
        self.notify(StateChange::Playing);
    }

    /// The current stream format, if a stream is active.
    pub fn current_format(&self) -> Option<&AudioFormat> {
        self.current_format.as_ref()
    }

    /// Install a stream format (stream start or format update).
    pub fn set_format(&mut self, format: AudioFormat) {
        self.current_format = Some(format);
        self.notify(StateChange::Format);
    }

    /// Clear the stream format (stream end).
    pub fn clear_format(&mut self) {
        self.current_format = None;
        self.notify(StateChange::Format);
    }

    /// Current stream generation counter.
    pub fn stream_generation(&self) -> u32 {
        self.stream_generation
    }

    /// Bump the stream generation, invalidating all in-flight decodes and
    /// queued frames. Called on every buffer clear.
    pub fn reset_stream_anchors(&mut self) {
        self.stream_generation = self.stream_generation.wrapping_add(1);
        self.notify(StateChange::Generation);
    }

    /// Cached server state.
    pub fn server_state(&self) -> &Value {
        &self.server_state
    }

    /// Merge a `server/state` diff into the cache.
    pub fn merge_server_state(&mut self, diff: Value) {
        merge_diff(&mut self.server_state, diff);
        self.notify(StateChange::ServerState);
    }

    /// Cached group state.
    pub fn group_state(&self) -> &Value {
        &self.group_state
    }

    /// Merge a `group/update` diff into the cache.
    pub fn merge_group_state(&mut self, diff: Value) {
        merge_diff(&mut self.group_state, diff);
        self.notify(StateChange::GroupState);
    }

    /// The controller's advertised command list, when the server has
    /// reported one. `None` means no restriction is known.
    pub fn supported_commands(&self) -> Option<Vec<String>> {
        let list = self
            .server_state
            .get("controller")?
            .get("supported_commands")?
            .as_array()?;
        Some(
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_volume_clamped() {
        let mut state = StateStore::new();
        state.set_volume(250);
        assert_eq!(state.volume(), 100);
        state.set_volume(42);
        assert_eq!(state.volume(), 42);
    }

    #[test]
    fn test_generation_monotone() {
        let mut state = StateStore::new();
        let g0 = state.stream_generation();
        state.reset_stream_anchors();
        state.reset_stream_anchors();
        assert_eq!(state.stream_generation(), g0.wrapping_add(2));
    }

    #[test]
    fn test_supported_commands_from_server_state() {
        let mut state = StateStore::new();
        assert!(state.supported_commands().is_none());

        state.merge_server_state(json!({
            "controller": {"supported_commands": ["play", "pause"]}
        }));
        assert_eq!(
            state.supported_commands(),
            Some(vec!["play".to_string(), "pause".to_string()])
        );
    }

    struct Counter(std::sync::Arc<std::sync::atomic::AtomicU32>);

    impl StateObserver for Counter {
        fn state_changed(&mut self, _change: StateChange) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observer_notified_per_mutation() {
        let count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let mut state = StateStore::new();
        state.set_observer(Box::new(Counter(count.clone())));

        state.set_volume(10);
        state.set_muted(true);
        state.reset_stream_anchors();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
