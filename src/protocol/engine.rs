// ABOUTME: Receiver-side protocol state machine
// ABOUTME: Handshake, time sync cadence, stream lifecycle, server commands

use crate::audio::{
    AudioChunk, AudioFormat, AudioSink, Codec, DecodeFrontEnd, VolumeControl,
};
use crate::config::{ClientConfig, SCHEDULE_DEBOUNCE};
use crate::error::Error;
use crate::persist::LatencyStore;
use crate::protocol::messages::{
    AudioFormatSpec, ClientCommand, ClientGoodbye, ClientHello, ClientState, ClientTime,
    ControllerCommand, DeviceInfo, GoodbyeReason, Message, PlayerStateReport, PlayerSupport,
    ServerCommand, ServerTime, StreamSignal, StreamStart,
};
use crate::scheduler::AudioScheduler;
use crate::state::{PlayerSyncState, StateStore};
use crate::sync::{LocalClock, TimeFilter};
use crate::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedSender;

/// Outstanding `client/time` requests kept for reply matching.
const MAX_PENDING_TIME_REQUESTS: usize = 8;

/// Builds the audio sink when the first stream starts.
pub type SinkFactory<S> = Box<dyn FnMut(&AudioFormat) -> Result<S>>;

/// Receive-side connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel.
    Disconnected,
    /// Channel being established.
    Connecting,
    /// `client/hello` sent, waiting for the server's.
    AwaitingServerHello,
    /// Handshake complete; timers running.
    Ready,
}

/// The protocol engine: consumes inbound frames, drives the time filter and
/// scheduler, and emits outbound messages onto a queue the transport drains.
///
/// The engine is transport-free so the state machine can be exercised
/// directly; [`crate::SendspinClient`] owns the WebSocket and the timers.
pub struct Engine<S: AudioSink> {
    config: ClientConfig,
    state: StateStore,
    filter: TimeFilter,
    scheduler: AudioScheduler<S>,
    decode: DecodeFrontEnd,
    clock: LocalClock,
    connection: ConnectionState,
    pending_time: VecDeque<i64>,
    outbound: UnboundedSender<Message>,
    debounce_deadline: Option<tokio::time::Instant>,
    hardware_volume: Option<Box<dyn VolumeControl>>,
    sink_factory: SinkFactory<S>,
}

impl<S: AudioSink> Engine<S> {
    /// Create an engine. Outbound messages are pushed to `outbound`;
    /// `sink_factory` is invoked when the first stream starts.
    pub fn new(
        config: ClientConfig,
        outbound: UnboundedSender<Message>,
        sink_factory: SinkFactory<S>,
        hardware_volume: Option<Box<dyn VolumeControl>>,
        latency_store: Box<dyn LatencyStore + Send>,
    ) -> Self {
        let latency_key = format!("output-latency:{}", config.player_id);
        let scheduler = AudioScheduler::new(
            config.correction_mode,
            config.sync_delay_seconds(),
            config.use_output_latency_compensation,
            latency_store,
            latency_key,
        );
        Self {
            config,
            state: StateStore::new(),
            filter: TimeFilter::new(),
            scheduler,
            decode: DecodeFrontEnd::new(),
            clock: LocalClock::new(),
            connection: ConnectionState::Disconnected,
            pending_time: VecDeque::new(),
            outbound,
            debounce_deadline: None,
            hardware_volume,
            sink_factory,
        }
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Whether the handshake has completed.
    pub fn is_ready(&self) -> bool {
        self.connection == ConnectionState::Ready
    }

    /// Session state store.
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// The time filter.
    pub fn filter(&self) -> &TimeFilter {
        &self.filter
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &AudioScheduler<S> {
        &self.scheduler
    }

    /// Deadline of the pending scheduling debounce, if armed.
    pub fn debounce_deadline(&self) -> Option<tokio::time::Instant> {
        self.debounce_deadline
    }

    /// The channel is being established.
    pub fn on_connecting(&mut self) {
        self.connection = ConnectionState::Connecting;
    }

    /// The channel is open: send `client/hello`.
    pub fn on_channel_open(&mut self) {
        self.send(Message::ClientHello(self.build_hello()));
        self.connection = ConnectionState::AwaitingServerHello;
    }

    fn build_hello(&self) -> ClientHello {
        let supported_formats = self
            .config
            .codecs
            .iter()
            .map(|codec| AudioFormatSpec {
                codec: codec.as_str().to_string(),
                channels: 2,
                sample_rate: 48_000,
                bit_depth: 16,
            })
            .collect();

        ClientHello {
            client_id: self.config.player_id.clone(),
            name: self.config.client_name.clone(),
            version: 1,
            supported_roles: vec!["player@v1".to_string()],
            device_info: Some(DeviceInfo {
                product_name: "Sendspin Player".to_string(),
                manufacturer: "Sendspin".to_string(),
                software_version: env!("CARGO_PKG_VERSION").to_string(),
            }),
            player_support: Some(PlayerSupport {
                supported_formats,
                buffer_capacity: self.config.buffer_capacity,
                supported_commands: vec!["volume".to_string(), "mute".to_string()],
            }),
        }
    }

    /// Handle one inbound text frame. Malformed frames are dropped.
    pub fn handle_text(&mut self, text: &str) -> Result<()> {
        match serde_json::from_str::<Message>(text) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                log::warn!("dropping malformed message: {}", e);
                Ok(())
            }
        }
    }

    /// Handle one parsed inbound message.
    pub fn handle_message(&mut self, message: Message) -> Result<()> {
        match message {
            Message::ServerHello(hello) => {
                if self.connection != ConnectionState::AwaitingServerHello {
                    log::warn!("unexpected server/hello in {:?}", self.connection);
                    return Ok(());
                }
                if let Some(name) = hello.name.as_deref() {
                    log::info!("connected to server: {}", name);
                }
                self.connection = ConnectionState::Ready;
                self.send_state_report();
                self.send_time_probe();
            }
            Message::ServerTime(reply) => {
                if self.is_ready() {
                    self.handle_server_time(reply);
                }
            }
            Message::StreamStart(start) => {
                if self.is_ready() {
                    self.handle_stream_start(start)?;
                }
            }
            Message::StreamClear(signal) => {
                if self.is_ready() {
                    self.handle_stream_clear(signal);
                }
            }
            Message::StreamEnd(signal) => {
                if self.is_ready() {
                    self.handle_stream_end(signal);
                }
            }
            Message::ServerCommand(command) => {
                if self.is_ready() {
                    self.handle_server_command(command);
                }
            }
            Message::ServerState(diff) => self.state.merge_server_state(diff),
            Message::GroupUpdate(diff) => self.state.merge_group_state(diff),
            other => {
                log::warn!("ignoring unexpected message: {:?}", other);
            }
        }
        Ok(())
    }

    /// Handle one inbound binary frame: decode and enqueue an audio chunk.
    pub fn handle_binary(&mut self, frame: &[u8]) -> Result<()> {
        let chunk = match AudioChunk::from_frame(frame) {
            Ok(chunk) => chunk,
            Err(e) => {
                log::warn!("dropping binary frame: {}", e);
                return Ok(());
            }
        };

        if !self.decode.is_configured() {
            log::debug!("audio chunk before stream/start, dropping");
            return Ok(());
        }

        // Captured before the decode starts; the frame is dropped after the
        // decode if a buffer clear bumped the generation meanwhile.
        let generation = self.state.stream_generation();
        let decoded = match self
            .decode
            .decode_chunk(&chunk.payload, chunk.server_time, generation)
        {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("dropping undecodable chunk: {}", e);
                return Ok(());
            }
        };

        if decoded.generation != self.state.stream_generation() {
            log::debug!("dropping frame from stale generation {}", decoded.generation);
            return Ok(());
        }

        self.scheduler.enqueue(decoded);
        self.arm_debounce();
        Ok(())
    }

    fn arm_debounce(&mut self) {
        self.debounce_deadline = Some(tokio::time::Instant::now() + SCHEDULE_DEBOUNCE);
    }

    /// The debounce fired: run one scheduling pass.
    pub fn on_debounce(&mut self) {
        self.debounce_deadline = None;
        let now_us = self.clock.now_us();
        self.scheduler
            .run_pass(&self.filter, self.state.stream_generation(), now_us);
    }

    /// Periodic time-sync tick.
    pub fn on_time_tick(&mut self) {
        if self.is_ready() {
            self.send_time_probe();
        }
    }

    /// Periodic state-report tick.
    pub fn on_state_tick(&mut self) {
        if self.is_ready() {
            self.send_state_report();
        }
    }

    fn send_time_probe(&mut self) {
        let t1 = self.clock.now_us();
        self.pending_time.push_back(t1);
        while self.pending_time.len() > MAX_PENDING_TIME_REQUESTS {
            self.pending_time.pop_front();
        }
        self.send(Message::ClientTime(ClientTime {
            client_transmitted: t1,
        }));
    }

    fn handle_server_time(&mut self, reply: ServerTime) {
        let t4 = self.clock.now_us();
        let Some(pos) = self
            .pending_time
            .iter()
            .position(|&t1| t1 == reply.client_transmitted)
        else {
            log::debug!(
                "ignoring server/time with unknown client_transmitted {}",
                reply.client_transmitted
            );
            return;
        };
        self.pending_time.remove(pos);

        let t1 = reply.client_transmitted;
        let t2 = reply.server_received;
        let t3 = reply.server_transmitted;

        let mut measurement = ((t2 - t1) + (t3 - t4)) / 2;
        let max_error = ((t4 - t1) - (t3 - t2)) / 2;

        if self.config.use_output_latency_compensation {
            if let Some(latency) = self.scheduler.raw_output_latency_us() {
                measurement += latency;
            }
        }

        self.filter.update(measurement, max_error, t4);
    }

    fn handle_stream_start(&mut self, start: StreamStart) -> Result<()> {
        let format = match parse_stream_format(&start) {
            Ok(format) => format,
            Err(e) => {
                log::warn!("dropping stream/start: {}", e);
                return Ok(());
            }
        };

        let format_update = self.state.current_format().is_some();
        self.state.set_format(format.clone());

        if format_update {
            // Format replaced in place: buffers stay, generation stays.
            if let Err(e) = self.decode.configure(&format) {
                log::warn!("format update rejected by decoder: {}", e);
            }
            return Ok(());
        }

        self.state.reset_stream_anchors();

        if !self.scheduler.has_sink() {
            match (self.sink_factory)(&format) {
                Ok(sink) => self.scheduler.attach_sink(sink),
                Err(e) => {
                    // The session cannot render without a sink.
                    self.state.set_player_state(PlayerSyncState::Error);
                    self.send_state_report();
                    return Err(e);
                }
            }
        }
        self.apply_volume_to_sink();

        if let Err(e) = self.decode.configure(&format) {
            log::warn!("stream/start with undecodable format: {}", e);
        }

        self.state.set_playing(true);
        self.send_state_report();
        Ok(())
    }

    fn handle_stream_clear(&mut self, signal: StreamSignal) {
        if !signal.applies_to_player() {
            return;
        }
        // Seek: drop buffered audio, keep format and playback running.
        self.scheduler.clear();
        self.state.reset_stream_anchors();
    }

    fn handle_stream_end(&mut self, signal: StreamSignal) {
        if !signal.applies_to_player() {
            return;
        }
        self.scheduler.clear();
        self.state.reset_stream_anchors();
        self.state.clear_format();
        self.decode.reset();
        self.state.set_playing(false);
        self.send_state_report();
    }

    fn handle_server_command(&mut self, command: ServerCommand) {
        let Some(player) = command.player else { return };
        match player.command.as_str() {
            "volume" => {
                if let Some(volume) = player.volume {
                    self.set_volume(volume);
                } else {
                    log::warn!("volume command without a volume");
                }
            }
            "mute" => {
                if let Some(mute) = player.mute {
                    self.set_mute(mute);
                } else {
                    log::warn!("mute command without a flag");
                }
            }
            other => {
                log::warn!("ignoring unknown player command: {}", other);
            }
        }
        // The state change above must be observable before this report.
        self.send_state_report();
    }

    /// Apply a volume level locally (and to the sink or hardware control).
    pub fn set_volume(&mut self, volume: u8) {
        self.state.set_volume(volume);
        if let Some(hw) = self.hardware_volume.as_mut() {
            hw.set_volume(self.state.volume());
        } else {
            let gain = self.state.volume() as f32 / 100.0;
            self.scheduler.set_gain(gain);
        }
    }

    /// Apply a mute flag locally (and to the sink or hardware control).
    pub fn set_mute(&mut self, muted: bool) {
        self.state.set_muted(muted);
        if let Some(hw) = self.hardware_volume.as_mut() {
            hw.set_muted(muted);
        } else {
            self.scheduler.set_muted(muted);
        }
    }

    fn apply_volume_to_sink(&mut self) {
        if self.hardware_volume.is_some() {
            // Hardware volume: software gain stays at unity.
            return;
        }
        let gain = self.state.volume() as f32 / 100.0;
        self.scheduler.set_gain(gain);
        self.scheduler.set_muted(self.state.muted());
    }

    /// Send a `client/state` report reflecting current state.
    pub fn send_state_report(&mut self) {
        let (volume, muted) = match self.hardware_volume.as_ref() {
            Some(hw) => (hw.volume(), hw.muted()),
            None => (self.state.volume(), self.state.muted()),
        };
        let report = PlayerStateReport {
            state: self.state.player_state(),
            volume,
            muted,
        };
        self.send(Message::ClientState(ClientState { player: report }));
    }

    /// Send a controller command, failing synchronously when the cached
    /// server state says the controller does not support it.
    pub fn send_command(&mut self, command: ControllerCommand) -> Result<()> {
        if let Some(supported) = self.state.supported_commands() {
            if !supported.iter().any(|name| name == command.name()) {
                return Err(Error::UnsupportedCommand(command.name().to_string()));
            }
        }
        self.send(Message::ClientCommand(ClientCommand {
            controller: command.to_payload(),
        }));
        Ok(())
    }

    /// Announce an orderly departure. The transport closes afterwards.
    pub fn disconnect(&mut self, reason: GoodbyeReason) {
        self.send(Message::ClientGoodbye(ClientGoodbye { reason }));
    }

    /// The channel closed: clear timers, flush filter state, reset session.
    pub fn on_channel_closed(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.pending_time.clear();
        self.debounce_deadline = None;
        self.filter.reset();
        self.scheduler.close();
        self.decode.reset();
        self.state.clear_format();
        self.state.set_playing(false);
    }

    fn send(&mut self, message: Message) {
        if self.outbound.send(message).is_err() {
            log::warn!("outbound channel closed, dropping message");
        }
    }
}

fn parse_stream_format(start: &StreamStart) -> Result<AudioFormat> {
    let params = &start.player;
    let codec = Codec::from_wire(&params.codec)?;
    let codec_header = match params.codec_header.as_deref() {
        Some(encoded) => Some(
            BASE64
                .decode(encoded)
                .map_err(|e| Error::Protocol(format!("bad codec_header: {e}")))?,
        ),
        None => None,
    };
    Ok(AudioFormat {
        codec,
        sample_rate: params.sample_rate,
        channels: params.channels,
        bit_depth: params.bit_depth,
        codec_header,
    })
}
