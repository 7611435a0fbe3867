mod common;

use common::MockSink;
use sendspin::error::Error;
use sendspin::persist::NullLatencyStore;
use sendspin::protocol::engine::{ConnectionState, Engine};
use sendspin::protocol::messages::{
    ControllerCommand, Message, PlayerCommand, ServerCommand, ServerHello, ServerTime,
    StreamParams, StreamSignal, StreamStart,
};
use sendspin::ClientConfig;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

fn new_engine() -> (Engine<MockSink>, UnboundedReceiver<Message>, MockSink) {
    let (tx, rx) = unbounded_channel();
    let sink = MockSink::new();
    let factory_sink = sink.clone();
    let mut config = ClientConfig::new("http://localhost:8927");
    config.player_id = "test-player".to_string();
    let engine = Engine::new(
        config,
        tx,
        Box::new(move |_format| Ok(factory_sink.clone())),
        None,
        Box::new(NullLatencyStore),
    );
    (engine, rx, sink)
}

fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

fn make_ready(engine: &mut Engine<MockSink>, rx: &mut UnboundedReceiver<Message>) {
    engine.on_connecting();
    engine.on_channel_open();
    engine
        .handle_message(Message::ServerHello(ServerHello::default()))
        .unwrap();
    assert!(engine.is_ready());
    drain(rx);
}

/// Run two clean time exchanges so the filter converges near offset zero.
fn synchronize(engine: &mut Engine<MockSink>, rx: &mut UnboundedReceiver<Message>) {
    for _ in 0..2 {
        engine.on_time_tick();
        let t1 = match rx.try_recv().unwrap() {
            Message::ClientTime(t) => t.client_transmitted,
            other => panic!("expected client/time, got {other:?}"),
        };
        engine
            .handle_message(Message::ServerTime(ServerTime {
                client_transmitted: t1,
                server_received: t1,
                server_transmitted: t1,
            }))
            .unwrap();
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(engine.filter().is_synchronized());
}

fn pcm_stream_start(sample_rate: u32) -> Message {
    Message::StreamStart(StreamStart {
        player: StreamParams {
            codec: "pcm".to_string(),
            sample_rate,
            channels: 2,
            bit_depth: Some(16),
            codec_header: None,
        },
    })
}

/// Binary player chunk of 16-bit stereo silence.
fn pcm_chunk(server_time: i64, frames: usize) -> Vec<u8> {
    let mut out = vec![0x04];
    out.extend_from_slice(&server_time.to_be_bytes());
    out.extend(std::iter::repeat(0u8).take(frames * 4));
    out
}

#[test]
fn test_handshake_order() {
    let (mut engine, mut rx, _sink) = new_engine();

    engine.on_connecting();
    assert_eq!(engine.connection_state(), ConnectionState::Connecting);

    engine.on_channel_open();
    assert_eq!(engine.connection_state(), ConnectionState::AwaitingServerHello);

    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 1, "exactly one hello before the server replies");
    assert!(matches!(sent[0], Message::ClientHello(_)));

    engine
        .handle_message(Message::ServerHello(ServerHello::default()))
        .unwrap();
    let sent = drain(&mut rx);
    assert!(
        matches!(sent[0], Message::ClientState(_)),
        "client/state must precede any client/time"
    );
    assert!(matches!(sent[1], Message::ClientTime(_)));
}

#[test]
fn test_messages_before_handshake_are_ignored() {
    let (mut engine, mut rx, sink) = new_engine();
    engine.on_connecting();
    engine.on_channel_open();
    drain(&mut rx);

    engine.handle_message(pcm_stream_start(48_000)).unwrap();
    assert!(engine.state().current_format().is_none());
    assert!(sink.calls().is_empty());
}

#[test]
fn test_malformed_text_is_dropped() {
    let (mut engine, mut rx, _sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    engine.handle_text("not json at all").unwrap();
    engine.handle_text(r#"{"type":"no/such","payload":{}}"#).unwrap();
    assert!(engine.is_ready());
}

#[test]
fn test_server_volume_command_confirmed_after_effect() {
    let (mut engine, mut rx, _sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    engine
        .handle_message(Message::ServerCommand(ServerCommand {
            player: Some(PlayerCommand {
                command: "volume".to_string(),
                volume: Some(50),
                mute: None,
            }),
        }))
        .unwrap();

    // The local change is visible before the confirming report went out.
    assert_eq!(engine.state().volume(), 50);

    let sent = drain(&mut rx);
    match &sent[0] {
        Message::ClientState(state) => assert_eq!(state.player.volume, 50),
        other => panic!("expected client/state, got {other:?}"),
    }
}

#[test]
fn test_server_mute_command() {
    let (mut engine, mut rx, _sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    engine
        .handle_message(Message::ServerCommand(ServerCommand {
            player: Some(PlayerCommand {
                command: "mute".to_string(),
                volume: None,
                mute: Some(true),
            }),
        }))
        .unwrap();

    assert!(engine.state().muted());
    let sent = drain(&mut rx);
    match &sent[0] {
        Message::ClientState(state) => assert!(state.player.muted),
        other => panic!("expected client/state, got {other:?}"),
    }
}

#[test]
fn test_command_gated_by_supported_commands() {
    let (mut engine, mut rx, _sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    engine
        .handle_message(Message::ServerState(json!({
            "controller": {"supported_commands": ["play", "volume"]}
        })))
        .unwrap();

    match engine.send_command(ControllerCommand::Pause) {
        Err(Error::UnsupportedCommand(name)) => assert_eq!(name, "pause"),
        other => panic!("expected UnsupportedCommand, got {other:?}"),
    }

    engine.send_command(ControllerCommand::Play).unwrap();
    let sent = drain(&mut rx);
    assert!(matches!(sent[0], Message::ClientCommand(_)));
}

#[test]
fn test_command_unrestricted_without_server_state() {
    let (mut engine, mut rx, _sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    engine.send_command(ControllerCommand::Shuffle).unwrap();
    assert!(matches!(drain(&mut rx)[0], Message::ClientCommand(_)));
}

#[test]
fn test_stream_start_bumps_generation_and_attaches_sink() {
    let (mut engine, mut rx, sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    let g0 = engine.state().stream_generation();
    engine.handle_message(pcm_stream_start(48_000)).unwrap();

    assert_eq!(engine.state().stream_generation(), g0 + 1);
    assert!(engine.state().is_playing());
    assert!(engine.state().current_format().is_some());
    assert!(!sink.0.lock().unwrap().closed);

    // The playing transition is reported.
    let sent = drain(&mut rx);
    assert!(sent.iter().any(|m| matches!(m, Message::ClientState(_))));
}

#[test]
fn test_second_stream_start_is_format_update() {
    let (mut engine, mut rx, _sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    engine.handle_message(pcm_stream_start(48_000)).unwrap();
    let generation = engine.state().stream_generation();
    drain(&mut rx);

    engine.handle_message(pcm_stream_start(44_100)).unwrap();

    // Format replaced; generation untouched, buffers untouched.
    assert_eq!(engine.state().stream_generation(), generation);
    assert_eq!(
        engine.state().current_format().unwrap().sample_rate,
        44_100
    );
}

#[test]
fn test_stream_end_clears_format_and_reports() {
    let (mut engine, mut rx, _sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    engine.handle_message(pcm_stream_start(48_000)).unwrap();
    drain(&mut rx);

    engine
        .handle_message(Message::StreamEnd(StreamSignal { roles: None }))
        .unwrap();

    assert!(engine.state().current_format().is_none());
    assert!(!engine.state().is_playing());
    let sent = drain(&mut rx);
    assert!(matches!(sent.last(), Some(Message::ClientState(_))));
}

#[test]
fn test_stream_signals_for_other_roles_are_ignored() {
    let (mut engine, mut rx, _sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    engine.handle_message(pcm_stream_start(48_000)).unwrap();
    let generation = engine.state().stream_generation();

    engine
        .handle_message(Message::StreamClear(StreamSignal {
            roles: Some(vec!["metadata".to_string()]),
        }))
        .unwrap();
    assert_eq!(engine.state().stream_generation(), generation);
    assert!(engine.state().is_playing());
}

#[test]
fn test_seek_drops_buffered_audio_but_keeps_playing() {
    let (mut engine, mut rx, sink) = new_engine();
    make_ready(&mut engine, &mut rx);
    synchronize(&mut engine, &mut rx);

    engine.handle_message(pcm_stream_start(48_000)).unwrap();
    let g_before = engine.state().stream_generation();

    // Two 20 ms chunks, comfortably in the future.
    engine.handle_binary(&pcm_chunk(30_000_000, 960)).unwrap();
    engine.handle_binary(&pcm_chunk(30_020_000, 960)).unwrap();
    assert!(engine.debounce_deadline().is_some());
    engine.on_debounce();
    assert_eq!(sink.active().len(), 2);

    engine
        .handle_message(Message::StreamClear(StreamSignal { roles: None }))
        .unwrap();

    assert!(engine.state().is_playing(), "seek must not stop playback");
    assert!(engine.state().current_format().is_some());
    assert_eq!(engine.state().stream_generation(), g_before + 1);
    assert!(sink.active().is_empty(), "pre-seek sources must be canceled");

    engine.handle_binary(&pcm_chunk(40_000_000, 960)).unwrap();
    engine.handle_binary(&pcm_chunk(40_020_000, 960)).unwrap();
    engine.on_debounce();

    assert_eq!(sink.active().len(), 2, "post-seek chunks must schedule");
    assert_eq!(sink.calls().len(), 4);
}

#[test]
fn test_time_reply_with_unknown_transmit_time_ignored() {
    let (mut engine, mut rx, _sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    for _ in 0..3 {
        engine.on_time_tick();
        let t1 = match rx.try_recv().unwrap() {
            Message::ClientTime(t) => t.client_transmitted,
            other => panic!("expected client/time, got {other:?}"),
        };
        engine
            .handle_message(Message::ServerTime(ServerTime {
                client_transmitted: t1 + 12_345,
                server_received: 0,
                server_transmitted: 0,
            }))
            .unwrap();
    }

    assert!(!engine.filter().is_synchronized());
}

#[test]
fn test_chunks_before_stream_start_are_dropped() {
    let (mut engine, mut rx, sink) = new_engine();
    make_ready(&mut engine, &mut rx);
    synchronize(&mut engine, &mut rx);

    engine.handle_binary(&pcm_chunk(30_000_000, 960)).unwrap();
    assert!(engine.debounce_deadline().is_none());
    assert!(sink.calls().is_empty());
}

#[test]
fn test_channel_close_resets_session() {
    let (mut engine, mut rx, sink) = new_engine();
    make_ready(&mut engine, &mut rx);
    synchronize(&mut engine, &mut rx);
    engine.handle_message(pcm_stream_start(48_000)).unwrap();

    engine.on_channel_closed();

    assert_eq!(engine.connection_state(), ConnectionState::Disconnected);
    assert!(!engine.filter().is_synchronized());
    assert!(engine.state().current_format().is_none());
    assert!(!engine.state().is_playing());
    assert!(sink.0.lock().unwrap().closed);
}

#[test]
fn test_hardware_volume_delegation() {
    use sendspin::audio::VolumeControl;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct FakeHardware(Arc<Mutex<(u8, bool)>>);

    impl VolumeControl for FakeHardware {
        fn set_volume(&mut self, volume: u8) {
            self.0.lock().unwrap().0 = volume;
        }
        fn set_muted(&mut self, muted: bool) {
            self.0.lock().unwrap().1 = muted;
        }
        fn volume(&self) -> u8 {
            self.0.lock().unwrap().0
        }
        fn muted(&self) -> bool {
            self.0.lock().unwrap().1
        }
    }

    let (tx, mut rx) = unbounded_channel();
    let sink = MockSink::new();
    let factory_sink = sink.clone();
    let mut config = ClientConfig::new("http://localhost:8927");
    config.use_hardware_volume = true;
    let hardware = FakeHardware(Arc::new(Mutex::new((80, false))));
    let mut engine = Engine::new(
        config,
        tx,
        Box::new(move |_format| Ok(factory_sink.clone())),
        Some(Box::new(hardware.clone())),
        Box::new(NullLatencyStore),
    );
    make_ready(&mut engine, &mut rx);
    engine.handle_message(pcm_stream_start(48_000)).unwrap();
    drain(&mut rx);

    engine
        .handle_message(Message::ServerCommand(ServerCommand {
            player: Some(PlayerCommand {
                command: "volume".to_string(),
                volume: Some(30),
                mute: None,
            }),
        }))
        .unwrap();

    // Delegated to hardware; the software gain stage stays at unity.
    assert_eq!(hardware.volume(), 30);
    assert_eq!(sink.0.lock().unwrap().gain, 1.0);

    // The report reads back through the hardware getter.
    let sent = drain(&mut rx);
    match &sent[0] {
        Message::ClientState(state) => assert_eq!(state.player.volume, 30),
        other => panic!("expected client/state, got {other:?}"),
    }
}

#[test]
fn test_goodbye_carries_reason() {
    let (mut engine, mut rx, _sink) = new_engine();
    make_ready(&mut engine, &mut rx);

    engine.disconnect(sendspin::GoodbyeReason::UserRequest);
    let sent = drain(&mut rx);
    match sent.last() {
        Some(Message::ClientGoodbye(goodbye)) => {
            assert_eq!(goodbye.reason, sendspin::GoodbyeReason::UserRequest);
        }
        other => panic!("expected client/goodbye, got {other:?}"),
    }
}
