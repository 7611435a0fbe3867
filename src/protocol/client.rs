// ABOUTME: WebSocket client driving the protocol engine
// ABOUTME: Connection, event loop, periodic timers, and the command handle

use crate::audio::{CpalSink, VolumeControl};
use crate::config::{ClientConfig, STATE_REPORT_INTERVAL, TIME_SYNC_INTERVAL};
use crate::error::Error;
use crate::persist::{LatencyStore, NullLatencyStore};
use crate::protocol::engine::Engine;
use crate::protocol::messages::{ControllerCommand, GoodbyeReason, Message};
use crate::Result;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

enum ApiRequest {
    Command(ControllerCommand, oneshot::Sender<Result<()>>),
    SetVolume(u8),
    SetMute(bool),
    Disconnect(GoodbyeReason),
}

/// Cloneable handle for controlling a running [`SendspinClient`].
#[derive(Clone)]
pub struct ClientHandle {
    tx: UnboundedSender<ApiRequest>,
}

impl ClientHandle {
    /// Send a controller command. Fails when the controller does not
    /// support it or the client has stopped.
    pub async fn send_command(&self, command: ControllerCommand) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ApiRequest::Command(command, reply_tx))
            .map_err(|_| Error::Connection("client stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Connection("client stopped".to_string()))?
    }

    /// Set the local volume.
    pub fn set_volume(&self, volume: u8) {
        let _ = self.tx.send(ApiRequest::SetVolume(volume));
    }

    /// Set the local mute flag.
    pub fn set_mute(&self, muted: bool) {
        let _ = self.tx.send(ApiRequest::SetMute(muted));
    }

    /// Disconnect with a goodbye.
    pub fn disconnect(&self, reason: GoodbyeReason) {
        let _ = self.tx.send(ApiRequest::Disconnect(reason));
    }
}

/// WebSocket client for the Sendspin protocol.
///
/// Owns the connection and drives the [`Engine`] as a single cooperative
/// event loop: inbound frames, the two periodic timers, the scheduling
/// debounce, and API requests all land on the same task. `run` is not
/// `Send` (the audio sink lives on this task), so await it directly rather
/// than spawning it.
pub struct SendspinClient {
    engine: Engine<CpalSink>,
    read: WsRead,
    write: WsWrite,
    out_rx: UnboundedReceiver<Message>,
    api_rx: UnboundedReceiver<ApiRequest>,
    api_tx: UnboundedSender<ApiRequest>,
}

impl SendspinClient {
    /// Connect to the server named by `config.base_url`.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::connect_with(config, None, Box::new(NullLatencyStore)).await
    }

    /// Connect with an external hardware volume control and a latency store.
    pub async fn connect_with(
        config: ClientConfig,
        hardware_volume: Option<Box<dyn VolumeControl>>,
        latency_store: Box<dyn LatencyStore + Send>,
    ) -> Result<Self> {
        let url = derive_ws_url(&config.base_url)?;
        log::info!("connecting to {}", url);

        let (out_tx, out_rx) = unbounded_channel();
        let mut engine = Engine::new(
            config,
            out_tx,
            Box::new(|format| CpalSink::open(format)),
            hardware_volume,
            latency_store,
        );
        engine.on_connecting();

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        let (write, read) = ws_stream.split();

        let (api_tx, api_rx) = unbounded_channel();

        Ok(Self {
            engine,
            read,
            write,
            out_rx,
            api_rx,
            api_tx,
        })
    }

    /// Handle for sending commands while the event loop runs.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            tx: self.api_tx.clone(),
        }
    }

    /// Run the event loop until the connection closes.
    pub async fn run(mut self) -> Result<()> {
        self.engine.on_channel_open();

        let mut time_timer = tokio::time::interval(TIME_SYNC_INTERVAL);
        let mut state_timer = tokio::time::interval(STATE_REPORT_INTERVAL);

        loop {
            let debounce_at = self.engine.debounce_deadline();
            let debounce_sleep = tokio::time::sleep_until(
                debounce_at.unwrap_or_else(|| {
                    tokio::time::Instant::now() + Duration::from_secs(3600)
                }),
            );

            tokio::select! {
                frame = self.read.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Err(e) = self.engine.handle_text(&text) {
                            log::error!("session error: {}", e);
                            self.engine.on_channel_closed();
                            return Err(e);
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        if let Err(e) = self.engine.handle_binary(&data) {
                            log::error!("session error: {}", e);
                            self.engine.on_channel_closed();
                            return Err(e);
                        }
                    }
                    Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) | None => {
                        log::info!("server closed connection");
                        self.engine.on_channel_closed();
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::error!("WebSocket error: {}", e);
                        self.engine.on_channel_closed();
                        break;
                    }
                },
                Some(message) = self.out_rx.recv() => {
                    self.flush_outbound(message).await?;
                }
                Some(request) = self.api_rx.recv() => {
                    if self.handle_api(request).await? {
                        break;
                    }
                }
                _ = time_timer.tick() => self.engine.on_time_tick(),
                _ = state_timer.tick() => self.engine.on_state_tick(),
                _ = debounce_sleep, if debounce_at.is_some() => self.engine.on_debounce(),
            }
        }

        Ok(())
    }

    async fn flush_outbound(&mut self, message: Message) -> Result<()> {
        let json =
            serde_json::to_string(&message).map_err(|e| Error::Protocol(e.to_string()))?;
        self.write
            .send(WsMessage::Text(json))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    /// Returns true when the loop should stop.
    async fn handle_api(&mut self, request: ApiRequest) -> Result<bool> {
        match request {
            ApiRequest::Command(command, reply) => {
                let _ = reply.send(self.engine.send_command(command));
            }
            ApiRequest::SetVolume(volume) => {
                self.engine.set_volume(volume);
                self.engine.send_state_report();
            }
            ApiRequest::SetMute(muted) => {
                self.engine.set_mute(muted);
                self.engine.send_state_report();
            }
            ApiRequest::Disconnect(reason) => {
                self.engine.disconnect(reason);
                while let Ok(message) = self.out_rx.try_recv() {
                    self.flush_outbound(message).await?;
                }
                let _ = self.write.close().await;
                self.engine.on_channel_closed();
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Derive the WebSocket URL from a server base URL: HTTP upgrades to WS,
/// HTTPS to WSS, with the protocol path appended.
pub fn derive_ws_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        return Err(Error::Connection(format!(
            "unsupported URL scheme: {base_url}"
        )));
    };
    Ok(format!("{ws_base}/sendspin"))
}
