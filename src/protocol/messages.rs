// ABOUTME: Protocol message type definitions and serialization
// ABOUTME: client/hello, server/time, stream lifecycle, commands, goodbye

use crate::state::PlayerSyncState;
use serde::{Deserialize, Serialize};

/// Top-level protocol message envelope: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    /// Client hello handshake message
    #[serde(rename = "client/hello")]
    ClientHello(ClientHello),

    /// Server hello handshake response
    #[serde(rename = "server/hello")]
    ServerHello(ServerHello),

    /// Client time synchronization request
    #[serde(rename = "client/time")]
    ClientTime(ClientTime),

    /// Server time synchronization response
    #[serde(rename = "server/time")]
    ServerTime(ServerTime),

    /// Player state report from client
    #[serde(rename = "client/state")]
    ClientState(ClientState),

    /// Server state diff, merged into the cached copy
    #[serde(rename = "server/state")]
    ServerState(serde_json::Value),

    /// Command from server to this player
    #[serde(rename = "server/command")]
    ServerCommand(ServerCommand),

    /// Command from this client to the group controller
    #[serde(rename = "client/command")]
    ClientCommand(ClientCommand),

    /// Stream start (or format update) notification
    #[serde(rename = "stream/start")]
    StreamStart(StreamStart),

    /// Flush buffered audio without ending the stream
    #[serde(rename = "stream/clear")]
    StreamClear(StreamSignal),

    /// End of stream
    #[serde(rename = "stream/end")]
    StreamEnd(StreamSignal),

    /// Group state diff, merged into the cached copy
    #[serde(rename = "group/update")]
    GroupUpdate(serde_json::Value),

    /// Orderly departure notice
    #[serde(rename = "client/goodbye")]
    ClientGoodbye(ClientGoodbye),
}

/// Client hello message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHello {
    /// Unique client identifier
    pub client_id: String,
    /// Human-readable client name
    pub name: String,
    /// Protocol version number
    pub version: u32,
    /// Supported roles, e.g. "player@v1"
    pub supported_roles: Vec<String>,
    /// Device information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    /// Player capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_support: Option<PlayerSupport>,
}

/// Device information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Product name
    pub product_name: String,
    /// Manufacturer name
    pub manufacturer: String,
    /// Software version string
    pub software_version: String,
}

/// Player capabilities advertised in the hello
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSupport {
    /// Supported audio formats, highest preference first
    pub supported_formats: Vec<AudioFormatSpec>,
    /// Accepted buffer size in bytes
    pub buffer_capacity: u32,
    /// Playback commands this player accepts
    pub supported_commands: Vec<String>,
}

/// One advertised audio format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFormatSpec {
    /// Codec name ("pcm", "flac", "opus")
    pub codec: String,
    /// Number of audio channels
    pub channels: u8,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bit depth per sample
    pub bit_depth: u8,
}

/// Server hello. The payload may be empty; identification fields are
/// informational when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerHello {
    /// Unique server identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Human-readable server name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Protocol version number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// Client time sync request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientTime {
    /// Client transmission timestamp, local microseconds (T1)
    pub client_transmitted: i64,
}

/// Server time sync response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTime {
    /// Echo of the request's T1
    pub client_transmitted: i64,
    /// Server reception timestamp, server microseconds (T2)
    pub server_received: i64,
    /// Server transmission timestamp, server microseconds (T3)
    pub server_transmitted: i64,
}

/// Player state report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientState {
    /// Player role payload
    pub player: PlayerStateReport,
}

/// The player portion of a `client/state`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStateReport {
    /// Synchronization state
    pub state: PlayerSyncState,
    /// Volume, 0..=100
    pub volume: u8,
    /// Mute flag
    pub muted: bool,
}

/// Command from server to this player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCommand {
    /// Player branch; other roles are ignored by this client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerCommand>,
}

/// The player branch of a server command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerCommand {
    /// "volume" or "mute"
    pub command: String,
    /// Volume argument for "volume"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    /// Mute argument for "mute"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
}

/// Command from this client to the group controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCommand {
    /// Controller branch
    pub controller: ControllerCommandPayload,
}

/// Wire form of a controller command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerCommandPayload {
    /// Command name
    pub command: String,
    /// Volume argument for "volume"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    /// Mute argument for "mute"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
}

/// Controller commands a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCommand {
    /// Start playback
    Play,
    /// Pause playback
    Pause,
    /// Stop playback
    Stop,
    /// Skip to the next item
    Next,
    /// Skip to the previous item
    Previous,
    /// Set the group volume
    Volume(u8),
    /// Set the group mute flag
    Mute(bool),
    /// Disable repeat
    RepeatOff,
    /// Repeat the current item
    RepeatOne,
    /// Repeat the whole queue
    RepeatAll,
    /// Enable shuffle
    Shuffle,
    /// Disable shuffle
    Unshuffle,
    /// Switch the active source
    Switch,
}

impl ControllerCommand {
    /// Wire name used both on the wire and in `supported_commands` lists.
    pub fn name(&self) -> &'static str {
        match self {
            ControllerCommand::Play => "play",
            ControllerCommand::Pause => "pause",
            ControllerCommand::Stop => "stop",
            ControllerCommand::Next => "next",
            ControllerCommand::Previous => "previous",
            ControllerCommand::Volume(_) => "volume",
            ControllerCommand::Mute(_) => "mute",
            ControllerCommand::RepeatOff => "repeat_off",
            ControllerCommand::RepeatOne => "repeat_one",
            ControllerCommand::RepeatAll => "repeat_all",
            ControllerCommand::Shuffle => "shuffle",
            ControllerCommand::Unshuffle => "unshuffle",
            ControllerCommand::Switch => "switch",
        }
    }

    /// Build the wire payload.
    pub fn to_payload(self) -> ControllerCommandPayload {
        let (volume, mute) = match self {
            ControllerCommand::Volume(v) => (Some(v.min(100)), None),
            ControllerCommand::Mute(m) => (None, Some(m)),
            _ => (None, None),
        };
        ControllerCommandPayload {
            command: self.name().to_string(),
            volume,
            mute,
        }
    }
}

/// Stream start message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStart {
    /// Player stream parameters
    pub player: StreamParams,
}

/// Stream parameters carried by stream/start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamParams {
    /// Codec name
    pub codec: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of audio channels
    pub channels: u8,
    /// Bit depth per sample, for PCM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<u8>,
    /// Codec-specific header, base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_header: Option<String>,
}

/// stream/clear and stream/end payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamSignal {
    /// Roles the signal applies to; absent means all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl StreamSignal {
    /// Whether the signal addresses the player role.
    pub fn applies_to_player(&self) -> bool {
        match &self.roles {
            None => true,
            Some(roles) => roles.iter().any(|r| r == "player"),
        }
    }
}

/// Orderly departure notice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientGoodbye {
    /// Why the client is leaving
    pub reason: GoodbyeReason,
}

/// Reason carried by `client/goodbye`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoodbyeReason {
    /// Switching to a different server
    AnotherServer,
    /// Device is shutting down
    Shutdown,
    /// Client is restarting
    Restart,
    /// The user asked to disconnect
    UserRequest,
}
