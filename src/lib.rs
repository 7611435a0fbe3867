// ABOUTME: Main library entry point for sendspin
// ABOUTME: Exports public API for the Sendspin Protocol receiver core

//! # sendspin
//!
//! Receiver-side core of the Sendspin protocol for synchronized multi-room
//! audio streaming. A central server broadcasts one audio stream to many
//! devices; this crate fuses NTP-style time exchanges into a drift-aware
//! clock estimate, drives the receiver handshake and stream lifecycle, and
//! schedules decoded audio onto a host sink so every device plays in phase.

#![warn(missing_docs)]

/// Audio types, decoders, gain stage, and sink abstraction
pub mod audio;
/// Client configuration
pub mod config;
/// Persistence for the smoothed output-latency estimate
pub mod persist;
/// Protocol implementation for WebSocket communication
pub mod protocol;
/// Synchronized audio scheduler
pub mod scheduler;
/// Session state store and server-state diff merging
pub mod state;
/// Clock synchronization utilities
pub mod sync;

pub use config::ClientConfig;
pub use protocol::client::SendspinClient;
pub use protocol::engine::Engine;
pub use protocol::messages::{ClientHello, ControllerCommand, GoodbyeReason};
pub use scheduler::AudioScheduler;
pub use state::StateStore;
pub use sync::TimeFilter;

/// Result type for sendspin operations
pub type Result<T> = std::result::Result<T, error::Error>;

/// Error types for sendspin
pub mod error {
    use thiserror::Error;

    /// Error types for sendspin operations
    #[derive(Error, Debug)]
    pub enum Error {
        /// WebSocket-related error
        #[error("WebSocket error: {0}")]
        WebSocket(String),

        /// Protocol violation or parsing error
        #[error("Protocol error: {0}")]
        Protocol(String),

        /// Invalid message format received
        #[error("Invalid message format")]
        InvalidMessage,

        /// Connection-related error
        #[error("Connection error: {0}")]
        Connection(String),

        /// Audio output error
        #[error("Audio output error: {0}")]
        Output(String),

        /// Codec decode failure
        #[error("Decode error: {0}")]
        Decode(String),

        /// Command not in the server's supported set
        #[error("Unsupported command: {0}")]
        UnsupportedCommand(String),
    }
}
