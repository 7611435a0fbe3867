// ABOUTME: Protocol implementation for the Sendspin WebSocket protocol
// ABOUTME: Message types, the engine state machine, and the client driver

/// WebSocket client and event loop
pub mod client;
/// Protocol state machine
pub mod engine;
/// Protocol message type definitions and serialization
pub mod messages;

pub use client::{ClientHandle, SendspinClient};
pub use engine::{ConnectionState, Engine};
pub use messages::Message;
