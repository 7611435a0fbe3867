// ABOUTME: Audio types and processing for sendspin
// ABOUTME: Frame types, codec decoders, gain stage, and sink abstraction

/// Audio decoder implementations and the decode front-end
pub mod decode;
/// Lock-free volume/mute control and hardware-volume delegation
pub mod gain;
/// Audio sink abstraction and cpal implementation
pub mod output;
/// Core audio type definitions
pub mod types;

pub use decode::DecodeFrontEnd;
pub use gain::{GainControl, VolumeControl};
pub use output::{AudioSink, CpalSink, SourceId};
pub use types::{AudioChunk, AudioFormat, AudioFrame, Codec};
