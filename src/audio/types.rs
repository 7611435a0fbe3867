// ABOUTME: Core audio type definitions
// ABOUTME: Codec, AudioFormat, decoded AudioFrame, and binary chunk parsing

use crate::error::Error;

/// Audio codec type
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Codec {
    /// Uncompressed PCM audio
    Pcm,
    /// FLAC lossless compressed audio
    Flac,
    /// Opus compressed audio
    Opus,
}

impl Codec {
    /// Wire name of the codec.
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Pcm => "pcm",
            Codec::Flac => "flac",
            Codec::Opus => "opus",
        }
    }

    /// Parse a wire codec name.
    pub fn from_wire(name: &str) -> Result<Self, Error> {
        match name {
            "pcm" => Ok(Codec::Pcm),
            "flac" => Ok(Codec::Flac),
            "opus" => Ok(Codec::Opus),
            other => Err(Error::Protocol(format!("unknown codec: {other}"))),
        }
    }
}

/// Audio format created on stream/start and cleared on stream/end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    /// Audio codec used
    pub codec: Codec,
    /// Sample rate in Hz (e.g., 48000)
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u8,
    /// Bit depth per sample, for PCM payloads
    pub bit_depth: Option<u8>,
    /// Codec-specific initialization data, already base64-decoded
    pub codec_header: Option<Vec<u8>>,
}

/// A decoded frame of planar float samples with its server timestamp.
///
/// Frames are moved from the decode front-end into the scheduler; nothing
/// else holds onto them.
#[derive(Clone, Debug)]
pub struct AudioFrame {
    /// Planar sample data, one inner `Vec<f32>` per channel
    pub channels: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Server timestamp of the first sample, microseconds
    pub server_time: i64,
    /// Stream generation captured before the decode started
    pub generation: u32,
}

impl AudioFrame {
    /// Number of sample frames (per-channel samples).
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration of this frame in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Duration of this frame in microseconds, rounded.
    pub fn duration_us(&self) -> i64 {
        (self.duration_seconds() * 1e6).round() as i64
    }
}

/// Binary frame tag for "player role, slot 0, audio chunk": role 1 in bits
/// 7..2, slot 0 in bits 1..0.
const PLAYER_AUDIO_CHUNK_TAG: u8 = 0x04;

/// Audio chunk from the server (binary frame)
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Server timestamp of the first sample, microseconds
    pub server_time: i64,
    /// Opaque codec payload
    pub payload: Vec<u8>,
}

impl AudioChunk {
    /// Parse a WebSocket binary frame. Byte 0 is the role/slot tag, bytes
    /// 1..9 the big-endian signed server timestamp, the rest the payload.
    pub fn from_frame(frame: &[u8]) -> Result<Self, Error> {
        if frame.len() < 9 {
            return Err(Error::Protocol("audio chunk too short".to_string()));
        }

        if frame[0] != PLAYER_AUDIO_CHUNK_TAG {
            return Err(Error::Protocol(format!(
                "unexpected binary frame tag {:#04x}",
                frame[0]
            )));
        }

        let server_time = i64::from_be_bytes([
            frame[1], frame[2], frame[3], frame[4], frame[5], frame[6], frame[7], frame[8],
        ]);

        Ok(Self {
            server_time,
            payload: frame[9..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_parse() {
        let mut frame = vec![0x04];
        frame.extend_from_slice(&1_500_000i64.to_be_bytes());
        frame.extend_from_slice(&[1, 2, 3]);

        let chunk = AudioChunk::from_frame(&frame).unwrap();
        assert_eq!(chunk.server_time, 1_500_000);
        assert_eq!(chunk.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_chunk_rejects_wrong_tag() {
        let mut frame = vec![0x08];
        frame.extend_from_slice(&0i64.to_be_bytes());
        assert!(AudioChunk::from_frame(&frame).is_err());
    }

    #[test]
    fn test_chunk_rejects_short_frame() {
        assert!(AudioChunk::from_frame(&[0x04, 0, 0]).is_err());
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame {
            channels: vec![vec![0.0; 4800], vec![0.0; 4800]],
            sample_rate: 48_000,
            server_time: 0,
            generation: 0,
        };
        assert_eq!(frame.frame_count(), 4800);
        assert_eq!(frame.duration_us(), 100_000);
    }
}
