// ABOUTME: PCM decoder implementation
// ABOUTME: Unpacks 16/24/32-bit little-endian interleaved integers to f32

use crate::audio::decode::Decoder;
use crate::error::Error;

/// Synchronous PCM unpacker.
pub struct PcmDecoder {
    bit_depth: u8,
    channels: usize,
}

impl PcmDecoder {
    /// Create a decoder for the given bit depth and channel count.
    pub fn new(bit_depth: u8, channels: u8) -> Result<Self, Error> {
        match bit_depth {
            16 | 24 | 32 => Ok(Self {
                bit_depth,
                channels: channels.max(1) as usize,
            }),
            other => Err(Error::Decode(format!("unsupported PCM bit depth: {other}"))),
        }
    }

    fn deinterleave(&self, interleaved: Vec<f32>) -> Vec<Vec<f32>> {
        let frames = interleaved.len() / self.channels;
        let mut planar = vec![Vec::with_capacity(frames); self.channels];
        for (i, sample) in interleaved.into_iter().enumerate() {
            planar[i % self.channels].push(sample);
        }
        planar
    }
}

impl Decoder for PcmDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<Vec<f32>>, Error> {
        let interleaved: Vec<f32> = match self.bit_depth {
            16 => data
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32_768.0)
                .collect(),
            24 => data
                .chunks_exact(3)
                .map(|c| {
                    let raw = (c[0] as i32) | ((c[1] as i32) << 8) | ((c[2] as i32) << 16);
                    // Sign-extend from 24-bit
                    let value = (raw << 8) >> 8;
                    value as f32 / 8_388_608.0
                })
                .collect(),
            32 => data
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / 2_147_483_648.0)
                .collect(),
            _ => unreachable!("bit depth validated in new()"),
        };

        Ok(self.deinterleave(interleaved))
    }
}
