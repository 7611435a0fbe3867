// ABOUTME: Opus decoder implementation
// ABOUTME: Wraps the opus crate, interleaved f32 out, deinterleaved to planar

use crate::audio::decode::Decoder;
use crate::error::Error;
use opus::Channels;

/// Largest Opus frame: 120 ms at 48 kHz.
const MAX_FRAME_SAMPLES: usize = 48_000 * 120 / 1_000;

/// Opus packet decoder.
pub struct OpusDecoder {
    inner: opus::Decoder,
    channels: usize,
    // Reused across packets to keep the decode path allocation-light.
    interleaved: Vec<f32>,
}

impl OpusDecoder {
    /// Create a decoder for the given sample rate and channel count.
    pub fn new(sample_rate: u32, channels: u8) -> Result<Self, Error> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            other => {
                return Err(Error::Decode(format!(
                    "unsupported Opus channel count: {other}"
                )))
            }
        };

        let inner = opus::Decoder::new(sample_rate, opus_channels)
            .map_err(|e| Error::Decode(format!("Opus decoder init: {e}")))?;

        Ok(Self {
            inner,
            channels: channels as usize,
            interleaved: vec![0.0; MAX_FRAME_SAMPLES * channels as usize],
        })
    }
}

impl Decoder for OpusDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<Vec<f32>>, Error> {
        let frames = self
            .inner
            .decode_float(data, &mut self.interleaved, false)
            .map_err(|e| Error::Decode(format!("Opus packet: {e}")))?;

        let mut planar = vec![Vec::with_capacity(frames); self.channels];
        for frame in 0..frames {
            for (ch, out) in planar.iter_mut().enumerate() {
                out.push(self.interleaved[frame * self.channels + ch]);
            }
        }
        Ok(planar)
    }
}
