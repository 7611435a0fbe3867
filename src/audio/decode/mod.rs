// ABOUTME: Audio decoder implementations and the decode front-end
// ABOUTME: Dispatches binary chunks to PCM, FLAC, or Opus and stamps frames

/// FLAC decoder backed by symphonia
pub mod flac;
/// Opus decoder backed by the opus crate
pub mod opus;
/// PCM unpacking
pub mod pcm;

pub use flac::FlacDecoder;
pub use opus::OpusDecoder;
pub use pcm::PcmDecoder;

use crate::audio::{AudioFormat, AudioFrame, Codec};
use crate::error::Error;

/// Default bit depth assumed for PCM streams that do not announce one.
const DEFAULT_PCM_BIT_DEPTH: u8 = 16;

/// Decoder trait for audio codecs. Produces planar f32 channel buffers.
pub trait Decoder {
    /// Decode one chunk payload into planar samples.
    fn decode(&mut self, data: &[u8]) -> Result<Vec<Vec<f32>>, Error>;
}

enum ActiveDecoder {
    Pcm(PcmDecoder),
    Flac(FlacDecoder),
    Opus(OpusDecoder),
}

impl ActiveDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<Vec<f32>>, Error> {
        match self {
            ActiveDecoder::Pcm(d) => d.decode(data),
            ActiveDecoder::Flac(d) => d.decode(data),
            ActiveDecoder::Opus(d) => d.decode(data),
        }
    }
}

/// Decode front-end: holds the decoder for the current stream format and
/// turns binary chunk payloads into generation-stamped [`AudioFrame`]s.
pub struct DecodeFrontEnd {
    decoder: Option<ActiveDecoder>,
    sample_rate: u32,
}

impl DecodeFrontEnd {
    /// Create an idle front-end with no configured decoder.
    pub fn new() -> Self {
        Self {
            decoder: None,
            sample_rate: 0,
        }
    }

    /// (Re)build the decoder for a stream format. Called on stream/start,
    /// including format updates.
    pub fn configure(&mut self, format: &AudioFormat) -> Result<(), Error> {
        let decoder = match format.codec {
            Codec::Pcm => ActiveDecoder::Pcm(PcmDecoder::new(
                format.bit_depth.unwrap_or(DEFAULT_PCM_BIT_DEPTH),
                format.channels,
            )?),
            Codec::Flac => ActiveDecoder::Flac(FlacDecoder::new(format)?),
            Codec::Opus => ActiveDecoder::Opus(OpusDecoder::new(
                format.sample_rate,
                format.channels,
            )?),
        };
        self.decoder = Some(decoder);
        self.sample_rate = format.sample_rate;
        Ok(())
    }

    /// Release the decoder. Called on stream/end and session close.
    pub fn reset(&mut self) {
        self.decoder = None;
        self.sample_rate = 0;
    }

    /// Whether a decoder is configured.
    pub fn is_configured(&self) -> bool {
        self.decoder.is_some()
    }

    /// Decode one chunk payload into a frame stamped with `generation`.
    ///
    /// The generation must be captured before the decode starts; the caller
    /// compares it against the current one afterwards and drops stale frames.
    pub fn decode_chunk(
        &mut self,
        payload: &[u8],
        server_time: i64,
        generation: u32,
    ) -> Result<AudioFrame, Error> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| Error::Decode("no stream format configured".to_string()))?;

        let channels = decoder.decode(payload)?;

        Ok(AudioFrame {
            channels,
            sample_rate: self.sample_rate,
            server_time,
            generation,
        })
    }
}

impl Default for DecodeFrontEnd {
    fn default() -> Self {
        Self::new()
    }
}
