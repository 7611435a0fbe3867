// ABOUTME: FLAC decoder implementation backed by symphonia
// ABOUTME: Feeds whole FLAC frames as packets, using codec_header STREAMINFO

use crate::audio::decode::Decoder;
use crate::audio::AudioFormat;
use crate::error::Error;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{
    CodecParameters, Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_FLAC,
};
use symphonia::core::formats::Packet;

/// Size of a FLAC STREAMINFO metadata block body.
const STREAMINFO_LEN: usize = 34;

/// FLAC frame decoder. Each binary chunk payload is one complete FLAC
/// frame; stream parameters come from the format's `codec_header`.
pub struct FlacDecoder {
    inner: Box<dyn SymphoniaDecoder>,
}

impl FlacDecoder {
    /// Build a decoder for the given stream format.
    pub fn new(format: &AudioFormat) -> Result<Self, Error> {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_FLAC)
            .with_sample_rate(format.sample_rate);

        if let Some(header) = format.codec_header.as_deref() {
            params.with_extra_data(streaminfo_block(header).into());
        }

        let inner = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("FLAC decoder init: {e}")))?;

        Ok(Self { inner })
    }
}

/// Extract the STREAMINFO block body from a codec header. Servers send the
/// full stream preamble (`fLaC` magic + metadata block header + body);
/// symphonia wants only the 34-byte body.
fn streaminfo_block(header: &[u8]) -> Vec<u8> {
    if header.starts_with(b"fLaC") && header.len() >= 8 + STREAMINFO_LEN {
        header[8..8 + STREAMINFO_LEN].to_vec()
    } else {
        header.to_vec()
    }
}

impl Decoder for FlacDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<Vec<f32>>, Error> {
        let packet = Packet::new_from_slice(0, 0, 0, data);
        let decoded = self
            .inner
            .decode(&packet)
            .map_err(|e| Error::Decode(format!("FLAC frame: {e}")))?;
        Ok(planar_f32(decoded))
    }
}

fn planar_f32(buffer: AudioBufferRef<'_>) -> Vec<Vec<f32>> {
    match buffer {
        AudioBufferRef::F32(buf) => {
            let channels = buf.spec().channels.count();
            (0..channels).map(|c| buf.chan(c).to_vec()).collect()
        }
        AudioBufferRef::S32(buf) => {
            let channels = buf.spec().channels.count();
            (0..channels)
                .map(|c| {
                    buf.chan(c)
                        .iter()
                        .map(|&s| s as f32 / 2_147_483_648.0)
                        .collect()
                })
                .collect()
        }
        AudioBufferRef::S16(buf) => {
            let channels = buf.spec().channels.count();
            (0..channels)
                .map(|c| buf.chan(c).iter().map(|&s| s as f32 / 32_768.0).collect())
                .collect()
        }
        other => {
            log::warn!("FLAC: unexpected sample format, emitting silence");
            let channels = other.spec().channels.count();
            vec![vec![0.0; other.frames()]; channels]
        }
    }
}
