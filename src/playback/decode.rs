use base64::Engine;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::PlaybackError;

/// PCM ready for an output device
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Decode raw base64 or a `data:<mime>;base64,<payload>` URL
pub fn decode_base64(payload: &str) -> Result<DecodedAudio, PlaybackError> {
    let (mime, encoded) = split_data_url(payload)?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| PlaybackError::DecodeFailed(format!("invalid base64: {}", e)))?;

    decode_bytes(bytes, mime)
}

fn split_data_url(payload: &str) -> Result<(Option<&str>, &str), PlaybackError> {
    let Some(rest) = payload.strip_prefix("data:") else {
        return Ok((None, payload));
    };

    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| PlaybackError::DecodeFailed("data URL without payload".to_string()))?;

    let mut parts = header.split(';');
    let mime = parts.next().filter(|m| !m.is_empty());
    if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err(PlaybackError::DecodeFailed(
            "data URL is not base64-encoded".to_string(),
        ));
    }

    Ok((mime, body))
}

fn extension_for(mime: &str) -> Option<&'static str> {
    match mime {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/wave" | "audio/x-wav" => Some("wav"),
        "audio/ogg" => Some("ogg"),
        "audio/flac" => Some("flac"),
        "audio/aac" | "audio/mp4" => Some("m4a"),
        _ => None,
    }
}

/// Decode an encoded audio file held in memory
pub fn decode_bytes(bytes: Vec<u8>, mime: Option<&str>) -> Result<DecodedAudio, PlaybackError> {
    if bytes.is_empty() {
        return Err(PlaybackError::DecodeFailed("empty payload".to_string()));
    }

    let mut hint = Hint::new();
    if let Some(mime) = mime {
        hint.mime_type(mime);
        if let Some(ext) = extension_for(mime) {
            hint.with_extension(ext);
        }
    }

    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let probed = symphonia::default::get_probe()
        .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| PlaybackError::DecodeFailed(format!("unrecognized format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlaybackError::DecodeFailed("no audio track".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PlaybackError::DecodeFailed(format!("unsupported codec: {}", e)))?;

    let mut samples = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(PlaybackError::DecodeFailed(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(PlaybackError::DecodeFailed(e.to_string())),
        }
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(PlaybackError::DecodeFailed("no audio frames decoded".to_string()));
    }

    debug!(
        "Decoded {} samples ({}Hz, {} channels)",
        samples.len(),
        sample_rate,
        channels
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav_data_url() {
        let bytes = wav_bytes(&vec![1000; 8000], 16000);
        let url = format!(
            "data:audio/wav;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );

        let audio = decode_base64(&url).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.frames(), 8000);
        assert_eq!(audio.duration_ms(), 500);
    }

    #[test]
    fn test_decode_raw_base64_without_hint() {
        let bytes = wav_bytes(&vec![0; 1600], 16000);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let audio = decode_base64(&encoded).unwrap();
        assert_eq!(audio.frames(), 1600);
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            decode_base64("data:audio/mpeg;base64,@@@not-base64@@@"),
            Err(PlaybackError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_garbage_bytes() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"definitely not audio data");
        assert!(matches!(
            decode_base64(&encoded),
            Err(PlaybackError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_data_url_requires_base64() {
        assert!(matches!(
            decode_base64("data:audio/mpeg,rawbytes"),
            Err(PlaybackError::DecodeFailed(_))
        ));
        assert!(matches!(decode_base64(""), Err(PlaybackError::DecodeFailed(_))));
    }
}
