use chrono::{DateTime, Utc};
use std::io::Cursor;
use tracing::{debug, info};

use super::device::AudioFrame;
use crate::error::CaptureError;

/// Media type of every non-empty payload
pub const PAYLOAD_MEDIA_TYPE: &str = "audio/wav";

/// Why a capture session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Caller called `stop_recording`
    Stopped,
    /// The recording ceiling fired
    Ceiling,
}

/// One finished recording
#[derive(Debug, Clone)]
pub struct AudioPayload {
    /// Encoded audio; empty when no slice was captured
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub slice_count: usize,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
    pub finish: FinishReason,
}

impl AudioPayload {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// A fixed-duration run of samples
#[derive(Debug, Clone)]
struct Slice {
    samples: Vec<i16>,
}

/// Buffers a session's audio in fixed time slices
///
/// Format is taken from the first frame; all slices share it.
pub struct SliceRecorder {
    slice_ms: u64,
    slices: Vec<Slice>,
    pending: Vec<i16>,
    format: Option<(u32, u16)>,
    started_at: DateTime<Utc>,
}

impl SliceRecorder {
    pub fn new(slice_ms: u64) -> Self {
        Self {
            slice_ms: slice_ms.max(1),
            slices: Vec::new(),
            pending: Vec::new(),
            format: None,
            started_at: Utc::now(),
        }
    }

    /// Number of completed slices
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    pub fn write_frame(&mut self, frame: &AudioFrame) {
        let (sample_rate, channels) = *self
            .format
            .get_or_insert((frame.sample_rate, frame.channels));

        if frame.sample_rate != sample_rate || frame.channels != channels {
            debug!(
                "Dropping frame with format {}Hz/{}ch (session is {}Hz/{}ch)",
                frame.sample_rate, frame.channels, sample_rate, channels
            );
            return;
        }

        let slice_len = self.slice_len();
        self.pending.extend_from_slice(&frame.samples);

        while self.pending.len() >= slice_len {
            let rest = self.pending.split_off(slice_len);
            let samples = std::mem::replace(&mut self.pending, rest);
            self.slices.push(Slice { samples });
        }
    }

    fn slice_len(&self) -> usize {
        let (sample_rate, channels) = self.format.unwrap_or((16000, 1));
        ((sample_rate as u64 * channels as u64 * self.slice_ms) / 1000).max(1) as usize
    }

    /// Flush the partial slice and assemble every slice into one payload
    pub fn finish(mut self, reason: FinishReason) -> Result<AudioPayload, CaptureError> {
        if !self.pending.is_empty() {
            let samples = std::mem::take(&mut self.pending);
            self.slices.push(Slice { samples });
        }

        let slice_count = self.slices.len();
        let (sample_rate, channels) = match self.format {
            Some(format) if slice_count > 0 => format,
            _ => {
                info!("Session finished with no audio ({:?})", reason);
                return Ok(AudioPayload {
                    bytes: Vec::new(),
                    media_type: PAYLOAD_MEDIA_TYPE.to_string(),
                    slice_count: 0,
                    duration_ms: 0,
                    recorded_at: self.started_at,
                    finish: reason,
                });
            }
        };

        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        let mut total_samples = 0usize;
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| CaptureError::Encoding(e.to_string()))?;

            for slice in &self.slices {
                for &sample in &slice.samples {
                    writer
                        .write_sample(sample)
                        .map_err(|e| CaptureError::Encoding(e.to_string()))?;
                }
                total_samples += slice.samples.len();
            }

            writer
                .finalize()
                .map_err(|e| CaptureError::Encoding(e.to_string()))?;
        }

        let duration_ms =
            total_samples as u64 * 1000 / (sample_rate as u64 * channels as u64).max(1);
        let bytes = cursor.into_inner();

        info!(
            "Session finished ({:?}): {} slices, {}ms, {} bytes",
            reason,
            slice_count,
            duration_ms,
            bytes.len()
        );

        Ok(AudioPayload {
            bytes,
            media_type: PAYLOAD_MEDIA_TYPE.to_string(),
            slice_count,
            duration_ms,
            recorded_at: self.started_at,
            finish: reason,
        })
    }
}
