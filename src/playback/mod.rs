//! Reply audio playback
//!
//! The assistant returns synthesized speech as base64 (usually a
//! `data:audio/mpeg;base64,...` URL). `PlaybackHelper` decodes it and renders
//! it through an `AudioSink`, resolving when playback ends.

pub mod decode;
pub mod output;

pub use decode::{decode_base64, decode_bytes, DecodedAudio};
pub use output::{AudioSink, Speaker};

use tracing::{info, warn};

use crate::error::PlaybackError;

pub struct PlaybackHelper {
    sink: Box<dyn AudioSink>,
}

impl PlaybackHelper {
    /// Play through the default output device
    pub fn new() -> Self {
        Self::with_sink(Box::new(Speaker))
    }

    pub fn with_sink(sink: Box<dyn AudioSink>) -> Self {
        Self { sink }
    }

    /// Decode and play one payload. Calls are not serialized here; callers
    /// play at most one reply at a time.
    pub async fn play(&mut self, payload: &str) -> Result<(), PlaybackError> {
        let audio = decode_base64(payload).map_err(|e| {
            warn!("Reply audio rejected: {}", e);
            e
        })?;

        info!(
            "Playing reply audio: {}ms ({}Hz, {} channels)",
            audio.duration_ms(),
            audio.sample_rate,
            audio.channels
        );

        self.sink.play(audio).await.map_err(|e| {
            warn!("Playback failed: {}", e);
            e
        })?;

        info!("Reply playback finished");
        Ok(())
    }
}

impl Default for PlaybackHelper {
    fn default() -> Self {
        Self::new()
    }
}
