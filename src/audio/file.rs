use hound::WavReader;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::device::{AudioFrame, DeviceConfig, InputDevice};
use crate::error::DeviceError;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).map_err(|e| {
            DeviceError::Unavailable(format!("Failed to open WAV file {}: {}", path.display(), e))
        })?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DeviceError::Unavailable(format!("Failed to read audio samples: {}", e)))?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split the file into frames of `frame_ms` each
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_ms = self.sample_rate as u64 * self.channels as u64;
        let frame_len = ((per_ms * frame_ms) / 1000).max(1) as usize;

        self.samples
            .chunks(frame_len)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Input device that replays a WAV file in real time, then idles until closed
pub struct FileInput {
    path: String,
    config: DeviceConfig,
    feeder: Option<JoinHandle<()>>,
}

impl FileInput {
    pub fn new(path: impl Into<String>, config: DeviceConfig) -> Self {
        Self {
            path: path.into(),
            config,
            feeder: None,
        }
    }
}

#[async_trait::async_trait]
impl InputDevice for FileInput {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, DeviceError> {
        if self.is_open() {
            return Err(DeviceError::Unavailable(format!("{} is already open", self.path)));
        }

        let file = AudioFile::open(&self.path)?;
        let frame_ms = self.config.frame_duration_ms.max(1);
        let frames = file.frames(frame_ms);
        let (tx, rx) = mpsc::channel(256);

        let feeder = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            for frame in frames {
                ticker.tick().await;
                if tx.send(frame).await.is_err() {
                    return;
                }
            }
            debug!("Audio file exhausted, holding device open");
            // Keep the sender alive so consumers see an idle device rather than a closed one
            tx.closed().await;
        });

        self.feeder = Some(feeder);
        Ok(rx)
    }

    fn close(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
            info!("Audio file input released: {}", self.path);
        }
    }

    fn is_open(&self) -> bool {
        self.feeder.is_some()
    }

    fn name(&self) -> &str {
        &self.path
    }
}

impl Drop for FileInput {
    fn drop(&mut self) {
        self.close();
    }
}
