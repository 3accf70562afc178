use tokio::sync::mpsc;

use crate::config::CaptureConfig;
use crate::error::DeviceError;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the device was opened
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration covered by this frame
    pub fn duration_ms(&self) -> u64 {
        let per_ms = self.sample_rate as u64 * self.channels.max(1) as u64;
        if per_ms == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / per_ms
    }
}

/// Configuration for an input device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Requested sample rate
    pub sample_rate: u32,
    /// Requested channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 20,
        }
    }
}

impl From<&CaptureConfig> for DeviceConfig {
    fn from(cfg: &CaptureConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            channels: cfg.channels,
            ..Default::default()
        }
    }
}

/// Input device trait
///
/// Implementations:
/// - Microphone: default input device through cpal
/// - File: paced WAV playback (offline runs and tests)
#[async_trait::async_trait]
pub trait InputDevice: Send {
    /// Acquire the device
    ///
    /// Returns a channel receiver that will receive audio frames until `close`
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, DeviceError>;

    /// Release the device. Must be safe to call when not open.
    fn close(&mut self);

    /// Check if the device is currently held
    fn is_open(&self) -> bool;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Input source type
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Default microphone (all platforms)
    Microphone,
    /// WAV file input
    File(String),
}

/// Input device factory
pub struct InputDeviceFactory;

impl InputDeviceFactory {
    pub fn create(source: InputSource, config: DeviceConfig) -> Box<dyn InputDevice> {
        match source {
            InputSource::Microphone => Box::new(super::microphone::Microphone::new(config)),
            InputSource::File(path) => Box::new(super::file::FileInput::new(path, config)),
        }
    }
}
