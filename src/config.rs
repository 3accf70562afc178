use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-relay".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the assistant service, without the `/ws/{client-id}` suffix
    pub base_url: String,
    /// Identifier embedded in the endpoint; one connection per identifier
    pub client_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://127.0.0.1:8000".to_string(),
            client_id: format!("client-{}", uuid::Uuid::new_v4()),
        }
    }
}

/// Capture engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Length of one buffered slice
    pub slice_ms: u64,
    /// Recording ceiling used when the caller does not pass one
    pub max_duration_ms: u64,
    /// Period of the volume meter while recording
    pub meter_interval_ms: u64,
    /// Analysis window; must be a power of two
    pub fft_size: usize,
    /// Spectrum smoothing between analyser reads, in [0, 1)
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // the service resamples to 16kHz anyway
            channels: 1,
            slice_ms: 100,
            max_duration_ms: 5000,
            meter_interval_ms: 50,
            fft_size: 2048,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 3000,
        }
    }
}

impl Config {
    /// Load from a config file (extension optional) overlaid by
    /// `VOICE_RELAY__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("VOICE_RELAY").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    /// Like `load`, but falls back to defaults when the file does not exist
    pub fn load_or_default(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VOICE_RELAY").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    /// Full endpoint for this client: `{base-url}/ws/{client-id}`
    pub fn endpoint(&self) -> String {
        crate::protocol::endpoint_url(&self.server.base_url, &self.server.client_id)
    }
}
