use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::stats::ExchangeStats;
use crate::audio::{AudioCaptureEngine, AudioPayload};
use crate::error::CaptureError;
use crate::protocol::RealtimeClient;

pub struct PushToTalk {
    engine: AudioCaptureEngine,
    client: Arc<RealtimeClient>,
    ceiling: Duration,
    completions: Option<mpsc::UnboundedReceiver<AudioPayload>>,
    stats: ExchangeStats,
}

impl PushToTalk {
    pub fn new(mut engine: AudioCaptureEngine, client: Arc<RealtimeClient>, ceiling: Duration) -> Self {
        let completions = engine.take_completions();

        Self {
            engine,
            client,
            ceiling,
            completions,
            stats: ExchangeStats::default(),
        }
    }

    /// Initialize the engine on first use and start a bounded session
    pub async fn start_listening(&mut self) -> Result<(), CaptureError> {
        self.engine.initialize().await?;
        self.engine.start_recording_for(self.ceiling)?;
        self.stats.sessions += 1;

        info!("Listening (session {})", self.stats.sessions);
        Ok(())
    }

    /// Stop the session and send its payload if the client is connected
    pub async fn stop_listening(&mut self) -> Result<AudioPayload, CaptureError> {
        let payload = self.engine.stop_recording().await?;
        self.deliver(&payload);
        Ok(payload)
    }

    /// Wait for the next payload finalized by the ceiling and send it
    pub async fn next_ceiling_payload(&mut self) -> Option<AudioPayload> {
        let payload = self.completions.as_mut()?.recv().await?;
        self.deliver(&payload);
        Some(payload)
    }

    fn deliver(&mut self, payload: &AudioPayload) -> bool {
        if payload.is_empty() {
            debug!("Empty recording, nothing to send");
            self.stats.payloads_dropped += 1;
            return false;
        }

        if !self.client.send_audio_binary(payload.bytes.clone()) {
            warn!(
                "Not connected, recording of {} bytes was not sent",
                payload.len()
            );
            self.stats.payloads_dropped += 1;
            return false;
        }

        self.stats.payloads_sent += 1;
        self.stats.bytes_sent += payload.len();
        self.stats.last_sent_at = Some(Utc::now());

        info!(
            "Sent recording: {} bytes, {}ms ({:?})",
            payload.len(),
            payload.duration_ms,
            payload.finish
        );
        true
    }

    pub fn is_listening(&self) -> bool {
        self.engine.is_recording()
    }

    pub fn volume(&self) -> u8 {
        self.engine.get_volume()
    }

    pub fn volume_meter(&self) -> watch::Receiver<u8> {
        self.engine.volume_meter()
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.client.send_text(text)
    }

    pub fn clear_history(&self) -> bool {
        self.client.clear_history()
    }

    pub fn request_reminders(&self) -> bool {
        self.client.request_reminders()
    }

    pub fn stats(&self) -> ExchangeStats {
        self.stats.clone()
    }

    /// Release the device and close the connection
    pub fn shutdown(&mut self) {
        self.engine.cleanup();
        self.client.disconnect();
        info!(
            "Push-to-talk shut down: {} sessions, {} payloads sent ({} bytes)",
            self.stats.sessions, self.stats.payloads_sent, self.stats.bytes_sent
        );
    }
}
