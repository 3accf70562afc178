//! Push-to-talk capture engine
//!
//! Owns the input device, the analysis path fed from it, and at most one
//! recording session. A pump task routes every device frame into the analyser
//! and, while a session is live, into its slice recorder. Each session arms a
//! ceiling timer and a volume meter; both are torn down on every exit path.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::analyser::Analyser;
use super::device::InputDevice;
use super::slices::{AudioPayload, FinishReason, SliceRecorder};
use crate::config::CaptureConfig;
use crate::error::{CaptureError, StateError};

/// Capture session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Finalizing,
}

struct ActiveSession {
    id: u64,
    recorder: SliceRecorder,
    ceiling: Option<JoinHandle<()>>,
    meter: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn cancel_timers(&mut self) {
        if let Some(ceiling) = self.ceiling.take() {
            ceiling.abort();
        }
        if let Some(meter) = self.meter.take() {
            meter.abort();
        }
    }
}

struct Shared {
    state: CaptureState,
    analyser: Option<Analyser>,
    session: Option<ActiveSession>,
    next_session_id: u64,
}

impl Shared {
    fn volume(&self) -> u8 {
        self.analyser.as_ref().map(Analyser::volume).unwrap_or(0)
    }
}

pub struct AudioCaptureEngine {
    config: CaptureConfig,
    device: Box<dyn InputDevice>,
    shared: Arc<Mutex<Shared>>,
    pump: Option<JoinHandle<()>>,
    meter_tx: Arc<watch::Sender<u8>>,
    completion_tx: mpsc::UnboundedSender<AudioPayload>,
    completion_rx: Option<mpsc::UnboundedReceiver<AudioPayload>>,
}

impl AudioCaptureEngine {
    pub fn new(config: CaptureConfig, device: Box<dyn InputDevice>) -> Self {
        let (meter_tx, _) = watch::channel(0u8);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        Self {
            config,
            device,
            shared: Arc::new(Mutex::new(Shared {
                state: CaptureState::Idle,
                analyser: None,
                session: None,
                next_session_id: 0,
            })),
            pump: None,
            meter_tx: Arc::new(meter_tx),
            completion_tx,
            completion_rx: Some(completion_rx),
        }
    }

    /// Acquire the input device and build the analysis path. No-op when
    /// already initialized.
    pub async fn initialize(&mut self) -> Result<(), CaptureError> {
        if self.is_initialized() {
            debug!("Capture engine already initialized");
            return Ok(());
        }

        info!("Acquiring input device: {}", self.device.name());

        let mut frames = self.device.open().await.map_err(|e| {
            warn!("Failed to acquire input device: {}", e);
            e
        })?;

        self.shared.lock().analyser = Some(Analyser::new(&self.config));

        let shared = Arc::clone(&self.shared);
        self.pump = Some(tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let mut guard = shared.lock();
                if let Some(analyser) = guard.analyser.as_mut() {
                    analyser.push_frame(&frame);
                }
                if let Some(session) = guard.session.as_mut() {
                    session.recorder.write_frame(&frame);
                }
            }
            debug!("Input frame stream ended");
        }));

        info!("Capture engine initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.pump.is_some()
    }

    /// Instantaneous loudness in [0, 100]; 0 when not initialized
    pub fn get_volume(&self) -> u8 {
        self.shared.lock().volume()
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state
    }

    pub fn is_recording(&self) -> bool {
        self.state() == CaptureState::Recording
    }

    /// Periodic volume samples, published only while recording
    pub fn volume_meter(&self) -> watch::Receiver<u8> {
        self.meter_tx.subscribe()
    }

    /// Payloads finalized by the recording ceiling. Can be taken once.
    pub fn take_completions(&mut self) -> Option<mpsc::UnboundedReceiver<AudioPayload>> {
        self.completion_rx.take()
    }

    /// Start a session bounded by the configured ceiling
    pub fn start_recording(&self) -> Result<(), CaptureError> {
        self.start_recording_for(Duration::from_millis(self.config.max_duration_ms))
    }

    /// Start a session that finalizes itself after `max_duration`
    pub fn start_recording_for(&self, max_duration: Duration) -> Result<(), CaptureError> {
        if !self.is_initialized() {
            return Err(StateError::NotInitialized.into());
        }

        let id = {
            let mut guard = self.shared.lock();
            if guard.state != CaptureState::Idle {
                return Err(StateError::AlreadyRecording.into());
            }

            let id = guard.next_session_id;
            guard.next_session_id += 1;
            guard.session = Some(ActiveSession {
                id,
                recorder: SliceRecorder::new(self.config.slice_ms),
                ceiling: None,
                meter: None,
            });
            guard.state = CaptureState::Recording;
            id
        };

        let ceiling = self.spawn_ceiling(id, max_duration);
        let meter = self.spawn_meter(id);

        {
            let mut guard = self.shared.lock();
            match guard.session.as_mut() {
                Some(session) if session.id == id => {
                    session.ceiling = Some(ceiling);
                    session.meter = Some(meter);
                }
                // Ended before the timers were attached
                _ => {
                    ceiling.abort();
                    meter.abort();
                }
            }
        }

        info!(
            "Recording started (session {}, ceiling {}ms)",
            id,
            max_duration.as_millis()
        );
        Ok(())
    }

    /// Finalize the live session and return its payload
    pub async fn stop_recording(&self) -> Result<AudioPayload, CaptureError> {
        // Let the pump drain frames already delivered by the device
        tokio::task::yield_now().await;

        let recorder = {
            let mut guard = self.shared.lock();
            if guard.state != CaptureState::Recording {
                return Err(StateError::NotRecording.into());
            }
            take_session(&mut guard, None)
        };

        match recorder {
            Some(recorder) => finalize(&self.shared, &self.meter_tx, recorder, FinishReason::Stopped),
            None => Err(StateError::NotRecording.into()),
        }
    }

    /// Stop any session, release the device and analysis path. Safe to call
    /// repeatedly or before `initialize`.
    pub fn cleanup(&mut self) {
        {
            let mut guard = self.shared.lock();
            if let Some(mut session) = guard.session.take() {
                session.cancel_timers();
                info!(
                    "Discarding in-flight session {} ({} slices) on cleanup",
                    session.id,
                    session.recorder.slice_count()
                );
            }
            guard.state = CaptureState::Idle;
            guard.analyser = None;
        }

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        if self.device.is_open() {
            self.device.close();
            info!("Input device released");
        }

        self.meter_tx.send_replace(0);
    }

    fn spawn_ceiling(&self, id: u64, max_duration: Duration) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let meter_tx = Arc::clone(&self.meter_tx);
        let completion_tx = self.completion_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(max_duration).await;

            let recorder = {
                let mut guard = shared.lock();
                if guard.state != CaptureState::Recording {
                    return;
                }
                take_session(&mut guard, Some(id))
            };

            let Some(recorder) = recorder else {
                return;
            };

            info!("Recording ceiling reached for session {}", id);

            match finalize(&shared, &meter_tx, recorder, FinishReason::Ceiling) {
                Ok(payload) => {
                    if completion_tx.send(payload).is_err() {
                        warn!("No listener for ceiling-finalized payload");
                    }
                }
                Err(e) => warn!("Failed to finalize session {} at ceiling: {}", id, e),
            }
        })
    }

    fn spawn_meter(&self, id: u64) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let meter_tx = Arc::clone(&self.meter_tx);
        let period = Duration::from_millis(self.config.meter_interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let volume = {
                    let guard = shared.lock();
                    match &guard.session {
                        Some(session) if session.id == id => {}
                        _ => return,
                    }
                    guard.volume()
                };
                meter_tx.send_replace(volume);
            }
        })
    }
}

impl Drop for AudioCaptureEngine {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Detach the live session and move to Finalizing.
///
/// `from_ceiling` carries the session id when the ceiling task is the caller;
/// its own handle is dropped rather than aborted.
fn take_session(shared: &mut Shared, from_ceiling: Option<u64>) -> Option<SliceRecorder> {
    let mut session = shared.session.take()?;

    if let Some(id) = from_ceiling {
        if session.id != id {
            shared.session = Some(session);
            return None;
        }
        session.ceiling.take();
    }

    session.cancel_timers();
    shared.state = CaptureState::Finalizing;
    Some(session.recorder)
}

fn finalize(
    shared: &Mutex<Shared>,
    meter_tx: &watch::Sender<u8>,
    recorder: SliceRecorder,
    reason: FinishReason,
) -> Result<AudioPayload, CaptureError> {
    let result = recorder.finish(reason);

    shared.lock().state = CaptureState::Idle;
    meter_tx.send_replace(0);

    result
}
