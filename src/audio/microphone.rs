// Default-input-device capture through cpal
//
// cpal streams are not Send, so the stream lives on a dedicated thread that
// owns it until `close` drops the stop channel. Nothing logs from the audio
// callback; frames dropped under back-pressure are counted and reported on
// close.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::device::{AudioFrame, DeviceConfig, InputDevice};
use crate::error::DeviceError;

/// Microphone input device
pub struct Microphone {
    config: DeviceConfig,
    name: String,
    stop_tx: Option<std_mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl Microphone {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            name: "default input".to_string(),
            stop_tx: None,
            worker: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frames dropped since the device was opened because the consumer lagged
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl InputDevice for Microphone {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, DeviceError> {
        if self.is_open() {
            return Err(DeviceError::Unavailable(format!("{} is already open", self.name)));
        }

        let (frame_tx, frame_rx) = mpsc::channel(256);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let config = self.config.clone();
        self.dropped.store(0, Ordering::Relaxed);
        let dropped = Arc::clone(&self.dropped);

        let worker = std::thread::Builder::new()
            .name("voice-relay-mic".to_string())
            .spawn(move || match build_stream(&config, frame_tx, dropped) {
                Ok((stream, name)) => {
                    let _ = ready_tx.send(Ok(name));
                    // Blocks until `close` sends or drops the stop handle
                    let _ = stop_rx.recv();
                    drop(stream);
                    debug!("Microphone stream dropped");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| DeviceError::Unavailable(format!("Failed to spawn capture thread: {}", e)))?;

        let opened = ready_rx
            .await
            .map_err(|_| DeviceError::Unavailable("capture thread exited early".to_string()));

        let name = match opened.and_then(|r| r) {
            Ok(name) => name,
            Err(e) => {
                let _ = worker.join();
                return Err(e);
            }
        };

        info!(
            "Microphone opened: {} ({}Hz, {} channels requested)",
            name, self.config.sample_rate, self.config.channels
        );

        self.name = name;
        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);

        Ok(frame_rx)
    }

    fn close(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Microphone capture thread panicked");
            }

            let dropped = self.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                warn!("Dropped {} audio frames while the consumer lagged", dropped);
            }
            info!("Microphone released: {}", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_stream(
    config: &DeviceConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    dropped: Arc<AtomicU64>,
) -> Result<(cpal::Stream, String), DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| DeviceError::Unavailable("no default input device".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "default input".to_string());

    let (stream_config, sample_format) = pick_config(&device, config)?;
    let assembler = FrameAssembler::new(&stream_config, config.frame_duration_ms, frame_tx, dropped);

    let stream = match sample_format {
        SampleFormat::F32 => input_stream::<f32>(&device, &stream_config, assembler)?,
        SampleFormat::I16 => input_stream::<i16>(&device, &stream_config, assembler)?,
        SampleFormat::U16 => input_stream::<u16>(&device, &stream_config, assembler)?,
        other => {
            return Err(DeviceError::Unavailable(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream.play().map_err(|e| classify(e.to_string()))?;

    Ok((stream, name))
}

/// Prefer the requested rate and channel count, else the device default
fn pick_config(
    device: &cpal::Device,
    config: &DeviceConfig,
) -> Result<(StreamConfig, SampleFormat), DeviceError> {
    let wanted = cpal::SampleRate(config.sample_rate);

    if let Ok(ranges) = device.supported_input_configs() {
        for range in ranges {
            if range.channels() == config.channels
                && range.min_sample_rate() <= wanted
                && wanted <= range.max_sample_rate()
            {
                let supported = range.with_sample_rate(wanted);
                return Ok((supported.config(), supported.sample_format()));
            }
        }
    }

    let supported = device
        .default_input_config()
        .map_err(|e| classify(e.to_string()))?;

    debug!(
        "Requested {}Hz/{}ch unsupported, using device default {}Hz/{}ch",
        config.sample_rate,
        config.channels,
        supported.sample_rate().0,
        supported.channels()
    );

    Ok((supported.config(), supported.sample_format()))
}

fn input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut assembler: FrameAssembler,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample,
    i16: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                assembler.push(data.iter().map(|&s| cpal::Sample::to_sample::<i16>(s)));
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| classify(e.to_string()))
}

/// Map host error text onto the device error taxonomy
fn classify(message: String) -> DeviceError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        DeviceError::PermissionDenied
    } else {
        DeviceError::Unavailable(message)
    }
}

/// Cuts the callback's sample stream into fixed-duration frames
struct FrameAssembler {
    pending: Vec<i16>,
    frame_len: usize,
    sample_rate: u32,
    channels: u16,
    emitted: u64,
    tx: mpsc::Sender<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameAssembler {
    fn new(
        config: &StreamConfig,
        frame_duration_ms: u64,
        tx: mpsc::Sender<AudioFrame>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;
        let frame_len =
            ((sample_rate as u64 * channels as u64 * frame_duration_ms) / 1000).max(1) as usize;

        Self {
            pending: Vec::with_capacity(frame_len),
            frame_len,
            sample_rate,
            channels,
            emitted: 0,
            tx,
            dropped,
        }
    }

    fn push(&mut self, samples: impl Iterator<Item = i16>) {
        for sample in samples {
            self.pending.push(sample);
            if self.pending.len() >= self.frame_len {
                self.emit();
            }
        }
    }

    fn emit(&mut self) {
        let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_len));
        let per_ms = (self.sample_rate as u64 * self.channels as u64).max(1);
        let frame = AudioFrame {
            timestamp_ms: self.emitted * 1000 / per_ms,
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples,
        };
        self.emitted += frame.samples.len() as u64;

        if let Err(TrySendError::Full(_)) = self.tx.try_send(frame) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
