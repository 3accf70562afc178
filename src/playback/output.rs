// Audio output through cpal
//
// Like the microphone, the output stream is not Send; it is built and held on
// a blocking thread until the callback has rendered the last sample.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tracing::{debug, error};

use super::decode::DecodedAudio;
use crate::error::PlaybackError;

/// Where decoded reply audio is rendered
#[async_trait::async_trait]
pub trait AudioSink: Send {
    /// Resolves once playback has finished
    async fn play(&mut self, audio: DecodedAudio) -> Result<(), PlaybackError>;
}

/// Default output device
#[derive(Debug, Default)]
pub struct Speaker;

#[async_trait::async_trait]
impl AudioSink for Speaker {
    async fn play(&mut self, audio: DecodedAudio) -> Result<(), PlaybackError> {
        tokio::task::spawn_blocking(move || render(audio))
            .await
            .map_err(|e| PlaybackError::PlaybackFailed(format!("playback thread failed: {}", e)))?
    }
}

enum RenderEvent {
    Finished,
    Failed(String),
}

fn render(audio: DecodedAudio) -> Result<(), PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PlaybackError::PlaybackFailed("no default output device".to_string()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| PlaybackError::PlaybackFailed(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();

    let audio = adapt(audio, config.sample_rate.0, config.channels);
    let expected = Duration::from_millis(audio.duration_ms());
    let (event_tx, event_rx) = std_mpsc::channel();

    let stream = match sample_format {
        SampleFormat::F32 => output_stream::<f32>(&device, &config, audio, event_tx)?,
        SampleFormat::I16 => output_stream::<i16>(&device, &config, audio, event_tx)?,
        SampleFormat::U16 => output_stream::<u16>(&device, &config, audio, event_tx)?,
        other => {
            return Err(PlaybackError::PlaybackFailed(format!(
                "unsupported output format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| PlaybackError::PlaybackFailed(e.to_string()))?;

    let outcome = event_rx.recv_timeout(expected + Duration::from_secs(2));
    // Give the device one buffer to drain the tail
    std::thread::sleep(Duration::from_millis(50));
    drop(stream);

    match outcome {
        Ok(RenderEvent::Finished) => Ok(()),
        Ok(RenderEvent::Failed(e)) => Err(PlaybackError::PlaybackFailed(e)),
        Err(_) => Err(PlaybackError::PlaybackFailed(
            "output device stopped consuming samples".to_string(),
        )),
    }
}

fn output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    audio: DecodedAudio,
    event_tx: std_mpsc::Sender<RenderEvent>,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let samples = audio.samples;
    let mut position = 0usize;
    let mut finished = false;
    let error_tx = event_tx.clone();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    let sample = samples.get(position).copied().unwrap_or(0.0);
                    *out = T::from_sample(sample);
                    position += 1;
                }
                if position >= samples.len() && !finished {
                    finished = true;
                    let _ = event_tx.send(RenderEvent::Finished);
                }
            },
            move |err| {
                error!("Audio output error: {}", err);
                let _ = error_tx.send(RenderEvent::Failed(err.to_string()));
            },
            None,
        )
        .map_err(|e| PlaybackError::PlaybackFailed(e.to_string()))
}

/// Convert to the device's rate and channel count (nearest-sample resampling)
pub fn adapt(audio: DecodedAudio, sample_rate: u32, channels: u16) -> DecodedAudio {
    if audio.sample_rate == sample_rate && audio.channels == channels {
        return audio;
    }

    debug!(
        "Adapting playback {}Hz/{}ch -> {}Hz/{}ch",
        audio.sample_rate, audio.channels, sample_rate, channels
    );

    let in_channels = audio.channels.max(1) as usize;
    let out_channels = channels.max(1) as usize;
    let in_frames = audio.frames();
    let out_frames =
        (in_frames as u64 * sample_rate as u64 / audio.sample_rate.max(1) as u64) as usize;

    let mut samples = Vec::with_capacity(out_frames * out_channels);
    for frame in 0..out_frames {
        let src = ((frame as u64 * audio.sample_rate as u64) / sample_rate.max(1) as u64) as usize;
        let src = src.min(in_frames.saturating_sub(1));
        let base = src * in_channels;
        for ch in 0..out_channels {
            let sample = if in_channels == 1 {
                audio.samples[base]
            } else if ch < in_channels {
                audio.samples[base + ch]
            } else {
                // Extra output channels mirror the first input channel
                audio.samples[base]
            };
            samples.push(sample);
        }
    }

    DecodedAudio {
        samples,
        sample_rate,
        channels,
    }
}
