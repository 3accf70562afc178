// Integration tests for reply playback, rendered into in-memory sinks

use base64::Engine;
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::Arc;
use voice_relay::error::PlaybackError;
use voice_relay::playback::{AudioSink, DecodedAudio, PlaybackHelper};

#[derive(Clone, Default)]
struct RecordingSink {
    played: Arc<Mutex<Vec<DecodedAudio>>>,
}

#[async_trait::async_trait]
impl AudioSink for RecordingSink {
    async fn play(&mut self, audio: DecodedAudio) -> Result<(), PlaybackError> {
        self.played.lock().push(audio);
        Ok(())
    }
}

struct BrokenSpeaker;

#[async_trait::async_trait]
impl AudioSink for BrokenSpeaker {
    async fn play(&mut self, _audio: DecodedAudio) -> Result<(), PlaybackError> {
        Err(PlaybackError::PlaybackFailed("device unplugged".to_string()))
    }
}

fn wav_base64(samples: &[i16], sample_rate: u32, channels: u16) -> String {
    let spec = hound::WavSpec {
        channels,
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
    base64::engine::general_purpose::STANDARD.encode(cursor.into_inner())
}

#[tokio::test]
async fn test_play_data_url() {
    let sink = RecordingSink::default();
    let mut helper = PlaybackHelper::with_sink(Box::new(sink.clone()));

    let payload = format!("data:audio/wav;base64,{}", wav_base64(&vec![4000; 24000], 24000, 1));
    helper.play(&payload).await.unwrap();

    let played = sink.played.lock();
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].sample_rate, 24000);
    assert_eq!(played[0].channels, 1);
    assert_eq!(played[0].duration_ms(), 1000);
}

#[tokio::test]
async fn test_play_raw_base64_stereo() {
    let sink = RecordingSink::default();
    let mut helper = PlaybackHelper::with_sink(Box::new(sink.clone()));

    helper.play(&wav_base64(&vec![0; 9600], 48000, 2)).await.unwrap();

    let played = sink.played.lock();
    assert_eq!(played[0].channels, 2);
    assert_eq!(played[0].frames(), 4800);
}

#[tokio::test]
async fn test_undecodable_payload_is_rejected() {
    let sink = RecordingSink::default();
    let mut helper = PlaybackHelper::with_sink(Box::new(sink.clone()));

    let err = helper.play("data:audio/mpeg;base64,AAAA").await.unwrap_err();
    assert!(matches!(err, PlaybackError::DecodeFailed(_)));

    let err = helper.play("%%%").await.unwrap_err();
    assert!(matches!(err, PlaybackError::DecodeFailed(_)));

    assert!(sink.played.lock().is_empty(), "nothing reaches the device");
}

#[tokio::test]
async fn test_device_failure_is_reported() {
    let mut helper = PlaybackHelper::with_sink(Box::new(BrokenSpeaker));

    let err = helper.play(&wav_base64(&[100; 160], 16000, 1)).await.unwrap_err();
    assert_eq!(err, PlaybackError::PlaybackFailed("device unplugged".to_string()));
}

#[tokio::test]
async fn test_sequential_replies_play_in_order() {
    let sink = RecordingSink::default();
    let mut helper = PlaybackHelper::with_sink(Box::new(sink.clone()));

    helper.play(&wav_base64(&vec![0; 1600], 16000, 1)).await.unwrap();
    helper.play(&wav_base64(&vec![0; 2400], 24000, 1)).await.unwrap();

    let rates: Vec<u32> = sink.played.lock().iter().map(|a| a.sample_rate).collect();
    assert_eq!(rates, vec![16000, 24000]);
}
