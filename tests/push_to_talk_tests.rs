// End-to-end push-to-talk flow: scripted microphone in, fake assistant out

mod common;

use common::{noise, scripted_input, settle, FakeConnector, Handshake, InputHandle};
use std::sync::Arc;
use std::time::Duration;
use voice_relay::audio::{AudioCaptureEngine, FinishReason};
use voice_relay::config::CaptureConfig;
use voice_relay::error::{CaptureError, StateError};
use voice_relay::protocol::{DispatchTable, Frame, RealtimeClient, ReconnectPolicy};
use voice_relay::session::PushToTalk;

fn setup(script: Vec<Handshake>, ceiling: Duration) -> (PushToTalk, InputHandle, Arc<FakeConnector>, Arc<RealtimeClient>) {
    let (input, handle) = scripted_input();
    let engine = AudioCaptureEngine::new(CaptureConfig::default(), input);

    let connector = FakeConnector::new(script);
    let client = Arc::new(RealtimeClient::with_connector(
        "ws://assistant.test:8000",
        "desk-1",
        ReconnectPolicy::default(),
        connector.clone(),
    ));

    (PushToTalk::new(engine, client.clone(), ceiling), handle, connector, client)
}

#[tokio::test]
async fn test_stop_sends_one_binary_frame() {
    let (mut ptt, input, connector, client) = setup(vec![Handshake::Accept], Duration::from_secs(5));
    client.connect(DispatchTable::new()).await.unwrap();

    ptt.start_listening().await.unwrap();
    assert!(ptt.is_listening());
    for _ in 0..10 {
        input.push(noise(320)).await;
    }

    let payload = ptt.stop_listening().await.unwrap();
    settle().await;

    assert!(!payload.is_empty());
    assert_eq!(payload.finish, FinishReason::Stopped);
    assert_eq!(connector.link(0).sent(), vec![Frame::Binary(payload.bytes.clone())]);

    let stats = ptt.stats();
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.payloads_sent, 1);
    assert_eq!(stats.bytes_sent, payload.len());
    assert!(stats.last_sent_at.is_some());
}

#[tokio::test]
async fn test_empty_recording_is_not_sent() {
    let (mut ptt, _, connector, client) = setup(vec![Handshake::Accept], Duration::from_secs(5));
    client.connect(DispatchTable::new()).await.unwrap();

    ptt.start_listening().await.unwrap();
    let payload = ptt.stop_listening().await.unwrap();
    settle().await;

    assert!(payload.is_empty());
    assert!(connector.link(0).sent().is_empty());
    assert_eq!(ptt.stats().payloads_sent, 0);
    assert_eq!(ptt.stats().payloads_dropped, 1);
}

#[tokio::test]
async fn test_recording_while_disconnected_is_kept_locally() {
    let (mut ptt, input, connector, _) = setup(vec![], Duration::from_secs(5));

    ptt.start_listening().await.unwrap();
    input.push(noise(1600)).await;
    let payload = ptt.stop_listening().await.unwrap();

    assert!(!payload.is_empty());
    assert_eq!(connector.call_count(), 0);
    assert_eq!(ptt.stats().payloads_dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_ceiling_payload_is_forwarded() {
    let (mut ptt, input, connector, client) = setup(vec![Handshake::Accept], Duration::from_millis(800));
    client.connect(DispatchTable::new()).await.unwrap();

    ptt.start_listening().await.unwrap();
    for _ in 0..5 {
        input.push(noise(320)).await;
    }

    let payload = ptt.next_ceiling_payload().await.unwrap();
    settle().await;

    assert_eq!(payload.finish, FinishReason::Ceiling);
    assert!(!ptt.is_listening());
    assert_eq!(connector.link(0).sent(), vec![Frame::Binary(payload.bytes.clone())]);

    // Button released after the ceiling already fired
    let err = ptt.stop_listening().await.unwrap_err();
    assert_eq!(err, CaptureError::State(StateError::NotRecording));
}

#[tokio::test]
async fn test_control_requests_pass_through() {
    let (ptt, _, connector, client) = setup(vec![Handshake::Accept], Duration::from_secs(5));
    client.connect(DispatchTable::new()).await.unwrap();

    assert!(ptt.send_text("what's on today"));
    assert!(ptt.request_reminders());
    assert!(ptt.clear_history());
    settle().await;

    let kinds: Vec<_> = connector
        .link(0)
        .sent_json()
        .into_iter()
        .map(|v| v["type"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kinds, vec!["text", "control", "control"]);
}

#[tokio::test]
async fn test_shutdown_releases_device_and_connection() {
    let (mut ptt, input, connector, client) = setup(vec![Handshake::Accept], Duration::from_secs(5));
    client.connect(DispatchTable::new()).await.unwrap();

    ptt.start_listening().await.unwrap();
    ptt.shutdown();
    settle().await;

    assert!(!ptt.is_listening());
    assert!(!input.is_open());
    assert!(!client.is_connected());
    assert!(connector.link(0).closed_by_client());

    // Shutdown twice is harmless
    ptt.shutdown();
}
