// Shared fakes for integration tests: a scripted input device fed from the
// test body, and a connector whose handshakes and peers the test controls.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use voice_relay::audio::{AudioFrame, InputDevice};
use voice_relay::error::{ConnectionError, DeviceError};
use voice_relay::protocol::{
    Connector, Frame, FrameSink, FrameSource, Release, Transport, TransportError,
};

pub const SAMPLE_RATE: u32 = 16000;

/// Let spawned tasks run; with paused time this auto-advances the clock
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Full-scale deterministic pseudo-noise
pub fn noise(len: usize) -> Vec<i16> {
    let mut state: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if state & 1 == 0 { i16::MAX } else { i16::MIN + 1 }
        })
        .collect()
}

pub fn frame(samples: Vec<i16>) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: SAMPLE_RATE,
        channels: 1,
        timestamp_ms: 0,
    }
}

pub struct ScriptedInput {
    feed: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
    opens: Arc<AtomicUsize>,
    failure: Option<DeviceError>,
}

/// Test-side handle to a `ScriptedInput`
#[derive(Clone)]
pub struct InputHandle {
    feed: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
    opens: Arc<AtomicUsize>,
}

impl InputHandle {
    /// Deliver a frame as the device would; false when the device is closed
    pub async fn push(&self, samples: Vec<i16>) -> bool {
        let tx = self.feed.lock().clone();
        match tx {
            Some(tx) => tx.send(frame(samples)).await.is_ok(),
            None => false,
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.feed.lock().is_some()
    }
}

pub fn scripted_input() -> (Box<ScriptedInput>, InputHandle) {
    let feed = Arc::new(Mutex::new(None));
    let opens = Arc::new(AtomicUsize::new(0));
    let handle = InputHandle {
        feed: feed.clone(),
        opens: opens.clone(),
    };
    (
        Box::new(ScriptedInput {
            feed,
            opens,
            failure: None,
        }),
        handle,
    )
}

pub fn failing_input(error: DeviceError) -> (Box<ScriptedInput>, InputHandle) {
    let (mut input, handle) = scripted_input();
    input.failure = Some(error);
    (input, handle)
}

#[async_trait::async_trait]
impl InputDevice for ScriptedInput {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let (tx, rx) = mpsc::channel(64);
        *self.feed.lock() = Some(tx);
        Ok(rx)
    }

    fn close(&mut self) {
        self.feed.lock().take();
    }

    fn is_open(&self) -> bool {
        self.feed.lock().is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Accept,
    Refuse,
}

/// Test-side view of one accepted connection
#[derive(Clone)]
pub struct FakeLink {
    inbound: Arc<Mutex<Option<mpsc::UnboundedSender<Frame>>>>,
    sent: Arc<Mutex<Vec<Frame>>>,
    closed: Arc<AtomicBool>,
}

impl FakeLink {
    /// Deliver a text frame from the peer
    pub fn push_text(&self, text: &str) {
        if let Some(tx) = self.inbound.lock().as_ref() {
            let _ = tx.send(Frame::Text(text.to_string()));
        }
    }

    pub fn push_binary(&self, bytes: Vec<u8>) {
        if let Some(tx) = self.inbound.lock().as_ref() {
            let _ = tx.send(Frame::Binary(bytes));
        }
    }

    /// Peer drops the connection
    pub fn drop_from_peer(&self) {
        self.inbound.lock().take();
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    /// Sent text frames parsed as JSON
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter_map(|f| match f {
                Frame::Text(text) => serde_json::from_str(&text).ok(),
                Frame::Binary(_) => None,
            })
            .collect()
    }

    pub fn closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeSink {
    sent: Arc<Mutex<Vec<Frame>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl FrameSink for FakeSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Dropping the socket closes the link from the client side
struct FakeRelease {
    closed: Arc<AtomicBool>,
}

impl Release for FakeRelease {
    fn release(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct FakeSource {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait::async_trait]
impl FrameSource for FakeSource {
    async fn next(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Handshakes follow the script; once it runs out every handshake is refused
#[derive(Default)]
pub struct FakeConnector {
    script: Mutex<VecDeque<Handshake>>,
    calls: Mutex<Vec<(Instant, String)>>,
    links: Mutex<Vec<FakeLink>>,
}

impl FakeConnector {
    pub fn new(script: impl IntoIterator<Item = Handshake>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, url)| url.clone()).collect()
    }

    pub fn link(&self, index: usize) -> FakeLink {
        self.links.lock()[index].clone()
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().len()
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError> {
        self.calls.lock().push((Instant::now(), url.to_string()));

        let handshake = self.script.lock().pop_front().unwrap_or(Handshake::Refuse);
        if handshake == Handshake::Refuse {
            return Err(ConnectionError::Handshake("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let link = FakeLink {
            inbound: Arc::new(Mutex::new(Some(tx))),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        self.links.lock().push(link.clone());

        Ok(Transport {
            sink: Box::new(FakeSink {
                sent: link.sent.clone(),
                closed: link.closed.clone(),
            }),
            source: Box::new(FakeSource { rx }),
            release: Arc::new(FakeRelease {
                closed: link.closed.clone(),
            }),
        })
    }
}
