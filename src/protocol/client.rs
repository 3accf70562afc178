//! Realtime duplex client for the assistant service
//!
//! One logical connection per client. A supervisor task owns the open
//! transport: it writes queued outbound frames, dispatches inbound envelopes
//! in arrival order, and drives the reconnect machine when the transport
//! drops. Every `connect`/`disconnect` bumps an epoch so a superseded
//! supervisor can never touch the current connection. The link keeps a
//! release handle for the open socket so `disconnect` drops it before
//! returning.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatch::DispatchTable;
use super::messages::{actions, Envelope};
use super::reconnect::{ConnectionState, ReconnectMachine, ReconnectPolicy, Transition};
use super::transport::{Connector, Frame, Release, Transport, WebSocketConnector};
use crate::error::{ConnectionError, ProtocolError};

struct Link {
    machine: ReconnectMachine,
    epoch: u64,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    shutdown: Option<watch::Sender<bool>>,
    supervisor: Option<JoinHandle<()>>,
    release: Option<Arc<dyn Release>>,
}

impl Link {
    /// Stop the supervisor and drop the socket
    fn teardown(&mut self) {
        self.epoch += 1;
        self.machine.stop();
        self.outbound = None;
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.abort();
        }
        if let Some(release) = self.release.take() {
            release.release();
        }
    }
}

struct Inner {
    link: Mutex<Link>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Inner {
    fn publish(&self, link: &Link) {
        self.state_tx.send_replace(link.machine.state());
    }

    /// Run `f` against the link if `epoch` is still current
    fn with_link<R>(&self, epoch: u64, f: impl FnOnce(&mut Link) -> R) -> Option<R> {
        let mut link = self.link.lock();
        if link.epoch != epoch {
            return None;
        }
        let result = f(&mut link);
        self.publish(&link);
        Some(result)
    }
}

pub struct RealtimeClient {
    endpoint: String,
    connector: Arc<dyn Connector>,
    inner: Arc<Inner>,
}

impl RealtimeClient {
    /// WebSocket client for `{base_url}/ws/{client_id}`
    pub fn new(base_url: &str, client_id: &str, policy: ReconnectPolicy) -> Self {
        Self::with_connector(base_url, client_id, policy, Arc::new(WebSocketConnector))
    }

    pub fn with_connector(
        base_url: &str,
        client_id: &str,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            endpoint: super::endpoint_url(base_url, client_id),
            connector,
            inner: Arc::new(Inner {
                link: Mutex::new(Link {
                    machine: ReconnectMachine::new(policy),
                    epoch: 0,
                    outbound: None,
                    shutdown: None,
                    supervisor: None,
                    release: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Open the connection and start delivering envelopes to `dispatch`.
    ///
    /// Resolves once the transport is open. A failed handshake is returned
    /// here and is not retried; drops after that are handled internally.
    pub async fn connect(&self, dispatch: DispatchTable) -> Result<(), ConnectionError> {
        super::validate_endpoint(&self.endpoint)?;

        // Replaces any previous connection
        self.disconnect();

        let epoch = {
            let mut link = self.inner.link.lock();
            link.epoch += 1;
            link.machine.begin_connect();
            self.inner.publish(&link);
            link.epoch
        };

        info!("Connecting to {}", self.endpoint);

        let transport = match self.connector.connect(&self.endpoint).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!("Connection to {} failed: {}", self.endpoint, e);
                self.inner.with_link(epoch, |link| link.machine.handshake_failed());
                return Err(e);
            }
        };

        let dispatch = Arc::new(dispatch);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let release = Arc::clone(&transport.release);

        let opened = self.inner.with_link(epoch, |link| {
            link.shutdown = Some(shutdown_tx);
            open_link(link, release)
        });
        let Some(outbound_rx) = opened else {
            transport.release.release();
            return Err(ConnectionError::Handshake("connect cancelled by disconnect".to_string()));
        };

        info!("Connected to {}", self.endpoint);
        dispatch.connected();

        let supervisor = tokio::spawn(supervise(Supervisor {
            inner: Arc::clone(&self.inner),
            connector: Arc::clone(&self.connector),
            endpoint: self.endpoint.clone(),
            dispatch,
            epoch,
            shutdown: shutdown_rx,
        }, transport, outbound_rx));

        let mut link = self.inner.link.lock();
        if link.epoch == epoch {
            link.supervisor = Some(supervisor);
        } else {
            supervisor.abort();
        }

        Ok(())
    }

    /// Close the connection and cancel any pending reconnect. The socket is
    /// released before this returns.
    pub fn disconnect(&self) {
        let mut link = self.inner.link.lock();
        let was = link.machine.state();

        link.teardown();
        self.inner.publish(&link);

        if was != ConnectionState::Disconnected {
            info!("Disconnected from {}", self.endpoint);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link.lock().machine.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Observe state transitions, including the terminal disconnect after
    /// the retry cap is exhausted
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.link.lock().machine.attempts()
    }

    /// Best-effort: dropped while not connected. Returns whether the frame
    /// was queued.
    pub fn send_text(&self, text: &str) -> bool {
        self.send_envelope(&Envelope::text(text))
    }

    pub fn send_control(&self, action: &str, extra: Option<Map<String, Value>>) -> bool {
        self.send_envelope(&Envelope::control(action, extra))
    }

    pub fn clear_history(&self) -> bool {
        self.send_control(actions::CLEAR_HISTORY, None)
    }

    pub fn request_reminders(&self) -> bool {
        self.send_control(actions::GET_REMINDERS, None)
    }

    /// Send a finished recording as one binary frame
    pub fn send_audio_binary(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.send_frame(Frame::Binary(bytes.into()))
    }

    fn send_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.to_json() {
            Ok(json) => self.send_frame(Frame::Text(json)),
            Err(e) => {
                warn!("Failed to serialize {} envelope: {}", envelope.kind().as_str(), e);
                false
            }
        }
    }

    fn send_frame(&self, frame: Frame) -> bool {
        let link = self.inner.link.lock();
        if link.machine.state() != ConnectionState::Connected {
            debug!("Not connected, dropping outbound frame");
            return false;
        }

        match &link.outbound {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.inner.link.lock().teardown();
    }
}

/// Mark the link open and hand back the outbound queue for the new transport
fn open_link(link: &mut Link, release: Arc<dyn Release>) -> mpsc::UnboundedReceiver<Frame> {
    let (tx, rx) = mpsc::unbounded_channel();
    link.machine.opened();
    link.outbound = Some(tx);
    link.release = Some(release);
    rx
}

struct Supervisor {
    inner: Arc<Inner>,
    connector: Arc<dyn Connector>,
    endpoint: String,
    dispatch: Arc<DispatchTable>,
    epoch: u64,
    shutdown: watch::Receiver<bool>,
}

#[derive(Debug, PartialEq, Eq)]
enum LinkEnd {
    /// Peer closed or the transport failed
    Dropped,
    /// Caller disconnected
    Shutdown,
}

async fn supervise(
    mut sv: Supervisor,
    mut transport: Transport,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame>,
) {
    loop {
        if pump(&mut sv, &mut transport, &mut outbound_rx).await == LinkEnd::Shutdown {
            transport.sink.close().await;
            debug!("Connection supervisor stopped");
            return;
        }

        info!("Connection to {} lost", sv.endpoint);

        let closed = sv.inner.with_link(sv.epoch, |link| {
            link.outbound = None;
            link.release = None;
            link.machine.closed();
        });
        if closed.is_none() {
            return;
        }
        sv.dispatch.disconnected();

        let Some(next) = reconnect(&mut sv).await else {
            return;
        };

        let release = Arc::clone(&next.release);
        let Some(rx) = sv.inner.with_link(sv.epoch, |link| open_link(link, release)) else {
            next.release.release();
            return;
        };

        info!("Reconnected to {}", sv.endpoint);
        sv.dispatch.connected();

        transport = next;
        outbound_rx = rx;
    }
}

/// Retry until a transport opens, the cap is reached, or the caller stops us
async fn reconnect(sv: &mut Supervisor) -> Option<Transport> {
    loop {
        let transition = sv.inner.with_link(sv.epoch, |link| link.machine.next_retry())?;

        let (attempt, delay) = match transition {
            Transition::Retry { attempt, delay } => (attempt, delay),
            Transition::GiveUp => {
                warn!(
                    "Giving up on {} after {} reconnect attempts",
                    sv.endpoint,
                    sv.inner.link.lock().machine.policy().max_attempts
                );
                return None;
            }
            Transition::Halted => return None,
        };

        info!(
            "Reconnecting to {} in {}ms (attempt {})",
            sv.endpoint,
            delay.as_millis(),
            attempt
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = sv.shutdown.changed() => return None,
        }

        sv.inner.with_link(sv.epoch, |link| link.machine.retry_due())?;

        let result = tokio::select! {
            result = sv.connector.connect(&sv.endpoint) => result,
            _ = sv.shutdown.changed() => return None,
        };

        match result {
            Ok(transport) => return Some(transport),
            Err(e) => {
                warn!("Reconnect attempt {} failed: {}", attempt, e);
                sv.inner.with_link(sv.epoch, |link| link.machine.attempt_failed())?;
            }
        }
    }
}

/// Shuttle frames until the transport drops or the caller disconnects
async fn pump(
    sv: &mut Supervisor,
    transport: &mut Transport,
    outbound_rx: &mut mpsc::UnboundedReceiver<Frame>,
) -> LinkEnd {
    loop {
        tokio::select! {
            _ = sv.shutdown.changed() => return LinkEnd::Shutdown,
            outbound = outbound_rx.recv() => match outbound {
                Some(frame) => {
                    if let Err(e) = transport.sink.send(frame).await {
                        warn!("Failed to send frame: {}", e);
                        return LinkEnd::Dropped;
                    }
                }
                // Every sender is gone: the link was torn down by the caller
                None => return LinkEnd::Shutdown,
            },
            inbound = transport.source.next() => match inbound {
                Some(Ok(Frame::Text(text))) => deliver(&sv.dispatch, &text),
                Some(Ok(Frame::Binary(bytes))) => {
                    debug!("Ignoring inbound binary frame ({} bytes)", bytes.len());
                }
                Some(Err(e)) => {
                    warn!("Transport error: {}", e);
                    return LinkEnd::Dropped;
                }
                None => return LinkEnd::Dropped,
            },
        }
    }
}

fn deliver(dispatch: &DispatchTable, text: &str) {
    match dispatch.dispatch_frame(text) {
        Ok(true) => {}
        Ok(false) => debug!("No handler registered, envelope dropped"),
        Err(ProtocolError::UnknownKind(kind)) => {
            debug!("Dropping envelope of unknown kind '{}'", kind)
        }
        Err(e) => warn!("Dropping inbound frame: {}", e),
    }
}
