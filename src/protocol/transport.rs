use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async_tls, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::ConnectionError;

/// One frame on the duplex connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON envelope
    Text(String),
    /// Raw recording bytes
    Binary(Vec<u8>),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport error: {0}")]
    Io(String),
}

/// Outbound half of a connection
#[async_trait::async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close gracefully; errors are swallowed
    async fn close(&mut self);
}

/// Inbound half of a connection. `None` means the peer closed.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    async fn next(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Synchronous teardown of an open connection. After `release` returns the
/// underlying socket is gone and both halves fail on their next use.
pub trait Release: Send + Sync {
    fn release(&self);
}

/// A freshly opened connection
pub struct Transport {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
    pub release: Arc<dyn Release>,
}

/// Opens a new transport per call; transports are never reused
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError>;
}

/// Socket shared between the WebSocket stream and its release handle.
/// Releasing drops the socket in place; later I/O reports `NotConnected`.
pub struct ReleasableSocket<S> {
    slot: Arc<Mutex<Option<S>>>,
}

impl<S> ReleasableSocket<S> {
    pub fn new(socket: S) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(socket))),
        }
    }

    pub fn is_released(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl<S> Clone for ReleasableSocket<S> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<S: Send> Release for ReleasableSocket<S> {
    fn release(&self) {
        if self.slot.lock().take().is_some() {
            debug!("Socket released");
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket released")
}

impl<S: AsyncRead + Unpin> AsyncRead for ReleasableSocket<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.slot.lock().as_mut() {
            Some(socket) => Pin::new(socket).poll_read(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ReleasableSocket<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.slot.lock().as_mut() {
            Some(socket) => Pin::new(socket).poll_write(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.slot.lock().as_mut() {
            Some(socket) => Pin::new(socket).poll_flush(cx),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.slot.lock().as_mut() {
            Some(socket) => Pin::new(socket).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<ReleasableSocket<TcpStream>>>;

/// WebSocket connector over tokio-tungstenite
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError> {
        let request = url
            .into_client_request()
            .map_err(|e| ConnectionError::InvalidEndpoint(e.to_string()))?;

        let uri = request.uri();
        let host = uri
            .host()
            .ok_or_else(|| ConnectionError::InvalidEndpoint(format!("{} (missing host)", url)))?
            .to_string();
        let port = uri
            .port_u16()
            .unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });

        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
        let _ = tcp.set_nodelay(true);

        let socket = ReleasableSocket::new(tcp);
        let (stream, response) = client_async_tls(request, socket.clone())
            .await
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;

        debug!("WebSocket handshake complete ({})", response.status());

        let (write, read) = stream.split();

        Ok(Transport {
            sink: Box::new(WsSink { inner: write }),
            source: Box::new(WsSource { inner: read }),
            release: Arc::new(socket),
        })
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait::async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
        };

        self.inner
            .send(message)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close().await {
            debug!("WebSocket close: {}", e);
        }
    }
}

struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait::async_trait]
impl FrameSource for WsSource {
    async fn next(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes))),
                Ok(Message::Close(reason)) => {
                    debug!("Peer closed connection: {:?}", reason);
                    return None;
                }
                // Ping/pong are answered by tungstenite
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
    }
}
