pub mod client;
pub mod dispatch;
pub mod messages;
pub mod reconnect;
pub mod transport;

pub use client::RealtimeClient;
pub use dispatch::DispatchTable;
pub use messages::{
    actions, ControlData, Envelope, EnvelopeKind, ErrorData, RemindersData, ResponseData,
    StatusData, TextData, TranscriptionData, VolumeData,
};
pub use reconnect::{ConnectionState, ReconnectMachine, ReconnectPolicy, Transition};
pub use transport::{
    Connector, Frame, FrameSink, FrameSource, ReleasableSocket, Release, Transport, TransportError,
    WebSocketConnector,
};

use crate::error::ConnectionError;

/// `{base-url}/ws/{client-id}`
pub fn endpoint_url(base_url: &str, client_id: &str) -> String {
    format!("{}/ws/{}", base_url.trim_end_matches('/'), client_id)
}

pub(crate) fn validate_endpoint(endpoint: &str) -> Result<(), ConnectionError> {
    let scheme_ok = endpoint.starts_with("ws://") || endpoint.starts_with("wss://");
    let client_id = endpoint.rsplit("/ws/").next().unwrap_or_default();

    if !scheme_ok {
        return Err(ConnectionError::InvalidEndpoint(format!(
            "{} (expected ws:// or wss://)",
            endpoint
        )));
    }
    if !endpoint.contains("/ws/") || client_id.is_empty() || client_id.contains('/') {
        return Err(ConnectionError::InvalidEndpoint(format!(
            "{} (missing client id)",
            endpoint
        )));
    }

    Ok(())
}
