//! Error types for voice-relay

use thiserror::Error;

/// Failure to acquire or keep the input device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("input device unavailable: {0}")]
    Unavailable(String),
}

/// Capture session lifecycle misuse
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("capture engine is not initialized")]
    NotInitialized,

    #[error("no recording session is active")]
    NotRecording,
}

/// Errors returned by `AudioCaptureEngine` operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to encode recording: {0}")]
    Encoding(String),
}

/// Handshake failure surfaced by `RealtimeClient::connect`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Malformed inbound frame. Logged and dropped, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown envelope kind: {0}")]
    UnknownKind(String),

    #[error("invalid {kind} payload: {reason}")]
    InvalidData { kind: String, reason: String },
}

/// Failure decoding or rendering reply audio
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("failed to decode audio: {0}")]
    DecodeFailed(String),

    #[error("failed to play audio: {0}")]
    PlaybackFailed(String),
}

impl CaptureError {
    /// The state error behind this failure, if any
    pub fn as_state(&self) -> Option<StateError> {
        match self {
            CaptureError::State(e) => Some(*e),
            _ => None,
        }
    }
}
