use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Well-known control actions understood by the assistant service
pub mod actions {
    pub const CLEAR_HISTORY: &str = "clear_history";
    pub const GET_REMINDERS: &str = "get_reminders";
}

/// Envelope tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Text,
    Control,
    Transcription,
    Response,
    Status,
    Volume,
    Error,
    Reminders,
}

impl EnvelopeKind {
    pub const ALL: [EnvelopeKind; 8] = [
        EnvelopeKind::Text,
        EnvelopeKind::Control,
        EnvelopeKind::Transcription,
        EnvelopeKind::Response,
        EnvelopeKind::Status,
        EnvelopeKind::Volume,
        EnvelopeKind::Error,
        EnvelopeKind::Reminders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Text => "text",
            EnvelopeKind::Control => "control",
            EnvelopeKind::Transcription => "transcription",
            EnvelopeKind::Response => "response",
            EnvelopeKind::Status => "status",
            EnvelopeKind::Volume => "volume",
            EnvelopeKind::Error => "error",
            EnvelopeKind::Reminders => "reminders",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

/// Wire shape of every JSON frame: `{"type": ..., "data": ...}`
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub text: String,
}

/// Outbound control request; extra fields sit next to `action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlData {
    pub action: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionData {
    pub text: String,
}

/// Assistant reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    pub text: String,
    /// Base64 audio, usually a `data:audio/mpeg;base64,...` URL
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub command_type: String,
    /// ISO-8601, when the service includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusData {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeData {
    pub volume: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemindersData {
    pub reminders: Vec<Value>,
}

/// A typed envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Text(TextData),
    Control(ControlData),
    Transcription(TranscriptionData),
    Response(ResponseData),
    Status(StatusData),
    Volume(VolumeData),
    Error(ErrorData),
    Reminders(RemindersData),
}

impl Envelope {
    pub fn text(text: impl Into<String>) -> Self {
        Envelope::Text(TextData { text: text.into() })
    }

    /// Control envelope; an `action` key in `extra` overrides `action`
    pub fn control(action: impl Into<String>, extra: Option<Map<String, Value>>) -> Self {
        let mut extra = extra.unwrap_or_default();
        let action = match extra.entry("action").or_insert_with(|| Value::String(action.into())).take() {
            Value::String(action) => action,
            other => other.to_string(),
        };
        extra.remove("action");
        Envelope::Control(ControlData { action, extra })
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Text(_) => EnvelopeKind::Text,
            Envelope::Control(_) => EnvelopeKind::Control,
            Envelope::Transcription(_) => EnvelopeKind::Transcription,
            Envelope::Response(_) => EnvelopeKind::Response,
            Envelope::Status(_) => EnvelopeKind::Status,
            Envelope::Volume(_) => EnvelopeKind::Volume,
            Envelope::Error(_) => EnvelopeKind::Error,
            Envelope::Reminders(_) => EnvelopeKind::Reminders,
        }
    }

    /// Parse one inbound JSON frame
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let wire: WireEnvelope =
            serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let kind = EnvelopeKind::from_tag(&wire.kind)
            .ok_or_else(|| ProtocolError::UnknownKind(wire.kind.clone()))?;

        let envelope = match kind {
            EnvelopeKind::Text => Envelope::Text(data(kind, wire.data)?),
            EnvelopeKind::Control => Envelope::Control(data(kind, wire.data)?),
            EnvelopeKind::Transcription => Envelope::Transcription(data(kind, wire.data)?),
            EnvelopeKind::Response => Envelope::Response(data(kind, wire.data)?),
            EnvelopeKind::Status => Envelope::Status(data(kind, wire.data)?),
            EnvelopeKind::Volume => {
                let volume: VolumeData = data(kind, wire.data)?;
                if volume.volume > 100 {
                    return Err(ProtocolError::InvalidData {
                        kind: kind.as_str().to_string(),
                        reason: format!("volume {} out of range 0..=100", volume.volume),
                    });
                }
                Envelope::Volume(volume)
            }
            EnvelopeKind::Error => Envelope::Error(data(kind, wire.data)?),
            EnvelopeKind::Reminders => Envelope::Reminders(data(kind, wire.data)?),
        };

        Ok(envelope)
    }

    /// Serialize to the wire shape
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let data = match self {
            Envelope::Text(d) => serde_json::to_value(d)?,
            Envelope::Control(d) => serde_json::to_value(d)?,
            Envelope::Transcription(d) => serde_json::to_value(d)?,
            Envelope::Response(d) => serde_json::to_value(d)?,
            Envelope::Status(d) => serde_json::to_value(d)?,
            Envelope::Volume(d) => serde_json::to_value(d)?,
            Envelope::Error(d) => serde_json::to_value(d)?,
            Envelope::Reminders(d) => serde_json::to_value(d)?,
        };

        serde_json::to_string(&WireEnvelope {
            kind: self.kind().as_str().to_string(),
            data,
        })
    }
}

fn data<T: serde::de::DeserializeOwned>(kind: EnvelopeKind, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidData {
        kind: kind.as_str().to_string(),
        reason: e.to_string(),
    })
}
