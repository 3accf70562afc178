//! Dispatch table keyed by envelope kind
//!
//! Every kind has one optional handler. Envelopes of a kind without a handler
//! are dropped quietly.

use super::messages::{
    ControlData, Envelope, EnvelopeKind, ErrorData, RemindersData, ResponseData, StatusData,
    TextData, TranscriptionData, VolumeData,
};
use crate::error::ProtocolError;

type Handler<T> = Box<dyn Fn(T) + Send + Sync>;
type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct DispatchTable {
    text: Option<Handler<TextData>>,
    control: Option<Handler<ControlData>>,
    transcription: Option<Handler<TranscriptionData>>,
    response: Option<Handler<ResponseData>>,
    status: Option<Handler<StatusData>>,
    volume: Option<Handler<VolumeData>>,
    error: Option<Handler<ErrorData>>,
    reminders: Option<Handler<RemindersData>>,
    connect: Option<Hook>,
    disconnect: Option<Hook>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_text(mut self, f: impl Fn(TextData) + Send + Sync + 'static) -> Self {
        self.text = Some(Box::new(f));
        self
    }

    pub fn on_control(mut self, f: impl Fn(ControlData) + Send + Sync + 'static) -> Self {
        self.control = Some(Box::new(f));
        self
    }

    pub fn on_transcription(mut self, f: impl Fn(TranscriptionData) + Send + Sync + 'static) -> Self {
        self.transcription = Some(Box::new(f));
        self
    }

    pub fn on_response(mut self, f: impl Fn(ResponseData) + Send + Sync + 'static) -> Self {
        self.response = Some(Box::new(f));
        self
    }

    pub fn on_status(mut self, f: impl Fn(StatusData) + Send + Sync + 'static) -> Self {
        self.status = Some(Box::new(f));
        self
    }

    pub fn on_volume(mut self, f: impl Fn(VolumeData) + Send + Sync + 'static) -> Self {
        self.volume = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(ErrorData) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_reminders(mut self, f: impl Fn(RemindersData) + Send + Sync + 'static) -> Self {
        self.reminders = Some(Box::new(f));
        self
    }

    /// Called on every successful open, including reconnects
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connect = Some(Box::new(f));
        self
    }

    /// Called on every transport close that was not requested by the caller
    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.disconnect = Some(Box::new(f));
        self
    }

    pub fn handles(&self, kind: EnvelopeKind) -> bool {
        match kind {
            EnvelopeKind::Text => self.text.is_some(),
            EnvelopeKind::Control => self.control.is_some(),
            EnvelopeKind::Transcription => self.transcription.is_some(),
            EnvelopeKind::Response => self.response.is_some(),
            EnvelopeKind::Status => self.status.is_some(),
            EnvelopeKind::Volume => self.volume.is_some(),
            EnvelopeKind::Error => self.error.is_some(),
            EnvelopeKind::Reminders => self.reminders.is_some(),
        }
    }

    /// Route an envelope to its handler. Returns whether one ran.
    pub fn dispatch(&self, envelope: Envelope) -> bool {
        fn call<T>(handler: &Option<Handler<T>>, data: T) -> bool {
            match handler {
                Some(h) => {
                    h(data);
                    true
                }
                None => false,
            }
        }

        match envelope {
            Envelope::Text(d) => call(&self.text, d),
            Envelope::Control(d) => call(&self.control, d),
            Envelope::Transcription(d) => call(&self.transcription, d),
            Envelope::Response(d) => call(&self.response, d),
            Envelope::Status(d) => call(&self.status, d),
            Envelope::Volume(d) => call(&self.volume, d),
            Envelope::Error(d) => call(&self.error, d),
            Envelope::Reminders(d) => call(&self.reminders, d),
        }
    }

    /// Parse a raw JSON frame and dispatch it
    pub fn dispatch_frame(&self, frame: &str) -> Result<bool, ProtocolError> {
        let envelope = Envelope::parse(frame)?;
        Ok(self.dispatch(envelope))
    }

    pub(crate) fn connected(&self) {
        if let Some(hook) = &self.connect {
            hook();
        }
    }

    pub(crate) fn disconnected(&self) {
        if let Some(hook) = &self.disconnect {
            hook();
        }
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handled: Vec<&str> = EnvelopeKind::ALL
            .into_iter()
            .filter(|k| self.handles(*k))
            .map(|k| k.as_str())
            .collect();
        f.debug_struct("DispatchTable").field("handles", &handled).finish()
    }
}
