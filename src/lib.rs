pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod protocol;
pub mod session;

pub use audio::{
    AudioCaptureEngine, AudioFile, AudioFrame, AudioPayload, CaptureState, DeviceConfig,
    FinishReason, InputDevice, InputDeviceFactory, InputSource,
};
pub use config::Config;
pub use error::{
    CaptureError, ConnectionError, DeviceError, PlaybackError, ProtocolError, StateError,
};
pub use playback::{AudioSink, DecodedAudio, PlaybackHelper};
pub use protocol::{
    ConnectionState, DispatchTable, Envelope, EnvelopeKind, RealtimeClient, ReconnectPolicy,
};
pub use session::{ExchangeStats, PushToTalk};
