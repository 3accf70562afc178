pub mod analyser;
pub mod device;
pub mod engine;
pub mod file;
pub mod microphone;
pub mod slices;

pub use analyser::{volume_from_bins, Analyser};
pub use device::{AudioFrame, DeviceConfig, InputDevice, InputDeviceFactory, InputSource};
pub use engine::{AudioCaptureEngine, CaptureState};
pub use file::{AudioFile, FileInput};
pub use microphone::Microphone;
pub use slices::{AudioPayload, FinishReason, SliceRecorder, PAYLOAD_MEDIA_TYPE};
