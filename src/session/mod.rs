//! Push-to-talk orchestration
//!
//! Ties a capture engine to a realtime client: start and stop recording,
//! ship each finished payload as one binary frame, and forward payloads the
//! recording ceiling finalized on its own.

mod push_to_talk;
mod stats;

pub use push_to_talk::PushToTalk;
pub use stats::ExchangeStats;
