//! Payload codecs.
//!
//! The gateway speaks JSON on every channel, so a single [`JsonCodec`]
//! covers outbound command envelopes, inbound replies, and inbound events.

mod json;

pub use json::JsonCodec;
