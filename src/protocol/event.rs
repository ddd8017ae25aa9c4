//! Inbound gateway events.
//!
//! Events are open-ended JSON objects whose fields vary by kind. The client
//! decodes them once and passes them by shared reference to every filter and
//! handler; nothing mutates an event after decode.

use serde::Deserialize;
use serde_json::Value;

/// An inbound event from the gateway's stream channel.
///
/// The payload is kept opaque beyond JSON decoding. Accessors exist for the
/// fields common across event kinds; anything else goes through [`Event::get`].
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct Event(Value);

impl Event {
    /// Wrap an already-decoded JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Look up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Event category reported by the gateway (`message`, `notice`, ...).
    pub fn post_type(&self) -> Option<&str> {
        self.str_field("post_type")
    }

    /// Message subtype (`group`, `private`, ...), present on message events.
    pub fn message_type(&self) -> Option<&str> {
        self.str_field("message_type")
    }

    /// Message body, present on message events.
    pub fn message(&self) -> Option<&str> {
        self.str_field("message")
    }

    /// Group the event originated from, if any.
    pub fn group_id(&self) -> Option<i64> {
        self.0.get("group_id").and_then(Value::as_i64)
    }

    /// User the event originated from, if any.
    pub fn user_id(&self) -> Option<i64> {
        self.0.get("user_id").and_then(Value::as_i64)
    }

    /// The bot account the event was delivered to.
    pub fn self_id(&self) -> Option<i64> {
        self.0.get("self_id").and_then(Value::as_i64)
    }

    /// The raw decoded payload.
    pub fn raw(&self) -> &Value {
        &self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}
