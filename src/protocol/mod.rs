//! Wire envelopes for the gateway protocol.
//!
//! Outbound commands and inbound replies share two fixed shapes:
//!
//! - command: `{ "action": "...", "params": { ... }, "echo": <i64> }`
//! - reply:   `{ "retcode": <i64>, "data": { ... } | null, "echo": <i64> }`
//!
//! `echo` is the correlation id linking a command to its eventual reply;
//! `retcode == 0` signals success. Events arrive as open-ended JSON objects
//! and are wrapped by [`Event`] without further interpretation.

mod event;
mod status;

pub use event::Event;
pub use status::GatewayStatus;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Send a message to a group chat.
pub const ACTION_SEND_GROUP_MSG: &str = "send_group_msg";
/// Send a direct message to a user.
pub const ACTION_SEND_PRIVATE_MSG: &str = "send_private_msg";
/// Remove a user from a group.
pub const ACTION_SET_GROUP_KICK: &str = "set_group_kick";
/// Mute a single group member.
pub const ACTION_SET_GROUP_BAN: &str = "set_group_ban";
/// Mute or unmute the whole group.
pub const ACTION_SET_GROUP_WHOLE_BAN: &str = "set_group_whole_ban";
/// Query the gateway's health flags.
pub const ACTION_GET_STATUS: &str = "get_status";

/// Outbound command envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiRequest<P> {
    /// Remote action name.
    pub action: &'static str,
    /// Action-specific parameters.
    pub params: P,
    /// Correlation id echoed back in the reply.
    pub echo: i64,
}

impl<P> ApiRequest<P> {
    /// Build a command envelope for the given action.
    pub fn new(action: &'static str, params: P, echo: i64) -> Self {
        Self {
            action,
            params,
            echo,
        }
    }
}

/// Inbound reply envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    /// Gateway return code; zero is success.
    pub retcode: i64,
    /// Action-specific payload, absent on failure.
    #[serde(default)]
    pub data: Option<Value>,
    /// Correlation id of the command this reply answers. Replies on the
    /// request channel carry no echo; it defaults to zero there.
    #[serde(default)]
    pub echo: i64,
}

impl ApiResponse {
    /// Whether the gateway reported success.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.retcode == 0
    }
}

/// Parameters for [`ACTION_SEND_GROUP_MSG`].
#[derive(Debug, Clone, Serialize)]
pub struct GroupMessage {
    /// Target group id.
    pub group_id: i64,
    /// Message body.
    pub message: String,
}

/// Parameters for [`ACTION_SEND_PRIVATE_MSG`].
#[derive(Debug, Clone, Serialize)]
pub struct PrivateMessage {
    /// Target user id.
    pub user_id: i64,
    /// Message body.
    pub message: String,
}

/// Parameters for [`ACTION_SET_GROUP_KICK`].
#[derive(Debug, Clone, Serialize)]
pub struct GroupKick {
    /// Target group id.
    pub group_id: i64,
    /// User to remove.
    pub user_id: i64,
    /// Whether to also reject future join requests from this user.
    pub reject_add_request: bool,
}

/// Parameters for [`ACTION_SET_GROUP_BAN`].
#[derive(Debug, Clone, Serialize)]
pub struct GroupBan {
    /// Target group id.
    pub group_id: i64,
    /// User to mute.
    pub user_id: i64,
    /// Mute duration in seconds; zero lifts the mute.
    pub duration: i64,
}

/// Parameters for [`ACTION_SET_GROUP_WHOLE_BAN`].
#[derive(Debug, Clone, Serialize)]
pub struct GroupWholeBan {
    /// Target group id.
    pub group_id: i64,
    /// Whether to enable the group-wide mute.
    pub enable: bool,
}
