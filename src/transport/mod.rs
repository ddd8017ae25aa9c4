//! Channel abstractions the client is wired against.
//!
//! The gateway is reached over two kinds of channel:
//!
//! - [`MessageChannel`]: a connected duplex stream. Outbound payloads go
//!   through [`MessageChannel::send`]; inbound payloads are delivered on the
//!   `mpsc::Receiver` handed out when the channel is connected, and the
//!   client owns the read loop.
//! - [`RequestChannel`]: a simple request/reply surface, one round trip per
//!   call.
//!
//! Both are traits so tests can substitute in-memory doubles; the real
//! implementations are [`WsChannel`] and [`HttpChannel`].

mod http;
mod ws;

pub use http::HttpChannel;
pub use ws::WsChannel;

use async_trait::async_trait;

use crate::error::Result;

/// A connected duplex message channel.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Transmit one payload.
    async fn send(&self, payload: String) -> Result<()>;

    /// Whether the channel is currently connected.
    fn is_connected(&self) -> bool;
}

/// A request/reply channel: one round trip per call.
#[async_trait]
pub trait RequestChannel: Send + Sync {
    /// Perform a single request for `action` and return the raw reply body.
    async fn request(&self, action: &str) -> Result<String>;
}
