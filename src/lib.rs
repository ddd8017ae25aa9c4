//! # botgate-client
//!
//! Client SDK for connecting a process to a remote chat-bot gateway.
//!
//! The gateway is reached over two WebSocket channels (api for commands and
//! replies, event for inbound events) plus an HTTP channel for status
//! queries. Inbound events fan out to independently registered plugins;
//! outbound commands are correlated with their replies by echo id.
//!
//! ## Architecture
//!
//! - **Plugins** expose keyed filters and handlers, paired at registration
//!   into immutable dispatch entries.
//! - **Dispatcher** fans each event out to every matching handler as an
//!   independent, bounded, panic-isolated unit of work.
//! - **Correlator** tracks each command's echo id until its reply arrives or
//!   a background sweep expires it.
//!
//! ## Example
//!
//! ```ignore
//! use botgate_client::ClientBuilder;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = ClientBuilder::new("access-token")
//!         .plugin(MyPlugin::default())
//!         .connect("ws://127.0.0.1:6700", "http://127.0.0.1:5700")
//!         .await
//!         .unwrap();
//!
//!     let status = client.get_status().await.unwrap();
//!     assert!(status.good);
//! }
//! ```

pub mod codec;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod plugin;
pub mod protocol;
pub mod transport;

mod client;

pub use client::{ClientBuilder, ClientConfig, GatewayClient};
pub use correlator::{EchoGenerator, SequentialEcho, TimeoutHook};
pub use dispatch::{FailureHook, HandlerFailure};
pub use error::BotgateError;
pub use plugin::{filter_fn, handler_fn, EventHandler, Filter, Plugin};
pub use protocol::{Event, GatewayStatus};
