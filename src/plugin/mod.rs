//! Plugin model: keyed filters paired with keyed handlers.
//!
//! A plugin exposes two plugin-local mappings, `filters` and `handlers`,
//! joined by key at registration time. A handler whose key has a matching
//! filter runs only when that filter accepts the event; a handler without a
//! matching filter key runs unconditionally on every event.
//!
//! # Example
//!
//! ```ignore
//! struct Ping;
//!
//! #[async_trait]
//! impl Plugin for Ping {
//!     fn name(&self) -> &str {
//!         "ping"
//!     }
//!
//!     fn filters(&self) -> HashMap<String, Filter> {
//!         let mut filters = HashMap::new();
//!         filters.insert(
//!             "cmd".to_string(),
//!             filter_fn(|event| event.message() == Some("!ping")),
//!         );
//!         filters
//!     }
//!
//!     fn handlers(&self) -> HashMap<String, EventHandler> {
//!         let mut handlers = HashMap::new();
//!         handlers.insert(
//!             "cmd".to_string(),
//!             handler_fn(|event| async move {
//!                 tracing::info!(from = ?event.user_id(), "pong");
//!                 Ok(())
//!             }),
//!         );
//!         handlers
//!     }
//! }
//! ```

mod registry;

pub use registry::{DispatchEntry, PluginRegistry};

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::Event;

/// Boxed future returned by event handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Predicate over an event, gating whether its paired handler runs.
pub type Filter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Action invoked on an event, either gated by a filter or unconditional.
///
/// Handlers receive the event behind an `Arc`: many handlers may read the
/// same instance concurrently and none may assume exclusivity.
pub type EventHandler =
    Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap a plain predicate as a [`Filter`].
pub fn filter_fn<F>(f: F) -> Filter
where
    F: Fn(&Event) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap an async closure as an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// A self-contained unit of bot logic.
///
/// Registration is a one-time bulk operation: the registry calls `load`,
/// collects `filters`/`handlers` once, and invokes `loaded` after every
/// plugin's entry is installed. Nothing is re-queried afterwards.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique plugin name; the registry keys entries by it.
    fn name(&self) -> &str;

    /// Fallible initialization. A failure excludes this plugin from
    /// registration but never aborts the others.
    fn load(&self) -> Result<()> {
        Ok(())
    }

    /// Post-load hook, invoked exactly once after registration completes,
    /// with no ordering guarantee relative to other plugins or dispatch.
    async fn loaded(&self) {}

    /// Keyed predicates gating this plugin's handlers.
    fn filters(&self) -> HashMap<String, Filter> {
        HashMap::new()
    }

    /// Keyed actions. Keys without a matching filter become unconditional.
    fn handlers(&self) -> HashMap<String, EventHandler>;
}
