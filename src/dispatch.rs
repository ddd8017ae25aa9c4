//! Event fan-out across registered plugins.
//!
//! Each inbound event is dispatched once. For every plugin entry the
//! dispatcher spawns one task for the entry's catch-all handlers and one task
//! per (filter, handler) pair. Units are independent: no ordering is
//! guaranteed between handlers of the same plugin, between plugins, or
//! between catch-all and keyed handlers, and dispatch returns without
//! waiting for any of them.
//!
//! Concurrency is bounded by a semaphore: when every permit is held, new
//! units are dropped with a warning instead of growing without bound. A
//! handler that returns an error or panics is reported through the failure
//! hook and cannot affect sibling handlers or the process.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;

use crate::plugin::{EventHandler, Filter, PluginRegistry};
use crate::protocol::Event;

/// Default maximum concurrently running handler units.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// A handler invocation that failed or panicked.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Name of the plugin the handler belongs to.
    pub plugin: String,
    /// The key the handler was paired under; `None` for catch-all handlers.
    pub key: Option<String>,
    /// Error message or panic payload description.
    pub reason: String,
}

/// Hook receiving handler failures.
pub type FailureHook = Arc<dyn Fn(HandlerFailure) + Send + Sync>;

fn log_failure(failure: HandlerFailure) {
    tracing::error!(
        plugin = %failure.plugin,
        key = failure.key.as_deref().unwrap_or("<catch-all>"),
        reason = %failure.reason,
        "handler failed"
    );
}

/// Fans inbound events out to every matching handler.
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    semaphore: Arc<Semaphore>,
    failure_hook: FailureHook,
}

impl Dispatcher {
    /// Create a dispatcher over a completed registry.
    pub fn new(registry: Arc<PluginRegistry>, max_concurrent_handlers: usize) -> Self {
        Self::with_failure_hook(registry, max_concurrent_handlers, Arc::new(log_failure))
    }

    /// Create a dispatcher with a custom failure hook.
    pub fn with_failure_hook(
        registry: Arc<PluginRegistry>,
        max_concurrent_handlers: usize,
        failure_hook: FailureHook,
    ) -> Self {
        Self {
            registry,
            semaphore: Arc::new(Semaphore::new(max_concurrent_handlers)),
            failure_hook,
        }
    }

    /// Dispatch one decoded inbound event.
    ///
    /// Fire-and-forget: work is enqueued onto the runtime and this returns
    /// immediately. There is no signal that all handlers have finished.
    pub fn dispatch(&self, event: Event) {
        let event = Arc::new(event);

        for (name, entry) in self.registry.entries() {
            if !entry.catch_all().is_empty() {
                self.spawn_catch_all(name, entry.catch_all().to_vec(), event.clone());
            }

            for key in entry.keys() {
                // Pairing guarantees both sides exist for every listed key.
                let (Some(filter), Some(handler)) = (entry.filter(key), entry.handler(key))
                else {
                    continue;
                };
                self.spawn_keyed(name, key, filter.clone(), handler.clone(), event.clone());
            }
        }
    }

    /// One unit running every unpaired handler of a plugin sequentially.
    fn spawn_catch_all(&self, plugin: &str, handlers: Vec<EventHandler>, event: Arc<Event>) {
        let Some(_permit) = self.try_permit(plugin, None) else {
            return;
        };
        let plugin = plugin.to_string();
        let hook = self.failure_hook.clone();

        tokio::spawn(async move {
            let _permit = _permit;
            for handler in handlers {
                run_handler(&handler, event.clone(), &plugin, None, &hook).await;
            }
        });
    }

    /// One unit evaluating a filter and, on acceptance, running its handler.
    fn spawn_keyed(
        &self,
        plugin: &str,
        key: &str,
        filter: Filter,
        handler: EventHandler,
        event: Arc<Event>,
    ) {
        let Some(_permit) = self.try_permit(plugin, Some(key)) else {
            return;
        };
        let plugin = plugin.to_string();
        let key = key.to_string();
        let hook = self.failure_hook.clone();

        tokio::spawn(async move {
            let _permit = _permit;
            // Filter runs synchronously inside the unit; a rejection skips
            // the handler with no side effect.
            if !filter(&event) {
                return;
            }
            run_handler(&handler, event, &plugin, Some(&key), &hook).await;
        });
    }

    fn try_permit(
        &self,
        plugin: &str,
        key: Option<&str>,
    ) -> Option<tokio::sync::OwnedSemaphorePermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(
                    %plugin,
                    key = key.unwrap_or("<catch-all>"),
                    "handler capacity reached, dropping dispatch unit"
                );
                None
            }
        }
    }
}

/// Run one handler, isolating panics and reporting failures.
async fn run_handler(
    handler: &EventHandler,
    event: Arc<Event>,
    plugin: &str,
    key: Option<&str>,
    hook: &FailureHook,
) {
    let outcome = AssertUnwindSafe(handler(event)).catch_unwind().await;
    let reason = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(error)) => error.to_string(),
        Err(panic) => panic_message(panic),
    };
    hook(HandlerFailure {
        plugin: plugin.to_string(),
        key: key.map(str::to_string),
        reason,
    });
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
