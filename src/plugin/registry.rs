//! Plugin registry: one-time bulk registration producing immutable
//! per-plugin dispatch entries.
//!
//! Registration runs in three phases:
//!
//! 1. **Load**: every plugin's fallible `load()`; a failure excludes that
//!    plugin and is logged, the others proceed.
//! 2. **Pairing**: per plugin, each filter key is joined with the handler
//!    under the same key. A filter key with no handler is a warning and the
//!    filter is dropped; a handler key with no filter joins the entry's
//!    catch-all list (invoked unconditionally on every event).
//! 3. **Notification**: after all entries are installed, each loaded
//!    plugin's `loaded()` hook is spawned exactly once, unordered.
//!
//! `register_all` consumes the plugin list and returns an immutable registry,
//! so dispatch can only ever read entries that are done being written. A late
//! or concurrent registration is unrepresentable.

use std::collections::HashMap;
use std::sync::Arc;

use super::{EventHandler, Filter, Plugin};

/// Immutable dispatch data derived from one plugin at registration time.
pub struct DispatchEntry {
    keys: Vec<String>,
    filters: HashMap<String, Filter>,
    handlers: HashMap<String, EventHandler>,
    catch_all: Vec<EventHandler>,
}

impl DispatchEntry {
    /// Keys that ended up with both a filter and a handler.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The filter paired under `key`.
    pub fn filter(&self, key: &str) -> Option<&Filter> {
        self.filters.get(key)
    }

    /// The handler paired under `key`.
    pub fn handler(&self, key: &str) -> Option<&EventHandler> {
        self.handlers.get(key)
    }

    /// Handlers with no paired filter, run unconditionally per event.
    pub fn catch_all(&self) -> &[EventHandler] {
        &self.catch_all
    }
}

/// Process-wide mapping from plugin name to its dispatch entry.
///
/// Write-once at load time, read-many during every dispatch.
pub struct PluginRegistry {
    entries: HashMap<String, DispatchEntry>,
}

impl PluginRegistry {
    /// Register all supplied plugins in one pass.
    ///
    /// Load failures and unpaired filter keys are logged, never returned:
    /// they are local to one plugin and must not abort the others.
    pub fn register_all(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        // Phase 1: load.
        let mut loaded = Vec::with_capacity(plugins.len());
        for plugin in plugins {
            if let Err(error) = plugin.load() {
                tracing::error!(plugin = %plugin.name(), %error, "plugin failed to load");
                continue;
            }
            loaded.push(plugin);
        }

        // Phase 2: pair filters with handlers.
        let mut entries = HashMap::with_capacity(loaded.len());
        for plugin in &loaded {
            let name = plugin.name().to_string();
            let entry = Self::build_entry(&name, plugin.filters(), plugin.handlers());
            entries.insert(name, entry);
        }

        // Phase 3: post-load hooks, fire-and-forget.
        for plugin in loaded {
            tokio::spawn(async move {
                plugin.loaded().await;
            });
        }

        Self { entries }
    }

    fn build_entry(
        plugin: &str,
        filters: HashMap<String, Filter>,
        mut handlers: HashMap<String, EventHandler>,
    ) -> DispatchEntry {
        let mut keys = Vec::with_capacity(filters.len());
        let mut paired_filters = HashMap::with_capacity(filters.len());
        let mut paired_handlers = HashMap::with_capacity(filters.len());

        for (key, filter) in filters {
            match handlers.remove(&key) {
                Some(handler) => {
                    paired_filters.insert(key.clone(), filter);
                    paired_handlers.insert(key.clone(), handler);
                    keys.push(key);
                }
                None => {
                    tracing::warn!(%plugin, %key, "filter key has no handler, dropping");
                }
            }
        }

        // Whatever handlers remain never matched a filter key.
        let catch_all = handlers.into_values().collect();

        DispatchEntry {
            keys,
            filters: paired_filters,
            handlers: paired_handlers,
            catch_all,
        }
    }

    /// The entry registered under `plugin`, if it loaded successfully.
    pub fn entry(&self, plugin: &str) -> Option<&DispatchEntry> {
        self.entries.get(plugin)
    }

    /// Iterate all entries. Order is unspecified.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DispatchEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Number of successfully registered plugins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no plugin registered successfully.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotgateError;
    use crate::plugin::{filter_fn, handler_fn};
    use crate::protocol::Event;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct TestPlugin {
        name: &'static str,
        fail_load: bool,
        filters: Vec<&'static str>,
        handlers: Vec<&'static str>,
        loaded_flag: Arc<AtomicBool>,
    }

    impl TestPlugin {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                fail_load: false,
                filters: Vec::new(),
                handlers: Vec::new(),
                loaded_flag: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn load(&self) -> crate::error::Result<()> {
            if self.fail_load {
                return Err(BotgateError::Protocol("init failed".to_string()));
            }
            Ok(())
        }

        async fn loaded(&self) {
            self.loaded_flag.store(true, Ordering::SeqCst);
        }

        fn filters(&self) -> HashMap<String, Filter> {
            self.filters
                .iter()
                .map(|key| (key.to_string(), filter_fn(|_: &Event| true)))
                .collect()
        }

        fn handlers(&self) -> HashMap<String, EventHandler> {
            self.handlers
                .iter()
                .map(|key| (key.to_string(), handler_fn(|_| async { Ok(()) })))
                .collect()
        }
    }

    #[tokio::test]
    async fn test_paired_key_registered() {
        let mut plugin = TestPlugin::new("paired");
        plugin.filters = vec!["cmd"];
        plugin.handlers = vec!["cmd"];

        let registry = PluginRegistry::register_all(vec![Arc::new(plugin)]);
        let entry = registry.entry("paired").unwrap();

        assert_eq!(entry.keys(), ["cmd".to_string()]);
        assert!(entry.filter("cmd").is_some());
        assert!(entry.handler("cmd").is_some());
        assert!(entry.catch_all().is_empty());
    }

    #[tokio::test]
    async fn test_unpaired_filter_key_dropped() {
        let mut plugin = TestPlugin::new("orphan_filter");
        plugin.filters = vec!["cmd", "dangling"];
        plugin.handlers = vec!["cmd"];

        let registry = PluginRegistry::register_all(vec![Arc::new(plugin)]);
        let entry = registry.entry("orphan_filter").unwrap();

        assert_eq!(entry.keys(), ["cmd".to_string()]);
        assert!(entry.filter("dangling").is_none());
        assert!(entry.handler("dangling").is_none());
    }

    #[tokio::test]
    async fn test_unpaired_handler_becomes_catch_all() {
        let mut plugin = TestPlugin::new("catch_all");
        plugin.filters = vec!["cmd"];
        plugin.handlers = vec!["cmd", "log", "audit"];

        let registry = PluginRegistry::register_all(vec![Arc::new(plugin)]);
        let entry = registry.entry("catch_all").unwrap();

        assert_eq!(entry.keys(), ["cmd".to_string()]);
        assert_eq!(entry.catch_all().len(), 2);
    }

    #[tokio::test]
    async fn test_load_failure_excludes_only_that_plugin() {
        let mut bad = TestPlugin::new("bad");
        bad.fail_load = true;
        bad.handlers = vec!["x"];

        let mut good = TestPlugin::new("good");
        good.handlers = vec!["x"];

        let registry = PluginRegistry::register_all(vec![Arc::new(bad), Arc::new(good)]);

        assert!(registry.entry("bad").is_none());
        assert!(registry.entry("good").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_loaded_hook_fires_once_after_registration() {
        let mut plugin = TestPlugin::new("hooked");
        plugin.handlers = vec!["x"];
        let flag = plugin.loaded_flag.clone();

        let mut failing = TestPlugin::new("failing");
        failing.fail_load = true;
        failing.handlers = vec!["x"];
        let failing_flag = failing.loaded_flag.clone();

        let _registry =
            PluginRegistry::register_all(vec![Arc::new(plugin), Arc::new(failing)]);

        // Hooks are spawned; yield until the loaded one lands.
        for _ in 0..50 {
            if flag.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(flag.load(Ordering::SeqCst));
        assert!(!failing_flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_registration() {
        let registry = PluginRegistry::register_all(Vec::new());
        assert!(registry.is_empty());
        assert_eq!(registry.entries().count(), 0);
    }
}
