//! Correlation of outbound commands with their replies.
//!
//! Every command carries an `echo` id. The correlator records the id when
//! the command is sent, removes it when a reply with the same id arrives,
//! and periodically sweeps ids that outlived the timeout threshold so
//! abandoned correlations cannot accumulate.
//!
//! Three actors touch the pending map concurrently (send path, reply path,
//! sweep task); every access goes through the mutex and nothing read under
//! the lock escapes the critical section.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default sweep period and timeout threshold.
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of correlation ids for outbound commands.
///
/// Pluggable so tests can pin ids deterministically.
pub trait EchoGenerator: Send + Sync {
    /// Produce the next id. Must never repeat while a previous id from this
    /// generator can still be in flight.
    fn next_id(&self) -> i64;
}

/// Monotonically increasing id generator.
///
/// Seeded from the unix timestamp so ids stay recognizable in gateway logs,
/// then incremented per call: two commands sent within the same second can
/// no longer collide.
pub struct SequentialEcho(AtomicI64);

impl SequentialEcho {
    /// Create a generator seeded from the current unix time.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self(AtomicI64::new(seed))
    }

    /// Create a generator starting at a fixed value (deterministic tests).
    pub fn starting_at(seed: i64) -> Self {
        Self(AtomicI64::new(seed))
    }
}

impl Default for SequentialEcho {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoGenerator for SequentialEcho {
    fn next_id(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Hook receiving the id of each request evicted by the sweep.
pub type TimeoutHook = Arc<dyn Fn(i64) + Send + Sync>;

/// Tracks in-flight correlation ids and expires stale ones.
pub struct Correlator {
    pending: Mutex<HashMap<i64, Instant>>,
    timeout: Duration,
    timeout_hook: Option<TimeoutHook>,
}

impl Correlator {
    /// Create a correlator with the given timeout threshold.
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
            timeout_hook: None,
        }
    }

    /// Create a correlator that also reports evictions through `hook`.
    ///
    /// The default behavior is log-only: a timed-out request never reaches
    /// the original caller. The hook is the opt-in failure channel for
    /// embedders that want one.
    pub fn with_timeout_hook(timeout: Duration, hook: TimeoutHook) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
            timeout_hook: Some(hook),
        }
    }

    /// Record `id` as pending as of now.
    pub fn track(&self, id: i64) {
        let mut pending = self.pending.lock().expect("correlator lock poisoned");
        if pending.insert(id, Instant::now()).is_some() {
            // Ids must be unique among in-flight requests; a collision means
            // the generator is misbehaving.
            tracing::warn!(echo = id, "correlation id already in flight, re-tracking");
        }
    }

    /// Resolve a reply. Returns true if the id was pending; resolving an
    /// untracked id is a no-op.
    pub fn resolve(&self, id: i64) -> bool {
        let mut pending = self.pending.lock().expect("correlator lock poisoned");
        pending.remove(&id).is_some()
    }

    /// Whether `id` is currently pending.
    pub fn is_pending(&self, id: i64) -> bool {
        let pending = self.pending.lock().expect("correlator lock poisoned");
        pending.contains_key(&id)
    }

    /// Number of in-flight ids.
    pub fn pending_count(&self) -> usize {
        let pending = self.pending.lock().expect("correlator lock poisoned");
        pending.len()
    }

    /// Evict every pending id older than the timeout threshold.
    ///
    /// Logging and the timeout hook run on the evicted ids after the lock is
    /// released.
    pub fn sweep(&self) {
        let now = Instant::now();
        let expired: Vec<i64> = {
            let mut pending = self.pending.lock().expect("correlator lock poisoned");
            let expired: Vec<i64> = pending
                .iter()
                .filter(|(_, tracked_at)| now.duration_since(**tracked_at) > self.timeout)
                .map(|(id, _)| *id)
                .collect();
            for id in &expired {
                pending.remove(id);
            }
            expired
        };

        for id in expired {
            tracing::error!(echo = id, timeout = ?self.timeout, "request timed out");
            if let Some(hook) = &self.timeout_hook {
                hook(id);
            }
        }
    }

    /// Spawn the recurring sweep task.
    ///
    /// Runs until the returned handle is aborted or the runtime shuts down.
    pub fn spawn_sweep(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let correlator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; skip it so the first
            // sweep happens one full period in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                correlator.sweep();
            }
        })
    }
}
