use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use dashmap::DashMap;
use log::{debug, info};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Longest time anything is kept, larger TTLs are cut down to this.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Args, Clone, Debug)]
#[group(id = "cache")]
pub struct Params {
    /// How long a finished result is served from memory
    #[arg(long, default_value = "100", env = "CACHE_TTL_SECS")]
    pub cache_ttl_secs: u64,

    /// How often expired results are purged, independently of lookups
    #[arg(long, default_value = "120", env = "CACHE_SWEEP_SECS")]
    pub cache_sweep_secs: u64,
}

impl Params {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs).min(MAX_TTL)
    }

    pub fn sweep_period(&self) -> Duration {
        // interval() panics on zero
        Duration::from_secs(self.cache_sweep_secs.max(1))
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

/// In-memory TTL cache for finished results. Shared between all concurrent probes, lookups of
/// one key never wait on a write to another key.
#[derive(Debug)]
pub struct ResultCache<V> {
    name: &'static str,
    entries: DashMap<String, Entry<V>>,
}

impl<V> ResultCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
        }
    }

    /// Returns the value if it is younger than the TTL it was stored with. Expired entries are
    /// removed on the way.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(Arc::clone(&entry.value));
            }
        }
        // guard dropped above, removing now cannot deadlock on the same shard
        if self.entries.remove_if(key, |_, entry| entry.expires_at <= now).is_some() {
            debug!("Evicted expired {} cache entry {}", self.name, key);
        }
        None
    }

    /// Stores a value, replacing any earlier one for the same key.
    pub fn put(&self, key: String, value: Arc<V>, ttl: Duration) {
        let expires_at = Instant::now() + ttl.min(MAX_TTL);
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drops every expired entry. Returns how many there were.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sweeps `cache` every `period` until `stop` is cancelled.
pub async fn run_sweeper<V>(cache: Arc<ResultCache<V>>, period: Duration, stop: CancellationToken)
where
    V: Send + Sync,
{
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately, nothing to sweep yet
    interval.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                let swept = cache.sweep();
                if swept > 0 {
                    info!(
                        "Swept {} expired {} cache entries, {} remain",
                        swept,
                        cache.name,
                        cache.len()
                    );
                }
            }
        }
    }
    debug!("{} cache sweeper stopped", cache.name);
}
