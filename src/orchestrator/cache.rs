//! Three-tier cache (§4.3.2): hot in-memory LRU, on-disk file snapshots,
//! and a permanent history tier.
//!
//! Grounded on the teacher's `engine::enricher::ContextCache` (TTL-keyed
//! `HashMap`, `evict_expired`) for the hot tier's shape, generalized to a
//! bounded LRU (spec requires "bounded") and extended with a file tier
//! (atomic rename-on-write, §5) and a permanent history tier. The history
//! tier delegates to `storage::history_store`, which the Backtester reads
//! directly.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

use crate::storage::history_store::HistoryStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub inserted_at: DateTime<Utc>,
    pub ttl_secs: i64,
}

impl CacheEntry {
    pub fn is_fresh(&self) -> bool {
        Utc::now() - self.inserted_at < Duration::seconds(self.ttl_secs)
    }
}

/// Bounded LRU hot tier: sub-millisecond lookup, evicts the least recently
/// used entry once `capacity` is exceeded.
struct HotTier {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, CacheEntry>,
}

impl HotTier {
    fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::new(), entries: HashMap::new() }
    }

    fn get(&mut self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.entries.get(key).cloned() {
            self.touch(key);
            Some(entry)
        } else {
            None
        }
    }

    fn insert(&mut self, key: String, entry: CacheEntry) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key.clone(), entry);
        self.touch(&key);
    }

    fn touch(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push_back(key.to_string());
    }
}

/// File tier: one JSON snapshot per cache key, written via a temp file plus
/// atomic rename so a crash mid-write never leaves a corrupt snapshot.
struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe = key.chars().map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' }).collect::<String>();
        self.dir.join(format!("{safe}.json"))
    }

    fn get(&self, key: &str) -> Option<CacheEntry> {
        let path = self.path_for(key);
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn insert(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context("creating file cache dir")?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(entry).context("serializing cache entry")?;
        std::fs::write(&tmp_path, bytes).context("writing temp cache file")?;
        std::fs::rename(&tmp_path, &path).context("renaming cache file into place")?;
        Ok(())
    }
}

/// Outcome of a cache-backed fetch: the value, plus whether it was served
/// stale (a cache hit past its TTL, returned only because a fresh fetch
/// failed).
pub struct FetchOutcome {
    pub value: serde_json::Value,
    pub stale: bool,
}

pub struct ThreeTierCache {
    hot: Mutex<HotTier>,
    file: FileTier,
    history: HistoryStore,
}

impl ThreeTierCache {
    pub fn new(hot_capacity: usize, file_dir: PathBuf, history: HistoryStore) -> Self {
        Self { hot: Mutex::new(HotTier::new(hot_capacity)), file: FileTier::new(file_dir), history }
    }

    /// Read-through fetch: check hot, then file, then call `fetch` on miss.
    /// On fetch success, write through all three tiers. On fetch failure,
    /// serve the most recent value from either tier, flagged stale, if one
    /// exists.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        collector_key: &str,
        request_key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<FetchOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<serde_json::Value>>,
    {
        let cache_key = format!("{collector_key}:{request_key}");

        if let Some(entry) = self.hot.lock().await.get(&cache_key) {
            if entry.is_fresh() {
                debug!(cache_key = %cache_key, tier = "hot", "cache hit");
                return Ok(FetchOutcome { value: entry.value, stale: false });
            }
        }
        if let Some(entry) = self.file.get(&cache_key) {
            if entry.is_fresh() {
                debug!(cache_key = %cache_key, tier = "file", "cache hit");
                self.hot.lock().await.insert(cache_key.clone(), entry.clone());
                return Ok(FetchOutcome { value: entry.value, stale: false });
            }
        }

        match fetch().await {
            Ok(value) => {
                let entry = CacheEntry { value: value.clone(), inserted_at: Utc::now(), ttl_secs: ttl.num_seconds() };
                self.hot.lock().await.insert(cache_key.clone(), entry.clone());
                let _ = self.file.insert(&cache_key, &entry);
                self.history.append(collector_key, request_key, &value).await?;
                Ok(FetchOutcome { value, stale: false })
            }
            Err(e) => {
                if let Some(entry) = self.hot.lock().await.get(&cache_key) {
                    debug!(cache_key = %cache_key, "serving stale value from hot tier after fetch failure");
                    return Ok(FetchOutcome { value: entry.value, stale: true });
                }
                if let Some(entry) = self.file.get(&cache_key) {
                    debug!(cache_key = %cache_key, "serving stale value from file tier after fetch failure");
                    return Ok(FetchOutcome { value: entry.value, stale: true });
                }
                Err(e)
            }
        }
    }
}

/// Dynamic TTL per §4.3.2: shortens as kickoff approaches.
pub fn dynamic_ttl(far_mins: i64, near_mins: i64, imminent_mins: i64, minutes_to_kickoff: Option<i64>) -> Duration {
    match minutes_to_kickoff {
        Some(m) if m < 30 => Duration::minutes(imminent_mins),
        Some(m) if m < 4 * 60 => Duration::minutes(near_mins),
        _ => Duration::minutes(far_mins),
    }
}
