//! Deduplicating TTS cache
//!
//! Entries are keyed by request fingerprint and are either pending (a fetch
//! in flight, shared by every caller asking for the same audio) or ready.
//! Only ready entries count against the bound; the least recently used one
//! is evicted first. A failed fetch removes its pending entry so the next
//! request tries again.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::fetcher::TtsFetcher;
use super::request::{TtsAudio, TtsRequest};
use crate::config::TtsCacheConfig;
use crate::error::TtsError;

type SharedFetch = Shared<BoxFuture<'static, Result<TtsAudio, TtsError>>>;

enum Entry {
    Pending { id: u64, fetch: SharedFetch },
    Ready { audio: TtsAudio, last_used: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Served from a ready entry
    pub hits: u64,
    /// Joined a fetch already in flight
    pub joined: u64,
    pub misses: u64,
    /// Requests actually sent to the TTS service
    pub fetches: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    tick: u64,
    next_id: u64,
    stats: CacheStats,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn ready_len(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, Entry::Ready { .. }))
            .count()
    }

    fn complete(&mut self, key: &str, id: u64, result: &Result<TtsAudio, TtsError>, max_entries: usize) {
        // A newer fetch may own the slot by now
        if !matches!(self.entries.get(key), Some(Entry::Pending { id: pending, .. }) if *pending == id) {
            return;
        }

        match result {
            Ok(audio) => {
                let last_used = self.next_tick();
                self.entries.insert(
                    key.to_string(),
                    Entry::Ready {
                        audio: audio.clone(),
                        last_used,
                    },
                );
                self.evict(max_entries);
            }
            Err(e) => {
                debug!("TTS fetch failed, dropping pending entry: {}", e);
                self.entries.remove(key);
            }
        }
    }

    fn evict(&mut self, max_entries: usize) {
        while self.ready_len() > max_entries {
            let oldest = self
                .entries
                .iter()
                .filter_map(|(key, entry)| match entry {
                    Entry::Ready { last_used, .. } => Some((*last_used, key.clone())),
                    Entry::Pending { .. } => None,
                })
                .min();

            let Some((_, key)) = oldest else {
                break;
            };
            debug!("Evicting TTS cache entry {}", key);
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

pub struct TtsCache {
    enabled: bool,
    max_entries: usize,
    fetcher: Arc<dyn TtsFetcher>,
    inner: Arc<Mutex<Inner>>,
}

impl TtsCache {
    pub fn new(config: &TtsCacheConfig, fetcher: Arc<dyn TtsFetcher>) -> Self {
        Self {
            enabled: config.enable,
            max_entries: config.max_entries.max(1),
            fetcher,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Audio for `request`, fetched at most once while cached
    pub async fn get(&self, request: &TtsRequest) -> Result<TtsAudio, TtsError> {
        if !self.enabled {
            self.inner.lock().await.stats.fetches += 1;
            return self.fetcher.fetch(request).await;
        }

        let key = request.fingerprint();
        let fetch = {
            let mut guard = self.inner.lock().await;
            let tick = guard.next_tick();
            let inner = &mut *guard;

            match inner.entries.get_mut(&key) {
                Some(Entry::Ready { audio, last_used }) => {
                    *last_used = tick;
                    inner.stats.hits += 1;
                    return Ok(audio.clone());
                }
                Some(Entry::Pending { fetch, .. }) => {
                    inner.stats.joined += 1;
                    fetch.clone()
                }
                None => {
                    inner.stats.misses += 1;
                    inner.stats.fetches += 1;
                    inner.next_id += 1;
                    let id = inner.next_id;

                    let fetch = self.start_fetch(key.clone(), id, request.clone());
                    inner.entries.insert(
                        key.clone(),
                        Entry::Pending {
                            id,
                            fetch: fetch.clone(),
                        },
                    );
                    fetch
                }
            }
        };

        fetch.await
    }

    fn start_fetch(&self, key: String, id: u64, request: TtsRequest) -> SharedFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let inner = Arc::clone(&self.inner);
        let max_entries = self.max_entries;

        let fetch = async move {
            let result = fetcher.fetch(&request).await;
            inner.lock().await.complete(&key, id, &result, max_entries);
            result
        }
        .boxed()
        .shared();

        // Drive the fetch to completion even if every caller gives up on it
        tokio::spawn(fetch.clone());
        fetch
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.stats
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn ready_len(&self) -> usize {
        self.inner.lock().await.ready_len()
    }

    pub async fn contains(&self, request: &TtsRequest) -> bool {
        let key = request.fingerprint();
        self.inner.lock().await.entries.contains_key(&key)
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.stats = CacheStats::default();
    }
}
