use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::{CacheStats, TtsCache};
use super::fetcher::{HttpTtsFetcher, TtsFetcher};
use super::request::{TtsAudio, TtsRequest};
use crate::config::TtsConfig;
use crate::error::{SessionError, SessionResult};

/// Speech synthesis for user turns, with optional caching and prefetch
pub struct TtsEngine {
    config: TtsConfig,
    http: HttpTtsFetcher,
    cache: Arc<TtsCache>,
}

impl TtsEngine {
    pub fn new(config: &TtsConfig) -> Self {
        let http = HttpTtsFetcher::new();
        let fetcher: Arc<dyn TtsFetcher> = Arc::new(http.clone());
        Self {
            config: config.clone(),
            cache: Arc::new(TtsCache::new(&config.cache, fetcher)),
            http,
        }
    }

    /// Engine backed by a custom speech source
    pub fn with_fetcher(config: &TtsConfig, fetcher: Arc<dyn TtsFetcher>) -> Self {
        Self {
            config: config.clone(),
            http: HttpTtsFetcher::new(),
            cache: Arc::new(TtsCache::new(&config.cache, fetcher)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.url.is_some()
    }

    pub fn request(&self, text: &str) -> SessionResult<TtsRequest> {
        TtsRequest::from_config(&self.config, text).ok_or(SessionError::TtsNotConfigured)
    }

    pub async fn synthesize(&self, text: &str) -> SessionResult<TtsAudio> {
        let request = self.request(text)?;
        debug!("Synthesizing \"{}\"", text);
        Ok(self.cache.get(&request).await?)
    }

    /// Warm the cache for an upcoming user turn.
    ///
    /// Returns the background task, or `None` when prefetch is off or the
    /// text still holds an unresolved `$variable`. Failures are only logged.
    pub fn prefetch(&self, text: &str) -> Option<JoinHandle<()>> {
        if !self.config.cache.enable || !self.config.cache.prefetch {
            return None;
        }
        if has_placeholder(text) {
            debug!("Skipping TTS prefetch for templated text \"{}\"", text);
            return None;
        }
        let request = TtsRequest::from_config(&self.config, text)?;

        let cache = Arc::clone(&self.cache);
        let text = text.to_string();
        Some(tokio::spawn(async move {
            match cache.get(&request).await {
                Ok(_) => debug!("Prefetched TTS for \"{}\"", text),
                Err(e) => warn!("TTS prefetch for \"{}\" failed: {}", text, e),
            }
        }))
    }

    /// Probe the TTS service; no-op when TTS is not configured
    pub async fn check_status(&self) -> SessionResult<()> {
        let Some(url) = &self.config.url else {
            return Ok(());
        };
        self.http.check_status(url).await?;
        info!("TTS service at {} is up", url);
        Ok(())
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub fn cache(&self) -> &TtsCache {
        &self.cache
    }
}

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$[A-Za-z_]\w*").expect("placeholder pattern compiles"));

/// `$name` style template variable still present in the text
pub fn has_placeholder(text: &str) -> bool {
    PLACEHOLDER_RE.is_match(text)
}
