//! Text-to-speech for user turns
//!
//! - `TtsRequest` and its fingerprint identify one synthesis call
//! - `TtsFetcher` is the speech source, `HttpTtsFetcher` the HTTP one
//! - `TtsCache` deduplicates concurrent fetches and keeps an LRU of results
//! - `TtsEngine` ties them to the session configuration and runs prefetch

mod cache;
mod engine;
mod fetcher;
mod request;

pub use cache::{CacheStats, TtsCache};
pub use engine::{has_placeholder, TtsEngine};
pub use fetcher::{status_url, HttpTtsFetcher, TtsFetcher};
pub use request::{TtsAudio, TtsRequest};
