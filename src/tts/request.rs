use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::config::TtsConfig;

/// Fully resolved TTS call for one utterance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TtsRequest {
    pub url: String,
    pub method: String,
    /// Query parameters, including `text`
    pub params: Map<String, Value>,
    pub body: Option<Value>,
    pub headers: Option<Value>,
    pub timeout_ms: u64,
}

impl TtsRequest {
    /// Build the request for `text`, or `None` when no TTS url is configured
    pub fn from_config(cfg: &TtsConfig, text: &str) -> Option<Self> {
        let url = cfg.url.clone()?;

        let mut params = match &cfg.params {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        params.insert("text".to_string(), Value::String(text.to_string()));

        Some(Self {
            url,
            method: cfg.method.to_uppercase(),
            params,
            body: cfg.body.clone(),
            headers: cfg.headers.clone(),
            timeout_ms: cfg.timeout_ms,
        })
    }

    pub fn text(&self) -> Option<&str> {
        self.params.get("text").and_then(Value::as_str)
    }

    /// SHA-256 over the parts that determine the synthesized audio.
    ///
    /// Headers and timeout are excluded; `serde_json` maps are ordered so
    /// equal requests always serialize to the same bytes.
    pub fn fingerprint(&self) -> String {
        let key = json!({
            "url": self.url,
            "method": self.method,
            "params": self.params,
            "body": self.body,
        });

        let mut hasher = Sha256::new();
        hasher.update(key.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Synthesized speech
#[derive(Debug, Clone, PartialEq)]
pub struct TtsAudio {
    pub bytes: Bytes,
    /// Playback length reported by the TTS service, in seconds
    pub duration_secs: Option<f64>,
}
