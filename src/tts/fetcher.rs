use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::request::{TtsAudio, TtsRequest};
use crate::error::TtsError;
use crate::worker::messages::truncate;

/// Source of synthesized speech
#[async_trait]
pub trait TtsFetcher: Send + Sync {
    async fn fetch(&self, request: &TtsRequest) -> Result<TtsAudio, TtsError>;
}

/// Fetches speech from an HTTP TTS service
#[derive(Debug, Clone, Default)]
pub struct HttpTtsFetcher {
    client: reqwest::Client,
}

impl HttpTtsFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `{origin}/api/status` of the TTS service, which must answer
    /// `{"status":"OK"}`
    pub async fn check_status(&self, tts_url: &str) -> Result<(), TtsError> {
        let url = status_url(tts_url)?;
        debug!("Checking TTS status: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TtsError::StatusCheck(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TtsError::StatusCheck(e.to_string()))?;

        let ok = status.is_success()
            && serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("status").and_then(Value::as_str).map(|s| s == "OK"))
                .unwrap_or(false);

        if ok {
            debug!("Checking TTS status response: {}", truncate(&body, 200));
            Ok(())
        } else {
            Err(TtsError::StatusCheck(format!(
                "response is: {}",
                truncate(&body, 200)
            )))
        }
    }
}

#[async_trait]
impl TtsFetcher for HttpTtsFetcher {
    async fn fetch(&self, request: &TtsRequest) -> Result<TtsAudio, TtsError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TtsError::Request(format!("invalid method {}: {e}", request.method)))?;

        let query: Vec<(String, String)> = request
            .params
            .iter()
            .map(|(k, v)| (k.clone(), query_value(v)))
            .collect();

        let mut builder = self
            .client
            .request(method, &request.url)
            .query(&query)
            .headers(header_map(request.headers.as_ref()))
            .timeout(Duration::from_millis(request.timeout_ms));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))?;

        let status = response.status();
        let duration_secs = response
            .headers()
            .get("content-duration")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))?;
        if bytes.is_empty() {
            return Err(TtsError::EmptyResponse);
        }

        debug!(
            "TTS returned {} bytes, duration {:?}s",
            bytes.len(),
            duration_secs
        );
        Ok(TtsAudio {
            bytes,
            duration_secs,
        })
    }
}

/// Origin of the TTS url joined with `/api/status`
pub fn status_url(tts_url: &str) -> Result<Url, TtsError> {
    Url::parse(tts_url)
        .and_then(|url| url.join("/api/status"))
        .map_err(|e| TtsError::StatusCheck(format!("invalid TTS url {tts_url}: {e}")))
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn header_map(headers: Option<&Value>) -> HeaderMap {
    let mut map = HeaderMap::new();
    let Some(Value::Object(headers)) = headers else {
        return map;
    };

    for (name, value) in headers {
        let value = query_value(value);
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => debug!("Skipping invalid TTS header {}", name),
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_url_uses_origin() {
        assert_eq!(
            status_url("https://tts.example.com:8443/api/tts?voice=a")
                .unwrap()
                .as_str(),
            "https://tts.example.com:8443/api/status"
        );
        assert!(status_url("not a url").is_err());
    }

    #[test]
    fn test_header_map_skips_invalid() {
        let map = header_map(Some(&json!({ "x-api-key": "k", "bad header": "v", "x-n": 3 })));
        assert_eq!(map.get("x-api-key").unwrap(), "k");
        assert_eq!(map.get("x-n").unwrap(), "3");
        assert_eq!(map.len(), 2);
    }
}
