use anyhow::{bail, Context, Result};
use futures::Future;
use reqwest::header::SET_COOKIE;
use reqwest::Url;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, COOKIE};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::truncate;
use crate::config::{ConnectConfig, WorkerEndpoint};
use crate::error::{SessionError, SessionResult};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

pub type WorkerStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Result of the HTTP handshake: where to open the channel
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    pub port: String,
    /// `Cookie` header value built from the handshake's `set-cookie`
    pub cookie: Option<String>,
}

/// Bootstraps the streaming channel to a call worker
pub struct WorkerClient {
    http: reqwest::Client,
    endpoint: WorkerEndpoint,
    retry: ConnectConfig,
}

impl WorkerClient {
    pub fn new(endpoint: WorkerEndpoint, retry: ConnectConfig) -> SessionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HANDSHAKE_TIMEOUT)
            .build()
            .map_err(|e| SessionError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            retry,
        })
    }

    pub fn endpoint(&self) -> &WorkerEndpoint {
        &self.endpoint
    }

    /// HTTP(S) form of the worker endpoint with `initCall` appended
    pub fn handshake_url(&self) -> SessionResult<Url> {
        let base = &self.endpoint.base_url;
        let http_base = if let Some(rest) = base.strip_prefix("wss://") {
            format!("https://{rest}/")
        } else if let Some(rest) = base.strip_prefix("ws://") {
            format!("http://{rest}/")
        } else {
            format!("{base}/")
        };

        Url::parse(&http_base)
            .and_then(|url| url.join("initCall"))
            .map_err(|e| SessionError::Config(format!("invalid worker url {base}: {e}")))
    }

    pub fn channel_url(&self, handshake: &Handshake) -> String {
        format!("{}/ws/{}", self.endpoint.base_url, handshake.port)
    }

    /// Handshake then channel open, each retried with a fixed delay
    pub async fn connect(&self) -> SessionResult<WorkerStream> {
        let handshake = with_retry("Connecting to VOIP Worker", &self.retry, || self.handshake()).await?;
        info!("Worker handshake complete, port {}", handshake.port);

        let stream = with_retry("Websocket connection", &self.retry, || {
            self.open_channel(&handshake)
        })
        .await?;
        info!("Websocket connection to {} opened", self.channel_url(&handshake));

        Ok(stream)
    }

    pub async fn handshake(&self) -> Result<Handshake> {
        let url = self.handshake_url()?;
        debug!("Worker handshake: POST {}", url);

        let response = self
            .http
            .post(url.clone())
            .json(&json!({ "API_KEY": self.endpoint.api_key }))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "Status: {} / Response: {}",
                status.as_u16(),
                truncate(&body, 200)
            );
        }

        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();

        let body: Value = response
            .json()
            .await
            .context("Handshake response is not JSON")?;
        let port = match body.get("port") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => bail!("Handshake response carries no port"),
        };

        Ok(Handshake {
            port,
            cookie: (!cookies.is_empty()).then(|| cookies.join("; ")),
        })
    }

    pub async fn open_channel(&self, handshake: &Handshake) -> Result<WorkerStream> {
        let url = self.channel_url(handshake);
        let mut request = url
            .as_str()
            .into_client_request()
            .with_context(|| format!("Invalid channel url {url}"))?;

        if let Some(cookie) = &handshake.cookie {
            let value = HeaderValue::from_str(cookie).context("Invalid handshake cookie")?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (stream, _response) = connect_async(request)
            .await
            .with_context(|| format!("Websocket connection failed to {url}"))?;
        Ok(stream)
    }
}

/// Run `op` until it succeeds, at most `max_retries + 1` times.
///
/// The last error chain ends up in `SessionError::Connect`.
pub async fn with_retry<T, F, Fut>(what: &str, retry: &ConnectConfig, mut op: F) -> SessionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(reason) => {
                warn!(
                    "Retry {} / {}: {} failed: {:#}",
                    attempt, retry.max_retries, what, reason
                );
                if attempt >= retry.max_retries {
                    return Err(SessionError::Connect {
                        attempts: attempt + 1,
                        reason: format!("{what}: {reason:#}"),
                    });
                }
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(retry.retry_delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn client(base_url: &str) -> WorkerClient {
        WorkerClient::new(
            WorkerEndpoint {
                base_url: base_url.to_string(),
                api_key: None,
            },
            ConnectConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_handshake_url() {
        assert_eq!(
            client("wss://worker.example.com").handshake_url().unwrap().as_str(),
            "https://worker.example.com/initCall"
        );
        assert_eq!(
            client("ws://localhost:5000/voip").handshake_url().unwrap().as_str(),
            "http://localhost:5000/voip/initCall"
        );
    }

    #[test]
    fn test_channel_url() {
        let handshake = Handshake {
            port: "6001".to_string(),
            cookie: None,
        };
        assert_eq!(
            client("ws://localhost:5000").channel_url(&handshake),
            "ws://localhost:5000/ws/6001"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let retry = ConnectConfig {
            max_retries: 2,
            retry_delay_ms: 4000,
        };

        let result: SessionResult<()> = with_retry("Handshake", &retry, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow!("connection refused")).context("POST http://worker/initCall") }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(SessionError::Connect { attempts, reason }) => {
                assert_eq!(attempts, 3);
                assert_eq!(
                    reason,
                    "Handshake: POST http://worker/initCall: connection refused"
                );
            }
            other => panic!("expected connect error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers() {
        let calls = AtomicU32::new(0);
        let retry = ConnectConfig::default();

        let result = with_retry("Handshake", &retry, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(anyhow!("not yet"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }
}
