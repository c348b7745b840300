use anyhow::Result;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{SessionError, SessionResult};
use crate::segmentation::{Policy, SentenceSplitter};

/// Complete configuration for a voice session.
///
/// Every section falls back to the built-in defaults, so a config file only
/// needs to name what differs. Sessions receive the loaded value behind an
/// `Arc` and never mutate it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VoipConfig {
    pub worker: WorkerConfig,
    pub global_worker: GlobalWorkerConfig,
    pub connect: ConnectConfig,
    pub sip: SipConfig,
    pub ice: IceConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub silence: SilenceConfig,
    pub session: LifecycleConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker base endpoint (`ws://` or `wss://`)
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Use the shared worker from `global_worker` instead of `url`/`api_key`
    pub use_global: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GlobalWorkerConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub retry_delay_ms: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    pub pool_caller_enable: bool,
    pub caller_registrar_uri: Option<String>,
    pub caller_address: Option<String>,
    pub caller_username: Option<String>,
    pub caller_password: Option<String>,
    pub caller_uri: Option<String>,
    pub callee_uri: Option<String>,
    pub proxy: Option<String>,
    pub protocol: String,
    #[serde(deserialize_with = "json_or_string")]
    pub reg_headers: Option<Value>,
    #[serde(deserialize_with = "json_or_string")]
    pub invite_headers: Option<Value>,
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            pool_caller_enable: false,
            caller_registrar_uri: None,
            caller_address: None,
            caller_username: None,
            caller_password: None,
            caller_uri: None,
            callee_uri: None,
            proxy: None,
            protocol: "TCP".to_string(),
            reg_headers: None,
            invite_headers: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub enable: bool,
    /// Accepts a list or a comma-separated string
    #[serde(deserialize_with = "list_or_csv")]
    pub stun_servers: Vec<String>,
    pub turn_server: Option<String>,
    pub turn_user: Option<String>,
    pub turn_password: Option<String>,
    pub turn_protocol: String,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            enable: false,
            stun_servers: Vec::new(),
            turn_server: None,
            turn_user: None,
            turn_password: None,
            turn_protocol: "TCP".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub url_stream: Option<String>,
    #[serde(deserialize_with = "json_or_string")]
    pub params_stream: Option<Value>,
    pub method_stream: String,
    #[serde(deserialize_with = "json_or_string")]
    pub body_stream: Option<Value>,
    /// Recognizer body, only read for consumption attribution
    #[serde(deserialize_with = "json_or_string")]
    pub body: Option<Value>,
    #[serde(deserialize_with = "json_or_string")]
    pub headers: Option<Value>,
    pub timeout_ms: u64,
    pub confidence_threshold: f64,
    pub message_handling: MessageHandlingConfig,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url_stream: None,
            params_stream: None,
            method_stream: "POST".to_string(),
            body_stream: None,
            body: None,
            headers: None,
            timeout_ms: 10_000,
            confidence_threshold: 0.5,
            message_handling: MessageHandlingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessageHandlingConfig {
    pub policy: Policy,
    /// Join flush timeout, also the fast-flush gap threshold
    pub timeout_ms: u64,
    pub delimiter: String,
    /// Characters ending a sentence for SPLIT/EXPAND
    pub punctuation: String,
}

impl Default for MessageHandlingConfig {
    fn default() -> Self {
        Self {
            policy: Policy::Original,
            timeout_ms: 2500,
            delimiter: ". ".to_string(),
            punctuation: ".!?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub url: Option<String>,
    #[serde(deserialize_with = "json_or_string")]
    pub params: Option<Value>,
    pub method: String,
    #[serde(deserialize_with = "json_or_string")]
    pub body: Option<Value>,
    #[serde(deserialize_with = "json_or_string")]
    pub headers: Option<Value>,
    pub timeout_ms: u64,
    pub cache: TtsCacheConfig,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: None,
            params: None,
            method: "GET".to_string(),
            body: None,
            headers: None,
            timeout_ms: 10_000,
            cache: TtsCacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsCacheConfig {
    pub enable: bool,
    /// Upper bound on completed entries
    pub max_entries: usize,
    pub prefetch: bool,
}

impl Default for TtsCacheConfig {
    fn default() -> Self {
        Self {
            enable: false,
            max_entries: 100,
            prefetch: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SilenceConfig {
    pub timeout_enable: bool,
    pub timeout_ms: u64,
    pub start_enable: bool,
    pub start_ms: u64,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            timeout_enable: false,
            timeout_ms: 2500,
            start_enable: false,
            start_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on waiting for the worker's end-of-session signal
    pub stop_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 100_000,
        }
    }
}

/// Worker location and credential after resolving the global-worker flag
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl VoipConfig {
    /// Load from a config file (any format the `config` crate knows) layered
    /// with `VOIP_<SECTION>__<KEY>` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("VOIP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn worker_endpoint(&self) -> SessionResult<WorkerEndpoint> {
        let (url, api_key) = if self.worker.use_global {
            (&self.global_worker.url, &self.global_worker.api_key)
        } else {
            (&self.worker.url, &self.worker.api_key)
        };

        let base_url = url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty())
            .ok_or_else(|| SessionError::Config("worker url is not set".to_string()))?;

        Ok(WorkerEndpoint {
            base_url: base_url.to_string(),
            api_key: api_key.clone(),
        })
    }

    pub fn validate(&self) -> SessionResult<()> {
        let endpoint = self.worker_endpoint()?;
        if !(endpoint.base_url.starts_with("ws://") || endpoint.base_url.starts_with("wss://")) {
            return Err(SessionError::Config(format!(
                "worker url must be ws:// or wss://, got {}",
                endpoint.base_url
            )));
        }

        if let Some(url) = &self.tts.url {
            reqwest::Url::parse(url)
                .map_err(|e| SessionError::Config(format!("invalid TTS url {url}: {e}")))?;
        }

        SentenceSplitter::new(&self.stt.message_handling.punctuation)?;

        if self.tts.cache.enable && self.tts.cache.max_entries == 0 {
            return Err(SessionError::Config(
                "tts.cache.max_entries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Accept structured values as-is; strings are parsed as JSON.
fn json_or_string<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => serde_json::from_str(&s).map(Some).map_err(de::Error::custom),
        other => Ok(other),
    }
}

fn list_or_csv<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Option::<ListOrCsv>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(ListOrCsv::List(list)) => list,
        Some(ListOrCsv::Csv(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    })
}
