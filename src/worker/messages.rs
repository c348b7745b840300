use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::VoipConfig;
use crate::segmentation::Policy;
use crate::stt::SttEvent;

/// Control message sent to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "METHOD")]
pub enum OutboundMessage {
    #[serde(rename = "initCall")]
    InitCall(Box<InitCall>),

    #[serde(rename = "sendDtmf")]
    SendDtmf {
        digits: String,
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
    },

    #[serde(rename = "sendAudio")]
    SendAudio {
        b64_buffer: String,
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
        #[serde(rename = "PESQ", skip_serializing_if = "Option::is_none")]
        pesq: Option<bool>,
    },

    #[serde(rename = "stopCall")]
    StopCall {
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
    },

    #[serde(rename = "setSttSilenceDuration")]
    SetSttSilenceDuration {
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
        #[serde(rename = "silenceDurationMs")]
        silence_duration_ms: u64,
    },
}

impl OutboundMessage {
    pub fn method(&self) -> &'static str {
        match self {
            OutboundMessage::InitCall(_) => "initCall",
            OutboundMessage::SendDtmf { .. } => "sendDtmf",
            OutboundMessage::SendAudio { .. } => "sendAudio",
            OutboundMessage::StopCall { .. } => "stopCall",
            OutboundMessage::SetSttSilenceDuration { .. } => "setSttSilenceDuration",
        }
    }

    /// Fill in the worker session id where the message carries one and it
    /// is still unset
    pub fn with_session_id(mut self, id: Option<&str>) -> Self {
        if let OutboundMessage::SendDtmf { session_id, .. }
        | OutboundMessage::SendAudio { session_id, .. }
        | OutboundMessage::StopCall { session_id }
        | OutboundMessage::SetSttSilenceDuration { session_id, .. } = &mut self
        {
            if session_id.is_none() {
                *session_id = id.map(str::to_string);
            }
        }
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Call setup relayed to the worker: SIP, ICE, STT and TTS configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct InitCall {
    pub sip_caller_auto: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_proxy: Option<String>,
    pub sip_protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_caller_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_caller_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_caller_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_caller_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_caller_registrar_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_callee_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_reg_headers: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_invite_headers: Option<Value>,
    pub ice_enable: bool,
    pub ice_stun_servers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ice_turn_server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ice_turn_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ice_turn_password: Option<String>,
    pub ice_turn_protocol: String,
    /// Worker-side silence detection, only when the general guard is on
    pub min_silence_duration: Option<u64>,
    pub stt_config: SttStreamConfig,
    pub tts_config: TtsStreamConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttStreamConfig {
    pub stt_url: Option<String>,
    pub stt_params: Option<Value>,
    pub stt_body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsStreamConfig {
    pub tts_url: Option<String>,
    pub tts_params: Option<Value>,
    pub tts_body: Option<Value>,
}

impl InitCall {
    pub fn from_config(cfg: &VoipConfig) -> Self {
        let stt_url = match cfg.stt.message_handling.policy {
            Policy::Psst => cfg.stt.url_stream.as_deref().map(psst_stream_url),
            _ => cfg.stt.url_stream.clone(),
        };

        Self {
            sip_caller_auto: cfg.sip.pool_caller_enable,
            sip_proxy: cfg.sip.proxy.clone(),
            sip_protocol: cfg.sip.protocol.clone(),
            sip_caller_uri: cfg.sip.caller_uri.clone(),
            sip_caller_username: cfg.sip.caller_username.clone(),
            sip_caller_password: cfg.sip.caller_password.clone(),
            sip_caller_address: cfg.sip.caller_address.clone(),
            sip_caller_registrar_uri: cfg.sip.caller_registrar_uri.clone(),
            sip_callee_uri: cfg.sip.callee_uri.clone(),
            sip_reg_headers: cfg.sip.reg_headers.clone(),
            sip_invite_headers: cfg.sip.invite_headers.clone(),
            ice_enable: cfg.ice.enable,
            ice_stun_servers: cfg.ice.stun_servers.clone(),
            ice_turn_server: cfg.ice.turn_server.clone(),
            ice_turn_username: cfg.ice.turn_user.clone(),
            ice_turn_password: cfg.ice.turn_password.clone(),
            ice_turn_protocol: cfg.ice.turn_protocol.clone(),
            min_silence_duration: cfg
                .silence
                .timeout_enable
                .then_some(cfg.silence.timeout_ms),
            stt_config: SttStreamConfig {
                stt_url,
                stt_params: cfg.stt.params_stream.clone(),
                stt_body: cfg.stt.body_stream.clone(),
            },
            tts_config: TtsStreamConfig {
                tts_url: cfg.tts.url.clone(),
                tts_params: cfg.tts.params.clone(),
                tts_body: cfg.tts.body.clone(),
            },
        }
    }
}

/// PSST recognizers stream on `<url>/psst` instead of the legacy endpoint
pub fn psst_stream_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/psst") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/psst")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallStatus {
    Initialized,
    Unauthorized,
    Forbidden,
    Connected,
    Disconnected,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallInfo {
    pub status: CallStatus,
    /// Originating event, e.g. `onCallRegState`
    pub event: Option<String>,
    /// Present on `initialized`
    pub session_id: Option<String>,
    /// Seconds connected, present on `disconnected`
    pub connect_duration: Option<f64>,
}

/// One `[start, end, duration]` span from a worker silence notice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceSpan {
    pub start: f64,
    pub end: f64,
    pub duration: f64,
}

/// Frame received from the worker
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    CallInfo(CallInfo),
    Error { message: String },
    Silence { spans: Vec<SilenceSpan> },
    FullRecord(Value),
    FullRecordStart(Value),
    FullRecordChunk(Value),
    FullRecordEnd(Value),
    Stt(SttEvent),
    Other(Option<String>),
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value))
    }

    /// Classify a decoded frame. Unknown or incomplete frames become
    /// `Other`; nothing here fails on missing fields.
    pub fn from_value(value: Value) -> Self {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_string);

        match kind.as_deref() {
            Some("callinfo") => InboundFrame::CallInfo(CallInfo {
                status: match value.get("status").and_then(Value::as_str) {
                    Some("initialized") => CallStatus::Initialized,
                    Some("unauthorized") => CallStatus::Unauthorized,
                    Some("forbidden") => CallStatus::Forbidden,
                    Some("connected") => CallStatus::Connected,
                    Some("disconnected") => CallStatus::Disconnected,
                    other => CallStatus::Other(other.unwrap_or_default().to_string()),
                },
                event: value.get("event").and_then(Value::as_str).map(str::to_string),
                session_id: value
                    .pointer("/voipConfig/sessionId")
                    .and_then(|id| match id {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    }),
                connect_duration: value.get("connectDuration").and_then(Value::as_f64),
            }),
            Some("error") => InboundFrame::Error {
                message: match value.get("message") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => "unknown worker error".to_string(),
                },
            },
            Some("silence") => InboundFrame::Silence {
                spans: value
                    .pointer("/data/silence")
                    .and_then(Value::as_array)
                    .map(|spans| spans.iter().filter_map(parse_span).collect())
                    .unwrap_or_default(),
            },
            Some("fullRecord") => InboundFrame::FullRecord(value),
            Some("fullRecordStart") => InboundFrame::FullRecordStart(value),
            Some("fullRecordChunk") => InboundFrame::FullRecordChunk(value),
            Some("fullRecordEnd") => InboundFrame::FullRecordEnd(value),
            _ => match SttEvent::from_frame(&value) {
                Some(event) => InboundFrame::Stt(event),
                None => InboundFrame::Other(kind),
            },
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(
            self,
            InboundFrame::FullRecord(_)
                | InboundFrame::FullRecordStart(_)
                | InboundFrame::FullRecordChunk(_)
                | InboundFrame::FullRecordEnd(_)
        )
    }
}

fn parse_span(span: &Value) -> Option<SilenceSpan> {
    let span = span.as_array()?;
    Some(SilenceSpan {
        start: span.first().and_then(Value::as_f64).unwrap_or_default(),
        end: span.get(1).and_then(Value::as_f64).unwrap_or_default(),
        duration: span.get(2)?.as_f64()?,
    })
}

const RECORDING_FIELDS: &[&str] = &["fullRecord", "chunk", "b64_buffer", "payload", "buffer", "audio"];

/// Frame text for logs: recording payloads replaced, long output truncated
pub fn log_summary(frame: &str) -> String {
    let summary = match serde_json::from_str::<Value>(frame) {
        Ok(Value::Object(mut map)) => {
            for field in RECORDING_FIELDS {
                if let Some(v) = map.get_mut(*field) {
                    *v = Value::String("<full_record_buffer>".to_string());
                }
            }
            Value::Object(map).to_string()
        }
        _ => frame.to_string(),
    };
    truncate(&summary, 200)
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
