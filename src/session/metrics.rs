use serde_json::Value;

use super::host::{ConsumptionMetric, MetricKind};

pub const STT_SECONDS_METRIC: &str = "consumption.e2e.voip.stt.seconds";
pub const TTS_CHARACTERS_METRIC: &str = "consumption.e2e.voip.tts.characters";
pub const E2E_VOICE_CATEGORY: &str = "e2eVoiceIvr";

/// Credential locations of the speech vendors the worker can proxy to
const API_KEY_PATHS: &[&str] = &[
    "/polly/credentials/accessKeyId",
    "/google/credentials/client_email",
    "/ibm/credentials/apikey",
    "/awstranscribe/credentials/accessKeyId",
    "/azure/credentials/subscriptionKey",
];

/// Vendor key carried in an STT/TTS request body, if any
pub fn extract_api_key(body: Option<&Value>) -> Option<String> {
    let body = body?;
    API_KEY_PATHS
        .iter()
        .filter_map(|path| body.pointer(path))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

fn metric(
    metric_name: &str,
    category: Option<&str>,
    transactions: f64,
    body: Option<&Value>,
) -> ConsumptionMetric {
    let api_key = extract_api_key(body);
    ConsumptionMetric {
        kind: if api_key.is_some() {
            MetricKind::ThirdParty
        } else {
            MetricKind::Inbuilt
        },
        category: category.map(str::to_string),
        metric_name: metric_name.to_string(),
        transactions,
        api_key,
    }
}

/// Connected call time, billed as STT seconds
pub fn stt_seconds(connect_duration: f64, stt_body: Option<&Value>) -> ConsumptionMetric {
    metric(
        STT_SECONDS_METRIC,
        Some(E2E_VOICE_CATEGORY),
        connect_duration,
        stt_body,
    )
}

pub fn tts_characters(text: &str, tts_body: Option<&Value>) -> ConsumptionMetric {
    metric(
        TTS_CHARACTERS_METRIC,
        None,
        text.chars().count() as f64,
        tts_body,
    )
}
