//! Confidence gate for final recognitions.
//!
//! Each recognizer reports confidence in its own structure, so scoring tries
//! a list of extractors in order and takes the first that finds candidates.

use serde_json::Value;
use tracing::debug;

use super::event::SttEvent;
use crate::convo::ConvoStep;

type Extractor = fn(&Value) -> Option<Vec<f64>>;

const EXTRACTORS: &[(&str, Extractor)] = &[
    ("azure_nbest", azure_nbest),
    ("alternatives", source_alternatives),
];

/// Highest candidate confidence for the event, `None` if the recognizer
/// did not supply a scorable structure.
pub fn score(event: &SttEvent) -> Option<f64> {
    EXTRACTORS.iter().find_map(|(name, extract)| {
        let candidates = extract(&event.source)?;
        let best = candidates.into_iter().reduce(f64::max)?;
        debug!("Confidence {} from {}", best, name);
        Some(best)
    })
}

pub fn passes(score: Option<f64>, threshold: f64) -> bool {
    score.is_some_and(|s| s >= threshold)
}

/// Step override first, configured default otherwise
pub fn resolve_threshold(step: Option<&ConvoStep>, default: f64) -> f64 {
    step.and_then(ConvoStep::confidence_threshold).unwrap_or(default)
}

fn azure_nbest(frame: &Value) -> Option<Vec<f64>> {
    let raw = frame.pointer("/data/source/debug/privJson")?;
    let parsed;
    let priv_json = match raw {
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s).ok()?;
            &parsed
        }
        other => other,
    };

    let candidates: Vec<f64> = priv_json
        .get("NBest")?
        .as_array()?
        .iter()
        .filter_map(|n| n.get("Confidence").and_then(Value::as_f64))
        .collect();
    (!candidates.is_empty()).then_some(candidates)
}

fn source_alternatives(frame: &Value) -> Option<Vec<f64>> {
    let candidates: Vec<f64> = frame
        .pointer("/data/source/alternatives")?
        .as_array()?
        .iter()
        .filter_map(|alt| alt.get("confidence").and_then(Value::as_f64))
        .collect();
    (!candidates.is_empty()).then_some(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convo::CONFIDENCE_THRESHOLD_HOOK;
    use serde_json::json;

    fn event(source: Value) -> SttEvent {
        SttEvent {
            kind: Some("stt".to_string()),
            is_final: true,
            start: None,
            end: None,
            message: String::new(),
            source,
        }
    }

    #[test]
    fn test_passes() {
        assert!(!passes(None, 0.5));
        assert!(!passes(Some(0.49), 0.5));
        assert!(passes(Some(0.5), 0.5));
        assert!(passes(Some(0.9), 0.5));
        assert!(!passes(None, 0.0));
    }

    #[test]
    fn test_azure_priv_json_string() {
        let priv_json = json!({ "NBest": [{ "Confidence": 0.4 }, { "Confidence": 0.87 }] });
        let ev = event(json!({
            "data": { "source": { "debug": { "privJson": priv_json.to_string() } } }
        }));
        assert_eq!(score(&ev), Some(0.87));
    }

    #[test]
    fn test_azure_empty_nbest() {
        let ev = event(json!({
            "data": { "source": { "debug": { "privJson": "{\"NBest\":[]}" } } }
        }));
        assert_eq!(score(&ev), None);
    }

    #[test]
    fn test_alternatives() {
        let ev = event(json!({
            "data": { "source": { "alternatives": [{ "confidence": 0.62 }, { "transcript": "x" }] } }
        }));
        assert_eq!(score(&ev), Some(0.62));
    }

    #[test]
    fn test_no_structure_scores_none() {
        assert_eq!(score(&event(json!({ "data": { "message": "hi" } }))), None);
        let bad = event(json!({ "data": { "source": { "debug": { "privJson": "not json" } } } }));
        assert_eq!(score(&bad), None);
    }

    #[test]
    fn test_threshold_resolution() {
        let step = ConvoStep::bot().with_hook(CONFIDENCE_THRESHOLD_HOOK, &["0.9"]);
        assert_eq!(resolve_threshold(Some(&step), 0.5), 0.9);
        assert_eq!(resolve_threshold(Some(&ConvoStep::bot()), 0.5), 0.5);
        assert_eq!(resolve_threshold(None, 0.3), 0.3);
    }
}
