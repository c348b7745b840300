use serde_json::Value;

/// One recognition result from the worker's STT stream.
///
/// `start`/`end` are utterance offsets in seconds from call start. `source`
/// keeps the full frame so it can be handed to the host as turn source data.
#[derive(Debug, Clone, PartialEq)]
pub struct SttEvent {
    /// `data.type`, `"stt"` for recognizer output
    pub kind: Option<String>,
    pub is_final: bool,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub message: String,
    pub source: Value,
}

/// Utterance offsets of an event, kept after the event itself is consumed
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timing {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl SttEvent {
    /// Build from a worker frame carrying a `data.final` flag.
    ///
    /// Returns `None` when the frame has no boolean `data.final`; every other
    /// field is optional and missing values never fail.
    pub fn from_frame(frame: &Value) -> Option<Self> {
        let data = frame.get("data")?;
        let is_final = data.get("final")?.as_bool()?;

        Some(Self {
            kind: data.get("type").and_then(Value::as_str).map(str::to_string),
            is_final,
            start: data.get("start").and_then(Value::as_f64),
            end: data.get("end").and_then(Value::as_f64),
            message: data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            source: frame.clone(),
        })
    }

    /// Final recognizer output, the only kind that becomes a turn
    pub fn is_final_stt(&self) -> bool {
        self.is_final && self.kind.as_deref() == Some("stt")
    }

    pub fn timing(&self) -> Timing {
        Timing {
            start: self.start,
            end: self.end,
        }
    }
}
