use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a voice session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Worker-assigned id, known once the call is initialized
    pub session_id: Option<String>,

    /// Local id of this run, for log correlation
    pub run_id: String,

    /// When `start()` was called
    pub started_at: DateTime<Utc>,

    /// Seconds since start
    pub duration_secs: f64,

    /// Bot turns delivered to the host
    pub turns_emitted: usize,

    /// Turn-level errors delivered to the host
    pub errors_emitted: usize,

    pub recording_emitted: bool,

    /// Worker signalled end of session or the channel closed
    pub ended: bool,
}
