use serde::{Deserialize, Serialize};

/// How final recognitions are turned into bot turns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Policy {
    /// One turn per final recognition
    #[default]
    Original,
    /// One turn per sentence.
    ///
    /// Text after the last punctuation run is kept as a final sentence
    /// ("Hi. How are" gives "Hi." and "How are") rather than dropped.
    Split,
    /// Same as `Split`
    Expand,
    /// Merge recognitions until a silence gap or the join timer
    Join,
    /// Same as `Join`
    Concat,
    /// `Join` with worker-side silence detection
    Psst,
}

impl Policy {
    pub fn is_join_like(self) -> bool {
        matches!(self, Policy::Join | Policy::Concat | Policy::Psst)
    }

    pub fn is_split_like(self) -> bool {
        matches!(self, Policy::Split | Policy::Expand)
    }
}

/// Behavior selected for one event: policy plus step hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Original,
    Split,
    Join { timeout_ms: u64 },
}
