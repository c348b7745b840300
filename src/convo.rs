//! Conversation steps as supplied by the host on each step advance.
//!
//! Logic hooks are plain data here: the host's assertion engine owns their
//! behavior, the session only looks at which hooks a step carries.

use serde::{Deserialize, Serialize};

/// Join consecutive recognitions on this step; arg 0 is the join timeout in ms
pub const JOIN_SILENCE_DURATION_HOOK: &str = "VOIP_JOIN_SILENCE_DURATION";
/// Suppress both silence guards on this step
pub const IGNORE_SILENCE_DURATION_HOOK: &str = "VOIP_IGNORE_SILENCE_DURATION";
/// Override the confidence threshold; arg 0 is the threshold
pub const CONFIDENCE_THRESHOLD_HOOK: &str = "VOIP_CONFIDENCE_THRESHOLD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicHook {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvoStep {
    pub sender: Sender,
    #[serde(default)]
    pub message_text: Option<String>,
    #[serde(default)]
    pub logic_hooks: Vec<LogicHook>,
}

impl ConvoStep {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            message_text: Some(text.into()),
            logic_hooks: Vec::new(),
        }
    }

    pub fn bot() -> Self {
        Self {
            sender: Sender::Bot,
            message_text: None,
            logic_hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, name: &str, args: &[&str]) -> Self {
        self.logic_hooks.push(LogicHook {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    pub fn logic_hook(&self, name: &str) -> Option<&LogicHook> {
        self.logic_hooks.iter().find(|hook| hook.name == name)
    }

    pub fn has_join_hook(&self) -> bool {
        self.logic_hook(JOIN_SILENCE_DURATION_HOOK).is_some()
    }

    /// Join timeout carried by the join hook, if it has a usable argument
    pub fn join_timeout_ms(&self) -> Option<u64> {
        self.logic_hook(JOIN_SILENCE_DURATION_HOOK)
            .and_then(|hook| hook.args.first())
            .and_then(|arg| arg.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
    }

    pub fn ignores_silence_duration(&self) -> bool {
        self.logic_hook(IGNORE_SILENCE_DURATION_HOOK).is_some()
    }

    pub fn confidence_threshold(&self) -> Option<f64> {
        self.logic_hook(CONFIDENCE_THRESHOLD_HOOK)
            .and_then(|hook| hook.args.first())
            .and_then(|arg| arg.trim().parse::<f64>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_lookup() {
        let step = ConvoStep::bot()
            .with_hook(JOIN_SILENCE_DURATION_HOOK, &["3000"])
            .with_hook(CONFIDENCE_THRESHOLD_HOOK, &["0.8"]);

        assert!(step.has_join_hook());
        assert_eq!(step.join_timeout_ms(), Some(3000));
        assert_eq!(step.confidence_threshold(), Some(0.8));
        assert!(!step.ignores_silence_duration());
    }

    #[test]
    fn test_join_hook_without_argument() {
        let step = ConvoStep::bot().with_hook(JOIN_SILENCE_DURATION_HOOK, &[]);
        assert!(step.has_join_hook());
        assert_eq!(step.join_timeout_ms(), None);
    }

    #[test]
    fn test_deserialize_step() {
        let step: ConvoStep = serde_json::from_str(
            r#"{"sender":"bot","logic_hooks":[{"name":"VOIP_IGNORE_SILENCE_DURATION"}]}"#,
        )
        .unwrap();
        assert!(step.ignores_silence_duration());
        assert_eq!(step.message_text, None);
    }
}
