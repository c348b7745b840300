use serde::Serialize;
use serde_json::Value;

use crate::error::SessionError;

/// One bot-side conversational unit delivered to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotTurn {
    pub message_text: String,

    /// Raw worker frame, or the ordered list of frames for a merged turn
    pub source_data: Value,

    /// Seconds of silence before this turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_duration: Option<f64>,

    /// Seconds of speech in this turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_duration: Option<f64>,
}

/// What the host receives on its bot queue
#[derive(Debug, Clone, PartialEq)]
pub enum BotReply {
    Message(BotTurn),
    /// In-call failure surfaced where the conversation assertion will see it
    Error(SessionError),
}

impl BotReply {
    pub fn text(&self) -> Option<&str> {
        match self {
            BotReply::Message(turn) => Some(&turn.message_text),
            BotReply::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, BotReply::Error(_))
    }
}
