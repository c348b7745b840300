use serde_json::Value;

use super::host::Attachment;

/// Recorded audio the user plays into the call
#[derive(Debug, Clone, PartialEq)]
pub struct UserMedia {
    pub uri: String,
    pub mime_type: String,
    pub buffer: Vec<u8>,
}

/// What the test host wants the caller to do on a user step.
///
/// Buttons take precedence over text; media is played in addition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserTurn {
    pub message_text: Option<String>,
    /// DTMF digits, the first entry is sent
    pub buttons: Vec<String>,
    pub media: Vec<UserMedia>,
}

impl UserTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            message_text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn dtmf(digits: impl Into<String>) -> Self {
        Self {
            buttons: vec![digits.into()],
            ..Self::default()
        }
    }

    pub fn media(media: UserMedia) -> Self {
        Self {
            media: vec![media],
            ..Self::default()
        }
    }
}

/// Result of playing a user turn into the call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserTurnOutcome {
    /// Audio that was sent, for the host to attach to the user message
    pub attachments: Vec<Attachment>,
    /// TTS request that produced the audio
    pub source_data: Option<Value>,
    /// Seconds waited for playback
    pub playback_secs: f64,
}
