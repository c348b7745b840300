//! Error types for session and TTS operations

use thiserror::Error;

/// Errors raised while fetching synthesized speech.
///
/// Cloneable so one failed fetch can be handed to every caller awaiting
/// the same deduplicated request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TtsError {
    #[error("TTS request failed: {0}")]
    Request(String),

    #[error("TTS failed - Status: {status} / Response: {body}")]
    Status { status: u16, body: String },

    #[error("TTS failed, response is empty")]
    EmptyResponse,

    #[error("Checking TTS Status failed - {0}")]
    StatusCheck(String),
}

/// Session-level errors.
///
/// Errors raised during a live call are delivered to the host as turn-level
/// errors, so this type is cloneable and its display text is what a test
/// assertion will see.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("Connecting to VOIP Worker failed after {attempts} attempts: {reason}")]
    Connect { attempts: u32, reason: String },

    #[error("Cannot open a call: SIP Authorization failed")]
    Unauthorized,

    #[error("Sip Registration failed")]
    RegistrationFailed,

    #[error("Error: {0}")]
    Worker(String),

    #[error("Silence Duration of {measured_secs}s exceeded Initial Silence Duration Timeout of {threshold_secs}s")]
    StartupSilence { measured_secs: f64, threshold_secs: f64 },

    #[error("Silence Duration of {measured_secs:.2}s exceeded General Silence Duration Timeout of {threshold_secs}s")]
    GeneralSilence { measured_secs: f64, threshold_secs: f64 },

    #[error(transparent)]
    Tts(#[from] TtsError),

    #[error("TTS not configured, only audio input supported")]
    TtsNotConfigured,

    #[error("Websocket channel error: {0}")]
    Channel(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Getting audio duration failed: {0}")]
    Audio(String),

    #[error("Session not started")]
    NotStarted,
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
