//! Voice session supervision
//!
//! This module provides the `VoipSession` abstraction that manages:
//! - Worker connection and call setup
//! - A single actor task that owns the channel and all per-call state
//! - Frame dispatch to the guardian, segmenter and recording reassembler
//! - User turns (DTMF, synthesized speech, recorded media)
//! - Stop with a bounded wait for the worker's end-of-session signal

mod actor;
mod host;
mod metrics;
#[allow(clippy::module_inception)]
mod session;
mod state;
mod stats;
mod turn;

pub use actor::StopOutcome;
pub use host::{Attachment, ChannelHost, ConsumptionMetric, Host, HostEvent, MetricKind};
pub use metrics::{extract_api_key, E2E_VOICE_CATEGORY, STT_SECONDS_METRIC, TTS_CHARACTERS_METRIC};
pub use session::VoipSession;
pub use state::{Effect, SessionState};
pub use stats::SessionStats;
pub use turn::{UserMedia, UserTurn, UserTurnOutcome};
