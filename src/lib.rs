pub mod audio;
pub mod config;
pub mod convo;
pub mod error;
pub mod guardian;
pub mod recording;
pub mod segmentation;
pub mod session;
pub mod stt;
pub mod tts;
pub mod worker;

pub use audio::AudioFile;
pub use config::VoipConfig;
pub use convo::{ConvoStep, LogicHook, Sender};
pub use error::{SessionError, SessionResult, TtsError};
pub use segmentation::{BotReply, BotTurn, Policy};
pub use session::{
    Attachment, ChannelHost, ConsumptionMetric, Host, HostEvent, SessionStats, StopOutcome,
    UserMedia, UserTurn, UserTurnOutcome, VoipSession,
};
pub use tts::{TtsAudio, TtsEngine};
