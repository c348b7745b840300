pub mod client;
pub mod messages;

pub use client::{with_retry, Handshake, WorkerClient, WorkerStream};
pub use messages::{
    CallInfo, CallStatus, InboundFrame, InitCall, OutboundMessage, SilenceSpan, SttStreamConfig,
    TtsStreamConfig,
};
