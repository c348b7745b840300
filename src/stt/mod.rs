//! STT result events and confidence scoring

pub mod confidence;
mod event;

pub use event::{SttEvent, Timing};
