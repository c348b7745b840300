//! STT-to-turn segmentation
//!
//! - `policy`: handling policies and the per-event mode
//! - `split`: sentence splitting for SPLIT/EXPAND
//! - `machine`: the segmentation state machine and join timer
//! - `turn`: turns delivered to the host

mod machine;
mod policy;
mod split;
mod turn;

pub use machine::{Segmenter, SegmenterConfig, PSST_MARGIN_MS};
pub use policy::{Mode, Policy};
pub use split::SentenceSplitter;
pub use turn::{BotReply, BotTurn};
