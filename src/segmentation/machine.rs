use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::policy::{Mode, Policy};
use super::split::SentenceSplitter;
use super::turn::BotTurn;
use crate::config::MessageHandlingConfig;
use crate::convo::ConvoStep;
use crate::error::SessionResult;
use crate::stt::{confidence, SttEvent, Timing};

/// Safety margin subtracted from the join timeout in PSST mode
pub const PSST_MARGIN_MS: u64 = 500;

/// Settings the segmenter needs, resolved once per session
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub policy: Policy,
    pub join_timeout_ms: u64,
    pub delimiter: String,
    pub splitter: SentenceSplitter,
    pub confidence_threshold: f64,
}

impl SegmenterConfig {
    pub fn new(handling: &MessageHandlingConfig, confidence_threshold: f64) -> SessionResult<Self> {
        Ok(Self {
            policy: handling.policy,
            join_timeout_ms: handling.timeout_ms,
            delimiter: handling.delimiter.clone(),
            splitter: SentenceSplitter::new(&handling.punctuation)?,
            confidence_threshold,
        })
    }
}

#[derive(Debug)]
struct PendingTurn {
    text: String,
    source: Value,
    timing: Timing,
}

/// Turns ordered STT events into bot turns.
///
/// The segmenter does no I/O and owns no timer task: the join timer is a
/// deadline that the owner sleeps on and reports back through
/// [`Segmenter::on_deadline`]. Arming a new deadline replaces the old one,
/// so there is never more than one.
#[derive(Debug)]
pub struct Segmenter {
    config: SegmenterConfig,
    pending: Vec<PendingTurn>,
    /// Offsets of the last final event, whatever its policy outcome
    prev_final: Option<Timing>,
    /// Offsets of the last event merged into a flushed join turn
    last_flushed: Option<Timing>,
    first_turn: bool,
    join_deadline: Option<Instant>,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            prev_final: None,
            last_flushed: None,
            first_turn: true,
            join_deadline: None,
        }
    }

    pub fn policy(&self) -> Policy {
        self.config.policy
    }

    pub fn mode(&self, step: Option<&ConvoStep>) -> Mode {
        if step.is_some_and(ConvoStep::has_join_hook) {
            return Mode::Join {
                timeout_ms: self.join_timeout_ms(step),
            };
        }

        match self.config.policy {
            Policy::Original => Mode::Original,
            Policy::Split | Policy::Expand => Mode::Split,
            Policy::Join | Policy::Concat | Policy::Psst => Mode::Join {
                timeout_ms: self.join_timeout_ms(step),
            },
        }
    }

    /// Join policy or join hook in effect; silence is then handled here
    /// instead of by the inter-turn guard.
    pub fn is_join_active(&self, step: Option<&ConvoStep>) -> bool {
        self.config.policy.is_join_like() || step.is_some_and(ConvoStep::has_join_hook)
    }

    pub fn join_timeout_ms(&self, step: Option<&ConvoStep>) -> u64 {
        step.and_then(ConvoStep::join_timeout_ms).unwrap_or(self.config.join_timeout_ms)
    }

    /// Join timer length, with the PSST margin applied
    pub fn timer_duration(&self, step: Option<&ConvoStep>) -> Duration {
        let timeout_ms = self.join_timeout_ms(step);
        if self.config.policy == Policy::Psst {
            Duration::from_millis(timeout_ms.saturating_sub(PSST_MARGIN_MS))
        } else {
            Duration::from_millis(timeout_ms)
        }
    }

    /// Silence duration the worker should use in PSST mode
    pub fn psst_silence_ms(&self, step: Option<&ConvoStep>) -> Option<u64> {
        (self.config.policy == Policy::Psst)
            .then(|| self.join_timeout_ms(step).saturating_sub(PSST_MARGIN_MS))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.join_deadline
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn cancel_join_timer(&mut self) {
        if self.join_deadline.take().is_some() {
            debug!("Join timer cancelled");
        }
    }

    /// Hand out whatever the join buffer holds, e.g. when the call is gone
    /// before the timer could fire.
    pub fn flush_pending(&mut self) -> Option<BotTurn> {
        if !self.pending.is_empty() {
            debug!("Flushing {} buffered recognitions", self.pending.len());
        }
        self.flush()
    }

    /// Interim result: a new utterance is starting.
    pub fn on_partial(&mut self, event: &SttEvent, step: Option<&ConvoStep>) -> Option<BotTurn> {
        self.cancel_join_timer();

        if let Mode::Join { timeout_ms } = self.mode(step) {
            if self.gap_exceeds(event, timeout_ms) && !self.pending.is_empty() {
                debug!("Silence gap exceeded {}ms on interim result, flushing", timeout_ms);
                return self.flush();
            }
        }

        None
    }

    /// Final result: dispatch on the effective mode.
    pub fn on_final(
        &mut self,
        event: &SttEvent,
        step: Option<&ConvoStep>,
        now: Instant,
    ) -> Vec<BotTurn> {
        let threshold = confidence::resolve_threshold(step, self.config.confidence_threshold);
        let score = confidence::score(event);
        let accepted = confidence::passes(score, threshold);
        debug!(
            "Message: {} / Confidence Score: {:?} (Threshold: {})",
            event.message, score, threshold
        );

        match self.mode(step) {
            Mode::Original => {
                let mut turns: Vec<BotTurn> = self.flush().into_iter().collect();
                let turn = self.measure(event);
                if accepted {
                    turns.push(turn);
                }
                turns
            }
            Mode::Split => {
                let mut turns: Vec<BotTurn> = self.flush().into_iter().collect();
                let turn = self.measure(event);
                if accepted {
                    turns.extend(self.split_turn(turn));
                }
                turns
            }
            Mode::Join { timeout_ms } => {
                let mut turns = Vec::new();
                if self.gap_exceeds(event, timeout_ms) {
                    turns.extend(self.flush());
                }

                self.prev_final = Some(event.timing());
                if accepted {
                    self.pending.push(PendingTurn {
                        text: event.message.clone(),
                        source: event.source.clone(),
                        timing: event.timing(),
                    });
                }

                if !self.pending.is_empty() {
                    self.join_deadline = Some(now + self.timer_duration(step));
                }
                turns
            }
        }
    }

    /// Join timer check; flushes when the deadline has passed.
    pub fn on_deadline(&mut self, now: Instant) -> Option<BotTurn> {
        match self.join_deadline {
            Some(deadline) if deadline <= now => {
                info!(
                    "Join timer elapsed with {} buffered recognitions",
                    self.pending.len()
                );
                self.flush()
            }
            _ => None,
        }
    }

    /// Merge everything buffered into one turn and clear the buffer.
    fn flush(&mut self) -> Option<BotTurn> {
        self.join_deadline = None;
        if self.pending.is_empty() {
            return None;
        }

        let pending = std::mem::take(&mut self.pending);
        let first = pending[0].timing;
        let last = pending[pending.len() - 1].timing;

        let silence_duration = match self.last_flushed {
            Some(prev) => diff(first.start, prev.end),
            None => first.start,
        };
        let voice_duration = diff(last.end, first.start);

        let message_text = pending
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(&self.config.delimiter);
        let source_data = Value::Array(pending.into_iter().map(|p| p.source).collect());

        self.last_flushed = Some(last);
        self.first_turn = false;

        Some(BotTurn {
            message_text,
            source_data,
            silence_duration,
            voice_duration,
        })
    }

    /// Single-event turn with silence/voice bookkeeping
    fn measure(&mut self, event: &SttEvent) -> BotTurn {
        let silence_duration = match (self.first_turn, self.prev_final) {
            (false, Some(prev)) => diff(event.start, prev.end),
            _ => event.start,
        };
        let voice_duration = diff(event.end, event.start);

        self.first_turn = false;
        self.prev_final = Some(event.timing());

        BotTurn {
            message_text: event.message.clone(),
            source_data: event.source.clone(),
            silence_duration,
            voice_duration,
        }
    }

    fn split_turn(&self, turn: BotTurn) -> Vec<BotTurn> {
        let Some(sentences) = self.config.splitter.split(&turn.message_text) else {
            return vec![turn];
        };

        sentences
            .into_iter()
            .enumerate()
            .map(|(i, sentence)| BotTurn {
                message_text: sentence,
                source_data: turn.source_data.clone(),
                silence_duration: if i == 0 { turn.silence_duration } else { None },
                voice_duration: turn.voice_duration,
            })
            .collect()
    }

    /// Gap since the previous final, compared in seconds
    fn gap_exceeds(&self, event: &SttEvent, timeout_ms: u64) -> bool {
        let gap = self.prev_final.and_then(|prev| diff(event.start, prev.end));
        gap.is_some_and(|gap| gap > timeout_ms as f64 / 1000.0)
    }
}

fn diff(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? - b?)
}
