//! Silence-timeout guardian
//!
//! Two guards end the session when the bot stays silent too long:
//! the startup guard looks at the first interim recognition of the call,
//! the inter-turn guard reacts to silence notices from the worker.

use tracing::{debug, warn};

use crate::config::SilenceConfig;
use crate::convo::ConvoStep;
use crate::error::SessionError;
use crate::stt::SttEvent;
use crate::worker::SilenceSpan;

#[derive(Debug)]
pub struct SilenceGuardian {
    config: SilenceConfig,
    first_stt_info_received: bool,
}

impl SilenceGuardian {
    pub fn new(config: SilenceConfig) -> Self {
        Self {
            config,
            first_stt_info_received: false,
        }
    }

    pub fn first_stt_info_received(&self) -> bool {
        self.first_stt_info_received
    }

    /// Feed an interim recognition; returns the startup timeout if it fired.
    pub fn on_partial(
        &mut self,
        event: &SttEvent,
        step: Option<&ConvoStep>,
    ) -> Option<SessionError> {
        let first = !self.first_stt_info_received;
        self.first_stt_info_received = true;

        if !first || !self.config.start_enable {
            return None;
        }
        if let Some(step) = step {
            if step.ignores_silence_duration() || step.has_join_hook() {
                debug!("Startup silence guard suppressed by step logic hook");
                return None;
            }
        }

        let start = event.start?;
        if start * 1000.0 > self.config.start_ms as f64 {
            warn!(
                "Startup silence {}s exceeded {}ms",
                start, self.config.start_ms
            );
            return Some(SessionError::StartupSilence {
                measured_secs: start,
                threshold_secs: self.config.start_ms as f64 / 1000.0,
            });
        }

        None
    }

    /// Feed a worker silence notice; returns the general timeout if it fired.
    ///
    /// `join_active` means segmentation handles silence through its own join
    /// timer, so the guard stays out of the way.
    pub fn on_silence(
        &self,
        spans: &[SilenceSpan],
        step: Option<&ConvoStep>,
        join_active: bool,
    ) -> Option<SessionError> {
        if !self.config.timeout_enable || join_active {
            return None;
        }
        if step.is_some_and(ConvoStep::ignores_silence_duration) {
            debug!("General silence guard suppressed by step logic hook");
            return None;
        }

        let span = spans.first()?;
        warn!(
            "General silence {:.2}s exceeded {}ms",
            span.duration, self.config.timeout_ms
        );
        Some(SessionError::GeneralSilence {
            measured_secs: span.duration,
            threshold_secs: self.config.timeout_ms as f64 / 1000.0,
        })
    }

    pub fn reset(&mut self) {
        self.first_stt_info_received = false;
    }
}
