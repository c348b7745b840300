//! Per-session state and the single frame dispatch
//!
//! Everything the worker sends goes through [`SessionState::handle_frame`],
//! called from the session actor in arrival order. Deliveries to the host
//! happen inline; anything the actor must do on the channel or for the
//! pending start is returned as an [`Effect`].

use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::host::Host;
use super::metrics;
use crate::config::VoipConfig;
use crate::convo::ConvoStep;
use crate::error::{SessionError, SessionResult};
use crate::guardian::SilenceGuardian;
use crate::recording::RecordingReassembler;
use crate::segmentation::{BotReply, BotTurn, Segmenter, SegmenterConfig};
use crate::stt::SttEvent;
use crate::worker::{CallInfo, CallStatus, InboundFrame, OutboundMessage};

/// Work for the actor that follows from a frame or step change
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Resolve the pending `start()`
    Start(SessionResult<()>),
    Send(OutboundMessage),
}

pub struct SessionState {
    host: Arc<dyn Host>,
    segmenter: Segmenter,
    guardian: SilenceGuardian,
    recorder: RecordingReassembler,
    step: Option<ConvoStep>,
    session_id: Option<String>,
    stt_body: Option<Value>,
    ended: bool,
    stop_requested: bool,
    turns_emitted: usize,
    errors_emitted: usize,
}

impl SessionState {
    pub fn new(config: &VoipConfig, host: Arc<dyn Host>) -> SessionResult<Self> {
        let segmenter_config =
            SegmenterConfig::new(&config.stt.message_handling, config.stt.confidence_threshold)?;

        Ok(Self {
            host,
            segmenter: Segmenter::new(segmenter_config),
            guardian: SilenceGuardian::new(config.silence.clone()),
            recorder: RecordingReassembler::new(),
            step: None,
            session_id: None,
            stt_body: config.stt.body.clone(),
            ended: false,
            stop_requested: false,
            turns_emitted: 0,
            errors_emitted: 0,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn step(&self) -> Option<&ConvoStep> {
        self.step.as_ref()
    }

    pub fn turns_emitted(&self) -> usize {
        self.turns_emitted
    }

    pub fn errors_emitted(&self) -> usize {
        self.errors_emitted
    }

    pub fn recording_emitted(&self) -> bool {
        self.recorder.emitted()
    }

    pub fn join_deadline(&self) -> Option<Instant> {
        self.segmenter.deadline()
    }

    pub fn handle_frame(&mut self, frame: InboundFrame, now: Instant) -> Vec<Effect> {
        if self.stop_requested && !frame.is_recording() {
            debug!("Stop requested, ignoring non-recording frame");
            return Vec::new();
        }

        match frame {
            InboundFrame::CallInfo(info) => self.on_call_info(info),
            InboundFrame::Error { message } => {
                let err = SessionError::Worker(message);
                warn!("Worker error: {}", err);
                self.ended = true;
                self.emit_error(err.clone());
                vec![Effect::Start(Err(err))]
            }
            InboundFrame::Silence { spans } => {
                let join_active = self.segmenter.is_join_active(self.step.as_ref());
                if let Some(err) = self.guardian.on_silence(&spans, self.step.as_ref(), join_active) {
                    self.ended = true;
                    self.emit_error(err);
                }
                Vec::new()
            }
            InboundFrame::Stt(event) => {
                self.on_stt(event, now);
                Vec::new()
            }
            InboundFrame::Other(kind) => {
                debug!("Ignoring frame of type {:?}", kind);
                Vec::new()
            }
            recording => {
                if let Some(attachment) = self.recorder.handle(&recording) {
                    self.host.emit_attachment(attachment);
                }
                if matches!(
                    recording,
                    InboundFrame::FullRecord(_) | InboundFrame::FullRecordEnd(_)
                ) {
                    self.ended = true;
                }
                Vec::new()
            }
        }
    }

    fn on_call_info(&mut self, info: CallInfo) -> Vec<Effect> {
        match info.status {
            CallStatus::Initialized => {
                self.session_id = info.session_id;
                info!("Call initialized, session {:?}", self.session_id);
                self.psst_silence_effect().into_iter().collect()
            }
            CallStatus::Unauthorized => vec![Effect::Start(Err(SessionError::Unauthorized))],
            CallStatus::Forbidden if info.event.as_deref() == Some("onCallRegState") => {
                vec![Effect::Start(Err(SessionError::RegistrationFailed))]
            }
            CallStatus::Connected => {
                info!("Call connected, session {:?}", self.session_id);
                vec![Effect::Start(Ok(()))]
            }
            CallStatus::Disconnected => {
                info!("Call disconnected after {:?}s", info.connect_duration);
                if let Some(duration) = info.connect_duration.filter(|d| *d > 0.0) {
                    self.host
                        .emit_consumption_metric(metrics::stt_seconds(duration, self.stt_body.as_ref()));
                }
                Vec::new()
            }
            status => {
                debug!("Call status {:?} ({:?})", status, info.event);
                Vec::new()
            }
        }
    }

    fn on_stt(&mut self, event: SttEvent, now: Instant) {
        if !event.is_final {
            if let Some(err) = self.guardian.on_partial(&event, self.step.as_ref()) {
                self.ended = true;
                self.emit_error(err);
            }
            if let Some(turn) = self.segmenter.on_partial(&event, self.step.as_ref()) {
                self.emit_turn(turn);
            }
        } else if event.is_final_stt() {
            for turn in self.segmenter.on_final(&event, self.step.as_ref(), now) {
                self.emit_turn(turn);
            }
        }
    }

    /// Join timer fired
    pub fn handle_join_deadline(&mut self, now: Instant) {
        if let Some(turn) = self.segmenter.on_deadline(now) {
            self.emit_turn(turn);
        }
    }

    /// Host moved to the next conversation step
    pub fn advance_step(&mut self, step: Option<ConvoStep>) -> Vec<Effect> {
        self.step = step;
        self.psst_silence_effect().into_iter().collect()
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
        self.segmenter.cancel_join_timer();
    }

    /// Channel is gone. Joined recognitions still buffered are delivered
    /// unless a stop already discarded them.
    pub fn on_channel_closed(&mut self) {
        self.ended = true;
        if self.stop_requested {
            self.segmenter.cancel_join_timer();
        } else if let Some(turn) = self.segmenter.flush_pending() {
            self.emit_turn(turn);
        }
    }

    fn psst_silence_effect(&self) -> Option<Effect> {
        let silence_duration_ms = self.segmenter.psst_silence_ms(self.step.as_ref())?;
        Some(Effect::Send(OutboundMessage::SetSttSilenceDuration {
            session_id: self.session_id.clone(),
            silence_duration_ms,
        }))
    }

    fn emit_turn(&mut self, turn: BotTurn) {
        info!("Bot says: {}", turn.message_text);
        self.turns_emitted += 1;
        self.host.enqueue_bot_turn(BotReply::Message(turn));
    }

    fn emit_error(&mut self, err: SessionError) {
        self.errors_emitted += 1;
        self.host.enqueue_bot_turn(BotReply::Error(err));
    }
}
