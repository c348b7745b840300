use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::actor::{Command, SessionActor, StopOutcome};
use super::host::{Attachment, Host};
use super::metrics;
use super::state::SessionState;
use super::stats::SessionStats;
use super::turn::{UserTurn, UserTurnOutcome};
use crate::audio::{extension_for_mime, probe_duration_secs};
use crate::config::VoipConfig;
use crate::convo::{ConvoStep, Sender};
use crate::error::{SessionError, SessionResult};
use crate::tts::{TtsEngine, TtsFetcher};
use crate::worker::{InitCall, OutboundMessage, WorkerClient};

const COMMAND_BUFFER: usize = 32;

struct Running {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
    run_id: String,
}

/// One voice call test session
pub struct VoipSession {
    config: Arc<VoipConfig>,
    host: Arc<dyn Host>,
    tts: Arc<TtsEngine>,
    running: Option<Running>,
    /// Step set before the call was started
    pending_step: Option<ConvoStep>,
}

impl VoipSession {
    pub fn new(config: Arc<VoipConfig>, host: Arc<dyn Host>) -> Self {
        let tts = Arc::new(TtsEngine::new(&config.tts));
        Self {
            config,
            host,
            tts,
            running: None,
            pending_step: None,
        }
    }

    /// Session whose user turns are synthesized by `fetcher`
    pub fn with_tts_fetcher(
        config: Arc<VoipConfig>,
        host: Arc<dyn Host>,
        fetcher: Arc<dyn TtsFetcher>,
    ) -> Self {
        let tts = Arc::new(TtsEngine::with_fetcher(&config.tts, fetcher));
        Self {
            config,
            host,
            tts,
            running: None,
            pending_step: None,
        }
    }

    pub fn config(&self) -> &VoipConfig {
        &self.config
    }

    pub fn tts(&self) -> &TtsEngine {
        &self.tts
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.task.is_finished())
    }

    /// Check configuration and, when TTS is configured, that the service is up
    pub async fn validate(&self) -> SessionResult<()> {
        self.config.validate()?;
        self.tts.check_status().await?;
        Ok(())
    }

    /// Connect to the worker, initialize the call and wait until it is
    /// connected.
    pub async fn start(&mut self) -> SessionResult<()> {
        if self.is_running() {
            warn!("Session already started");
            return Ok(());
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting session {}", run_id);

        let mut state = SessionState::new(&self.config, Arc::clone(&self.host))?;
        if let Some(step) = self.pending_step.take() {
            state.advance_step(Some(step));
        }

        let client = WorkerClient::new(self.config.worker_endpoint()?, self.config.connect.clone())?;
        let mut stream = client.connect().await?;

        let init = OutboundMessage::InitCall(Box::new(InitCall::from_config(&self.config)));
        let payload = init
            .to_json()
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        debug!("Sending initCall");
        stream
            .send(Message::text(payload))
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;

        let (start_tx, start_rx) = oneshot::channel();
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = SessionActor::new(
            state,
            stream,
            command_rx,
            start_tx,
            Duration::from_millis(self.config.session.stop_timeout_ms),
            run_id.clone(),
        );
        let task = tokio::spawn(actor.run());

        match start_rx.await {
            Ok(Ok(())) => {
                info!("Session {} connected", run_id);
                self.running = Some(Running {
                    commands,
                    task,
                    run_id,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Session {} failed to start: {}", run_id, e);
                drop(commands);
                let _ = task.await;
                Err(e)
            }
            Err(_) => {
                let _ = task.await;
                Err(SessionError::Channel(
                    "session ended before the call connected".to_string(),
                ))
            }
        }
    }

    /// Play a user turn into the call and wait for its playback time
    pub async fn on_user_turn(&self, turn: UserTurn) -> SessionResult<UserTurnOutcome> {
        let mut outcome = UserTurnOutcome::default();
        let mut playback_secs = 0.0;

        if let Some(digits) = turn.buttons.first() {
            info!("User presses {}", digits);
            self.send(OutboundMessage::SendDtmf {
                digits: digits.clone(),
                session_id: None,
            })
            .await?;
        } else if let Some(text) = turn.message_text.as_deref().filter(|t| !t.is_empty()) {
            info!("User says: {}", text);
            let request = self.tts.request(text)?;
            let audio = self.tts.synthesize(text).await?;
            self.host
                .emit_consumption_metric(metrics::tts_characters(text, self.config.tts.body.as_ref()));

            let base64 = STANDARD.encode(&audio.bytes);
            self.send(OutboundMessage::SendAudio {
                b64_buffer: base64.clone(),
                session_id: None,
                pesq: Some(false),
            })
            .await?;

            outcome.attachments.push(Attachment {
                name: "tts.wav".to_string(),
                mime_type: "audio/wav".to_string(),
                base64,
            });
            outcome.source_data = serde_json::to_value(&request).ok();
            playback_secs = match audio.duration_secs {
                Some(secs) => secs,
                None => probe_duration_secs(&audio.bytes, Some("wav")).unwrap_or_else(|e| {
                    debug!("TTS audio duration unknown: {}", e);
                    0.0
                }),
            };
        }

        if let Some(media) = turn.media.first() {
            info!("User plays {}", media.uri);
            let base64 = STANDARD.encode(&media.buffer);
            self.send(OutboundMessage::SendAudio {
                b64_buffer: base64.clone(),
                session_id: None,
                pesq: None,
            })
            .await?;
            outcome.attachments.push(Attachment {
                name: media.uri.clone(),
                mime_type: media.mime_type.clone(),
                base64,
            });

            let secs = probe_duration_secs(&media.buffer, extension_for_mime(&media.mime_type))
                .map_err(|e| SessionError::Audio(e.to_string()))?;
            debug!("Audio duration of user audio: {} seconds", secs);
            playback_secs = secs.round();
        }

        if playback_secs > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(playback_secs)).await;
        }
        outcome.playback_secs = playback_secs;
        Ok(outcome)
    }

    /// Host advanced to `step`. Upcoming user text is prefetched.
    pub async fn convo_step_next(&mut self, step: Option<ConvoStep>) -> SessionResult<()> {
        if let Some(ConvoStep {
            sender: Sender::User,
            message_text: Some(text),
            ..
        }) = &step
        {
            self.tts.prefetch(text);
        }

        match &self.running {
            Some(running) => running
                .commands
                .send(Command::Step(step))
                .await
                .map_err(|_| SessionError::Channel("session has ended".to_string())),
            None => {
                self.pending_step = step;
                Ok(())
            }
        }
    }

    /// Hang up and wait, bounded, for the worker to end the session
    pub async fn stop(&mut self) -> SessionResult<StopOutcome> {
        let Some(running) = self.running.take() else {
            debug!("Stop called on a session that is not running");
            return Ok(StopOutcome::NotRunning);
        };
        info!("Stopping session {}", running.run_id);

        let (reply, outcome) = oneshot::channel();
        let outcome = if running.commands.send(Command::Stop { reply }).await.is_err() {
            StopOutcome::ChannelGone
        } else {
            outcome.await.unwrap_or(StopOutcome::ChannelGone)
        };

        drop(running.commands);
        if let Err(e) = running.task.await {
            error!("Session task failed: {}", e);
        }
        self.pending_step = None;

        info!("Session {} stopped: {:?}", running.run_id, outcome);
        Ok(outcome)
    }

    pub async fn stats(&self) -> SessionResult<SessionStats> {
        let running = self.running.as_ref().ok_or(SessionError::NotStarted)?;
        let (reply, stats) = oneshot::channel();
        running
            .commands
            .send(Command::Stats { reply })
            .await
            .map_err(|_| SessionError::Channel("session has ended".to_string()))?;
        stats
            .await
            .map_err(|_| SessionError::Channel("session has ended".to_string()))
    }

    async fn send(&self, message: OutboundMessage) -> SessionResult<()> {
        let running = self.running.as_ref().ok_or(SessionError::NotStarted)?;
        let (reply, result) = oneshot::channel();
        running
            .commands
            .send(Command::Send { message, reply })
            .await
            .map_err(|_| SessionError::Channel("session has ended".to_string()))?;
        result
            .await
            .map_err(|_| SessionError::Channel("session has ended".to_string()))?
    }
}
