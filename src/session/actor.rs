use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use super::state::{Effect, SessionState};
use super::stats::SessionStats;
use crate::convo::ConvoStep;
use crate::error::{SessionError, SessionResult};
use crate::worker::messages::log_summary;
use crate::worker::{InboundFrame, OutboundMessage, WorkerStream};

/// How a stop request finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Worker signalled the end of the session
    Ended,
    /// No end-of-session signal within the stop timeout
    TimedOut,
    /// Channel was already gone
    ChannelGone,
    NotRunning,
}

pub(crate) enum Command {
    Send {
        message: OutboundMessage,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    Step(Option<ConvoStep>),
    Stop {
        reply: oneshot::Sender<StopOutcome>,
    },
    Stats {
        reply: oneshot::Sender<SessionStats>,
    },
}

/// Owns the channel and all session state; one per running session
pub(crate) struct SessionActor {
    state: SessionState,
    stream: WorkerStream,
    commands: mpsc::Receiver<Command>,
    start: Option<oneshot::Sender<SessionResult<()>>>,
    stop_timeout: Duration,
    stop_waiter: Option<(oneshot::Sender<StopOutcome>, Instant)>,
    channel_open: bool,
    run_id: String,
    started_at: DateTime<Utc>,
}

impl SessionActor {
    pub fn new(
        state: SessionState,
        stream: WorkerStream,
        commands: mpsc::Receiver<Command>,
        start: oneshot::Sender<SessionResult<()>>,
        stop_timeout: Duration,
        run_id: String,
    ) -> Self {
        Self {
            state,
            stream,
            commands,
            start: Some(start),
            stop_timeout,
            stop_waiter: None,
            channel_open: true,
            run_id,
            started_at: Utc::now(),
        }
    }

    pub async fn run(mut self) {
        info!("Session {} running", self.run_id);

        loop {
            let join_deadline = self.state.join_deadline();
            let stop_deadline = self.stop_waiter.as_ref().map(|(_, deadline)| *deadline);

            let flow = tokio::select! {
                frame = self.stream.next(), if self.channel_open => {
                    self.on_channel(frame).await;
                    ControlFlow::Continue(())
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => {
                        debug!("Session handle dropped");
                        ControlFlow::Break(())
                    }
                },
                _ = sleep_until(join_deadline.unwrap_or_else(Instant::now)), if join_deadline.is_some() => {
                    self.state.handle_join_deadline(Instant::now());
                    ControlFlow::Continue(())
                }
                _ = sleep_until(stop_deadline.unwrap_or_else(Instant::now)), if stop_deadline.is_some() => {
                    warn!(
                        "No end of session from worker within {}ms",
                        self.stop_timeout.as_millis()
                    );
                    self.finish_stop(StopOutcome::TimedOut);
                    ControlFlow::Break(())
                }
            };

            if flow.is_break() {
                break;
            }
            if self.stop_waiter.is_some() && (self.state.ended() || !self.channel_open) {
                self.finish_stop(StopOutcome::Ended);
                break;
            }
        }

        if self.channel_open {
            if let Err(e) = self.stream.close(None).await {
                debug!("Closing channel: {}", e);
            }
        }
        info!("Session {} finished", self.run_id);
    }

    async fn on_channel(&mut self, frame: Option<Result<Message, WsError>>) {
        match frame {
            Some(Ok(Message::Text(text))) => {
                debug!("Received: {}", log_summary(&text));
                match InboundFrame::parse(&text) {
                    Ok(frame) => {
                        let effects = self.state.handle_frame(frame, Instant::now());
                        self.apply(effects).await;
                    }
                    Err(e) => warn!("Dropping unparseable frame: {}", e),
                }
            }
            Some(Ok(Message::Close(close))) => {
                info!("Worker closed the channel: {:?}", close);
                self.channel_closed("closed by worker".to_string());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("Channel error: {}", e);
                self.channel_closed(e.to_string());
            }
            None => self.channel_closed("closed".to_string()),
        }
    }

    async fn on_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Send { message, reply } => {
                let result = self.send(message).await;
                let _ = reply.send(result);
            }
            Command::Step(step) => {
                let effects = self.state.advance_step(step);
                self.apply(effects).await;
            }
            Command::Stop { reply } => {
                self.state.request_stop();
                if !self.channel_open {
                    let _ = reply.send(StopOutcome::ChannelGone);
                    return ControlFlow::Break(());
                }

                let stop = OutboundMessage::StopCall { session_id: None };
                if let Err(e) = self.send(stop).await {
                    warn!("Sending stopCall failed: {}", e);
                }
                self.stop_waiter = Some((reply, Instant::now() + self.stop_timeout));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
        ControlFlow::Continue(())
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Start(result) => self.resolve_start(result),
                Effect::Send(message) => {
                    if let Err(e) = self.send(message).await {
                        warn!("Sending to worker failed: {}", e);
                    }
                }
            }
        }
    }

    async fn send(&mut self, message: OutboundMessage) -> SessionResult<()> {
        if !self.channel_open {
            return Err(SessionError::Channel("channel is closed".to_string()));
        }

        let message = message.with_session_id(self.state.session_id());
        let payload = message
            .to_json()
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        debug!("Sending {}", message.method());

        self.stream
            .send(Message::text(payload))
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))
    }

    fn resolve_start(&mut self, result: SessionResult<()>) {
        if let Some(start) = self.start.take() {
            let _ = start.send(result);
        }
    }

    fn channel_closed(&mut self, reason: String) {
        self.channel_open = false;
        self.state.on_channel_closed();
        self.resolve_start(Err(SessionError::Channel(reason)));
    }

    fn finish_stop(&mut self, outcome: StopOutcome) {
        if let Some((reply, _)) = self.stop_waiter.take() {
            info!("Stop finished: {:?}", outcome);
            let _ = reply.send(outcome);
        }
    }

    fn stats(&self) -> SessionStats {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        SessionStats {
            session_id: self.state.session_id().map(str::to_string),
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            duration_secs: elapsed.num_milliseconds() as f64 / 1000.0,
            turns_emitted: self.state.turns_emitted(),
            errors_emitted: self.state.errors_emitted(),
            recording_emitted: self.state.recording_emitted(),
            ended: self.state.ended(),
        }
    }
}
