// In-process mock of a call worker
//
// Serves the `initCall` handshake and the `/ws/:port` channel. The channel
// replies to control messages with scripted frames and forwards everything
// it receives to the test.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use voip_session::config::VoipConfig;
use voip_session::tts::{TtsAudio, TtsFetcher, TtsRequest};
use voip_session::{BotReply, HostEvent, TtsError};

pub const WORKER_PORT: u16 = 7001;

/// Frames the worker sends in reply to each control message
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub on_init: Vec<Value>,
    pub on_dtmf: Vec<Value>,
    pub on_audio: Vec<Value>,
    pub on_stop: Vec<Value>,
    /// Close the channel after answering `stopCall`
    pub close_on_stop: bool,
}

#[derive(Clone)]
struct WorkerState {
    script: Script,
    received: mpsc::UnboundedSender<Value>,
    cookies: Arc<Mutex<Vec<String>>>,
}

pub struct MockWorker {
    pub addr: SocketAddr,
    pub received: mpsc::UnboundedReceiver<Value>,
    cookies: Arc<Mutex<Vec<String>>>,
}

impl MockWorker {
    pub async fn start(script: Script) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cookies = Arc::new(Mutex::new(Vec::new()));
        let state = WorkerState {
            script,
            received: tx,
            cookies: Arc::clone(&cookies),
        };

        let app = Router::new()
            .route("/initCall", post(init_call))
            .route("/ws/:port", get(channel))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            received: rx,
            cookies,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn config(&self) -> VoipConfig {
        let mut cfg = VoipConfig::default();
        cfg.worker.url = Some(self.url());
        cfg.worker.api_key = Some("test-key".to_string());
        cfg.connect.max_retries = 1;
        cfg.connect.retry_delay_ms = 10;
        cfg.session.stop_timeout_ms = 2000;
        cfg
    }

    pub fn cookies(&self) -> Vec<String> {
        self.cookies.lock().unwrap().clone()
    }

    /// Next control message with the given METHOD
    pub async fn next_method(&mut self, method: &str) -> Value {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let msg = self.received.recv().await.expect("worker stopped");
                if msg["METHOD"] == method {
                    return msg;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {method} received"))
    }
}

async fn init_call(Json(body): Json<Value>) -> impl IntoResponse {
    assert_eq!(body["API_KEY"], "test-key");
    (
        [(SET_COOKIE, "worker=abc; Path=/; HttpOnly")],
        Json(json!({ "port": WORKER_PORT })),
    )
}

async fn channel(
    ws: WebSocketUpgrade,
    Path(port): Path<u16>,
    headers: HeaderMap,
    State(state): State<WorkerState>,
) -> impl IntoResponse {
    assert_eq!(port, WORKER_PORT);
    if let Some(cookie) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
        state.cookies.lock().unwrap().push(cookie.to_string());
    }
    ws.on_upgrade(move |socket| serve_channel(socket, state))
}

async fn serve_channel(mut socket: WebSocket, state: WorkerState) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(msg) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let method = msg["METHOD"].as_str().unwrap_or_default().to_string();
        let _ = state.received.send(msg);

        let replies = match method.as_str() {
            "initCall" => &state.script.on_init,
            "sendDtmf" => &state.script.on_dtmf,
            "sendAudio" => &state.script.on_audio,
            "stopCall" => &state.script.on_stop,
            _ => continue,
        };
        for frame in replies {
            if socket.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
        if method == "stopCall" && state.script.close_on_stop {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    }
}

pub fn initialized(session_id: &str) -> Value {
    json!({ "type": "callinfo", "status": "initialized", "voipConfig": { "sessionId": session_id } })
}

pub fn connected() -> Value {
    json!({ "type": "callinfo", "status": "connected" })
}

pub fn final_stt(message: &str, start: f64, end: f64) -> Value {
    json!({
        "data": {
            "type": "stt", "final": true, "message": message, "start": start, "end": end,
            "source": { "alternatives": [{ "confidence": 0.92 }] }
        }
    })
}

pub fn partial_stt(message: &str, start: f64) -> Value {
    json!({ "data": { "type": "stt", "final": false, "message": message, "start": start } })
}

/// Next event from the host channel
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<HostEvent>) -> HostEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for host event")
        .expect("host channel closed")
}

/// Next bot reply, skipping attachments and metrics
pub async fn next_reply(events: &mut mpsc::UnboundedReceiver<HostEvent>) -> BotReply {
    loop {
        if let HostEvent::BotReply(reply) = next_event(events).await {
            return reply;
        }
    }
}

/// Fixed-audio TTS source
pub struct StaticTts {
    pub duration_secs: Option<f64>,
}

#[async_trait]
impl TtsFetcher for StaticTts {
    async fn fetch(&self, _request: &TtsRequest) -> Result<TtsAudio, TtsError> {
        Ok(TtsAudio {
            bytes: Bytes::from_static(b"RIFF-tts"),
            duration_secs: self.duration_secs,
        })
    }
}
