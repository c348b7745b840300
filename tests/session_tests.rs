// End-to-end session tests against an in-process mock worker

mod common;

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::*;
use serde_json::json;
use std::sync::Arc;
use voip_session::convo::JOIN_SILENCE_DURATION_HOOK;
use voip_session::segmentation::Policy;
use voip_session::session::{MetricKind, STT_SECONDS_METRIC, TTS_CHARACTERS_METRIC};
use voip_session::{
    BotReply, ChannelHost, ConvoStep, HostEvent, SessionError, StopOutcome, UserTurn, VoipSession,
};

#[tokio::test]
async fn test_call_lifecycle_with_recording() -> Result<()> {
    let mut worker = MockWorker::start(Script {
        on_init: vec![
            initialized("sess-1"),
            connected(),
            final_stt("Welcome to the help line", 0.8, 2.1),
        ],
        on_stop: vec![
            final_stt("Goodbye", 3.0, 3.5),
            json!({ "type": "fullRecordStart" }),
            json!({ "type": "fullRecordChunk", "chunk": "QQ==" }),
            json!({ "type": "fullRecordChunk", "chunk": "Qg==" }),
            json!({ "type": "fullRecordEnd", "chunk": "Qw==" }),
        ],
        ..Script::default()
    })
    .await?;

    let (host, mut events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(worker.config()), Arc::new(host));
    session.start().await?;

    let init = worker.next_method("initCall").await;
    assert_eq!(init["SIP_PROTOCOL"], "TCP");
    assert_eq!(worker.cookies(), vec!["worker=abc".to_string()]);

    let reply = next_reply(&mut events).await;
    assert_eq!(reply.text(), Some("Welcome to the help line"));
    match reply {
        BotReply::Message(turn) => {
            assert_eq!(turn.silence_duration, Some(0.8));
            assert!((turn.voice_duration.unwrap() - 1.3).abs() < 1e-9);
        }
        BotReply::Error(e) => panic!("unexpected error {e}"),
    }

    let outcome = session.stop().await?;
    assert_eq!(outcome, StopOutcome::Ended);

    let stop = worker.next_method("stopCall").await;
    assert_eq!(stop["sessionId"], "sess-1");

    // Recognitions arriving after stop are dropped, the recording is not
    match next_event(&mut events).await {
        HostEvent::Attachment(attachment) => {
            assert_eq!(attachment.name, "full_record.wav");
            assert_eq!(STANDARD.decode(attachment.base64)?, b"ABC");
        }
        other => panic!("expected attachment, got {other:?}"),
    }

    assert!(!session.is_running());
    Ok(())
}

#[tokio::test]
async fn test_disconnect_reports_stt_seconds() -> Result<()> {
    let worker = MockWorker::start(Script {
        on_init: vec![initialized("sess-m"), connected()],
        on_dtmf: vec![
            json!({ "type": "callinfo", "status": "disconnected", "connectDuration": 12.5 }),
            json!({ "type": "callinfo", "status": "disconnected", "connectDuration": 0 }),
        ],
        ..Script::default()
    })
    .await?;

    let mut cfg = worker.config();
    cfg.session.stop_timeout_ms = 200;

    let (host, mut events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(cfg), Arc::new(host));
    session.start().await?;
    session.on_user_turn(UserTurn::dtmf("9")).await?;

    match next_event(&mut events).await {
        HostEvent::Metric(metric) => {
            assert_eq!(metric.metric_name, STT_SECONDS_METRIC);
            assert_eq!(metric.transactions, 12.5);
            assert_eq!(metric.kind, MetricKind::Inbuilt);
            assert_eq!(metric.api_key, None);
        }
        other => panic!("expected metric, got {other:?}"),
    }

    session.stop().await?;
    assert!(events.try_recv().is_err(), "zero duration reports nothing");
    Ok(())
}

#[tokio::test]
async fn test_start_rejects_unauthorized() -> Result<()> {
    let worker = MockWorker::start(Script {
        on_init: vec![json!({ "type": "callinfo", "status": "unauthorized" })],
        ..Script::default()
    })
    .await?;

    let (host, _events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(worker.config()), Arc::new(host));

    let err = session.start().await.unwrap_err();
    assert_eq!(err, SessionError::Unauthorized);
    assert!(!session.is_running());
    assert_eq!(session.stop().await?, StopOutcome::NotRunning);
    Ok(())
}

#[tokio::test]
async fn test_start_rejects_registration_failure() -> Result<()> {
    let worker = MockWorker::start(Script {
        on_init: vec![
            json!({ "type": "callinfo", "status": "forbidden", "event": "onCallState" }),
            json!({ "type": "callinfo", "status": "forbidden", "event": "onCallRegState" }),
        ],
        ..Script::default()
    })
    .await?;

    let (host, _events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(worker.config()), Arc::new(host));

    assert_eq!(
        session.start().await.unwrap_err(),
        SessionError::RegistrationFailed
    );
    Ok(())
}

#[tokio::test]
async fn test_start_gives_up_after_retries() -> Result<()> {
    // Bind and drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let mut cfg = voip_session::VoipConfig::default();
    cfg.worker.url = Some(format!("ws://{addr}"));
    cfg.connect.max_retries = 2;
    cfg.connect.retry_delay_ms = 10;

    let (host, _events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(cfg), Arc::new(host));

    match session.start().await {
        Err(SessionError::Connect { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected connect failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_join_policy_merges_recognitions() -> Result<()> {
    let worker = MockWorker::start(Script {
        on_init: vec![
            initialized("sess-join"),
            connected(),
            final_stt("Your balance is", 0.5, 1.5),
            final_stt("forty two dollars", 1.7, 2.9),
        ],
        ..Script::default()
    })
    .await?;

    let mut cfg = worker.config();
    cfg.stt.message_handling.policy = Policy::Join;
    cfg.stt.message_handling.timeout_ms = 300;

    let (host, mut events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(cfg), Arc::new(host));
    session.start().await?;

    let reply = next_reply(&mut events).await;
    assert_eq!(reply.text(), Some("Your balance is. forty two dollars"));
    if let BotReply::Message(turn) = reply {
        assert_eq!(turn.source_data.as_array().map(Vec::len), Some(2));
    }

    let stats = session.stats().await?;
    assert_eq!(stats.turns_emitted, 1);
    assert_eq!(stats.session_id.as_deref(), Some("sess-join"));

    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_join_hook_on_step() -> Result<()> {
    let worker = MockWorker::start(Script {
        on_init: vec![initialized("sess-hook"), connected()],
        on_dtmf: vec![
            final_stt("Press one", 0.5, 1.0),
            final_stt("for sales", 1.2, 1.8),
        ],
        ..Script::default()
    })
    .await?;

    let (host, mut events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(worker.config()), Arc::new(host));
    session.start().await?;

    let step = ConvoStep::bot().with_hook(JOIN_SILENCE_DURATION_HOOK, &["300"]);
    session.convo_step_next(Some(step)).await?;
    session.on_user_turn(UserTurn::dtmf("0")).await?;

    let reply = next_reply(&mut events).await;
    assert_eq!(reply.text(), Some("Press one. for sales"));

    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_user_turns_reach_worker() -> Result<()> {
    let mut worker = MockWorker::start(Script {
        on_init: vec![initialized("sess-2"), connected()],
        ..Script::default()
    })
    .await?;

    let mut cfg = worker.config();
    cfg.tts.url = Some("http://tts.local/api/tts".to_string());

    let (host, mut events) = ChannelHost::new();
    let mut session = VoipSession::with_tts_fetcher(
        Arc::new(cfg),
        Arc::new(host),
        Arc::new(StaticTts {
            duration_secs: Some(0.05),
        }),
    );
    session.start().await?;

    session.on_user_turn(UserTurn::dtmf("42#")).await?;
    let dtmf = worker.next_method("sendDtmf").await;
    assert_eq!(dtmf["digits"], "42#");
    assert_eq!(dtmf["sessionId"], "sess-2");

    let outcome = session.on_user_turn(UserTurn::text("I want to pay")).await?;
    let audio = worker.next_method("sendAudio").await;
    assert_eq!(audio["b64_buffer"], STANDARD.encode(b"RIFF-tts"));
    assert_eq!(audio["PESQ"], false);
    assert_eq!(outcome.attachments.len(), 1);
    assert_eq!(outcome.attachments[0].name, "tts.wav");
    assert_eq!(outcome.playback_secs, 0.05);
    assert!(outcome.source_data.is_some());

    match next_event(&mut events).await {
        HostEvent::Metric(metric) => {
            assert_eq!(metric.metric_name, TTS_CHARACTERS_METRIC);
            assert_eq!(metric.transactions, 13.0);
        }
        other => panic!("expected metric, got {other:?}"),
    }

    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_text_turn_without_tts() -> Result<()> {
    let worker = MockWorker::start(Script {
        on_init: vec![connected()],
        ..Script::default()
    })
    .await?;

    let (host, _events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(worker.config()), Arc::new(host));
    session.start().await?;

    let err = session.on_user_turn(UserTurn::text("hello")).await.unwrap_err();
    assert_eq!(err, SessionError::TtsNotConfigured);

    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_worker_error_surfaces_as_turn() -> Result<()> {
    let worker = MockWorker::start(Script {
        on_init: vec![connected()],
        on_dtmf: vec![json!({ "type": "error", "message": "Call dropped" })],
        ..Script::default()
    })
    .await?;

    let (host, mut events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(worker.config()), Arc::new(host));
    session.start().await?;
    session.on_user_turn(UserTurn::dtmf("1")).await?;

    match next_reply(&mut events).await {
        BotReply::Error(err) => assert_eq!(err.to_string(), "Error: Call dropped"),
        other => panic!("expected error turn, got {other:?}"),
    }

    // The worker error already ended the session
    assert_eq!(session.stop().await?, StopOutcome::Ended);
    Ok(())
}

#[tokio::test]
async fn test_startup_silence_guard() -> Result<()> {
    let worker = MockWorker::start(Script {
        on_init: vec![connected(), partial_stt("hel", 2.0)],
        ..Script::default()
    })
    .await?;

    let mut cfg = worker.config();
    cfg.silence.start_enable = true;
    cfg.silence.start_ms = 1000;

    let (host, mut events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(cfg), Arc::new(host));
    session.start().await?;

    match next_reply(&mut events).await {
        BotReply::Error(err) => assert_eq!(
            err,
            SessionError::StartupSilence {
                measured_secs: 2.0,
                threshold_secs: 1.0
            }
        ),
        other => panic!("expected startup silence error, got {other:?}"),
    }

    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_stop_times_out_without_end_signal() -> Result<()> {
    let worker = MockWorker::start(Script {
        on_init: vec![connected()],
        ..Script::default()
    })
    .await?;

    let mut cfg = worker.config();
    cfg.session.stop_timeout_ms = 200;

    let (host, _events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(cfg), Arc::new(host));
    session.start().await?;

    assert_eq!(session.stop().await?, StopOutcome::TimedOut);
    Ok(())
}

#[tokio::test]
async fn test_stop_ends_when_worker_closes_channel() -> Result<()> {
    let worker = MockWorker::start(Script {
        on_init: vec![connected()],
        close_on_stop: true,
        ..Script::default()
    })
    .await?;

    let (host, mut events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::new(worker.config()), Arc::new(host));
    session.start().await?;

    assert_eq!(session.stop().await?, StopOutcome::Ended);
    assert!(events.try_recv().is_err(), "No recording means no attachment");
    Ok(())
}
