use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use voip_session::{
    AudioFile, BotReply, ChannelHost, ConvoStep, HostEvent, UserMedia, UserTurn, VoipConfig,
    VoipSession,
};

/// Place one test call through a voice worker and log what the bot says
#[derive(Debug, Parser)]
#[command(name = "voip-session", version)]
struct Args {
    /// Config file, without extension
    #[arg(long, default_value = "config/voip-session")]
    config: String,

    /// Text to speak, in order
    #[arg(long)]
    say: Vec<String>,

    /// DTMF digits to press after the spoken turns
    #[arg(long)]
    dtmf: Vec<String>,

    /// WAV file to play after the other turns
    #[arg(long)]
    play: Option<String>,

    /// Seconds to keep listening after the last user turn
    #[arg(long, default_value_t = 10)]
    listen_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Arc::new(VoipConfig::load(&args.config)?);

    info!("voip-session v{}", env!("CARGO_PKG_VERSION"));
    info!("Policy: {:?}", cfg.stt.message_handling.policy);

    let (host, mut events) = ChannelHost::new();
    let mut session = VoipSession::new(Arc::clone(&cfg), Arc::new(host));
    session.validate().await.context("Validation failed")?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                HostEvent::BotReply(BotReply::Message(turn)) => info!("BOT: {}", turn.message_text),
                HostEvent::BotReply(BotReply::Error(e)) => error!("BOT ERROR: {}", e),
                HostEvent::Attachment(a) => info!("Attachment {} ({} bytes base64)", a.name, a.base64.len()),
                HostEvent::Metric(m) => info!("Metric {} = {}", m.metric_name, m.transactions),
            }
        }
    });

    session.start().await.context("Starting the call failed")?;

    let mut turns: Vec<UserTurn> = args.say.into_iter().map(UserTurn::text).collect();
    turns.extend(args.dtmf.into_iter().map(UserTurn::dtmf));
    if let Some(path) = &args.play {
        let audio = AudioFile::open(path)?;
        turns.push(UserTurn::media(UserMedia {
            uri: audio.name,
            mime_type: "audio/wav".to_string(),
            buffer: audio.bytes,
        }));
    }

    for turn in turns {
        if let Some(text) = &turn.message_text {
            session.convo_step_next(Some(ConvoStep::user(text.clone()))).await?;
        }
        if let Err(e) = session.on_user_turn(turn).await {
            error!("User turn failed: {}", e);
        }
        session.convo_step_next(Some(ConvoStep::bot())).await?;
    }

    tokio::time::sleep(Duration::from_secs(args.listen_secs)).await;

    let stats = session.stats().await.ok();
    let outcome = session.stop().await?;
    info!("Call finished ({:?})", outcome);
    if let Some(stats) = stats {
        info!(
            "{} bot turns, {} errors, recording: {}",
            stats.turns_emitted, stats.errors_emitted, stats.recording_emitted
        );
    }

    Ok(())
}
