use anyhow::{Context, Result};
use std::io::Cursor;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Playback length of encoded audio in any container symphonia can read.
///
/// `extension` is a hint only (`"wav"`, `"mp3"`, ...).
pub fn probe_duration_secs(bytes: &[u8], extension: Option<&str>) -> Result<f64> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unsupported audio format")?;

    let track = probed
        .format
        .default_track()
        .context("Audio has no playable track")?;
    let params = &track.codec_params;
    let frames = params
        .n_frames
        .context("Could not determine audio duration from metadata")?;

    let seconds = match (params.time_base, params.sample_rate) {
        (Some(time_base), _) => {
            let time = time_base.calc_time(frames);
            time.seconds as f64 + time.frac
        }
        (None, Some(rate)) if rate > 0 => frames as f64 / rate as f64,
        _ => anyhow::bail!("Could not determine audio duration from metadata"),
    };

    debug!("Audio duration: {:.2}s", seconds);
    Ok(seconds)
}

/// File extension guess from a mime type, used as a probe hint
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "audio/wav" | "audio/wave" | "audio/x-wav" => Some("wav"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/ogg" => Some("ogg"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        _ => None,
    }
}
