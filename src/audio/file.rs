use anyhow::{Context, Result};
use hound::WavReader;
use std::io::Cursor;
use std::path::Path;
use tracing::info;

/// WAV audio sent as a user turn
pub struct AudioFile {
    pub name: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Encoded file contents, forwarded to the worker as-is
    pub bytes: Vec<u8>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        Self::from_wav_bytes(name, bytes)
    }

    pub fn from_wav_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let reader = WavReader::new(Cursor::new(bytes.as_slice()))
            .context("Failed to parse WAV data")?;

        let spec = reader.spec();
        let frames = reader.duration();
        let duration_seconds = frames as f64 / spec.sample_rate as f64;

        let name = name.into();
        info!(
            "Audio file {} loaded: {:.1}s, {}Hz, {} channels",
            name, duration_seconds, spec.sample_rate, spec.channels
        );

        Ok(Self {
            name,
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bytes,
        })
    }
}
