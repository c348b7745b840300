use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::payload;
use crate::session::Attachment;
use crate::worker::InboundFrame;

pub const RECORDING_NAME: &str = "full_record.wav";
pub const RECORDING_MIME_TYPE: &str = "audio/wav";

/// Collects the call recording and emits it once per session
///
/// Chunks are kept in their encoded form: a worker may slice one base64
/// string at arbitrary offsets, so only the joined text is guaranteed to
/// decode.
#[derive(Debug, Default)]
pub struct RecordingReassembler {
    chunks: Vec<String>,
    emitted: bool,
}

impl RecordingReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> bool {
        self.emitted
    }

    /// Encoded characters buffered so far
    pub fn buffered_len(&self) -> usize {
        self.chunks.iter().map(String::len).sum()
    }

    /// Feed a recording frame; returns the attachment when it completes.
    /// Non-recording frames are ignored.
    pub fn handle(&mut self, frame: &InboundFrame) -> Option<Attachment> {
        match frame {
            InboundFrame::FullRecord(value) => {
                self.reset();
                self.append(value);
                self.finish()
            }
            InboundFrame::FullRecordStart(value) => {
                debug!("Recording started");
                self.reset();
                self.append(value);
                None
            }
            InboundFrame::FullRecordChunk(value) => {
                self.append(value);
                None
            }
            InboundFrame::FullRecordEnd(value) => {
                self.append(value);
                self.finish()
            }
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.chunks.clear();
    }

    fn append(&mut self, frame: &Value) {
        if let Some(encoded) = payload::resolve(frame).map(str::trim) {
            if !encoded.is_empty() {
                self.chunks.push(encoded.to_string());
            }
        }
    }

    /// Decode the joined payload, or each chunk on its own when the chunks
    /// were encoded separately (padding in the middle).
    fn decode(&self) -> Vec<u8> {
        if let Ok(bytes) = STANDARD.decode(self.chunks.concat()) {
            return bytes;
        }

        let mut bytes = Vec::new();
        for chunk in &self.chunks {
            match STANDARD.decode(chunk) {
                Ok(decoded) => bytes.extend_from_slice(&decoded),
                Err(e) => warn!("Skipping undecodable recording chunk: {}", e),
            }
        }
        bytes
    }

    fn finish(&mut self) -> Option<Attachment> {
        if self.emitted {
            debug!("Recording already emitted, ignoring");
            return None;
        }

        let bytes = self.decode();
        let chunks = std::mem::take(&mut self.chunks).len();
        if bytes.is_empty() {
            warn!("Recording finished without payload, no attachment emitted");
            return None;
        }

        self.emitted = true;
        info!(
            "Recording complete: {} bytes from {} chunk(s)",
            bytes.len(),
            chunks
        );

        Some(Attachment {
            name: RECORDING_NAME.to_string(),
            mime_type: RECORDING_MIME_TYPE.to_string(),
            base64: STANDARD.encode(bytes),
        })
    }
}
