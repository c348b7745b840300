//! Call recording reassembly
//!
//! Workers deliver the recording either in one `fullRecord` frame or as a
//! `fullRecordStart` / `fullRecordChunk` / `fullRecordEnd` sequence.

pub mod payload;
mod reassembler;

pub use reassembler::{RecordingReassembler, RECORDING_MIME_TYPE, RECORDING_NAME};
