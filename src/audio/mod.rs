pub mod file;
pub mod probe;

pub use file::AudioFile;
pub use probe::{extension_for_mime, probe_duration_secs};
