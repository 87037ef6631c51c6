//! YAML cassettes of HTTP interactions, for offline runs and tests.

pub mod format;
pub mod recorder;
pub mod replayer;
