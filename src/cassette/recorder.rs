//! Collects interactions during a live session and writes the cassette.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::format::{Cassette, Interaction};

/// Accumulates interactions in call order. Nothing touches the disk until
/// [`CassetteRecorder::finish`].
#[derive(Debug)]
pub struct CassetteRecorder {
    path: PathBuf,
    name: String,
    commit: String,
    started: DateTime<Utc>,
    interactions: Vec<Interaction>,
}

impl CassetteRecorder {
    /// Start a session that will be written to `path`.
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            commit: commit.into(),
            started: Utc::now(),
            interactions: Vec::new(),
        }
    }

    /// Append one interaction, numbered after the ones before it.
    pub fn record(
        &mut self,
        port: impl Into<String>,
        method: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
    ) {
        let seq = self.interactions.len() as u64;
        self.interactions.push(Interaction {
            seq,
            port: port.into(),
            method: method.into(),
            input,
            output,
        });
    }

    /// Interactions recorded so far.
    #[must_use]
    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Write the cassette, stamped with the session start time, and return
    /// its path. The file is written next to its destination first and then
    /// renamed, so an interrupted write never leaves a truncated cassette.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be produced or the file written.
    pub fn finish(self) -> Result<PathBuf, std::io::Error> {
        let count = self.interactions.len();
        let cassette = Cassette {
            name: self.name,
            recorded_at: self.started,
            commit: self.commit,
            interactions: self.interactions,
        };
        let yaml = serde_yaml::to_string(&cassette).map_err(std::io::Error::other)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("yaml.partial");
        std::fs::write(&staging, yaml)?;
        std::fs::rename(&staging, &self.path)?;
        log::debug!("wrote {count} interactions to {}", self.path.display());
        Ok(self.path)
    }
}
