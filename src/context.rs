//! Transport selection: live, recording or replaying.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::adapters::live::http::HttpTransport;
use crate::adapters::recording::transport::{RecordingTransport, TRANSPORT_PORT};
use crate::adapters::replaying::transport::ReplayingTransport;
use crate::cassette::recorder::CassetteRecorder;
use crate::cassette::replayer::CassetteReplayer;
use crate::client::ClientConfig;
use crate::error::ClientError;
use crate::ports::Transport;

/// Environment variable naming a cassette to replay instead of going live.
pub const REPLAY_ENV: &str = "STARRYSKY_REPLAY";

/// Environment variable that turns on recording when set to `1` or `true`.
pub const RECORD_ENV: &str = "STARRYSKY_REC";

/// Bundles the transport a [`Client`](crate::Client) should use.
pub struct ServiceContext {
    /// HTTP transport port.
    pub transport: Arc<dyn Transport>,
}

/// Handle to a recording session that must be finished after use.
pub struct RecordingSession {
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingSession {
    /// Finish the recording and write the cassette file to disk. Every
    /// client built on the recording context must be dropped first.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette is still in use or cannot be written.
    pub fn finish(self) -> Result<PathBuf, String> {
        let recorder = Arc::try_unwrap(self.recorder)
            .map_err(|_| "Recording transport still has references".to_string())?
            .into_inner()
            .map_err(|e| format!("Recorder lock poisoned: {e}"))?;
        recorder.finish().map_err(|e| format!("Failed to write cassette: {e}"))
    }
}

impl ServiceContext {
    /// Live HTTP transport authenticated with the configured token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the token is unusable.
    pub fn live(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self { transport: Arc::new(HttpTransport::new(&config.token)?) })
    }

    /// Live transport wrapped with a recorder writing under `.starrysky/cassettes/<timestamp>/`.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceContext::live`].
    pub fn recording(config: &ClientConfig) -> Result<(Self, RecordingSession), ClientError> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        let output_dir = PathBuf::from(".starrysky/cassettes").join(&timestamp);
        Self::recording_to(config, &output_dir.join(format!("{TRANSPORT_PORT}.cassette.yaml")))
    }

    /// Live transport wrapped with a recorder writing to `path`.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceContext::live`].
    pub fn recording_to(
        config: &ClientConfig,
        path: &Path,
    ) -> Result<(Self, RecordingSession), ClientError> {
        let live = HttpTransport::new(&config.token)?;
        let name = path
            .file_stem()
            .map_or_else(|| "recording".to_string(), |s| s.to_string_lossy().into_owned());
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(path, name, get_commit_hash())));
        let transport = RecordingTransport::new(Box::new(live), Arc::clone(&recorder));
        Ok((Self { transport: Arc::new(transport) }, RecordingSession { recorder }))
    }

    /// Transport that serves responses from a cassette file.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Replay`] if the cassette cannot be loaded.
    pub fn replaying(path: &Path) -> Result<Self, ClientError> {
        let replayer = CassetteReplayer::open(path)
            .map_err(|e| ClientError::Replay(format!("Failed to load cassette: {e}")))?;
        let transport = ReplayingTransport::new(Arc::new(Mutex::new(replayer)));
        Ok(Self { transport: Arc::new(transport) })
    }

    /// Pick the mode from the environment: replay when `STARRYSKY_REPLAY`
    /// names a cassette, record when `STARRYSKY_REC` is `1`/`true`, live
    /// otherwise.
    ///
    /// # Errors
    ///
    /// As the selected constructor.
    pub fn from_env(config: &ClientConfig) -> Result<(Self, Option<RecordingSession>), ClientError> {
        if let Some(cassette) = std::env::var(REPLAY_ENV).ok().filter(|v| !v.is_empty()) {
            log::debug!("replaying HTTP interactions from {cassette}");
            return Ok((Self::replaying(Path::new(&cassette))?, None));
        }
        if std::env::var(RECORD_ENV).is_ok_and(|v| v == "true" || v == "1") {
            log::debug!("recording HTTP interactions");
            let (ctx, session) = Self::recording(config)?;
            return Ok((ctx, Some(session)));
        }
        Ok((Self::live(config)?, None))
    }
}

/// Get the current git commit hash, or "unknown" if unavailable.
fn get_commit_hash() -> String {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map_or_else(|| "unknown".to_string(), |s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaying_missing_cassette_is_replay_error() {
        let err = ServiceContext::replaying(Path::new("/nonexistent/http.cassette.yaml")).err().unwrap();
        assert!(matches!(err, ClientError::Replay(_)));
    }

    #[test]
    fn live_requires_token() {
        let config = ClientConfig::new("http://h/sdapi/v1", "");
        assert!(matches!(ServiceContext::live(&config), Err(ClientError::Config(_))));
    }

    #[test]
    fn unused_recording_writes_empty_cassette() {
        let dir = std::env::temp_dir().join("starrysky_context_rec");
        let path = dir.join("http.cassette.yaml");
        let config = ClientConfig::new("http://h/sdapi/v1", "t");
        let (ctx, session) = ServiceContext::recording_to(&config, &path).unwrap();
        drop(ctx);
        assert_eq!(session.finish().unwrap(), path);
        assert!(std::fs::read_to_string(&path).unwrap().contains("name: http.cassette"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn finish_fails_while_transport_alive() {
        let path = std::env::temp_dir().join("starrysky_context_busy/http.cassette.yaml");
        let config = ClientConfig::new("http://h/sdapi/v1", "t");
        let (ctx, session) = ServiceContext::recording_to(&config, &path).unwrap();
        assert!(session.finish().is_err());
        drop(ctx);
    }
}
