//! On-disk cassette format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recorded session: every interaction in call order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cassette {
    /// Human-readable cassette name.
    pub name: String,
    /// When the recording was made.
    pub recorded_at: DateTime<Utc>,
    /// Git commit of the recording build, or `unknown`.
    pub commit: String,
    /// Recorded interactions.
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

/// One call across a port boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// Position in the recording.
    pub seq: u64,
    /// Port name, e.g. `http`.
    pub port: String,
    /// Method name within the port, e.g. `get` or `post`.
    pub method: String,
    /// Serialized input.
    pub input: serde_json::Value,
    /// Serialized `{"Ok": ...}` or `{"Err": "..."}` output.
    pub output: serde_json::Value,
}
