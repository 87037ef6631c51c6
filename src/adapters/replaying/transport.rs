//! Replaying adapter for the `Transport` port.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::adapters::recording::transport::TRANSPORT_PORT;
use crate::cassette::replayer::CassetteReplayer;
use crate::error::ClientError;
use crate::ports::transport::{ExecuteFuture, Transport, WireRequest, WireResponse};

/// Serves recorded HTTP responses from a cassette, in order per method.
/// Request URLs and bodies are not compared.
pub struct ReplayingTransport {
    replayer: Arc<Mutex<CassetteReplayer>>,
}

impl ReplayingTransport {
    /// Create a replaying transport backed by the given replayer.
    #[must_use]
    pub fn new(replayer: Arc<Mutex<CassetteReplayer>>) -> Self {
        Self { replayer }
    }

    fn next_response(&self, request: &WireRequest) -> Result<WireResponse, ClientError> {
        let interaction = self
            .replayer
            .lock()
            .map_err(|e| ClientError::Replay(format!("replayer lock poisoned: {e}")))?
            .next_interaction(TRANSPORT_PORT, request.method.as_str())
            .map_err(ClientError::Replay)?;
        log::debug!("replaying #{} for {} {}", interaction.seq, request.method.as_str(), request.url);
        decode_output(interaction.output)
    }
}

/// Turn a recorded `{"Ok": response}` / `{"Err": message}` back into a result.
fn decode_output(mut output: Value) -> Result<WireResponse, ClientError> {
    if let Some(err) = output.get("Err") {
        return Err(ClientError::Replay(err.as_str().unwrap_or("recorded error").to_string()));
    }
    let ok = output
        .get_mut("Ok")
        .map(Value::take)
        .ok_or_else(|| ClientError::Replay(format!("recorded output has neither Ok nor Err: {output}")))?;
    serde_json::from_value(ok)
        .map_err(|e| ClientError::Replay(format!("recorded response is malformed: {e}")))
}

impl Transport for ReplayingTransport {
    fn execute(&self, request: &WireRequest) -> ExecuteFuture<'_> {
        let result = self.next_response(request);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::format::{Cassette, Interaction};
    use chrono::Utc;
    use serde_json::json;

    fn replaying(interactions: Vec<Interaction>) -> ReplayingTransport {
        let cassette =
            Cassette { name: "t".into(), recorded_at: Utc::now(), commit: "c".into(), interactions };
        ReplayingTransport::new(Arc::new(Mutex::new(CassetteReplayer::new(cassette))))
    }

    fn interaction(seq: u64, method: &str, output: Value) -> Interaction {
        Interaction { seq, port: "http".into(), method: method.into(), input: json!({}), output }
    }

    #[tokio::test]
    async fn serves_responses_per_method() {
        let transport = replaying(vec![
            interaction(0, "get", json!({"Ok": {"status": 200, "body": "{\"a\":1}"}})),
            interaction(1, "post", json!({"Ok": {"status": 500, "body": "internal error"}})),
        ]);

        let post = transport.execute(&WireRequest::post("http://h/x", None)).await.unwrap();
        assert_eq!(post.status, 500);
        let get = transport.execute(&WireRequest::get("http://h/y")).await.unwrap();
        assert_eq!(get.body, "{\"a\":1}");
    }

    #[tokio::test]
    async fn replays_recorded_error() {
        let transport = replaying(vec![interaction(0, "get", json!({"Err": "refused"}))]);
        let err = transport.execute(&WireRequest::get("http://h/y")).await.unwrap_err();
        assert!(matches!(err, ClientError::Replay(msg) if msg == "refused"));
    }

    #[tokio::test]
    async fn malformed_output_is_replay_error() {
        let transport = replaying(vec![interaction(0, "get", json!({"status": 200}))]);
        let err = transport.execute(&WireRequest::get("http://h/y")).await.unwrap_err();
        assert!(matches!(err, ClientError::Replay(msg) if msg.contains("neither Ok nor Err")));
    }

    #[tokio::test]
    async fn exhausted_cassette_is_replay_error() {
        let transport = replaying(vec![]);
        let err = transport.execute(&WireRequest::get("http://h/y")).await.unwrap_err();
        assert!(matches!(err, ClientError::Replay(_)));
    }
}
