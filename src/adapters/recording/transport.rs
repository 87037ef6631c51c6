//! Recording adapter for the `Transport` port.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::cassette::recorder::CassetteRecorder;
use crate::error::ClientError;
use crate::ports::transport::{ExecuteFuture, Transport, WireRequest, WireResponse};

/// Cassette port name for HTTP interactions.
pub const TRANSPORT_PORT: &str = "http";

/// Delegates to an inner transport and records each exchange.
pub struct RecordingTransport {
    inner: Box<dyn Transport>,
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingTransport {
    /// Wrap `inner`, appending every exchange to `recorder`.
    pub fn new(inner: Box<dyn Transport>, recorder: Arc<Mutex<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }

    /// Store the exchange as `{"Ok": response}` or `{"Err": message}`.
    /// Failures to record are logged and never affect the call.
    fn record(&self, request: &WireRequest, result: &Result<WireResponse, ClientError>) {
        let output = match result {
            Ok(response) => json!({ "Ok": response }),
            Err(e) => json!({ "Err": e.to_string() }),
        };
        let input = serde_json::to_value(request).unwrap_or_else(|e| {
            log::warn!("recording {} {} without its body: {e}", request.method.as_str(), request.url);
            json!({ "method": request.method, "url": request.url, "body": Value::Null })
        });
        match self.recorder.lock() {
            Ok(mut recorder) => recorder.record(TRANSPORT_PORT, request.method.as_str(), input, output),
            Err(e) => log::warn!("recorder lock poisoned, dropping {}: {e}", request.url),
        }
    }
}

impl Transport for RecordingTransport {
    fn execute(&self, request: &WireRequest) -> ExecuteFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let result = self.inner.execute(&request).await;
            self.record(&request, &result);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Transport for Fixed {
        fn execute(&self, _request: &WireRequest) -> ExecuteFuture<'_> {
            Box::pin(async { Ok(WireResponse { status: 200, body: "{\"ok\":true}".into() }) })
        }
    }

    struct Failing;

    impl Transport for Failing {
        fn execute(&self, _request: &WireRequest) -> ExecuteFuture<'_> {
            Box::pin(async { Err(ClientError::InvalidResponse("boom".into())) })
        }
    }

    fn recorder(name: &str) -> Arc<Mutex<CassetteRecorder>> {
        let path = std::env::temp_dir().join(format!("{name}.cassette.yaml"));
        Arc::new(Mutex::new(CassetteRecorder::new(path, name, "abc")))
    }

    #[tokio::test]
    async fn records_request_and_response() {
        let recorder = recorder("starrysky_recording_ok");
        let transport = RecordingTransport::new(Box::new(Fixed), Arc::clone(&recorder));

        let request = WireRequest::post("http://h/sdapi/v1/txt2img", Some(json!({"prompt": "a cat"})));
        let response = transport.execute(&request).await.unwrap();
        assert_eq!(response.status, 200);

        let guard = recorder.lock().unwrap();
        let recorded = &guard.interactions()[0];
        assert_eq!((recorded.port.as_str(), recorded.method.as_str()), ("http", "post"));
        assert_eq!(recorded.input["url"], "http://h/sdapi/v1/txt2img");
        assert_eq!(recorded.input["body"]["prompt"], "a cat");
        assert_eq!(recorded.output["Ok"]["body"], "{\"ok\":true}");
    }

    #[tokio::test]
    async fn records_errors_as_strings() {
        let recorder = recorder("starrysky_recording_err");
        let transport = RecordingTransport::new(Box::new(Failing), Arc::clone(&recorder));

        assert!(transport.execute(&WireRequest::get("http://h/sdapi/v1/options")).await.is_err());

        let guard = recorder.lock().unwrap();
        let recorded = &guard.interactions()[0];
        assert_eq!(recorded.method, "get");
        assert!(recorded.output["Err"].as_str().unwrap().contains("boom"));
    }
}
