//! In-memory transport and log capture for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};

use log::{Level, LevelFilter, Metadata, Record};
use serde_json::Value;

use crate::client::{Client, ClientConfig};
use crate::ports::transport::{ExecuteFuture, Transport, WireRequest, WireResponse};

/// Records every request and answers with queued responses, then `{}`.
pub(crate) struct Capturing {
    requests: Mutex<Vec<WireRequest>>,
    responses: Mutex<VecDeque<WireResponse>>,
}

impl Capturing {
    pub(crate) fn new(responses: Vec<(u16, Value)>) -> Arc<Self> {
        let responses = responses
            .into_iter()
            .map(|(status, body)| WireResponse { status, body: body.to_string() })
            .collect();
        Arc::new(Self { requests: Mutex::new(Vec::new()), responses: Mutex::new(responses) })
    }

    pub(crate) fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn client(self: &Arc<Self>) -> Client {
        let config = ClientConfig::new("http://127.0.0.1:7860/sdapi/v1", "secret");
        Client::with_transport(&config, Arc::clone(self) as Arc<dyn Transport>).unwrap()
    }
}

impl Transport for Capturing {
    fn execute(&self, request: &WireRequest) -> ExecuteFuture<'_> {
        self.requests.lock().unwrap().push(request.clone());
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| WireResponse { status: 200, body: "{}".into() });
        Box::pin(async move { Ok(response) })
    }
}

thread_local! {
    static WARNINGS: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Keeps `warn!` messages emitted on a thread that is inside [`capture_warnings`].
struct WarningCapture;

impl log::Log for WarningCapture {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() == Level::Warn
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        WARNINGS.with(|warnings| {
            if let Some(warnings) = warnings.borrow_mut().as_mut() {
                warnings.push(record.args().to_string());
            }
        });
    }

    fn flush(&self) {}
}

static CAPTURE: WarningCapture = WarningCapture;

/// Run `f` and return its output with the warnings it logged on this thread.
pub(crate) fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if log::set_logger(&CAPTURE).is_ok() {
            log::set_max_level(LevelFilter::Warn);
        }
    });
    WARNINGS.with(|warnings| *warnings.borrow_mut() = Some(Vec::new()));
    let output = f();
    let warnings = WARNINGS.with(|warnings| warnings.borrow_mut().take()).unwrap_or_default();
    (output, warnings)
}
