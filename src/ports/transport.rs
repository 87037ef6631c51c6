//! HTTP transport port between the client and the webui.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// HTTP method of a wire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl Method {
    /// Lower-case name, used as the cassette method key.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
        }
    }
}

/// A single HTTP request to the webui.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// JSON body, if any.
    #[serde(default)]
    pub body: Option<Value>,
}

impl WireRequest {
    /// A `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: Method::Get, url: url.into(), body: None }
    }

    /// A `POST` request with an optional JSON body.
    pub fn post(url: impl Into<String>, body: Option<Value>) -> Self {
        Self { method: Method::Post, url: url.into(), body }
    }
}

/// The status and raw body of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

impl WireResponse {
    /// Parse the body as JSON, failing on any status other than 200.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Service`] for a non-200 status and
    /// [`ClientError::InvalidResponse`] if the body is not JSON.
    pub fn json(&self) -> Result<Value, ClientError> {
        if self.status != 200 {
            return Err(ClientError::Service { status: self.status, body: self.body.clone() });
        }
        serde_json::from_str(&self.body)
            .map_err(|e| ClientError::InvalidResponse(format!("Response is not JSON: {e}")))
    }
}

/// Boxed future type returned by [`Transport::execute`].
pub type ExecuteFuture<'a> =
    Pin<Box<dyn Future<Output = Result<WireResponse, ClientError>> + Send + 'a>>;

/// Sends requests to the webui. Authentication is the transport's concern.
pub trait Transport: Send + Sync {
    /// Perform one request. No retries.
    fn execute(&self, request: &WireRequest) -> ExecuteFuture<'_>;
}
