//! Live transport over `reqwest`.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;

use crate::error::ClientError;
use crate::ports::transport::{ExecuteFuture, Method, Transport, WireRequest, WireResponse};

/// Live transport that sends every request with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport whose requests all carry `Authorization: Bearer <token>`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the token is empty or not a valid
    /// header value, and [`ClientError::Network`] if the HTTP client cannot
    /// be built.
    pub fn new(token: &str) -> Result<Self, ClientError> {
        if token.trim().is_empty() {
            return Err(ClientError::Config("token cannot be empty".into()));
        }
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ClientError::Config(format!("Invalid token: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self { client })
    }

    /// Use an already configured `reqwest::Client`. The caller is
    /// responsible for its authentication headers.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &WireRequest) -> ExecuteFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let builder = match request.method {
                Method::Get => self.client.get(&request.url),
                Method::Post => self.client.post(&request.url),
            };
            let builder = match &request.body {
                Some(body) => builder.json(body),
                None => builder,
            };

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            log::debug!("{} {} -> {status}", request.method.as_str(), request.url);
            Ok(WireResponse { status, body })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_config_error() {
        assert!(matches!(HttpTransport::new(""), Err(ClientError::Config(_))));
        assert!(matches!(HttpTransport::new("   "), Err(ClientError::Config(_))));
    }

    #[test]
    fn token_with_newline_is_config_error() {
        assert!(matches!(HttpTransport::new("abc\ndef"), Err(ClientError::Config(_))));
    }

    #[test]
    fn valid_token_builds() {
        assert!(HttpTransport::new("secret-token").is_ok());
    }
}
