//! [model-keyword](https://github.com/mix1009/model-keyword) extension.

use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::error::ClientError;

/// Trigger keywords for the loaded checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelKeywordResult {
    /// Keywords to add to prompts.
    pub keywords: Vec<String>,
    /// Checkpoint name.
    pub model: String,
    /// Legacy short hash of the checkpoint.
    #[serde(rename = "hash")]
    pub oldhash: String,
    /// Where the keywords came from.
    pub match_source: String,
}

/// Keyword lookup for the loaded checkpoint.
#[derive(Debug, Clone)]
pub struct ModelKeywordInterface {
    client: Client,
}

impl ModelKeywordInterface {
    /// Bind to a client.
    #[must_use]
    pub fn new(client: &Client) -> Self {
        Self { client: client.clone() }
    }

    /// Keywords for the checkpoint that is currently loaded.
    ///
    /// # Errors
    ///
    /// As [`Client::custom_get`], or [`ClientError::InvalidResponse`] if a
    /// field is missing.
    pub async fn get_keywords(&self) -> Result<ModelKeywordResult, ClientError> {
        let value = self.client.custom_get("model_keyword/get_keywords", false).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::InvalidResponse(format!("Unexpected keyword body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Capturing;
    use serde_json::json;

    #[tokio::test]
    async fn maps_hash_to_oldhash() {
        let transport = Capturing::new(vec![(
            200,
            json!({"keywords": ["mdjrny-v4 style"], "model": "midjourney-v4", "hash": "5d5ad06c", "match_source": "model-keyword.txt"}),
        )]);
        let result = ModelKeywordInterface::new(&transport.client()).get_keywords().await.unwrap();
        assert_eq!(result.oldhash, "5d5ad06c");
        assert_eq!(result.keywords, vec!["mdjrny-v4 style"]);
        assert_eq!(transport.requests()[0].url, "http://127.0.0.1:7860/model_keyword/get_keywords");
    }

    #[tokio::test]
    async fn missing_field_is_invalid_response() {
        let transport = Capturing::new(vec![(200, json!({"keywords": []}))]);
        let err = ModelKeywordInterface::new(&transport.client()).get_keywords().await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }
}
