//! HTTP embedding provider client.

use super::{Embedder, Embedding};
use crate::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Client for a JSON embedding endpoint.
///
/// Sends `{"input": text, "dimensions": n}` and expects
/// `{"embedding": [f32; n], "model": "..."}`. Any transport failure,
/// non-success status, or dimension mismatch degrades to the zero vector
/// rather than failing the caller.
pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
    dimensions: usize,
    provider_version: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    model: Option<String>,
}

impl HttpEmbedder {
    /// Creates a client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        dimensions: usize,
        timeout_ms: u64,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::internal("build_http_client", e))?;
        let endpoint = endpoint.into();
        Ok(Self {
            provider_version: format!("http:{endpoint}"),
            client,
            endpoint,
            api_key,
            dimensions,
        })
    }

    fn degraded(&self, cause: &str) -> Embedding {
        tracing::warn!(endpoint = %self.endpoint, cause, "embedding provider degraded");
        Embedding {
            vector: vec![0.0; self.dimensions],
            degraded: true,
            provider_version: self.provider_version.clone(),
        }
    }

    fn request(&self, text: &str) -> std::result::Result<EmbedResponse, reqwest::Error> {
        let mut req = self.client.post(&self.endpoint).json(&serde_json::json!({
            "input": text,
            "dimensions": self.dimensions,
        }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()?.error_for_status()?.json()
    }
}

impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_version(&self) -> &str {
        &self.provider_version
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(Error::Validation("cannot embed empty text".to_string()));
        }

        match self.request(text) {
            Ok(response) => {
                if response.embedding.len() != self.dimensions {
                    return Ok(self.degraded(&format!(
                        "dimension mismatch: expected {}, got {}",
                        self.dimensions,
                        response.embedding.len()
                    )));
                }
                let provider_version = response
                    .model
                    .map_or_else(|| self.provider_version.clone(), |m| format!("http:{m}"));
                Ok(Embedding {
                    vector: response.embedding,
                    degraded: false,
                    provider_version,
                })
            },
            Err(e) => Ok(self.degraded(&e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_endpoint_degrades() {
        // Port 9 (discard) refuses connections on loopback.
        let embedder =
            HttpEmbedder::new("http://127.0.0.1:9/embed", None, 16, 200).unwrap();
        let result = embedder.embed("some text").unwrap();
        assert!(result.degraded);
        assert!(result.is_zero());
        assert_eq!(result.vector.len(), 16);
    }

    #[test]
    fn test_empty_text_is_an_error_not_degraded() {
        let embedder =
            HttpEmbedder::new("http://127.0.0.1:9/embed", None, 16, 200).unwrap();
        assert!(embedder.embed("").is_err());
    }
}
