use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::error::{AutopressError, Result};

use super::TranslationService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub translated_text: String,
}

/// Client for the local translation service.
pub struct HttpTranslationService {
    client: Client,
    config: ServiceConfig,
}

impl HttpTranslationService {
    pub fn new(config: ServiceConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("HTTP client creation should not fail");

        Self { client, config }
    }
}

#[async_trait]
impl TranslationService for HttpTranslationService {
    async fn translate(&self, text: &str) -> Result<String> {
        let url = format!("{}/translate", self.config.endpoint.trim_end_matches('/'));

        debug!("Sending translation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&TranslateRequest {
                text: text.to_string(),
            })
            .send()
            .await
            .map_err(|e| AutopressError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AutopressError::Translation(format!(
                "Translation service error {}: {}",
                status, error_text
            )));
        }

        let translated: TranslateResponse = response
            .json()
            .await
            .map_err(|e| AutopressError::Translation(format!("Failed to parse response: {}", e)))?;

        Ok(translated.translated_text)
    }
}

/// Check that the translation service endpoint is reachable.
///
/// Any HTTP status counts as reachable; only a transport-level failure
/// (refused connection, DNS, TLS) is reported.
pub async fn check_service_availability(endpoint: &str) -> Result<()> {
    let client = Client::new();

    client
        .get(endpoint)
        .send()
        .await
        .map_err(|e| AutopressError::Translation(format!(
            "Translation service not reachable at {}: {}",
            endpoint, e
        )))?;

    info!("Translation service is reachable at {}", endpoint);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = TranslateRequest {
            text: "Hello".to_string(),
        };
        let serialized = serde_json::to_value(&request).unwrap();
        assert_eq!(serialized, serde_json::json!({"text": "Hello"}));
    }

    #[test]
    fn test_response_wire_shape() {
        let parsed: TranslateResponse =
            serde_json::from_str(r#"{"translated_text": "Ciao"}"#).unwrap();
        assert_eq!(parsed.translated_text, "Ciao");
    }
}
