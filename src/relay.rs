//! Local translation relay.
//!
//! Bridges `POST /translate {"text": ...}` to the DeepL API with a fixed
//! language pair and domain context, returning `{"translated_text": ...}`.
//! Serves both this binary's driver and the hosted page's own tooling, so
//! CORS is scoped to the page's origin.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Json, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::post;
use axum::Router;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::RelayConfig;
use crate::error::{AutopressError, Result};
use crate::translate::http::{TranslateRequest, TranslateResponse};

#[derive(Debug, Serialize)]
struct DeepLRequest {
    text: Vec<String>,
    source_lang: String,
    target_lang: String,
    context: String,
}

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}

#[derive(Debug, Serialize)]
struct RelayErrorBody {
    detail: String,
}

struct RelayState {
    client: Client,
    config: RelayConfig,
    api_key: String,
}

/// The relay server.
pub struct RelayServer {
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Create a relay; the upstream API key is read from the environment
    /// variable named in the config.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            AutopressError::Relay(format!(
                "Upstream API key not found: set {}",
                config.api_key_env
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("HTTP client creation should not fail");

        Ok(Self {
            state: Arc::new(RelayState {
                client,
                config,
                api_key,
            }),
        })
    }

    pub fn addr(&self) -> String {
        format!(
            "{}:{}",
            self.state.config.listen_host, self.state.config.listen_port
        )
    }

    /// Bind and serve until the process exits.
    pub async fn run(&self) -> Result<()> {
        let app = self.router()?;

        let addr: SocketAddr = self
            .addr()
            .parse()
            .map_err(|e| AutopressError::Relay(format!("Invalid listen address: {}", e)))?;
        let listener = TcpListener::bind(addr).await?;

        info!("Translation relay listening on {}", addr);
        axum::serve(listener, app).await?;

        Ok(())
    }

    fn router(&self) -> Result<Router> {
        let origin = self
            .state
            .config
            .allowed_origin
            .parse::<HeaderValue>()
            .map_err(|e| AutopressError::Relay(format!("Invalid allowed origin: {}", e)))?;

        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::POST, Method::OPTIONS])
            .allow_headers(Any)
            .max_age(Duration::from_secs(3600));

        Ok(Router::new()
            .route("/translate", post(handle_translate))
            .layer(cors)
            .with_state(self.state.clone()))
    }
}

async fn handle_translate(
    State(state): State<Arc<RelayState>>,
    Json(request): Json<TranslateRequest>,
) -> std::result::Result<Json<TranslateResponse>, (StatusCode, Json<RelayErrorBody>)> {
    match forward_upstream(&state, &request.text).await {
        Ok(translated_text) => Ok(Json(TranslateResponse { translated_text })),
        Err(e) => {
            error!("Relay upstream call failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RelayErrorBody {
                    detail: e.to_string(),
                }),
            ))
        }
    }
}

async fn forward_upstream(state: &RelayState, text: &str) -> Result<String> {
    let payload = build_upstream_request(&state.config, text);

    let response = state
        .client
        .post(&state.config.upstream_endpoint)
        .header(
            "Authorization",
            format!("DeepL-Auth-Key {}", state.api_key),
        )
        .json(&payload)
        .send()
        .await
        .map_err(|e| AutopressError::Relay(format!("Upstream request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AutopressError::Relay(format!(
            "Upstream error {}: {}",
            status, body
        )));
    }

    let parsed: DeepLResponse = response
        .json()
        .await
        .map_err(|e| AutopressError::Relay(format!("Unexpected upstream response: {}", e)))?;

    extract_translation(parsed)
        .ok_or_else(|| AutopressError::Relay("Upstream returned no translations".to_string()))
}

fn build_upstream_request(config: &RelayConfig, text: &str) -> DeepLRequest {
    DeepLRequest {
        text: vec![text.to_string()],
        source_lang: config.source_lang.clone(),
        target_lang: config.target_lang.clone(),
        context: config.context.clone(),
    }
}

fn extract_translation(response: DeepLResponse) -> Option<String> {
    response
        .translations
        .into_iter()
        .next()
        .map(|translation| translation.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_upstream_request_carries_language_pair_and_context() {
        let config = Config::default().relay;
        let payload = build_upstream_request(&config, "Hello");

        let serialized = serde_json::to_value(&payload).unwrap();
        assert_eq!(serialized["text"], serde_json::json!(["Hello"]));
        assert_eq!(serialized["source_lang"], "EN");
        assert_eq!(serialized["target_lang"], "IT");
        assert!(serialized["context"].as_str().unwrap().contains("tone"));
    }

    #[test]
    fn test_first_upstream_translation_wins() {
        let response: DeepLResponse = serde_json::from_str(
            r#"{"translations": [{"text": "Ciao"}, {"text": "Salve"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_translation(response).as_deref(), Some("Ciao"));
    }

    #[test]
    fn test_empty_upstream_translations_is_none() {
        let response: DeepLResponse =
            serde_json::from_str(r#"{"translations": []}"#).unwrap();
        assert!(extract_translation(response).is_none());
    }

    #[test]
    fn test_error_body_matches_wire_shape() {
        let body = RelayErrorBody {
            detail: "Upstream error 456: quota exceeded".to_string(),
        };
        let serialized = serde_json::to_value(&body).unwrap();
        assert_eq!(
            serialized,
            serde_json::json!({"detail": "Upstream error 456: quota exceeded"})
        );
    }
}
