// Translation service client
//
// One operation: submit a source string, get its translation back. The
// trait seam exists so the driver can run against a canned service in
// tests; the real implementation POSTs to the local relay (or any service
// speaking the same request/response shape).

pub mod http;

use async_trait::async_trait;

pub use http::HttpTranslationService;

use crate::config::ServiceConfig;
use crate::error::Result;

/// Main trait for translation operations.
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Translate a source string.
    async fn translate(&self, text: &str) -> Result<String>;
}

/// Factory for translation service instances.
pub struct TranslationServiceFactory;

impl TranslationServiceFactory {
    pub fn create_service(config: ServiceConfig) -> Box<dyn TranslationService> {
        Box::new(HttpTranslationService::new(config))
    }
}

/// Check that the translation service endpoint is reachable.
pub async fn check_service_availability(endpoint: &str) -> Result<()> {
    http::check_service_availability(endpoint).await
}
