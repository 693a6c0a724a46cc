// Page environment abstraction
//
// The driver never touches the DOM directly; it goes through this trait so
// the typing/poll/retry logic can run against an in-memory page in tests.
// The concrete implementation evaluates synthetic-event JavaScript over CDP.

pub mod cdp;

use async_trait::async_trait;

pub use cdp::CdpPageDriver;

use crate::cdp::CdpClient;
use crate::config::BrowserConfig;
use crate::error::Result;

/// Operations the hosted translation editor exposes to the driver.
///
/// Selectors are owned by the third-party page; every method maps a missing
/// selector to `ElementNotFound`.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Read the current text value of a field.
    async fn read_field(&self, selector: &str) -> Result<String>;

    /// Empty a field without notifying the page. The page only learns about
    /// the new content through the per-character notifications that follow.
    async fn clear_field(&self, selector: &str) -> Result<()>;

    /// Set a field's value and dispatch exactly one input notification.
    async fn set_field(&self, selector: &str, value: &str) -> Result<()>;

    /// Click into a field and give it keyboard focus.
    async fn focus_field(&self, selector: &str) -> Result<()>;

    /// Dispatch a synthetic click on a control.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Whether the selector currently resolves to an element.
    async fn exists(&self, selector: &str) -> Result<bool>;
}

/// Factory for page driver instances.
pub struct PageDriverFactory;

impl PageDriverFactory {
    /// Connect to the browser, locate the editor tab and attach to it.
    pub async fn connect(config: &BrowserConfig) -> Result<Box<dyn PageDriver>> {
        let client = CdpClient::connect(&config.cdp_endpoint).await?;
        let page = client.find_page(&config.page_url_filter).await?;
        tracing::info!("Driving page: {} ({})", page.title, page.url);
        let session_id = client.attach_page(&page.id).await?;
        Ok(Box::new(CdpPageDriver::new(client, session_id)))
    }
}
