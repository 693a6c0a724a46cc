//! CDP-backed page environment.
//!
//! Each operation evaluates a guarded JavaScript snippet in the attached
//! page session. Snippets return `false`/`null` when the selector does not
//! resolve, which maps to `ElementNotFound` here; page-side exceptions
//! surface as `Browser` errors from the transport.

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::cdp::CdpClient;
use crate::error::{AutopressError, Result};

use super::PageDriver;

pub struct CdpPageDriver {
    client: CdpClient,
    session_id: String,
}

impl CdpPageDriver {
    pub fn new(client: CdpClient, session_id: String) -> Self {
        Self { client, session_id }
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        trace!("Page eval: {}", expression);
        self.client.evaluate(&self.session_id, expression).await
    }

    /// Run a snippet that returns `false` when the element is missing.
    async fn evaluate_on_element(&self, selector: &str, expression: String) -> Result<()> {
        match self.evaluate(&expression).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(AutopressError::ElementNotFound(selector.to_string())),
        }
    }
}

#[async_trait]
impl PageDriver for CdpPageDriver {
    async fn read_field(&self, selector: &str) -> Result<String> {
        match self.evaluate(&read_field_script(selector)).await? {
            Value::String(text) => Ok(text),
            _ => Err(AutopressError::ElementNotFound(selector.to_string())),
        }
    }

    async fn clear_field(&self, selector: &str) -> Result<()> {
        self.evaluate_on_element(selector, clear_field_script(selector)).await
    }

    async fn set_field(&self, selector: &str, value: &str) -> Result<()> {
        self.evaluate_on_element(selector, set_field_script(selector, value)).await
    }

    async fn focus_field(&self, selector: &str) -> Result<()> {
        self.evaluate_on_element(selector, focus_field_script(selector)).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.evaluate_on_element(selector, click_script(selector)).await
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        match self.evaluate(&exists_script(selector)).await? {
            Value::Bool(present) => Ok(present),
            other => Err(AutopressError::Browser(format!(
                "Unexpected presence probe result: {}",
                other
            ))),
        }
    }
}

/// Quote a string as a JavaScript string literal.
fn js_string(text: &str) -> String {
    serde_json::to_string(text).expect("string serialization is infallible")
}

fn read_field_script(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         return el ? el.value : null; }})()",
        sel = js_string(selector)
    )
}

fn clear_field_script(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         if (!el) return false; el.value = ''; return true; }})()",
        sel = js_string(selector)
    )
}

fn set_field_script(selector: &str, value: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         if (!el) return false; el.value = {val}; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         return true; }})()",
        sel = js_string(selector),
        val = js_string(value)
    )
}

fn focus_field_script(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         if (!el) return false; el.click(); el.focus(); return true; }})()",
        sel = js_string(selector)
    )
}

fn click_script(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         if (!el) return false; \
         el.dispatchEvent(new MouseEvent('click', \
         {{ bubbles: true, cancelable: true, view: window }})); \
         return true; }})()",
        sel = js_string(selector)
    )
}

fn exists_script(selector: &str) -> String {
    format!(
        "document.querySelector({sel}) !== null",
        sel = js_string(selector)
    )
}
