use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, AutopressError};

// Defaults for fields added after the first config format shipped
fn default_ready_timeout_secs() -> u64 {
    30
}

fn default_advance_on_unconfirmed() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub browser: BrowserConfig,
    pub page: PageConfig,
    pub driver: DriverConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Translation service base URL; the driver POSTs to {endpoint}/translate
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chrome debugging endpoint
    pub cdp_endpoint: String,
    /// Substring used to pick the editor tab among open pages; empty matches
    /// the first page target
    pub page_url_filter: String,
}

/// Selectors owned by the hosted translation editor. These are a fixed
/// integration contract with the third-party page, not invented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    /// Text field holding the original string
    pub source_field: String,
    /// Text field receiving the translated string
    pub destination_field: String,
    /// Control advancing to the next translatable string
    pub next_control: String,
    /// Control returning to the previous string
    pub previous_control: String,
    /// Control persisting the current translation
    pub save_control: String,
    /// Element whose presence signals the page accepted the last save
    pub confirmation_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Lower bound for the per-character typing delay (milliseconds)
    pub type_delay_min_ms: u64,
    /// Upper bound for the per-character typing delay (milliseconds)
    pub type_delay_max_ms: u64,
    /// Delay between typing and save, and between confirmation and advance
    pub settle_delay_ms: u64,
    /// Delay between the save click and the first confirmation check
    pub post_save_delay_ms: u64,
    /// Confirmation poll attempt cap
    pub confirm_attempts: u32,
    /// Wait between confirmation poll attempts (milliseconds)
    pub confirm_interval_ms: u64,
    /// Whether an exhausted confirmation poll still advances to the next
    /// item (the original behavior) or leaves the item for the operator
    #[serde(default = "default_advance_on_unconfirmed")]
    pub advance_on_unconfirmed: bool,
    /// Overall deadline for the pre-drive readiness wait (seconds)
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Listen address for the relay server
    pub listen_host: String,
    pub listen_port: u16,
    /// Upstream translation API endpoint
    pub upstream_endpoint: String,
    /// Environment variable holding the upstream API key
    pub api_key_env: String,
    /// Language pair forwarded upstream
    pub source_lang: String,
    pub target_lang: String,
    /// Domain context forwarded upstream to steer tone and terminology
    pub context: String,
    /// Origin allowed to call the relay from a browser
    pub allowed_origin: String,
    /// Upstream request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                endpoint: "http://localhost:8443".to_string(),
                timeout_secs: 10,
            },
            browser: BrowserConfig {
                cdp_endpoint: "http://localhost:9222".to_string(),
                page_url_filter: String::new(),
            },
            page: PageConfig {
                source_field: "div#trp-language-en_GB textarea.trp-translation-input.trp-textarea"
                    .to_string(),
                destination_field:
                    "div#trp-language-it_IT textarea.trp-translation-input.trp-textarea"
                        .to_string(),
                next_control: "#trp-next".to_string(),
                previous_control: "#trp-previous".to_string(),
                save_control: "#trp-save".to_string(),
                confirmation_marker: "svg.trp_reviewed_icon".to_string(),
            },
            driver: DriverConfig {
                type_delay_min_ms: 2,
                type_delay_max_ms: 20,
                settle_delay_ms: 500,
                post_save_delay_ms: 100,
                confirm_attempts: 30,
                confirm_interval_ms: 300,
                advance_on_unconfirmed: true,
                ready_timeout_secs: 30,
            },
            relay: RelayConfig {
                listen_host: "127.0.0.1".to_string(),
                listen_port: 8443,
                upstream_endpoint: "https://api-free.deepl.com/v2/translate".to_string(),
                api_key_env: "DEEPL_API_KEY".to_string(),
                source_lang: "EN".to_string(),
                target_lang: "IT".to_string(),
                context: "Website content for a student-led startup accelerator program. \
                          The text is about entrepreneurship, innovation, and student \
                          startups. Keep the same text tone and style."
                    .to_string(),
                allowed_origin: "https://builditup.it".to_string(),
                timeout_secs: 10,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AutopressError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| AutopressError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AutopressError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| AutopressError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_driver_timings() {
        let config = Config::default();
        assert_eq!(config.driver.type_delay_min_ms, 2);
        assert_eq!(config.driver.type_delay_max_ms, 20);
        assert_eq!(config.driver.settle_delay_ms, 500);
        assert_eq!(config.driver.post_save_delay_ms, 100);
        assert_eq!(config.driver.confirm_attempts, 30);
        assert_eq!(config.driver.confirm_interval_ms, 300);
        assert!(config.driver.advance_on_unconfirmed);
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.service.endpoint = "http://localhost:9999".to_string();
        config.driver.confirm_attempts = 5;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.service.endpoint, "http://localhost:9999");
        assert_eq!(loaded.driver.confirm_attempts, 5);
        assert_eq!(loaded.page.save_control, "#trp-save");
    }

    #[test]
    fn test_missing_policy_field_defaults_on() {
        let mut config = Config::default();
        config.driver.advance_on_unconfirmed = false;
        let mut serialized = toml::to_string(&config).unwrap();
        serialized = serialized.replace("advance_on_unconfirmed = false\n", "");

        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert!(parsed.driver.advance_on_unconfirmed);
    }
}
