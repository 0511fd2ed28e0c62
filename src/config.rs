//! Process configuration read from the environment (after `.env` loading).

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::catalog::FeedCatalog;
use crate::fetch::{BasicClient, HttpClient, HttpConfig, auth::ApiKey};
use crate::service::FeedService;

pub const CATALOG_PATH_VAR: &str = "MTA_CATALOG_PATH";
pub const API_KEY_VAR: &str = "MTA_API_KEY";
pub const HTTP_TIMEOUT_VAR: &str = "HTTP_TIMEOUT_SECS";
pub const HTTP_CONNECT_TIMEOUT_VAR: &str = "HTTP_CONNECT_TIMEOUT_SECS";
pub const LOG_FILE_VAR: &str = "LOG_FILE_PATH";

const DEFAULT_LOG_FILE: &str = "logs/mta_realtime.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// JSON catalog overriding the built-in MTA feeds and timeouts.
    pub catalog_path: Option<String>,
    /// Sent as `x-api-key` on every upstream request when set.
    pub api_key: Option<String>,
    pub http: HttpConfig,
    pub log_file_path: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values are
    /// treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let secs = |name: &str, default: Duration| -> Result<Duration> {
            match var(name) {
                Some(raw) => {
                    let secs: u64 = raw
                        .trim()
                        .parse()
                        .with_context(|| format!("{name} must be a whole number of seconds, got '{raw}'"))?;
                    Ok(Duration::from_secs(secs))
                }
                None => Ok(default),
            }
        };

        let defaults = HttpConfig::default();
        Ok(Self {
            catalog_path: var(CATALOG_PATH_VAR),
            api_key: var(API_KEY_VAR),
            http: HttpConfig {
                timeout: secs(HTTP_TIMEOUT_VAR, defaults.timeout)?,
                connect_timeout: secs(HTTP_CONNECT_TIMEOUT_VAR, defaults.connect_timeout)?,
            },
            log_file_path: var(LOG_FILE_VAR).unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
        })
    }

    pub fn catalog(&self) -> Result<FeedCatalog> {
        match &self.catalog_path {
            Some(path) => {
                info!(path = %path, "Loading feed catalog");
                FeedCatalog::load(path)
            }
            None => Ok(FeedCatalog::mta_defaults()),
        }
    }

    pub fn http_client(&self) -> Result<Box<dyn HttpClient>> {
        let basic = BasicClient::new(self.http).context("failed to build HTTP client")?;
        let client: Box<dyn HttpClient> = match &self.api_key {
            Some(key) => Box::new(ApiKey::mta(basic, key).context("invalid MTA_API_KEY")?),
            None => Box::new(basic),
        };
        Ok(client)
    }

    pub fn build_service(&self) -> Result<FeedService<Box<dyn HttpClient>>> {
        Ok(FeedService::new(self.catalog()?, self.http_client()?))
    }
}
