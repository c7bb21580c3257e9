//! Configuration loading for the desk store
//!
//! Supports loading settings from (in order of priority):
//! 1. JSON file (~/.config/deskline/desk.json)
//! 2. Runtime environment variables (fallback)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::models::AgentIdentity;
use crate::store::DEFAULT_PAGE_SIZE;


const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Invalid or incomplete settings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid Supabase URL {0:?}")]
    InvalidUrl(String),
    #[error("page size must be greater than zero")]
    ZeroPageSize,
}

/// Zoho Desk credentials used for replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZohoConfig {
    pub org_id: String,
    #[serde(default = "default_zoho_url")]
    pub base_url: String,
    pub access_token: String,
}

fn default_zoho_url() -> String {
    crate::actions::ZohoDeskClient::DEFAULT_BASE_URL.to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Connection and identity settings for the console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskConfig {
    pub supabase_url: String,
    pub supabase_key: String,
    #[serde(default)]
    pub agent: AgentIdentity,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub zoho: Option<ZohoConfig>,
}

impl DeskConfig {
    /// Load settings using the following priority:
    /// 1. JSON file (~/.config/deskline/desk.json)
    /// 2. Runtime environment variables
    pub fn load() -> Result<Self> {
        if config::config_exists(config::DESK_FILE) {
            let cfg: DeskConfig = config::load_json(config::DESK_FILE)?;
            cfg.validate()?;
            return Ok(cfg);
        }
        Self::from_env()
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let cfg: DeskConfig = config::load_json_file(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: DeskConfig = serde_json::from_str(json).context("Failed to parse desk config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let page_size = match lookup("DESK_PAGE_SIZE") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DESK_PAGE_SIZE is not a number: {}", raw))?,
            None => DEFAULT_PAGE_SIZE,
        };

        let zoho = match (lookup("ZOHO_ORG_ID"), lookup("ZOHO_ACCESS_TOKEN")) {
            (Some(org_id), Some(access_token)) => Some(ZohoConfig {
                org_id,
                base_url: lookup("ZOHO_BASE_URL").unwrap_or_else(default_zoho_url),
                access_token,
            }),
            _ => None,
        };

        let cfg = Self {
            supabase_url: required("SUPABASE_URL")?,
            supabase_key: required("SUPABASE_KEY")?,
            agent: AgentIdentity::new(
                lookup("DESK_AGENT_ID").unwrap_or_default(),
                lookup("DESK_AGENT_NAME").unwrap_or_default(),
            ),
            page_size,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            zoho,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.supabase_key.trim().is_empty() {
            return Err(ConfigError::Missing("supabase_key"));
        }
        Url::parse(&self.supabase_url).map_err(|_| ConfigError::InvalidUrl(self.supabase_url.clone()))?;
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the default settings file path (~/.config/deskline/desk.json)
    pub fn default_config_path() -> Option<PathBuf> {
        config::config_path(config::DESK_FILE)
    }
}
