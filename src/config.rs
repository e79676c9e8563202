//! Sync configuration helpers.
//!
//! `sync.json` names the catalogue, the remote workspace, and the knobs of a
//! reconciliation pass. Every field has a default, so a missing file behaves
//! like an empty one; command-line flags override whatever is loaded here.
use crate::util::{read_json, write_json};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_PATH: &str = "sync.json";
pub const DEFAULT_CATALOG_PATH: &str = "data/catalog.json";
pub const DEFAULT_API_BASE: &str = "https://api.notion.com/v1";
pub const DEFAULT_TOKEN_ENV: &str = "NOTION_TOKEN";
pub const DEFAULT_SYNC_FIELD: &str = "sync";

/// Remote workspace settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotionConfig {
    /// URL of the page whose child databases are the sync tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    /// Environment variable holding the integration token.
    pub token_env: String,
    pub api_base: String,
    /// Retries after a rate-limited response before giving up.
    pub max_retries: u32,
    /// Wait used when a rate-limited response carries no `Retry-After`.
    pub default_retry_secs: u64,
    pub timeout_secs: u64,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            page_url: None,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_retries: 3,
            default_retry_secs: 1,
            timeout_secs: 30,
        }
    }
}

impl NotionConfig {
    pub fn default_retry(&self) -> Duration {
        Duration::from_secs(self.default_retry_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the integration token from the configured environment variable.
    pub fn token(&self) -> Result<String> {
        let token = std::env::var(&self.token_env)
            .with_context(|| format!("read token from ${}", self.token_env))?;
        if token.trim().is_empty() {
            return Err(anyhow!("${} is set but empty", self.token_env));
        }
        Ok(token.trim().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub schema_version: u32,
    pub catalog_path: PathBuf,
    pub notion: NotionConfig,
    /// Checkbox field gating which rows a pull reads.
    pub sync_field: String,
    /// Clear the gate on pulled rows once the catalogue is written.
    pub acknowledge: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        default_config()
    }
}

pub fn default_config() -> SyncConfig {
    SyncConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        catalog_path: PathBuf::from(DEFAULT_CATALOG_PATH),
        notion: NotionConfig::default(),
        sync_field: DEFAULT_SYNC_FIELD.to_string(),
        acknowledge: false,
    }
}

/// Config written by `rulesync init`: defaults plus a placeholder page URL.
pub fn config_stub() -> SyncConfig {
    let mut config = default_config();
    config.notion.page_url = Some("https://www.notion.so/<workspace>/<page-id>".to_string());
    config
}

/// Load `path`, or defaults when it does not exist and was not asked for
/// explicitly.
pub fn load_config(path: &Path, explicit: bool) -> Result<SyncConfig> {
    if !path.exists() {
        if explicit {
            return Err(anyhow!("config {} does not exist", path.display()));
        }
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(default_config());
    }
    let config: SyncConfig =
        read_json(path).with_context(|| format!("load config {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn write_config(path: &Path, config: &SyncConfig) -> Result<()> {
    write_json(path, config)
}

pub fn validate_config(config: &SyncConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported sync config schema_version {}",
            config.schema_version
        ));
    }
    if config.catalog_path.as_os_str().is_empty() {
        return Err(anyhow!("catalog_path must be non-empty"));
    }
    if config.sync_field.trim().is_empty() {
        return Err(anyhow!("sync_field must be non-empty"));
    }
    if config.notion.token_env.trim().is_empty() {
        return Err(anyhow!("notion.token_env must be non-empty"));
    }
    let base = config.notion.api_base.trim();
    if !(base.starts_with("https://") || base.starts_with("http://")) {
        return Err(anyhow!(
            "notion.api_base must be an http(s) URL (got {base:?})"
        ));
    }
    if config.notion.timeout_secs == 0 {
        return Err(anyhow!("notion.timeout_secs must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_round_trips_through_validation() {
        let stub = serde_json::to_string_pretty(&config_stub()).expect("serialize stub");
        let config: SyncConfig = serde_json::from_str(&stub).expect("parse stub");
        validate_config(&config).expect("stub is valid");
        assert_eq!(config.notion.max_retries, 3);
        assert_eq!(config.sync_field, "sync");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"schema_version": 1, "acknowledge": true}"#)
                .expect("parse partial");
        assert!(config.acknowledge);
        assert_eq!(config.notion.token_env, DEFAULT_TOKEN_ENV);
        assert_eq!(config.catalog_path, PathBuf::from(DEFAULT_CATALOG_PATH));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = default_config();
        config.schema_version = 2;
        assert!(validate_config(&config).is_err());

        let mut config = default_config();
        config.sync_field = " ".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = default_config();
        config.notion.api_base = "api.notion.com".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn missing_file_uses_defaults_unless_explicit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sync.json");
        assert_eq!(load_config(&path, false).expect("defaults"), default_config());
        assert!(load_config(&path, true).is_err());

        write_config(&path, &default_config()).expect("write config");
        assert_eq!(load_config(&path, true).expect("load"), default_config());
    }
}
