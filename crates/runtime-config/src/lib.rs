//! Client configuration types.
//!
//! The HTTP client, the session and the list views all read `propdesk.toml`
//! through these types. Every field has a default, so an empty or missing
//! file yields a working configuration against a local backend.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "propdesk.toml";

/// Top-level client configuration (persisted as `propdesk.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub listing: ListingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Token refresh endpoint, relative to the API prefix. Empty disables refresh.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            api_prefix: default_api_prefix(),
            refresh_path: default_refresh_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerSettings {
    /// Absolute URL of an API path such as `/property`.
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.url.trim_end_matches('/'),
            self.api_prefix.trim_end_matches('/'),
            path
        )
    }

    /// Absolute refresh endpoint, or `None` when refresh is disabled.
    pub fn refresh_url(&self) -> Option<String> {
        let path = self.refresh_path.trim();
        if path.is_empty() {
            return None;
        }
        if path.starts_with("http://") || path.starts_with("https://") {
            return Some(path.to_string());
        }
        Some(self.api_url(path))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    /// Session-storage key the bearer token lives under.
    #[serde(default = "default_token_key")]
    pub token_key: String,
    /// Session-storage key of the path to restore after login.
    #[serde(default = "default_last_path_key")]
    pub last_path_key: String,
    /// Refresh the token this many seconds before it expires.
    #[serde(default = "default_skew_secs")]
    pub skew_secs: i64,
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            token_key: default_token_key(),
            last_path_key: default_last_path_key(),
            skew_secs: default_skew_secs(),
            login_path: default_login_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingSettings {
    #[serde(default = "default_id_key")]
    pub id_key: String,
    #[serde(default = "default_attachment_key")]
    pub attachment_key: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            id_key: default_id_key(),
            attachment_key: default_attachment_key(),
            page_size: default_page_size(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw).context("Failed to parse client config")?;
        apply_compat_fallbacks(&mut config);
        Ok(config)
    }
}

/// Load the config at `path`, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    ClientConfig::from_toml_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_server_url() -> String {
    "http://localhost:5000".to_string()
}
fn default_api_prefix() -> String {
    "/api".to_string()
}
fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_token_key() -> String {
    "token".to_string()
}
fn default_last_path_key() -> String {
    "lastPath".to_string()
}
fn default_skew_secs() -> i64 {
    60
}
fn default_login_path() -> String {
    "/login".to_string()
}
fn default_id_key() -> String {
    "idProperty".to_string()
}
fn default_attachment_key() -> String {
    "image".to_string()
}
fn default_page_size() -> u32 {
    10
}

/// Repair values that deserialize but cannot be used as-is.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut ClientConfig) -> bool {
    let mut changed = false;

    let prefix = config.server.api_prefix.trim().trim_end_matches('/');
    if !prefix.is_empty() && !prefix.starts_with('/') {
        config.server.api_prefix = format!("/{prefix}");
        changed = true;
    }
    if config.server.timeout_secs == 0 {
        config.server.timeout_secs = default_timeout_secs();
        changed = true;
    }
    if config.session.token_key.trim().is_empty() {
        config.session.token_key = default_token_key();
        changed = true;
    }
    if config.session.skew_secs < 0 {
        config.session.skew_secs = 0;
        changed = true;
    }
    if config.listing.id_key.trim().is_empty() {
        config.listing.id_key = default_id_key();
        changed = true;
    }
    if config.listing.page_size == 0 {
        config.listing.page_size = default_page_size();
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = ClientConfig::from_toml_str("").expect("parse empty config");
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.server.timeout_secs, 15);
        assert_eq!(cfg.session.skew_secs, 60);
        assert_eq!(cfg.listing.id_key, "idProperty");
    }

    #[test]
    fn urls_are_joined_without_double_slashes() {
        let cfg = ClientConfig::from_toml_str(
            r#"
[server]
url = "https://listings.example.com/"
api_prefix = "api/"
"#,
        )
        .expect("parse server config");

        assert_eq!(cfg.server.api_prefix, "/api");
        assert_eq!(
            cfg.server.api_url("/property"),
            "https://listings.example.com/api/property"
        );
        assert_eq!(
            cfg.server.refresh_url().as_deref(),
            Some("https://listings.example.com/api/auth/refresh")
        );
    }

    #[test]
    fn empty_refresh_path_disables_refresh() {
        let cfg = ClientConfig::from_toml_str(
            r#"
[server]
refresh_path = ""
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.server.refresh_url(), None);
    }

    #[test]
    fn compat_fallbacks_repair_unusable_values() {
        let mut cfg = ClientConfig::default();
        cfg.server.timeout_secs = 0;
        cfg.session.skew_secs = -5;
        cfg.listing.page_size = 0;
        cfg.listing.id_key = " ".to_string();

        assert!(apply_compat_fallbacks(&mut cfg));
        assert_eq!(cfg.server.timeout_secs, 15);
        assert_eq!(cfg.session.skew_secs, 0);
        assert_eq!(cfg.listing.page_size, 10);
        assert_eq!(cfg.listing.id_key, "idProperty");
        assert!(!apply_compat_fallbacks(&mut cfg));
    }

    #[test]
    fn load_config_reads_file_or_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert_eq!(load_config(&path).expect("missing file"), ClientConfig::default());

        std::fs::write(
            &path,
            r#"
[session]
skew_secs = 120
login_path = "/auth/login"

[listing]
page_size = 25
"#,
        )
        .expect("write config");
        let cfg = load_config(&path).expect("load config");
        assert_eq!(cfg.session.skew_secs, 120);
        assert_eq!(cfg.session.login_path, "/auth/login");
        assert_eq!(cfg.listing.page_size, 25);
        assert_eq!(cfg.session.token_key, "token");
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[server\nurl = 1").expect("write config");
        let err = load_config(&path).expect_err("invalid config should fail");
        assert!(format!("{err:#}").contains(CONFIG_FILE_NAME));
    }
}
