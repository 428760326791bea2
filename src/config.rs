//! Configuration loading and defaults for the codewizard server.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::docs::DEFAULT_DOCS_URL;
use crate::models::DEFAULT_MODEL;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CHAT_BASE_URL: &str = "https://api.groq.com/openai/v1";
/// Per-request timeout for both remote collaborators.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

// === Types ===

/// Server configuration. Every field is optional in the file; accessors
/// apply defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub chat_base_url: Option<String>,
    pub docs_url: Option<String>,
    pub default_model: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load from `path`, `CODEWIZARD_CONFIG_PATH` or `~/.codewizard/config.toml`,
    /// in that order. A missing file yields defaults. Environment overrides are
    /// applied before validation.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match resolve_load_config_path(path) {
            Some(path) if path.exists() => load_config_file(&path)?,
            _ => Config::default(),
        };
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(host) = self.host.as_deref()
            && host.trim().is_empty()
        {
            anyhow::bail!("host cannot be empty");
        }
        if self.port == Some(0) {
            anyhow::bail!("port must be between 1 and 65535");
        }
        if self.request_timeout_secs == Some(0) {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        validate_url("chat_base_url", &self.chat_base_url())?;
        validate_url("docs_url", &self.docs_url())?;
        if self.default_model().trim().is_empty() {
            anyhow::bail!("default_model cannot be empty");
        }
        Ok(())
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Socket address to bind, resolved from `host` and `port`.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host(), self.port())
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host(), self.port()))
    }

    /// Chat-completions base URL without a trailing slash.
    pub fn chat_base_url(&self) -> String {
        normalize_base_url(self.chat_base_url.as_deref().unwrap_or(DEFAULT_CHAT_BASE_URL))
    }

    pub fn docs_url(&self) -> String {
        self.docs_url
            .as_deref()
            .map_or_else(|| DEFAULT_DOCS_URL.to_string(), |url| url.trim().to_string())
    }

    pub fn default_model(&self) -> &str {
        self.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins.clone().unwrap_or_else(|| {
            DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|origin| (*origin).to_string())
                .collect()
        })
    }
}

// === Paths ===

fn home_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".codewizard").join("config.toml"))
}

fn env_config_path() -> Option<PathBuf> {
    let path = std::env::var("CODEWIZARD_CONFIG_PATH").ok()?;
    let trimmed = path.trim();
    (!trimmed.is_empty()).then(|| expand_path(trimmed))
}

fn resolve_load_config_path(path: Option<PathBuf>) -> Option<PathBuf> {
    match path {
        Some(path) => Some(expand_pathbuf(path)),
        None => env_config_path().or_else(home_config_path),
    }
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(raw) => expand_path(raw),
        None => path,
    }
}

fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

// === Loading ===

fn load_config_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(value) = var("CODEWIZARD_HOST") {
        config.host = Some(value);
    }
    if let Some(value) = var("CODEWIZARD_PORT") {
        match value.trim().parse() {
            Ok(port) => config.port = Some(port),
            Err(_) => tracing::warn!(%value, "Ignoring invalid CODEWIZARD_PORT"),
        }
    }
    if let Some(value) = var("GROQ_BASE_URL") {
        config.chat_base_url = Some(value);
    }
    if let Some(value) = var("CONTEXT7_URL") {
        config.docs_url = Some(value);
    }
    if let Some(value) = var("CODEWIZARD_MODEL") {
        config.default_model = Some(value);
    }
    if let Some(value) = var("CODEWIZARD_REQUEST_TIMEOUT_SECS") {
        match value.trim().parse() {
            Ok(secs) => config.request_timeout_secs = Some(secs),
            Err(_) => tracing::warn!(%value, "Ignoring invalid CODEWIZARD_REQUEST_TIMEOUT_SECS"),
        }
    }
}

fn normalize_base_url(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}

fn validate_url(field: &str, url: &str) -> Result<()> {
    if url.is_empty() {
        anyhow::bail!("{field} cannot be empty");
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!("Invalid {field} '{url}': expected an http:// or https:// URL");
    }
    Ok(())
}
