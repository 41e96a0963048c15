// crates/redix-config/src/config.rs
// ============================================================================
// Module: Redix Configuration
// Description: Configuration loading and validation for the gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: redix-client, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is resolved in this order:
//!
//! 1. An explicit path (the CLI `--config` flag).
//! 2. The `REDIX_MCP_CONFIG` environment variable.
//! 3. `redix-mcp.toml` in the working directory, when it exists.
//! 4. Built-in defaults.
//!
//! Environment overrides (`REDIX_API_BASE`, `REDIX_API_KEY`,
//! `REQUEST_TIMEOUT`, `REDIX_SUBMISSION_METHOD`) are applied after the file
//! and before validation. Environment access goes through a lookup function
//! so tests never mutate process state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use redix_client::DEFAULT_MAX_ERROR_DETAIL_CHARS;
use redix_client::DEFAULT_SUBMISSION_METHOD;
use redix_client::EngineClientConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "redix-mcp.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "REDIX_MCP_CONFIG";
/// Environment variable overriding the engine base URL.
pub const API_BASE_ENV_VAR: &str = "REDIX_API_BASE";
/// Environment variable overriding the engine API key.
pub const API_KEY_ENV_VAR: &str = "REDIX_API_KEY";
/// Environment variable overriding the request timeout, in seconds.
pub const TIMEOUT_ENV_VAR: &str = "REQUEST_TIMEOUT";
/// Environment variable overriding the submission channel.
pub const SUBMISSION_METHOD_ENV_VAR: &str = "REDIX_SUBMISSION_METHOD";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default engine base URL.
const DEFAULT_BASE_URL: &str = "http://localhost:8080";
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Maximum request timeout in seconds.
const MAX_TIMEOUT_SECS: u64 = 3600;
/// Default maximum MCP request body size.
const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
/// Hard ceiling for the MCP request body size.
const MAX_BODY_BYTES_LIMIT: usize = 64 * 1024 * 1024;
/// Hard ceiling for retained upstream error detail.
const MAX_ERROR_DETAIL_LIMIT: usize = 100_000;

// ============================================================================
// SECTION: Config Root
// ============================================================================

/// Gateway configuration root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedixConfig {
    /// Engine connection settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// MCP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Audit sink settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl RedixConfig {
    /// Loads configuration using the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |name| env::var(name).ok())
    }

    /// Loads configuration with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path is rejected, the file cannot be
    /// read or parsed, or the resulting configuration is invalid.
    pub fn load_with_env(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path, &lookup)? {
            Some(resolved) => Self::read_file(&resolved)?,
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration text without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a config file under the size and encoding guards.
    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies environment overrides on top of file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `REQUEST_TIMEOUT` is not an integer.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(base_url) = lookup(API_BASE_ENV_VAR).filter(|value| !value.trim().is_empty()) {
            self.engine.base_url = base_url.trim().to_string();
        }
        if let Some(api_key) = lookup(API_KEY_ENV_VAR) {
            self.engine.api_key = Some(api_key);
        }
        if let Some(timeout) = lookup(TIMEOUT_ENV_VAR).filter(|value| !value.trim().is_empty()) {
            self.engine.timeout_secs = timeout.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{TIMEOUT_ENV_VAR} must be a whole number of seconds"))
            })?;
        }
        if let Some(method) =
            lookup(SUBMISSION_METHOD_ENV_VAR).filter(|value| !value.trim().is_empty())
        {
            self.engine.submission_method = method.trim().to_string();
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.server.validate()?;
        self.audit.validate()
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Engine connection settings.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Optional API key; blank means none.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Submission channel reported to the engine.
    #[serde(default = "default_submission_method")]
    pub submission_method: String,
    /// Maximum characters of upstream error detail retained.
    #[serde(default = "default_max_error_detail_chars")]
    pub max_error_detail_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            submission_method: default_submission_method(),
            max_error_detail_chars: DEFAULT_MAX_ERROR_DETAIL_CHARS,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("submission_method", &self.submission_method)
            .field("max_error_detail_chars", &self.max_error_detail_chars)
            .finish()
    }
}

impl EngineConfig {
    /// Validates engine settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::Invalid("engine.base_url must be non-empty".to_string()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(
                "engine.base_url must use http or https".to_string(),
            ));
        }
        if !(1 ..= MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "engine.timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            )));
        }
        let method = self.submission_method.trim();
        if method.is_empty() || !method.bytes().all(|byte| byte.is_ascii_graphic()) {
            return Err(ConfigError::Invalid(
                "engine.submission_method must be non-empty printable ascii".to_string(),
            ));
        }
        if self.max_error_detail_chars == 0 || self.max_error_detail_chars > MAX_ERROR_DETAIL_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "engine.max_error_detail_chars must be between 1 and {MAX_ERROR_DETAIL_LIMIT}"
            )));
        }
        if let Some(key) = &self.api_key
            && key.chars().any(char::is_control)
        {
            return Err(ConfigError::Invalid(
                "engine.api_key must not contain control characters".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the API key when one is set and non-blank.
    #[must_use]
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|key| !key.is_empty())
    }

    /// Builds the HTTP client settings.
    #[must_use]
    pub fn client_config(&self) -> EngineClientConfig {
        EngineClientConfig {
            base_url: self.base_url.trim().trim_end_matches('/').to_string(),
            api_key: self.effective_api_key().map(str::to_string),
            timeout: Duration::from_secs(self.timeout_secs),
            submission_method: self.submission_method.trim().to_string(),
            max_error_detail_chars: self.max_error_detail_chars,
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// MCP transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerTransport {
    /// Use stdin/stdout transport.
    #[default]
    Stdio,
    /// Use HTTP JSON-RPC transport.
    Http,
}

/// MCP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Transport type for MCP.
    #[serde(default)]
    pub transport: ServerTransport,
    /// Bind address for the HTTP transport.
    #[serde(default)]
    pub bind: Option<String>,
    /// Allow binding the HTTP transport to a non-loopback address.
    #[serde(default)]
    pub allow_non_loopback: bool,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: ServerTransport::default(),
            bind: None,
            allow_non_loopback: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Validates server transport configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        if self.transport == ServerTransport::Http {
            let addr = self.bind_addr()?;
            if !addr.ip().is_loopback() && !self.allow_non_loopback {
                return Err(ConfigError::Invalid(
                    "server.bind must be loopback unless allow_non_loopback is set".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the bind address is missing or
    /// malformed.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or_default().trim();
        if bind.is_empty() {
            return Err(ConfigError::Invalid("http transport requires server.bind".to_string()));
        }
        bind.parse().map_err(|_| ConfigError::Invalid("invalid server.bind address".to_string()))
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    None,
}

/// Audit sink settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, self.path.as_deref()) {
            (AuditSinkKind::File, Some(path)) => validate_path_string("audit.path", path),
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires audit.path".to_string()))
            }
            (_, Some(path)) => validate_path_string("audit.path", path),
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path; `None` means use defaults.
fn resolve_path(
    path: Option<&Path>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    if let Some(env_path) = lookup(CONFIG_ENV_VAR).filter(|value| !value.trim().is_empty()) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(Some(PathBuf::from(env_path)));
    }
    let default_path = PathBuf::from(DEFAULT_CONFIG_NAME);
    Ok(default_path.is_file().then_some(default_path))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default engine base URL.
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Default request timeout.
const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Default submission channel.
fn default_submission_method() -> String {
    DEFAULT_SUBMISSION_METHOD.to_string()
}

/// Default error detail cap.
const fn default_max_error_detail_chars() -> usize {
    DEFAULT_MAX_ERROR_DETAIL_CHARS
}

/// Default MCP body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}
