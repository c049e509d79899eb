use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use actum_audit::{MAX_QUERY_LIMIT, MIN_SECRET_BYTES};
use actum_core::PolicyVersion;
use actum_policy::{DEFAULT_MAX_IMAGE_BYTES, DEFAULT_MAX_INPUT_BYTES};

use crate::error::{RootError, RootResult};

/// Environment variable that overrides `audit.hmac_secret`.
pub const HMAC_SECRET_ENV: &str = "ACTUM_HMAC_SECRET";

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Policy pack source and input limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyConfig {
    /// JSON pack document. The built-in EU AI Act pack is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_file: Option<PathBuf>,

    /// Pack to activate at startup, overriding the document's `is_active`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_version: Option<PolicyVersion>,

    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,

    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

fn default_max_input_bytes() -> usize {
    DEFAULT_MAX_INPUT_BYTES
}

fn default_max_image_bytes() -> usize {
    DEFAULT_MAX_IMAGE_BYTES
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            pack_file: None,
            active_version: None,
            max_input_bytes: default_max_input_bytes(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

/// Where committed audit events live.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// SQLite file at `audit.database_path`.
    #[default]
    Sqlite,
    /// Process memory. Everything is lost on exit.
    Memory,
}

/// Audit trail configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditConfig {
    #[serde(default)]
    pub store: StoreKind,

    /// Defaults to `<data_dir>/audit.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// HMAC key for the chain. `ACTUM_HMAC_SECRET` takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac_secret: Option<String>,

    #[serde(default = "default_query_limit")]
    pub default_query_limit: usize,

    #[serde(default = "default_max_query_limit")]
    pub max_query_limit: usize,

    #[serde(default = "default_writer_queue_depth")]
    pub writer_queue_depth: usize,
}

fn default_query_limit() -> usize {
    actum_audit::DEFAULT_QUERY_LIMIT
}

fn default_max_query_limit() -> usize {
    MAX_QUERY_LIMIT
}

fn default_writer_queue_depth() -> usize {
    actum_audit::DEFAULT_QUEUE_DEPTH
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            database_path: None,
            hmac_secret: None,
            default_query_limit: default_query_limit(),
            max_query_limit: default_max_query_limit(),
            writer_queue_depth: default_writer_queue_depth(),
        }
    }
}

impl std::fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditConfig")
            .field("store", &self.store)
            .field("database_path", &self.database_path)
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "<redacted>"))
            .field("default_query_limit", &self.default_query_limit)
            .field("max_query_limit", &self.max_query_limit)
            .field("writer_queue_depth", &self.writer_queue_depth)
            .finish()
    }
}

/// Top-level configuration for the Actum service and CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

fn default_data_dir() -> PathBuf {
    dirs_or_default(".actum")
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            policy: PolicyConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl RootConfig {
    /// Load configuration from a TOML file, or return defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(RootError::Io)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RootError::Io)?;
        }
        std::fs::write(path, contents).map_err(RootError::Io)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> RootResult<()> {
        if self.server.bind.trim().is_empty() {
            return Err(RootError::Config("server.bind must not be empty".into()));
        }
        if self.policy.max_input_bytes == 0 {
            return Err(RootError::Config("max_input_bytes must be > 0".into()));
        }
        if self.policy.max_image_bytes == 0 {
            return Err(RootError::Config("max_image_bytes must be > 0".into()));
        }
        let audit = &self.audit;
        if audit.max_query_limit == 0 {
            return Err(RootError::Config("max_query_limit must be > 0".into()));
        }
        if audit.default_query_limit == 0 || audit.default_query_limit > audit.max_query_limit {
            return Err(RootError::Config(format!(
                "default_query_limit must be between 1 and {}, got {}",
                audit.max_query_limit, audit.default_query_limit
            )));
        }
        if audit.writer_queue_depth == 0 {
            return Err(RootError::Config("writer_queue_depth must be > 0".into()));
        }
        if let Some(secret) = &audit.hmac_secret {
            check_secret_len(secret)?;
        }
        Ok(())
    }

    /// Path of the SQLite audit database.
    pub fn database_path(&self) -> PathBuf {
        self.audit
            .database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("audit.db"))
    }

    /// The chain secret, from `ACTUM_HMAC_SECRET` or the config file.
    pub fn hmac_secret(&self) -> RootResult<Zeroizing<String>> {
        self.resolve_secret(std::env::var(HMAC_SECRET_ENV).ok())
    }

    /// The chain secret given the value of `ACTUM_HMAC_SECRET`, if any.
    pub(crate) fn resolve_secret(&self, from_env: Option<String>) -> RootResult<Zeroizing<String>> {
        let secret = from_env
            .filter(|s| !s.is_empty())
            .or_else(|| self.audit.hmac_secret.clone())
            .map(Zeroizing::new)
            .ok_or_else(|| {
                RootError::Config(format!(
                    "no audit HMAC secret: set audit.hmac_secret or {}",
                    HMAC_SECRET_ENV
                ))
            })?;
        check_secret_len(&secret)?;
        Ok(secret)
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".actum/config.toml")
    }
}

fn check_secret_len(secret: &str) -> RootResult<()> {
    if secret.len() < MIN_SECRET_BYTES {
        return Err(RootError::Config(format!(
            "hmac_secret must be at least {} bytes",
            MIN_SECRET_BYTES
        )));
    }
    Ok(())
}
