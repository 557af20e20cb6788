// crates/counter-reports-config/src/config.rs
// ============================================================================
// Module: COUNTER Reports Configuration
// Description: Configuration loading and validation for COUNTER reports.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: counter-reports-core, counter-reports-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section is optional and falls back to the engine defaults; values
//! that are present are range-checked before any engine is built from them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use counter_reports_core::AggregationConfig;
use counter_reports_core::DEFAULT_MAX_BATCH_TITLES;
use counter_reports_core::DEFAULT_MAX_PROBE_ATTEMPTS;
use counter_reports_core::IdentityResolver;
use counter_reports_core::MAX_REPORT_MONTHS;
use counter_reports_core::PeriodError;
use counter_reports_core::ReportKind;
use counter_reports_core::ReportRequest;
use counter_reports_core::Sha256TitleHasher;
use counter_reports_core::UsageStore;
use counter_reports_store_sqlite::SqliteStoreConfig;
use counter_reports_store_sqlite::SqliteStoreMode;
use counter_reports_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;
use time::Date;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "counter-reports.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "COUNTER_REPORTS_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum titles per aggregation batch.
pub(crate) const MAX_BATCH_TITLES_LIMIT: usize = 10_000;
/// Maximum identity probe attempts.
pub(crate) const MAX_PROBE_ATTEMPTS_LIMIT: u32 = 1_000_000;
/// Default store busy timeout in milliseconds.
pub(crate) const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum store busy timeout in milliseconds.
pub(crate) const MAX_STORE_BUSY_TIMEOUT_MS: u64 = 600_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// COUNTER reports configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CounterReportsConfig {
    /// Usage store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Aggregation pipeline configuration.
    #[serde(default)]
    pub aggregation: AggregationSettings,
    /// Title identity configuration.
    #[serde(default)]
    pub identity: IdentitySettings,
    /// Report defaults.
    #[serde(default)]
    pub reports: ReportSettings,
}

impl CounterReportsConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
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

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.aggregation.validate()?;
        self.identity.validate()?;
        self.reports.validate()?;
        Ok(())
    }

    /// Returns the aggregation pipeline configuration.
    #[must_use]
    pub const fn aggregation_config(&self) -> AggregationConfig {
        AggregationConfig {
            max_batch_titles: self.aggregation.max_batch_titles,
        }
    }

    /// Builds an identity resolver over `store` with the configured probe
    /// bound.
    #[must_use]
    pub const fn identity_resolver<S: UsageStore>(&self, store: S) -> IdentityResolver<S> {
        IdentityResolver::with_hasher(store, Sha256TitleHasher, self.identity.max_probe_attempts)
    }

    /// Builds a request for the configured trailing report period ending with
    /// the month before `today`.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError`] when the period falls outside supported dates.
    pub fn trailing_report_request(
        &self,
        kind: ReportKind,
        today: Date,
    ) -> Result<ReportRequest, PeriodError> {
        ReportRequest::trailing(kind, today, self.reports.default_period_months)
    }
}

/// Usage store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates usage store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.busy_timeout_ms > MAX_STORE_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "store busy_timeout_ms must be at most {MAX_STORE_BUSY_TIMEOUT_MS}"
            )));
        }
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_store_path(path)
            }
        }
    }

    /// Returns the `SQLite` store configuration when the sqlite backend is
    /// selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }
}

/// Usage store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use `SQLite`-backed durable store.
    Sqlite,
}

/// Aggregation pipeline settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AggregationSettings {
    /// Maximum titles per committed batch.
    #[serde(default = "default_max_batch_titles")]
    pub max_batch_titles: usize,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            max_batch_titles: default_max_batch_titles(),
        }
    }
}

impl AggregationSettings {
    /// Validates aggregation settings.
    fn validate(self) -> Result<(), ConfigError> {
        if self.max_batch_titles == 0 || self.max_batch_titles > MAX_BATCH_TITLES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "aggregation max_batch_titles must be between 1 and {MAX_BATCH_TITLES_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Title identity settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IdentitySettings {
    /// Maximum candidate identities probed before giving up.
    #[serde(default = "default_max_probe_attempts")]
    pub max_probe_attempts: u32,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            max_probe_attempts: default_max_probe_attempts(),
        }
    }
}

impl IdentitySettings {
    /// Validates identity settings.
    fn validate(self) -> Result<(), ConfigError> {
        if self.max_probe_attempts == 0 || self.max_probe_attempts > MAX_PROBE_ATTEMPTS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "identity max_probe_attempts must be between 1 and {MAX_PROBE_ATTEMPTS_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Report defaults.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReportSettings {
    /// Length of the default trailing report period in months.
    #[serde(default = "default_period_months")]
    pub default_period_months: u8,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            default_period_months: default_period_months(),
        }
    }
}

impl ReportSettings {
    /// Validates report settings.
    fn validate(self) -> Result<(), ConfigError> {
        if self.default_period_months == 0 || self.default_period_months > MAX_REPORT_MONTHS {
            return Err(ConfigError::Invalid(format!(
                "reports default_period_months must be between 1 and {MAX_REPORT_MONTHS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default store busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Returns the default aggregation batch size.
const fn default_max_batch_titles() -> usize {
    DEFAULT_MAX_BATCH_TITLES
}

/// Returns the default identity probe bound.
const fn default_max_probe_attempts() -> u32 {
    DEFAULT_MAX_PROBE_ATTEMPTS
}

/// Returns the default trailing report length.
const fn default_period_months() -> u8 {
    MAX_REPORT_MONTHS
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

/// Resolves the config path from caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
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

/// Validates the store database path.
fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid("store path must be non-empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("store path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("store path component too long".to_string()));
        }
    }
    Ok(())
}
