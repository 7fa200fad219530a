// crates/recordsync-config/src/config.rs
// ============================================================================
// Module: recordsync Configuration
// Description: Configuration loading and validation for recordsync.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: recordsync-core, recordsync-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. The validated model yields
//! the pieces the engine is built from: [`EngineConfig`], [`StoreRules`],
//! per-type [`EntitySchema`] values, the `SQLite` store settings, and the
//! audit sink.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use recordsync_core::AuditSink;
use recordsync_core::DEFAULT_MAX_BATCH_SIZE;
use recordsync_core::DuplicateKeyPolicy;
use recordsync_core::EngineConfig;
use recordsync_core::EntitySchema;
use recordsync_core::FileAuditSink;
use recordsync_core::IntraBatchPolicy;
use recordsync_core::NoopAuditSink;
use recordsync_core::StderrAuditSink;
use recordsync_core::StoreRules;
use recordsync_store_sqlite::SqliteStoreConfig;
use recordsync_store_sqlite::SqliteStoreMode;
use recordsync_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "recordsync.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "RECORDSYNC_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound accepted for `reconcile.max_batch_size`.
pub const MAX_BATCH_SIZE_LIMIT: usize = 10_000;
/// Maximum number of configured entity types.
const MAX_ENTITIES: usize = 256;
/// Maximum length of an entity type or field name.
const MAX_NAME_LENGTH: usize = 128;
/// Default busy timeout for the `SQLite` store (ms).
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// recordsync configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordSyncConfig {
    /// Record store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Reconciliation policy configuration.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Entity type declarations.
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

impl RecordSyncConfig {
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
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
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
        self.reconcile.validate()?;
        self.audit.validate()?;
        if self.entities.len() > MAX_ENTITIES {
            return Err(ConfigError::Invalid(format!(
                "too many entities: {} (max {MAX_ENTITIES})",
                self.entities.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for entity in &self.entities {
            entity.validate()?;
            if !seen.insert(entity.entity_type.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "entity {} declared more than once",
                    entity.entity_type
                )));
            }
        }
        Ok(())
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn engine_config(&self) -> EngineConfig {
        self.reconcile.engine_config()
    }

    /// Returns the natural-key schema of a declared entity type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the entity type is not declared.
    pub fn schema(&self, entity_type: &str) -> Result<EntitySchema, ConfigError> {
        self.entity(entity_type).map(EntityConfig::schema)
    }

    /// Returns the declaration of an entity type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the entity type is not declared.
    pub fn entity(&self, entity_type: &str) -> Result<&EntityConfig, ConfigError> {
        self.entities
            .iter()
            .find(|entity| entity.entity_type == entity_type)
            .ok_or_else(|| ConfigError::Invalid(format!("entity {entity_type} is not declared")))
    }

    /// Builds the store rules declared across all entities.
    #[must_use]
    pub fn store_rules(&self) -> StoreRules {
        self.entities.iter().fold(StoreRules::new(), |rules, entity| {
            let rules = if entity.required_fields.is_empty() {
                rules
            } else {
                rules.require(entity.entity_type.as_str(), entity.required_fields.iter().cloned())
            };
            if entity.read_only { rules.read_only(entity.entity_type.as_str()) } else { rules }
        })
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Record store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Record store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
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
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
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
                validate_path_string("store.path", &path.to_string_lossy())
            }
        }
    }

    /// Returns the `SQLite` store settings for the sqlite backend.
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

/// Returns the default busy timeout for the `SQLite` store.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Reconcile
// ============================================================================

/// Reconciliation policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReconcileConfig {
    /// Handling of duplicate natural keys returned by a store read.
    #[serde(default)]
    pub duplicate_keys: DuplicateKeyPolicy,
    /// Handling of duplicate natural keys within one desired batch.
    #[serde(default)]
    pub intra_batch: IntraBatchPolicy,
    /// Maximum desired entities per batch call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            duplicate_keys: DuplicateKeyPolicy::default(),
            intra_batch: IntraBatchPolicy::default(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl ReconcileConfig {
    /// Validates reconcile configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_SIZE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "reconcile.max_batch_size must be between 1 and {MAX_BATCH_SIZE_LIMIT}"
            )));
        }
        Ok(())
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            duplicate_keys: self.duplicate_keys,
            intra_batch: self.intra_batch,
            max_batch_size: self.max_batch_size,
        }
    }
}

/// Returns the default maximum batch size.
const fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Audit events are discarded.
    #[serde(rename = "none")]
    Disabled,
}

/// Audit sink configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuditConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }

    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit file cannot be opened.
    pub fn build_sink(&self) -> Result<Arc<dyn AuditSink>, ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
            (AuditSinkType::Disabled, _) => Ok(Arc::new(NoopAuditSink)),
            (AuditSinkType::File, Some(path)) => {
                let sink =
                    FileAuditSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Entities
// ============================================================================

/// Entity type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityConfig {
    /// Entity type name.
    pub entity_type: String,
    /// Field holding the natural key.
    pub key_field: String,
    /// Fields the store requires on every write.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Rejects every write verb when set.
    #[serde(default)]
    pub read_only: bool,
}

impl EntityConfig {
    /// Validates an entity declaration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_name("entities.entity_type", &self.entity_type)?;
        validate_name("entities.key_field", &self.key_field)?;
        for field in &self.required_fields {
            validate_name("entities.required_fields", field)?;
        }
        Ok(())
    }

    /// Returns the natural-key schema.
    #[must_use]
    pub fn schema(&self) -> EntitySchema {
        EntitySchema::new(self.entity_type.as_str(), self.key_field.as_str())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
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

/// Resolves the config path from CLI or environment defaults.
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

/// Validates the resolved path against length limits.
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

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an entity type or field name.
fn validate_name(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value.len() > MAX_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "{field} must be 1 to {MAX_NAME_LENGTH} characters"
        )));
    }
    if !value.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(ConfigError::Invalid(format!(
            "{field} must contain only letters, digits, and underscores: {value}"
        )));
    }
    Ok(())
}
