// crates/recordsync-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Record Store
// Description: Durable StoreGateway backed by SQLite WAL.
// Purpose: Persist records as JSON field maps with transactional batch writes.
// Dependencies: recordsync-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`StoreGateway`] using `SQLite`. Records
//! live in one `records` table keyed by an autoincrement identifier, with the
//! field map stored as a JSON object. Filtered reads narrow rows with
//! `json_extract` and then apply the exact [`RecordQuery`] match, so results
//! agree with the in-memory store. Each write verb commits in one transaction;
//! identifiers are written back to the caller only after the commit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use recordsync_core::EntityType;
use recordsync_core::FieldMap;
use recordsync_core::QueryField;
use recordsync_core::Record;
use recordsync_core::RecordId;
use recordsync_core::RecordQuery;
use recordsync_core::StoreError;
use recordsync_core::StoreGateway;
use recordsync_core::StoreRules;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum field name length accepted in filters.
const MAX_FIELD_NAME_LENGTH: usize = 128;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Journal mode applied when the store opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// Write-ahead log.
    #[default]
    Wal,
    /// Rollback journal deleted after each transaction.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `journal_mode` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `synchronous` level applied when the store opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Sync on every commit.
    #[default]
    Full,
    /// Sync at WAL checkpoints only.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `synchronous` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` record store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw field payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored row could not be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store configuration or data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Invalid(message) => Self::Validation(message),
            SqliteStoreError::Db(message)
            | SqliteStoreError::Corrupt(message)
            | SqliteStoreError::VersionMismatch(message) => Self::Store(message),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

/// Maps a `rusqlite` error into a gateway error.
fn db_error(error: rusqlite::Error) -> StoreError {
    SqliteStoreError::from(error).into()
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed record store with WAL support.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - A failed write verb rolls back its whole batch.
#[derive(Clone)]
pub struct SqliteRecordStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
    /// Write validation rules.
    rules: StoreRules,
}

impl SqliteRecordStore {
    /// Opens an `SQLite`-backed record store that accepts every write.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        prepare_path(&config.path)?;
        let mut connection = connect(&config)?;
        migrate(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
            rules: StoreRules::default(),
        })
    }

    /// Replaces the write validation rules.
    #[must_use]
    pub fn with_rules(mut self, rules: StoreRules) -> Self {
        self.rules = rules;
        self
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite mutex poisoned".to_string()).into())
    }

    /// Runs `apply` inside one transaction and commits on success.
    fn write<T, F>(&self, apply: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>, i64) -> Result<T, StoreError>,
    {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        let value = apply(&tx, unix_millis())?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(value)
    }
}

impl StoreGateway for SqliteRecordStore {
    fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let (column, values) = match &query.field {
            QueryField::Id => ("id".to_string(), id_params(&query.values)),
            QueryField::Field(name) => {
                validate_field_name(name)?;
                (format!("json_extract(fields_json, '$.{name}')"), field_params(&query.values))
            }
        };
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders =
            (2 ..= values.len() + 1).map(|n| format!("?{n}")).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT id, fields_json FROM records WHERE entity_type = ?1 AND {column} IN \
             ({placeholders}) ORDER BY id"
        );
        let mut bound = Vec::with_capacity(values.len() + 1);
        bound.push(SqlValue::Text(query.entity_type.as_str().to_string()));
        bound.extend(values);

        let guard = self.lock()?;
        let mut statement = guard.prepare(&sql).map_err(db_error)?;
        let rows = statement
            .query_map(params_from_iter(bound.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_error)?;
        let mut records = Vec::new();
        for row in rows {
            let (id, fields_json) = row.map_err(db_error)?;
            let record = decode_record(&query.entity_type, id, &fields_json)?;
            if query.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn create(&self, records: &mut [Record]) -> Result<(), StoreError> {
        let mut payloads = Vec::with_capacity(records.len());
        for record in records.iter() {
            if record.id.is_some() {
                return Err(StoreError::Validation(format!(
                    "{} create must not carry an identifier",
                    record.entity_type
                )));
            }
            self.rules.check_write(record)?;
            payloads.push(encode_fields(&record.fields)?);
        }
        let assigned = self.write(|tx, now| {
            records
                .iter()
                .zip(&payloads)
                .map(|(record, payload)| insert_row(tx, &record.entity_type, payload, now))
                .collect::<Result<Vec<_>, _>>()
        })?;
        for (record, id) in records.iter_mut().zip(assigned) {
            record.id = Some(id);
        }
        Ok(())
    }

    fn update(&self, records: &[Record]) -> Result<(), StoreError> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let Some(id) = record.id else {
                return Err(StoreError::Validation(format!(
                    "{} update requires an identifier",
                    record.entity_type
                )));
            };
            self.rules.check_write(record)?;
            rows.push((id, encode_fields(&record.fields)?));
        }
        self.write(|tx, now| {
            for (record, (id, payload)) in records.iter().zip(&rows) {
                update_row(tx, &record.entity_type, *id, payload, now)?;
            }
            Ok(())
        })
    }

    fn upsert(&self, records: &mut [Record]) -> Result<(), StoreError> {
        let mut payloads = Vec::with_capacity(records.len());
        for record in records.iter() {
            self.rules.check_write(record)?;
            payloads.push(encode_fields(&record.fields)?);
        }
        let assigned = self.write(|tx, now| {
            let mut assigned = Vec::with_capacity(records.len());
            for (record, payload) in records.iter().zip(&payloads) {
                let id = match record.id {
                    Some(id) => {
                        update_row(tx, &record.entity_type, id, payload, now)?;
                        id
                    }
                    None => insert_row(tx, &record.entity_type, payload, now)?,
                };
                assigned.push(id);
            }
            Ok(assigned)
        })?;
        for (record, id) in records.iter_mut().zip(assigned) {
            record.id = Some(id);
        }
        Ok(())
    }

    fn delete(&self, records: &[Record]) -> Result<(), StoreError> {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let Some(id) = record.id else {
                return Err(StoreError::Validation(format!(
                    "{} delete requires an identifier",
                    record.entity_type
                )));
            };
            self.rules.check_delete(record)?;
            ids.push(id);
        }
        self.write(|tx, _| {
            for (record, id) in records.iter().zip(&ids) {
                let changed = tx
                    .execute(
                        "DELETE FROM records WHERE id = ?1 AND entity_type = ?2",
                        params![sql_id(*id)?, record.entity_type.as_str()],
                    )
                    .map_err(db_error)?;
                if changed == 0 {
                    return Err(StoreError::NotFound(format!("{} {id}", record.entity_type)));
                }
            }
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Milliseconds since the unix epoch, stamped on every written row.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Inserts one row and returns its assigned identifier.
fn insert_row(
    tx: &Transaction<'_>,
    entity_type: &EntityType,
    payload: &str,
    now: i64,
) -> Result<RecordId, StoreError> {
    tx.execute(
        "INSERT INTO records (entity_type, fields_json, updated_at) VALUES (?1, ?2, ?3)",
        params![entity_type.as_str(), payload, now],
    )
    .map_err(db_error)?;
    record_id(tx.last_insert_rowid()).map_err(StoreError::from)
}

/// Replaces the fields of one existing row.
fn update_row(
    tx: &Transaction<'_>,
    entity_type: &EntityType,
    id: RecordId,
    payload: &str,
    now: i64,
) -> Result<(), StoreError> {
    let changed = tx
        .execute(
            "UPDATE records SET fields_json = ?1, updated_at = ?2 WHERE id = ?3 AND entity_type = \
             ?4",
            params![payload, now, sql_id(id)?, entity_type.as_str()],
        )
        .map_err(db_error)?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("{entity_type} {id}")));
    }
    Ok(())
}

/// Serializes a field map for storage.
fn encode_fields(fields: &FieldMap) -> Result<String, StoreError> {
    serde_json::to_string(fields)
        .map_err(|err| SqliteStoreError::Invalid(format!("fields not serializable: {err}")).into())
}

/// Rebuilds a record from a stored row.
fn decode_record(
    entity_type: &EntityType,
    id: i64,
    fields_json: &str,
) -> Result<Record, StoreError> {
    let fields: FieldMap = serde_json::from_str(fields_json)
        .map_err(|err| SqliteStoreError::Corrupt(format!("record {id}: {err}")))?;
    Ok(Record {
        id: Some(record_id(id)?),
        entity_type: entity_type.clone(),
        fields,
    })
}

/// Converts a row identifier into a record identifier.
fn record_id(raw: i64) -> Result<RecordId, SqliteStoreError> {
    u64::try_from(raw)
        .ok()
        .and_then(RecordId::from_raw)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid row identifier {raw}")))
}

/// Converts a record identifier into a row identifier.
fn sql_id(id: RecordId) -> Result<i64, StoreError> {
    i64::try_from(id.get())
        .map_err(|_| StoreError::NotFound(format!("identifier {id} out of range")))
}

/// Binds identifier filter values; non-integer values cannot match.
fn id_params(values: &[Value]) -> Vec<SqlValue> {
    values
        .iter()
        .filter_map(Value::as_u64)
        .filter_map(|raw| i64::try_from(raw).ok())
        .map(SqlValue::Integer)
        .collect()
}

/// Binds field filter values as the SQL values `json_extract` yields.
fn field_params(values: &[Value]) -> Vec<SqlValue> {
    values
        .iter()
        .filter_map(|value| match value {
            Value::Null => None,
            Value::Bool(flag) => Some(SqlValue::Integer(i64::from(*flag))),
            Value::Number(number) => number
                .as_i64()
                .map(SqlValue::Integer)
                .or_else(|| number.as_f64().map(SqlValue::Real)),
            Value::String(text) => Some(SqlValue::Text(text.clone())),
            Value::Array(_) | Value::Object(_) => Some(SqlValue::Text(value.to_string())),
        })
        .collect()
}

/// Rejects field names that cannot be embedded in a JSON path.
fn validate_field_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_FIELD_NAME_LENGTH
        && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::Validation(format!("unsupported filter field name: {name:?}")))
    }
}

// ============================================================================
// SECTION: Open Helpers
// ============================================================================

/// Schema created on first open, after the version row is written.
const RECORDS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        fields_json TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_records_entity_type ON records (entity_type, id);
";

/// Checks the database path and creates its parent directory.
fn prepare_path(path: &Path) -> Result<(), SqliteStoreError> {
    let invalid = |message: &str| Err(SqliteStoreError::Invalid(format!("store path {message}")));
    if path.as_os_str().is_empty() {
        return invalid("is empty");
    }
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return invalid("exceeds length limit");
    }
    if path.components().any(|part| part.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return invalid("contains an overlong component");
    }
    if path.is_dir() {
        return invalid("names a directory");
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
        }
        _ => Ok(()),
    }
}

/// Opens the database read-write and applies the configured pragmas.
fn connect(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.pragma_update(None, "journal_mode", config.journal_mode.pragma_value())?;
    connection.pragma_update(None, "synchronous", config.sync_mode.pragma_value())?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

/// Creates the schema on an empty database or checks the stored version.
fn migrate(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let stored: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match stored {
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "expected schema {SCHEMA_VERSION}, found {other}"
            )));
        }
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(RECORDS_SCHEMA)?;
        }
    }
    tx.commit()?;
    Ok(())
}
