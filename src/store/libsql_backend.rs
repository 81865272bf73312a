//! libSQL backend for the store traits.
//!
//! Embedded SQLite-compatible storage via Turso's libSQL fork. Always
//! file-backed; tests point it at a temp directory. All multi-step
//! mutations (primary swap, classification commit, cascades) run inside
//! explicit BEGIN/COMMIT transactions on a single connection.

mod capabilities;
mod servers;
mod skills;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase};
use uuid::Uuid;

use crate::error::StoreError;
use crate::registry::types::{Capability, CapabilityKind, UsageCounters};
use crate::store::schema;

/// Explicit column list for the capabilities table, prefixed for joins.
/// Positions must match `row_to_capability`.
pub(crate) const CAPABILITY_COLUMNS: &str = "\
    c.id, c.name, c.original_name, c.kind, c.description, c.source_server_id, \
    c.schema_or_content, c.primary_skill_id, c.is_classified, c.org_id, \
    c.is_global, c.is_default, c.is_active, c.is_deprecated, \
    c.call_count, c.success_count, c.failure_count, c.avg_latency_ms, \
    c.last_used_at, c.created_at, c.updated_at";

/// libSQL-backed capability store.
pub struct LibSqlStore {
    db: Arc<LibSqlDatabase>,
}

impl LibSqlStore {
    /// Open (or create) a local database file.
    ///
    /// Always file-backed, tests included: every operation opens its own
    /// connection, and libSQL in-memory databases are connection-local.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {}", e))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open database: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Apply the schema. Idempotent.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        conn.execute_batch(schema::SCHEMA)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to apply schema: {}", e)))?;
        Ok(())
    }

    /// New connection with `busy_timeout` set so concurrent writers wait
    /// instead of failing instantly with "database is locked".
    pub(crate) async fn connect(&self) -> Result<Connection, StoreError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {}", e)))?;
        conn.query("PRAGMA busy_timeout = 5000", ())
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to set busy_timeout: {}", e)))?;
        Ok(conn)
    }
}

// ==================== Transaction helpers ====================

pub(crate) async fn begin(conn: &Connection) -> Result<(), StoreError> {
    conn.execute("BEGIN", ())
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
    Ok(())
}

pub(crate) async fn commit(conn: &Connection) -> Result<(), StoreError> {
    conn.execute("COMMIT", ())
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
    Ok(())
}

/// Roll back, preserving the original error.
pub(crate) async fn rollback(conn: &Connection, err: StoreError) -> StoreError {
    let _ = conn.execute("ROLLBACK", ()).await;
    err
}

// ==================== Row helpers ====================

/// Parse an ISO-8601 timestamp string from SQLite into DateTime<Utc>.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ndt.and_utc());
    }
    Err(format!("unparseable timestamp: {:?}", s))
}

/// Format a DateTime<Utc> for storage (RFC 3339 with millisecond precision).
pub(crate) fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Format an optional DateTime<Utc>.
pub(crate) fn fmt_opt_ts(dt: &Option<DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(fmt_ts(dt)),
        None => libsql::Value::Null,
    }
}

/// Extract a text column, returning empty string for NULL.
pub(crate) fn get_text(row: &libsql::Row, idx: i32) -> String {
    row.get::<String>(idx).unwrap_or_default()
}

/// Extract an optional text column. None for SQL NULL.
pub(crate) fn get_opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

/// Convert an `Option<&str>` to a `libsql::Value` (Text or Null).
pub(crate) fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Extract an i64 column, defaulting to 0.
pub(crate) fn get_i64(row: &libsql::Row, idx: i32) -> i64 {
    row.get::<i64>(idx).unwrap_or(0)
}

/// Extract a float column, defaulting to 0.
pub(crate) fn get_f64(row: &libsql::Row, idx: i32) -> f64 {
    row.get::<f64>(idx).unwrap_or(0.0)
}

/// Extract a bool from an integer column.
pub(crate) fn get_bool(row: &libsql::Row, idx: i32) -> bool {
    row.get::<i64>(idx).unwrap_or(0) != 0
}

/// Parse a JSON value from a text column, defaulting to Null.
pub(crate) fn get_json(row: &libsql::Row, idx: i32) -> serde_json::Value {
    row.get::<String>(idx)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null)
}

/// Parse a JSON string array from a text column, defaulting to empty.
pub(crate) fn get_string_array(row: &libsql::Row, idx: i32) -> Vec<String> {
    row.get::<String>(idx)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Parse a timestamp column. NULL or unparseable values log a warning and
/// fall back to the Unix epoch so the defect is detectable.
pub(crate) fn get_ts(row: &libsql::Row, idx: i32) -> DateTime<Utc> {
    match row.get::<String>(idx) {
        Ok(s) => match parse_timestamp(&s) {
            Ok(dt) => dt,
            Err(e) => {
                tracing::warn!("Timestamp parse failure at column {}: {}", idx, e);
                DateTime::UNIX_EPOCH
            }
        },
        Err(_) => DateTime::UNIX_EPOCH,
    }
}

/// Parse an optional timestamp column.
pub(crate) fn get_opt_ts(row: &libsql::Row, idx: i32) -> Option<DateTime<Utc>> {
    row.get::<String>(idx)
        .ok()
        .and_then(|s| parse_timestamp(&s).ok())
}

/// Parse a required UUID column.
pub(crate) fn get_uuid(row: &libsql::Row, idx: i32) -> Result<Uuid, StoreError> {
    let s = row
        .get::<String>(idx)
        .map_err(|e| StoreError::Corrupt(format!("missing uuid at column {}: {}", idx, e)))?;
    Uuid::parse_str(&s).map_err(|e| StoreError::Corrupt(format!("bad uuid {:?}: {}", s, e)))
}

/// Parse an optional UUID column.
pub(crate) fn get_opt_uuid(row: &libsql::Row, idx: i32) -> Option<Uuid> {
    row.get::<String>(idx)
        .ok()
        .and_then(|s| Uuid::parse_str(&s).ok())
}

/// Map a capability row (CAPABILITY_COLUMNS order, plus a trailing
/// group_concat of assigned skill ids) into a [`Capability`].
pub(crate) fn row_to_capability(row: &libsql::Row) -> Result<Capability, StoreError> {
    let kind_text = get_text(row, 3);
    let kind = CapabilityKind::from_str(&kind_text).map_err(StoreError::Corrupt)?;

    let skill_ids = match get_opt_text(row, 21) {
        Some(joined) if !joined.is_empty() => {
            joined.split(',').map(|s| s.to_string()).collect()
        }
        _ => Vec::new(),
    };

    Ok(Capability {
        id: get_uuid(row, 0)?,
        name: get_text(row, 1),
        original_name: get_opt_text(row, 2),
        kind,
        description: get_text(row, 4),
        source_server_id: get_opt_uuid(row, 5),
        schema_or_content: get_json(row, 6),
        primary_skill_id: get_opt_text(row, 7),
        is_classified: get_bool(row, 8),
        org_id: get_opt_text(row, 9),
        is_global: get_bool(row, 10),
        is_default: get_bool(row, 11),
        is_active: get_bool(row, 12),
        is_deprecated: get_bool(row, 13),
        usage: UsageCounters {
            call_count: get_i64(row, 14),
            success_count: get_i64(row, 15),
            failure_count: get_i64(row, 16),
            avg_latency_ms: get_f64(row, 17),
            last_used_at: get_opt_ts(row, 18),
        },
        skill_ids,
        created_at: get_ts(row, 19),
        updated_at: get_ts(row, 20),
    })
}

/// Detect a unique-index violation so registration can surface NameConflict
/// instead of a generic query error.
pub(crate) fn is_unique_violation(err: &libsql::Error) -> bool {
    err.to_string().contains("UNIQUE constraint failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_round_trip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&fmt_ts(&now)).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn timestamp_accepts_naive_sqlite_format() {
        assert!(parse_timestamp("2024-01-15 10:30:00").is_ok());
        assert!(parse_timestamp("2024-01-15 10:30:00.123").is_ok());
        assert!(parse_timestamp("not a time").is_err());
    }

    #[tokio::test]
    async fn schema_applies_twice() {
        let dir = tempfile::tempdir().unwrap();
        let store = LibSqlStore::new_local(&dir.path().join("test.db"))
            .await
            .unwrap();
        store.apply_schema().await.unwrap();
        store.apply_schema().await.unwrap();
    }

    #[tokio::test]
    async fn state_is_visible_across_connections() {
        use crate::registry::types::NewCapability;
        use crate::tenant::TenantScope;

        let (store, _dir) = crate::testing::test_store().await;

        // Each store operation opens its own connection; a row written
        // through one must be visible through the next.
        store
            .register_capability(&NewCapability::global_tool(
                "echo",
                "Echo the supplied message back",
                serde_json::json!({ "type": "object", "properties": {} }),
            ))
            .await
            .unwrap();
        let cap = store
            .get_capability_by_name("echo", &TenantScope::global())
            .await
            .unwrap();
        assert!(cap.is_some());
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_reopen() {
        use crate::registry::types::NewCapability;
        use crate::store::CapabilityStore;
        use crate::tenant::TenantScope;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store.apply_schema().await.unwrap();
            store
                .register_capability(&NewCapability::global_tool(
                    "echo",
                    "Echo the supplied message back",
                    serde_json::json!({ "type": "object", "properties": {} }),
                ))
                .await
                .unwrap();
        }

        let store = LibSqlStore::new_local(&path).await.unwrap();
        store.apply_schema().await.unwrap();
        let cap = store
            .get_capability_by_name("echo", &TenantScope::global())
            .await
            .unwrap();
        assert!(cap.is_some());
    }
}
