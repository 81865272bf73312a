//! Shared test fixtures.

use std::sync::Arc;

use crate::store::libsql_backend::LibSqlStore;
use crate::store::Store;

/// Create a schema-applied store in a temporary directory.
///
/// Returns the store and a `TempDir` guard; keep the guard alive for the
/// duration of the test. Use a temp file rather than `:memory:` so
/// connections share state (in-memory databases are connection-local).
pub async fn test_store() -> (Arc<dyn Store>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = LibSqlStore::new_local(&dir.path().join("test.db"))
        .await
        .expect("failed to open test database");
    store
        .apply_schema()
        .await
        .expect("failed to apply schema");
    (Arc::new(store), dir)
}
