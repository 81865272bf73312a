//! ServerStore implementation for LibSqlStore.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use uuid::Uuid;

use super::{
    begin, commit, fmt_opt_ts, fmt_ts, get_json, get_opt_ts, get_text, get_ts, get_uuid,
    is_unique_violation, rollback, LibSqlStore,
};
use crate::error::StoreError;
use crate::registry::types::{ExternalServer, ServerStatus};
use crate::store::ServerStore;

const SERVER_COLUMNS: &str = "id, slug, transport_config, status, last_synced_at, created_at";

fn row_to_server(row: &libsql::Row) -> Result<ExternalServer, StoreError> {
    let status_text = get_text(row, 3);
    Ok(ExternalServer {
        id: get_uuid(row, 0)?,
        slug: get_text(row, 1),
        transport_config: get_json(row, 2),
        status: ServerStatus::from_str(&status_text).map_err(StoreError::Corrupt)?,
        last_synced_at: get_opt_ts(row, 4),
        created_at: get_ts(row, 5),
    })
}

#[async_trait]
impl ServerStore for LibSqlStore {
    async fn add_server(&self, server: &ExternalServer) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        let result = conn
            .execute(
                &format!(
                    "INSERT INTO external_servers ({SERVER_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    server.id.to_string(),
                    server.slug.as_str(),
                    server.transport_config.to_string(),
                    server.status.as_str(),
                    fmt_opt_ts(&server.last_synced_at),
                    fmt_ts(&server.created_at),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::NameConflict {
                name: server.slug.clone(),
            }),
            Err(e) => Err(StoreError::Query(e.to_string())),
        }
    }

    async fn get_server(&self, id: Uuid) -> Result<Option<ExternalServer>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SERVER_COLUMNS} FROM external_servers WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_server(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_server_by_slug(&self, slug: &str) -> Result<Option<ExternalServer>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SERVER_COLUMNS} FROM external_servers WHERE slug = ?1"),
                params![slug],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_server(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_servers(&self) -> Result<Vec<ExternalServer>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SERVER_COLUMNS} FROM external_servers ORDER BY slug"),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            out.push(row_to_server(&row)?);
        }
        Ok(out)
    }

    async fn set_server_status(
        &self,
        id: Uuid,
        status: ServerStatus,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE external_servers \
             SET status = ?2, last_synced_at = COALESCE(?3, last_synced_at) \
             WHERE id = ?1",
            params![id.to_string(), status.as_str(), fmt_opt_ts(&synced_at)],
        )
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn remove_server(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        let server_id = id.to_string();
        begin(&conn).await?;

        // Cascade: assignments first (adjusting tool counts), then any
        // suggestions spawned by the server's capabilities, then the
        // capabilities, then the server row itself.
        let steps = [
            "UPDATE skill_categories SET tool_count = tool_count - (\
                 SELECT COUNT(*) FROM skill_assignments a \
                 JOIN capabilities c ON c.id = a.capability_id \
                 WHERE c.source_server_id = ?1 AND a.skill_id = skill_categories.id)",
            "DELETE FROM skill_assignments WHERE capability_id IN (\
                 SELECT id FROM capabilities WHERE source_server_id = ?1)",
            "DELETE FROM skill_suggestions WHERE source_capability_id IN (\
                 SELECT id FROM capabilities WHERE source_server_id = ?1)",
            "DELETE FROM capabilities WHERE source_server_id = ?1",
            "DELETE FROM external_servers WHERE id = ?1",
        ];
        for sql in steps {
            if let Err(e) = conn.execute(sql, params![server_id.as_str()]).await {
                return Err(rollback(&conn, StoreError::Query(e.to_string())).await);
            }
        }

        commit(&conn).await
    }
}
