//! CapabilityStore implementation for LibSqlStore.

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use uuid::Uuid;

use super::{
    begin, commit, fmt_ts, is_unique_violation, opt_text, rollback, row_to_capability,
    LibSqlStore, CAPABILITY_COLUMNS,
};
use crate::error::StoreError;
use crate::registry::types::{Capability, CapabilityKind, NewCapability};
use crate::store::CapabilityStore;
use crate::tenant::TenantScope;

/// Scalar subquery joining assigned skill ids onto a capability row.
const SKILL_IDS_SUBQUERY: &str =
    "(SELECT group_concat(skill_id) FROM skill_assignments a WHERE a.capability_id = c.id)";

#[async_trait]
impl CapabilityStore for LibSqlStore {
    async fn register_capability(&self, new: &NewCapability) -> Result<Uuid, StoreError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        let now = fmt_ts(&Utc::now());

        let result = conn
            .execute(
                r#"
                INSERT INTO capabilities (
                    id, name, original_name, kind, description, source_server_id,
                    schema_or_content, org_id, is_global, is_default,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                "#,
                params![
                    id.to_string(),
                    new.name.as_str(),
                    opt_text(new.original_name.as_deref()),
                    new.kind.as_str(),
                    new.description.as_str(),
                    opt_text(new.source_server_id.map(|u| u.to_string()).as_deref()),
                    new.schema_or_content.to_string(),
                    opt_text(new.org_id.as_deref()),
                    new.is_global as i64,
                    new.is_default as i64,
                    now.as_str(),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(StoreError::NameConflict {
                name: new.name.clone(),
            }),
            Err(e) => Err(StoreError::Query(e.to_string())),
        }
    }

    async fn get_capability(&self, id: Uuid) -> Result<Option<Capability>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CAPABILITY_COLUMNS}, {SKILL_IDS_SUBQUERY} \
                     FROM capabilities c WHERE c.id = ?1"
                ),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_capability(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_capability_by_name(
        &self,
        name: &str,
        scope: &TenantScope,
    ) -> Result<Option<Capability>, StoreError> {
        let conn = self.connect().await?;
        // Org-scoped shadows global: sort rows where org_id matches the
        // caller first, then take one.
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CAPABILITY_COLUMNS}, {SKILL_IDS_SUBQUERY} \
                     FROM capabilities c \
                     WHERE c.name = ?1 AND c.is_active = 1 \
                       AND (c.is_default = 1 OR c.is_global = 1 OR c.org_id = ?2) \
                     ORDER BY (c.org_id = ?2) DESC \
                     LIMIT 1"
                ),
                params![name, opt_text(scope.org_id.as_deref())],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_capability(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_visible(
        &self,
        scope: &TenantScope,
        kind: Option<CapabilityKind>,
        skill_id: Option<&str>,
    ) -> Result<Vec<Capability>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CAPABILITY_COLUMNS}, {SKILL_IDS_SUBQUERY} \
                     FROM capabilities c \
                     WHERE c.is_active = 1 AND c.is_deprecated = 0 \
                       AND (c.is_default = 1 OR c.is_global = 1 OR c.org_id = ?1) \
                       AND (?2 IS NULL OR c.kind = ?2) \
                       AND (?3 IS NULL OR EXISTS (\
                            SELECT 1 FROM skill_assignments a \
                            WHERE a.capability_id = c.id AND a.skill_id = ?3)) \
                     ORDER BY c.name"
                ),
                params![
                    opt_text(scope.org_id.as_deref()),
                    opt_text(kind.map(|k| k.as_str())),
                    opt_text(skill_id),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            out.push(row_to_capability(&row)?);
        }
        Ok(out)
    }

    async fn list_for_server(&self, server_id: Uuid) -> Result<Vec<Capability>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CAPABILITY_COLUMNS}, {SKILL_IDS_SUBQUERY} \
                     FROM capabilities c WHERE c.source_server_id = ?1 ORDER BY c.name"
                ),
                params![server_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            out.push(row_to_capability(&row)?);
        }
        Ok(out)
    }

    async fn list_unclassified(&self, limit: i64) -> Result<Vec<Capability>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CAPABILITY_COLUMNS}, {SKILL_IDS_SUBQUERY} \
                     FROM capabilities c \
                     WHERE c.is_classified = 0 AND c.is_active = 1 AND c.is_default = 0 \
                     ORDER BY c.created_at ASC LIMIT ?1"
                ),
                params![limit],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            out.push(row_to_capability(&row)?);
        }
        Ok(out)
    }

    async fn set_capability_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE capabilities SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), active as i64, fmt_ts(&Utc::now())],
        )
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn update_description(&self, id: Uuid, description: &str) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE capabilities \
             SET description = ?2, is_classified = 0, updated_at = ?3 \
             WHERE id = ?1",
            params![id.to_string(), description, fmt_ts(&Utc::now())],
        )
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn mark_classified(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE capabilities SET is_classified = 1, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), fmt_ts(&Utc::now())],
        )
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn delete_capability(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        begin(&conn).await?;

        let steps = [
            (
                "UPDATE skill_categories SET tool_count = tool_count - 1 \
                 WHERE id IN (SELECT skill_id FROM skill_assignments WHERE capability_id = ?1)",
                id.to_string(),
            ),
            (
                "DELETE FROM skill_assignments WHERE capability_id = ?1",
                id.to_string(),
            ),
            (
                "DELETE FROM skill_suggestions WHERE source_capability_id = ?1",
                id.to_string(),
            ),
            ("DELETE FROM capabilities WHERE id = ?1", id.to_string()),
        ];
        for (sql, param) in steps {
            if let Err(e) = conn.execute(sql, params![param]).await {
                return Err(rollback(&conn, StoreError::Query(e.to_string())).await);
            }
        }

        commit(&conn).await
    }

    async fn record_usage(
        &self,
        id: Uuid,
        success: bool,
        latency_ms: f64,
    ) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        let now = fmt_ts(&Utc::now());
        conn.execute(
            r#"
            UPDATE capabilities SET
                avg_latency_ms = (avg_latency_ms * call_count + ?2) / (call_count + 1),
                call_count = call_count + 1,
                success_count = success_count + CASE WHEN ?3 != 0 THEN 1 ELSE 0 END,
                failure_count = failure_count + CASE WHEN ?3 != 0 THEN 0 ELSE 1 END,
                last_used_at = ?4,
                updated_at = ?4
            WHERE id = ?1
            "#,
            params![id.to_string(), latency_ms, success as i64, now.as_str()],
        )
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}
