//! SkillStore implementation for LibSqlStore.
//!
//! Every assignment mutation runs in one transaction that also maintains the
//! two denormalized pieces of state: `skill_categories.tool_count` and
//! `capabilities.primary_skill_id`. The primary flag is always recomputed
//! from the assignment rows at the end of the transaction so a concurrent
//! reader can never observe two primaries or a stale pointer.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{params, Connection};
use uuid::Uuid;

use super::{
    begin, commit, fmt_opt_ts, fmt_ts, get_bool, get_f64, get_i64, get_opt_text,
    get_opt_ts, get_string_array, get_text, get_ts, get_uuid, is_unique_violation, opt_text,
    rollback, LibSqlStore,
};
use crate::error::StoreError;
use crate::registry::types::{
    AssignmentSource, SkillAssignment, SkillCategory, SkillSuggestion, SuggestionStatus,
};
use crate::store::SkillStore;

const SKILL_COLUMNS: &str = "\
    id, name, description, keywords, examples, parent_domain, \
    tool_count, is_active, created_at";

const SUGGESTION_COLUMNS: &str = "\
    id, suggested_name, suggested_description, source_capability_id, \
    reasoning, status, merged_into_skill_id, created_at, resolved_at";

fn row_to_skill(row: &libsql::Row) -> SkillCategory {
    SkillCategory {
        id: get_text(row, 0),
        name: get_text(row, 1),
        description: get_text(row, 2),
        keywords: get_string_array(row, 3),
        examples: get_string_array(row, 4),
        parent_domain: get_opt_text(row, 5),
        tool_count: get_i64(row, 6),
        is_active: get_bool(row, 7),
        created_at: get_ts(row, 8),
    }
}

fn row_to_suggestion(row: &libsql::Row) -> Result<SkillSuggestion, StoreError> {
    let status_text = get_text(row, 5);
    let status = SuggestionStatus::from_str(&status_text).map_err(StoreError::Corrupt)?;
    Ok(SkillSuggestion {
        id: get_uuid(row, 0)?,
        suggested_name: get_text(row, 1),
        suggested_description: get_text(row, 2),
        source_capability_id: get_uuid(row, 3)?,
        reasoning: get_text(row, 4),
        status,
        merged_into_skill_id: get_opt_text(row, 6),
        created_at: get_ts(row, 7),
        resolved_at: get_opt_ts(row, 8),
    })
}

/// Recompute `capabilities.primary_skill_id` from the assignment rows.
/// Call before COMMIT in any transaction touching assignments.
async fn sync_primary_pointer(conn: &Connection, capability_id: &str) -> Result<(), libsql::Error> {
    conn.execute(
        "UPDATE capabilities SET primary_skill_id = (\
             SELECT skill_id FROM skill_assignments \
             WHERE capability_id = ?1 AND is_primary = 1) \
         WHERE id = ?1",
        params![capability_id],
    )
    .await?;
    Ok(())
}

#[async_trait]
impl SkillStore for LibSqlStore {
    async fn create_skill(&self, skill: &SkillCategory) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        let keywords = serde_json::to_string(&skill.keywords)
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let examples = serde_json::to_string(&skill.examples)
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let result = conn
            .execute(
                r#"
                INSERT INTO skill_categories
                    (id, name, description, keywords, examples, parent_domain, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    skill.id.as_str(),
                    skill.name.as_str(),
                    skill.description.as_str(),
                    keywords.as_str(),
                    examples.as_str(),
                    opt_text(skill.parent_domain.as_deref()),
                    fmt_ts(&skill.created_at),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::NameConflict {
                name: skill.id.clone(),
            }),
            Err(e) => Err(StoreError::Query(e.to_string())),
        }
    }

    async fn get_skill(&self, id: &str) -> Result<Option<SkillCategory>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SKILL_COLUMNS} FROM skill_categories WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_skill(&row))),
            None => Ok(None),
        }
    }

    async fn list_skills(&self, active_only: bool) -> Result<Vec<SkillCategory>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SKILL_COLUMNS} FROM skill_categories \
                     WHERE (?1 = 0 OR is_active = 1) \
                     ORDER BY created_at ASC, id ASC"
                ),
                params![active_only as i64],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            out.push(row_to_skill(&row));
        }
        Ok(out)
    }

    async fn deactivate_skill(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        // One transaction, so an assignment landing between the check and
        // the update cannot deactivate a skill that just gained tools.
        begin(&conn).await?;

        let mut rows = match conn
            .query(
                "SELECT tool_count FROM skill_categories WHERE id = ?1",
                params![id],
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Err(rollback(&conn, StoreError::Query(e.to_string())).await),
        };

        let count = match rows.next().await {
            Ok(Some(row)) => get_i64(&row, 0),
            Ok(None) => {
                return Err(rollback(&conn, StoreError::RowNotFound(format!("skill '{}'", id))).await)
            }
            Err(e) => return Err(rollback(&conn, StoreError::Query(e.to_string())).await),
        };
        if count > 0 {
            return Err(rollback(&conn, StoreError::SkillInUse(id.to_string())).await);
        }

        if let Err(e) = conn
            .execute(
                "UPDATE skill_categories SET is_active = 0 WHERE id = ?1",
                params![id],
            )
            .await
        {
            return Err(rollback(&conn, StoreError::Query(e.to_string())).await);
        }

        commit(&conn).await
    }

    async fn list_assignments(
        &self,
        capability_id: Uuid,
    ) -> Result<Vec<SkillAssignment>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT capability_id, skill_id, confidence, is_primary, source, assigned_at \
                 FROM skill_assignments WHERE capability_id = ?1 \
                 ORDER BY confidence DESC, skill_id ASC",
                params![capability_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            let source_text = get_text(&row, 4);
            out.push(SkillAssignment {
                capability_id: get_uuid(&row, 0)?,
                skill_id: get_text(&row, 1),
                confidence: get_f64(&row, 2),
                is_primary: get_bool(&row, 3),
                source: AssignmentSource::from_str(&source_text).map_err(StoreError::Corrupt)?,
                assigned_at: get_ts(&row, 5),
            });
        }
        Ok(out)
    }

    async fn upsert_assignment(&self, assignment: &SkillAssignment) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        let cap_id = assignment.capability_id.to_string();
        begin(&conn).await?;

        let result: Result<(), libsql::Error> = async {
            // New row? then the skill's tool_count grows.
            let mut rows = conn
                .query(
                    "SELECT 1 FROM skill_assignments WHERE capability_id = ?1 AND skill_id = ?2",
                    params![cap_id.as_str(), assignment.skill_id.as_str()],
                )
                .await?;
            let exists = rows.next().await?.is_some();
            if !exists {
                conn.execute(
                    "UPDATE skill_categories SET tool_count = tool_count + 1 WHERE id = ?1",
                    params![assignment.skill_id.as_str()],
                )
                .await?;
            }

            // Atomic primary swap: unset the old primary in the same
            // transaction that sets the new one.
            if assignment.is_primary {
                conn.execute(
                    "UPDATE skill_assignments SET is_primary = 0 \
                     WHERE capability_id = ?1 AND is_primary = 1",
                    params![cap_id.as_str()],
                )
                .await?;
            }

            conn.execute(
                r#"
                INSERT INTO skill_assignments
                    (capability_id, skill_id, confidence, is_primary, source, assigned_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT (capability_id, skill_id) DO UPDATE SET
                    confidence = excluded.confidence,
                    is_primary = excluded.is_primary,
                    source = excluded.source,
                    assigned_at = excluded.assigned_at
                "#,
                params![
                    cap_id.as_str(),
                    assignment.skill_id.as_str(),
                    assignment.confidence,
                    assignment.is_primary as i64,
                    assignment.source.as_str(),
                    fmt_ts(&assignment.assigned_at),
                ],
            )
            .await?;

            sync_primary_pointer(&conn, &cap_id).await
        }
        .await;

        if let Err(e) = result {
            return Err(rollback(&conn, StoreError::Query(e.to_string())).await);
        }
        commit(&conn).await
    }

    async fn replace_auto_assignments(
        &self,
        capability_id: Uuid,
        kept: &[(String, f64)],
        primary: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        let cap_id = capability_id.to_string();
        let now = fmt_ts(&Utc::now());
        begin(&conn).await?;

        let result: Result<(), libsql::Error> = async {
            // Current rows: which skills are human-held, which are auto, and
            // whether a human row currently holds the primary flag.
            let mut rows = conn
                .query(
                    "SELECT skill_id, source, is_primary FROM skill_assignments \
                     WHERE capability_id = ?1",
                    params![cap_id.as_str()],
                )
                .await?;

            let mut human_skills: HashSet<String> = HashSet::new();
            let mut auto_skills: HashSet<String> = HashSet::new();
            let mut human_holds_primary = false;
            while let Some(row) = rows.next().await? {
                let skill_id = get_text(&row, 0);
                let source = get_text(&row, 1);
                let is_primary = get_bool(&row, 2);
                if source == "auto" {
                    auto_skills.insert(skill_id);
                } else {
                    if is_primary {
                        human_holds_primary = true;
                    }
                    human_skills.insert(skill_id);
                }
            }

            let kept_ids: HashSet<&str> = kept.iter().map(|(id, _)| id.as_str()).collect();

            // Drop auto rows the classifier no longer stands behind.
            for stale in auto_skills.iter().filter(|s| !kept_ids.contains(s.as_str())) {
                conn.execute(
                    "DELETE FROM skill_assignments \
                     WHERE capability_id = ?1 AND skill_id = ?2",
                    params![cap_id.as_str(), stale.as_str()],
                )
                .await?;
                conn.execute(
                    "UPDATE skill_categories SET tool_count = tool_count - 1 WHERE id = ?1",
                    params![stale.as_str()],
                )
                .await?;
            }

            // Write kept pairs. Human rows are never touched by
            // reclassification, not even to bump confidence.
            for (skill_id, confidence) in kept {
                if human_skills.contains(skill_id) {
                    continue;
                }
                if auto_skills.contains(skill_id) {
                    conn.execute(
                        "UPDATE skill_assignments \
                         SET confidence = ?3, assigned_at = ?4 \
                         WHERE capability_id = ?1 AND skill_id = ?2",
                        params![cap_id.as_str(), skill_id.as_str(), *confidence, now.as_str()],
                    )
                    .await?;
                } else {
                    conn.execute(
                        "INSERT INTO skill_assignments \
                             (capability_id, skill_id, confidence, is_primary, source, assigned_at) \
                         VALUES (?1, ?2, ?3, 0, 'auto', ?4)",
                        params![cap_id.as_str(), skill_id.as_str(), *confidence, now.as_str()],
                    )
                    .await?;
                    conn.execute(
                        "UPDATE skill_categories SET tool_count = tool_count + 1 WHERE id = ?1",
                        params![skill_id.as_str()],
                    )
                    .await?;
                }
            }

            // Primary: a human-held primary survives reclassification.
            if !human_holds_primary {
                conn.execute(
                    "UPDATE skill_assignments SET is_primary = 0 \
                     WHERE capability_id = ?1 AND is_primary = 1",
                    params![cap_id.as_str()],
                )
                .await?;
                if let Some(primary_id) = primary {
                    conn.execute(
                        "UPDATE skill_assignments SET is_primary = 1 \
                         WHERE capability_id = ?1 AND skill_id = ?2",
                        params![cap_id.as_str(), primary_id],
                    )
                    .await?;
                }
            }

            conn.execute(
                "UPDATE capabilities SET is_classified = 1, updated_at = ?2 WHERE id = ?1",
                params![cap_id.as_str(), now.as_str()],
            )
            .await?;

            sync_primary_pointer(&conn, &cap_id).await
        }
        .await;

        if let Err(e) = result {
            return Err(rollback(&conn, StoreError::Query(e.to_string())).await);
        }
        commit(&conn).await
    }

    async fn remove_assignment(
        &self,
        capability_id: Uuid,
        skill_id: &str,
    ) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        let cap_id = capability_id.to_string();
        begin(&conn).await?;

        let result: Result<(), libsql::Error> = async {
            let removed = conn
                .execute(
                    "DELETE FROM skill_assignments \
                     WHERE capability_id = ?1 AND skill_id = ?2",
                    params![cap_id.as_str(), skill_id],
                )
                .await?;
            if removed > 0 {
                conn.execute(
                    "UPDATE skill_categories SET tool_count = tool_count - 1 WHERE id = ?1",
                    params![skill_id],
                )
                .await?;
            }
            sync_primary_pointer(&conn, &cap_id).await
        }
        .await;

        if let Err(e) = result {
            return Err(rollback(&conn, StoreError::Query(e.to_string())).await);
        }
        commit(&conn).await
    }

    async fn create_suggestion(&self, suggestion: &SkillSuggestion) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        conn.execute(
            &format!(
                "INSERT INTO skill_suggestions ({SUGGESTION_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                suggestion.id.to_string(),
                suggestion.suggested_name.as_str(),
                suggestion.suggested_description.as_str(),
                suggestion.source_capability_id.to_string(),
                suggestion.reasoning.as_str(),
                suggestion.status.as_str(),
                opt_text(suggestion.merged_into_skill_id.as_deref()),
                fmt_ts(&suggestion.created_at),
                fmt_opt_ts(&suggestion.resolved_at),
            ],
        )
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_suggestion(&self, id: Uuid) -> Result<Option<SkillSuggestion>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SUGGESTION_COLUMNS} FROM skill_suggestions WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_suggestion(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_suggestions(
        &self,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<SkillSuggestion>, StoreError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SUGGESTION_COLUMNS} FROM skill_suggestions \
                     WHERE (?1 IS NULL OR status = ?1) \
                     ORDER BY created_at ASC"
                ),
                params![opt_text(status.map(|s| s.as_str()))],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            out.push(row_to_suggestion(&row)?);
        }
        Ok(out)
    }

    async fn resolve_suggestion(
        &self,
        id: Uuid,
        status: SuggestionStatus,
        merged_into_skill_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        let changed = conn
            .execute(
                "UPDATE skill_suggestions \
                 SET status = ?2, merged_into_skill_id = ?3, resolved_at = ?4 \
                 WHERE id = ?1 AND status = 'pending'",
                params![
                    id.to_string(),
                    status.as_str(),
                    opt_text(merged_into_skill_id),
                    fmt_ts(&Utc::now()),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        if changed == 0 {
            return Err(StoreError::RowNotFound(format!(
                "pending suggestion '{}'",
                id
            )));
        }
        Ok(())
    }
}
