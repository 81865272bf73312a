//! SQL schema for the libSQL backend, applied idempotently at startup.

/// Full schema. Every statement is `IF NOT EXISTS` so re-applying is safe.
///
/// Name uniqueness is scoped by two partial unique indexes: one over global
/// names, one over `(name, org_id)` pairs. The two namespaces are
/// independent, so a global `search` and an org-scoped `search` can coexist.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS capabilities (
    id                TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    original_name     TEXT,
    kind              TEXT NOT NULL,
    description       TEXT NOT NULL DEFAULT '',
    source_server_id  TEXT REFERENCES external_servers(id),
    schema_or_content TEXT NOT NULL DEFAULT '{}',
    primary_skill_id  TEXT,
    is_classified     INTEGER NOT NULL DEFAULT 0,
    org_id            TEXT,
    is_global         INTEGER NOT NULL DEFAULT 0,
    is_default        INTEGER NOT NULL DEFAULT 0,
    is_active         INTEGER NOT NULL DEFAULT 1,
    is_deprecated     INTEGER NOT NULL DEFAULT 0,
    call_count        INTEGER NOT NULL DEFAULT 0,
    success_count     INTEGER NOT NULL DEFAULT 0,
    failure_count     INTEGER NOT NULL DEFAULT 0,
    avg_latency_ms    REAL NOT NULL DEFAULT 0,
    last_used_at      TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_capabilities_global_name
    ON capabilities (name) WHERE is_global = 1;

CREATE UNIQUE INDEX IF NOT EXISTS idx_capabilities_org_name
    ON capabilities (name, org_id) WHERE org_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_capabilities_server
    ON capabilities (source_server_id);

CREATE INDEX IF NOT EXISTS idx_capabilities_unclassified
    ON capabilities (created_at) WHERE is_classified = 0;

CREATE TABLE IF NOT EXISTS skill_categories (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    description   TEXT NOT NULL DEFAULT '',
    keywords      TEXT NOT NULL DEFAULT '[]',
    examples      TEXT NOT NULL DEFAULT '[]',
    parent_domain TEXT,
    tool_count    INTEGER NOT NULL DEFAULT 0,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS skill_assignments (
    capability_id TEXT NOT NULL REFERENCES capabilities(id),
    skill_id      TEXT NOT NULL REFERENCES skill_categories(id),
    confidence    REAL NOT NULL,
    is_primary    INTEGER NOT NULL DEFAULT 0,
    source        TEXT NOT NULL DEFAULT 'auto',
    assigned_at   TEXT NOT NULL,
    PRIMARY KEY (capability_id, skill_id)
);

CREATE INDEX IF NOT EXISTS idx_assignments_skill
    ON skill_assignments (skill_id);

CREATE TABLE IF NOT EXISTS skill_suggestions (
    id                    TEXT PRIMARY KEY,
    suggested_name        TEXT NOT NULL,
    suggested_description TEXT NOT NULL DEFAULT '',
    source_capability_id  TEXT NOT NULL REFERENCES capabilities(id),
    reasoning             TEXT NOT NULL DEFAULT '',
    status                TEXT NOT NULL DEFAULT 'pending',
    merged_into_skill_id  TEXT,
    created_at            TEXT NOT NULL,
    resolved_at           TEXT
);

CREATE TABLE IF NOT EXISTS external_servers (
    id               TEXT PRIMARY KEY,
    slug             TEXT NOT NULL UNIQUE,
    transport_config TEXT NOT NULL DEFAULT '{}',
    status           TEXT NOT NULL DEFAULT 'disconnected',
    last_synced_at   TEXT,
    created_at       TEXT NOT NULL
);
"#;
