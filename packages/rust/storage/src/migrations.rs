//! SQL migration definitions for the kybcheck job database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: jobs, job_log",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Verification jobs. business_name is the original submission and never
-- changes; current_name tracks continuation overrides.
CREATE TABLE IF NOT EXISTS jobs (
    id            TEXT PRIMARY KEY,
    business_name TEXT NOT NULL,
    current_name  TEXT NOT NULL,
    status        TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    result_json   TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- Append-only audit log, one JSON entry per pipeline step. seq is
-- monotonic per job; insertion order is chronological order.
CREATE TABLE IF NOT EXISTS job_log (
    job_id     TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    seq        INTEGER NOT NULL,
    entry_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (job_id, seq)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
