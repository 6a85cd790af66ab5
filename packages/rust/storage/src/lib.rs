//! libSQL storage layer for verification jobs.
//!
//! The [`JobStore`] wraps a local libSQL database holding job metadata and
//! the append-only audit log. Jobs survive process restarts; an
//! `action_required` job can be continued days later.
//!
//! The audit log is stored as one JSON document per entry. Reads return the
//! raw JSON so a single malformed row (e.g. written by a newer version)
//! degrades to a per-entry error instead of poisoning the whole log.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};

use kybcheck_shared::{JobId, JobStatus, KybError, LogEntry, Result, VerificationResult};

/// A job row as stored.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    /// The name originally submitted. Immutable.
    pub business_name: String,
    /// The name the pipeline currently works with; continuation input may
    /// override it.
    pub current_name: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<VerificationResult>,
}

/// A raw audit-log row.
#[derive(Debug, Clone)]
pub struct StoredLogEntry {
    pub seq: u32,
    pub entry_json: String,
}

impl StoredLogEntry {
    /// Parse the stored JSON into a typed entry.
    pub fn parse(&self) -> std::result::Result<LogEntry, serde_json::Error> {
        serde_json::from_str(&self.entry_json)
    }
}

/// Storage handle wrapping a libSQL database.
pub struct JobStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl JobStore {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KybError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| KybError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| KybError::Storage(e.to_string()))?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    KybError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Job operations
    // -----------------------------------------------------------------------

    /// Insert a new job in `pending` state. `current_name` starts equal to
    /// the submitted name.
    pub async fn create_job(&self, id: JobId, business_name: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO jobs (id, business_name, current_name, status, created_at, updated_at)
                 VALUES (?1, ?2, ?2, ?3, ?4, ?4)",
                params![
                    id.to_string(),
                    business_name,
                    JobStatus::Pending.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| KybError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Fetch a job by ID.
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, business_name, current_name, status, created_at, updated_at, result_json
                 FROM jobs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| KybError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(KybError::Storage(e.to_string())),
        }
    }

    /// Update a job's status.
    pub async fn set_status(&self, id: JobId, status: JobStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| KybError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Update the working name after a continuation override. The original
    /// `business_name` is never touched.
    pub async fn set_current_name(&self, id: JobId, name: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE jobs SET current_name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| KybError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Store the final verification result.
    pub async fn set_result(&self, id: JobId, result: &VerificationResult) -> Result<()> {
        let json = serde_json::to_string(result)
            .map_err(|e| KybError::Storage(format!("serialize result: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE jobs SET result_json = ?1, updated_at = ?2 WHERE id = ?3",
                params![json.as_str(), now.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| KybError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Audit log
    // -----------------------------------------------------------------------

    /// Append a log entry, assigning the next per-job sequence number.
    pub async fn append_log(&self, id: JobId, entry: &LogEntry) -> Result<()> {
        let json = serde_json::to_string(entry)
            .map_err(|e| KybError::Storage(format!("serialize log entry: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO job_log (job_id, seq, entry_json, created_at)
                 SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2, ?3
                 FROM job_log WHERE job_id = ?1",
                params![id.to_string(), json.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| KybError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All log entries for a job, in append order, as raw JSON.
    pub async fn log_entries(&self, id: JobId) -> Result<Vec<StoredLogEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT seq, entry_json FROM job_log WHERE job_id = ?1 ORDER BY seq",
                params![id.to_string()],
            )
            .await
            .map_err(|e| KybError::Storage(e.to_string()))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            entries.push(StoredLogEntry {
                seq: row.get::<u32>(0).map_err(|e| KybError::Storage(e.to_string()))?,
                entry_json: row
                    .get::<String>(1)
                    .map_err(|e| KybError::Storage(e.to_string()))?,
            });
        }
        Ok(entries)
    }

    /// Number of log entries for a job. Drives the progress heuristic.
    pub async fn log_count(&self, id: JobId) -> Result<u32> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM job_log WHERE job_id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| KybError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row.get::<u32>(0).map_err(|e| KybError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(KybError::Storage(e.to_string())),
        }
    }
}

fn row_to_job(row: &libsql::Row) -> Result<JobRecord> {
    let id_str = row
        .get::<String>(0)
        .map_err(|e| KybError::Storage(e.to_string()))?;
    let id: JobId = id_str
        .parse()
        .map_err(|e| KybError::Storage(format!("bad job id {id_str:?}: {e}")))?;

    let status_str = row
        .get::<String>(3)
        .map_err(|e| KybError::Storage(e.to_string()))?;
    let status: JobStatus = status_str
        .parse()
        .map_err(|e| KybError::Storage(format!("bad job status: {e}")))?;

    let result_json = row
        .get::<Option<String>>(6)
        .map_err(|e| KybError::Storage(e.to_string()))?;
    let result = result_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| KybError::Storage(format!("bad result JSON: {e}")))?;

    Ok(JobRecord {
        id,
        business_name: row
            .get::<String>(1)
            .map_err(|e| KybError::Storage(e.to_string()))?,
        current_name: row
            .get::<String>(2)
            .map_err(|e| KybError::Storage(e.to_string()))?,
        status,
        created_at: parse_timestamp(&row.get::<String>(4).map_err(|e| KybError::Storage(e.to_string()))?)?,
        updated_at: parse_timestamp(&row.get::<String>(5).map_err(|e| KybError::Storage(e.to_string()))?)?,
        result,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| KybError::Storage(format!("bad timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kybcheck_shared::LogEvent;

    async fn temp_store() -> (tempfile::TempDir, JobStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JobStore::open(&dir.path().join("jobs.db"))
            .await
            .expect("open store");
        (dir, store)
    }

    #[tokio::test]
    async fn job_roundtrip() {
        let (_dir, store) = temp_store().await;
        let id = JobId::new();

        store.create_job(id, "Alpha Muscle Gym Ltd").await.unwrap();

        let job = store.get_job(id).await.unwrap().expect("job exists");
        assert_eq!(job.id, id);
        assert_eq!(job.business_name, "Alpha Muscle Gym Ltd");
        assert_eq!(job.current_name, "Alpha Muscle Gym Ltd");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result.is_none());

        assert!(store.get_job(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_and_name_updates() {
        let (_dir, store) = temp_store().await;
        let id = JobId::new();
        store.create_job(id, "Alpha Muscle Gym Ltd").await.unwrap();

        store.set_status(id, JobStatus::Processing).await.unwrap();
        store
            .set_current_name(id, "Alpha Muscle Gym Limited")
            .await
            .unwrap();

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.current_name, "Alpha Muscle Gym Limited");
        // The original submission is immutable.
        assert_eq!(job.business_name, "Alpha Muscle Gym Ltd");
    }

    #[tokio::test]
    async fn log_is_append_only_and_ordered() {
        let (_dir, store) = temp_store().await;
        let id = JobId::new();
        store.create_job(id, "Alpha Muscle Gym Ltd").await.unwrap();

        store
            .append_log(
                id,
                &LogEntry::now(LogEvent::OriginalRequest {
                    business_name: "Alpha Muscle Gym Ltd".into(),
                }),
            )
            .await
            .unwrap();
        store
            .append_log(
                id,
                &LogEntry::now(LogEvent::Note {
                    message: "resolution started".into(),
                }),
            )
            .await
            .unwrap();

        let entries = store.log_entries(id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[1].seq, 2);

        let first = entries[0].parse().unwrap();
        assert!(matches!(first.event, LogEvent::OriginalRequest { .. }));

        assert_eq!(store.log_count(id).await.unwrap(), 2);

        // Earlier entries stay put as the log grows.
        store
            .append_log(
                id,
                &LogEntry::now(LogEvent::Note {
                    message: "website discovery started".into(),
                }),
            )
            .await
            .unwrap();
        let longer = store.log_entries(id).await.unwrap();
        assert_eq!(longer.len(), 3);
        assert_eq!(longer[0].entry_json, entries[0].entry_json);
        assert_eq!(longer[1].entry_json, entries[1].entry_json);
    }

    #[tokio::test]
    async fn result_roundtrip() {
        let (_dir, store) = temp_store().await;
        let id = JobId::new();
        store.create_job(id, "Qzxyabc Corp").await.unwrap();

        let result = VerificationResult::no_company_found("Qzxyabc Corp");
        store.set_result(id, &result).await.unwrap();
        store.set_status(id, JobStatus::Completed).await.unwrap();

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let stored = job.result.expect("result stored");
        assert_eq!(stored.requested_name, "Qzxyabc Corp");
    }

    #[tokio::test]
    async fn reopen_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let id = JobId::new();

        {
            let store = JobStore::open(&path).await.unwrap();
            store.create_job(id, "Alpha Muscle Gym Ltd").await.unwrap();
            store.set_status(id, JobStatus::ActionRequired).await.unwrap();
        }

        let store = JobStore::open(&path).await.unwrap();
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ActionRequired);
    }
}
