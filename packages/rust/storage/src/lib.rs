//! libSQL step journal (offline mode).
//!
//! The [`Storage`] struct wraps a local libSQL database holding one row per
//! persisted pipeline snapshot (`steps`) and one row per stage failure
//! (`step_errors`), both keyed by session id.
//!
//! **Access rules:**
//! - `reportforge run`: read-write via [`Storage::open`]
//! - `reportforge history`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use reportforge_shared::{ReportforgeError, Result};
use serde::Serialize;
use serde_json::Value;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReportforgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReportforgeError::Storage(format!(
                "no step journal at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
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
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ReportforgeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
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

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ReportforgeError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Step snapshots
    // -----------------------------------------------------------------------

    /// Append a snapshot. Returns the new row id.
    pub async fn insert_step(
        &self,
        session_id: &str,
        label: &str,
        category: &str,
        payload: &Value,
    ) -> Result<i64> {
        self.check_writable()?;
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| ReportforgeError::Storage(format!("payload not serializable: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO steps (session_id, label, category, payload_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id, label, category, payload_json.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All snapshots for a session, oldest first.
    pub async fn list_steps(&self, session_id: &str) -> Result<Vec<StepRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, session_id, label, category, payload_json, created_at
                 FROM steps WHERE session_id = ?1 ORDER BY id",
                params![session_id],
            )
            .await
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_step(&row)?);
        }
        Ok(results)
    }

    /// Most recent snapshot with `label` for a session.
    pub async fn get_step(&self, session_id: &str, label: &str) -> Result<Option<StepRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, session_id, label, category, payload_json, created_at
                 FROM steps WHERE session_id = ?1 AND label = ?2
                 ORDER BY id DESC LIMIT 1",
                params![session_id, label],
            )
            .await
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_step(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ReportforgeError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Step errors
    // -----------------------------------------------------------------------

    /// Record a stage failure. Returns the new row id.
    pub async fn insert_error(
        &self,
        session_id: &str,
        label: &str,
        error: &str,
        context: Option<&Value>,
    ) -> Result<i64> {
        self.check_writable()?;
        let context_json = context
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ReportforgeError::Storage(format!("context not serializable: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO step_errors (session_id, label, error, context_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id, label, error, context_json, now.as_str()],
            )
            .await
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All failures for a session, oldest first.
    pub async fn list_errors(&self, session_id: &str) -> Result<Vec<StepErrorRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, label, error, created_at
                 FROM step_errors WHERE session_id = ?1 ORDER BY id",
                params![session_id],
            )
            .await
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(StepErrorRecord {
                id: row
                    .get::<i64>(0)
                    .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
                label: row
                    .get::<String>(1)
                    .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
                error: row
                    .get::<String>(2)
                    .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
                created_at: row
                    .get::<String>(3)
                    .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Sessions with at least one snapshot, newest first.
    pub async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT s.session_id, MIN(s.created_at), MAX(s.created_at), COUNT(*),
                        (SELECT COUNT(*) FROM step_errors e WHERE e.session_id = s.session_id)
                 FROM steps s
                 GROUP BY s.session_id
                 ORDER BY MIN(s.id) DESC
                 LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(SessionSummary {
                session_id: row
                    .get::<String>(0)
                    .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
                started_at: row
                    .get::<String>(1)
                    .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
                last_step_at: row
                    .get::<String>(2)
                    .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
                step_count: row.get::<i64>(3).unwrap_or(0) as usize,
                error_count: row.get::<i64>(4).unwrap_or(0) as usize,
            });
        }
        Ok(results)
    }
}

/// One persisted snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub id: i64,
    pub session_id: String,
    /// `pipeline_started`, `stage_<name>`, or `final_analysis`.
    pub label: String,
    pub category: String,
    pub payload: Value,
    pub created_at: String,
}

/// One persisted stage failure.
#[derive(Debug, Clone, Serialize)]
pub struct StepErrorRecord {
    pub id: i64,
    pub label: String,
    pub error: String,
    pub created_at: String,
}

/// Aggregate view of one session's journal.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: String,
    pub last_step_at: String,
    pub step_count: usize,
    pub error_count: usize,
}

/// Convert a database row to a [`StepRecord`].
fn row_to_step(row: &libsql::Row) -> Result<StepRecord> {
    let payload_json: String = row
        .get(4)
        .map_err(|e| ReportforgeError::Storage(e.to_string()))?;
    Ok(StepRecord {
        id: row
            .get::<i64>(0)
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
        session_id: row
            .get::<String>(1)
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
        label: row
            .get::<String>(2)
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
        category: row
            .get::<String>(3)
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
        payload: serde_json::from_str(&payload_json)
            .map_err(|e| ReportforgeError::Storage(format!("corrupt payload: {e}")))?,
        created_at: row
            .get::<String>(5)
            .map_err(|e| ReportforgeError::Storage(e.to_string()))?,
    })
}
