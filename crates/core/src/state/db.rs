//! # Unified Prism Database
//!
//! Single SQLite database for all orchestrator persistence: the pattern
//! bank's durable copy and the query log. One connection behind a mutex;
//! every store hands out the shared handle.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Row of the query log, newest first
#[derive(Debug, Clone)]
pub struct QueryLogEntry {
    pub query_id: String,
    pub user_id: String,
    pub text: String,
    pub intents: Vec<String>,
    pub result_count: u64,
    pub duration_ms: u64,
    pub degraded: bool,
    pub created_at: String,
}

/// Unified database manager for orchestrator state
pub struct PrismDb {
    conn: Arc<Mutex<Connection>>,
}

impl PrismDb {
    /// Open or create the database at `.prism/prism.db`
    pub fn open() -> Result<Self> {
        Self::open_at(".prism/prism.db")
    }

    /// Open database at a specific path (useful for testing)
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path.as_ref()).context("Failed to open prism database")?;
        Self::from_connection(conn)
    }

    /// Fully in-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a shared connection for use by other modules
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Run schema migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < SCHEMA_VERSION {
            self.migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    /// Migration to version 1 - complete schema
    fn migrate_v1(&self, conn: &Connection) -> Result<()> {
        // Durable pattern bank entries, one row per fingerprint
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS patterns (
                fingerprint TEXT PRIMARY KEY,
                strategy_json TEXT NOT NULL,
                quality REAL NOT NULL,
                uses INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_used TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // Append-only query log
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS query_log (
                query_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                text TEXT NOT NULL,
                intents_json TEXT NOT NULL DEFAULT '[]',
                result_count INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                degraded INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_query_log_user ON query_log (user_id, created_at)",
            [],
        )?;

        Ok(())
    }

    /// Append one completed (or failed) query to the log
    pub fn log_query(&self, entry: &QueryLogEntry) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO query_log
                (query_id, user_id, text, intents_json, result_count, duration_ms, degraded, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.query_id,
                entry.user_id,
                entry.text,
                serde_json::to_string(&entry.intents)?,
                entry.result_count as i64,
                entry.duration_ms as i64,
                entry.degraded as i64,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// Most recent queries for a user, newest first
    pub fn recent_queries(&self, user_id: &str, limit: usize) -> Result<Vec<QueryLogEntry>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let mut stmt = conn.prepare(
            r#"
            SELECT query_id, user_id, text, intents_json, result_count, duration_ms, degraded, created_at
            FROM query_log
            WHERE user_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok(QueryLogEntry {
                query_id: row.get(0)?,
                user_id: row.get(1)?,
                text: row.get(2)?,
                intents: serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or_default(),
                result_count: row.get::<_, i64>(4)? as u64,
                duration_ms: row.get::<_, i64>(5)? as u64,
                degraded: row.get::<_, i64>(6)? != 0,
                created_at: row.get(7)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}
