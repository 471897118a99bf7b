//! # Pattern Store
//!
//! Durable copy of the pattern bank, backed by the shared prism database.
//! The in-memory bank is authoritative at runtime; the store lets learned
//! strategies survive restarts.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

use crate::models::ExecutionStrategy;
use crate::state::db::PrismDb;

/// One persisted pattern row
#[derive(Debug, Clone)]
pub struct StoredPattern {
    pub fingerprint: String,
    pub strategy: ExecutionStrategy,
    pub quality: f64,
    pub uses: u64,
    pub created_at: String,
    pub last_used: String,
}

/// SQLite-backed pattern persistence using the shared PrismDb connection
pub struct PatternStore {
    conn: Arc<Mutex<Connection>>,
}

impl PatternStore {
    /// Create from shared PrismDb connection
    pub fn new(db: &PrismDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Insert or replace a pattern row
    pub fn upsert(&self, pattern: &StoredPattern) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO patterns
                (fingerprint, strategy_json, quality, uses, created_at, last_used)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                pattern.fingerprint,
                serde_json::to_string(&pattern.strategy)?,
                pattern.quality,
                pattern.uses as i64,
                pattern.created_at,
                pattern.last_used,
            ],
        )
        .context("Failed to upsert pattern")?;
        Ok(())
    }

    /// Remove a pattern row (expiry or eviction)
    pub fn remove(&self, fingerprint: &str) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        conn.execute(
            "DELETE FROM patterns WHERE fingerprint = ?1",
            params![fingerprint],
        )?;
        Ok(())
    }

    /// Every persisted pattern, most recently used first
    pub fn load_all(&self) -> Result<Vec<StoredPattern>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT fingerprint, strategy_json, quality, uses, created_at, last_used
            FROM patterns
            ORDER BY last_used DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut patterns = Vec::new();
        for row in rows {
            let (fingerprint, strategy_json, quality, uses, created_at, last_used) = row?;
            // Rows whose strategy no longer deserializes are skipped, not fatal
            match serde_json::from_str(&strategy_json) {
                Ok(strategy) => patterns.push(StoredPattern {
                    fingerprint,
                    strategy,
                    quality,
                    uses: uses as u64,
                    created_at,
                    last_used,
                }),
                Err(e) => {
                    tracing::warn!(fingerprint = %fingerprint, error = %e, "dropping unreadable pattern row");
                }
            }
        }
        Ok(patterns)
    }
}
