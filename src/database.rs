use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::errors::AuthError;
use crate::models::{ApiKeyRecord, SportScope};

/// SQLite-backed key storage. The match tables are owned by the sync
/// pipeline; this service only reads and writes `api_keys`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(path: &str) -> Result<Self, AuthError> {
        let conn = Connection::open(path)?;
        // Bound the wait on a contended database so a slow lookup becomes
        // Unavailable instead of stalling the request.
        conn.busy_timeout(Duration::from_millis(500))?;
        conn.execute_batch(include_str!("../db/schema.sql"))?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn create_api_key(
        &self,
        key_hash: &str,
        key_prefix: &str,
        name: &str,
        sports: &SportScope,
        rate_limit_per_minute: u32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ApiKeyRecord, AuthError> {
        let conn = self.lock()?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO api_keys (key_hash, key_prefix, name, sports, rate_limit, is_active, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
            params![
                key_hash,
                key_prefix,
                name,
                sports.to_json(),
                rate_limit_per_minute,
                created_at.to_rfc3339(),
                expires_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(ApiKeyRecord {
            id,
            key_hash: key_hash.to_string(),
            key_prefix: key_prefix.to_string(),
            name: name.to_string(),
            sports: sports.clone(),
            rate_limit_per_minute,
            is_active: true,
            created_at,
            last_used_at: None,
            expires_at,
        })
    }

    pub fn find_by_key_hash(&self, key_hash: &str) -> Result<ApiKeyRecord, AuthError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, key_hash, key_prefix, name, sports, rate_limit, is_active, created_at, last_used_at, expires_at
             FROM api_keys WHERE key_hash = ?",
        )?;
        let record = stmt.query_row(params![key_hash], row_to_record)?;
        Ok(record)
    }

    pub fn update_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<(), AuthError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE api_keys SET last_used_at = ? WHERE id = ?",
            params![at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Soft-retires a key and returns its hash so callers can drop cache
    /// entries. Rows are never deleted; audit history references them.
    pub fn revoke_api_key(&self, id: i64) -> Result<String, AuthError> {
        let conn = self.lock()?;
        let key_hash: String = conn.query_row(
            "SELECT key_hash FROM api_keys WHERE id = ?",
            params![id],
            |row| row.get(0),
        )?;
        conn.execute(
            "UPDATE api_keys SET is_active = 0 WHERE id = ?",
            params![id],
        )?;
        Ok(key_hash)
    }

    pub fn list_api_keys(&self) -> Result<Vec<ApiKeyRecord>, AuthError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, key_hash, key_prefix, name, sports, rate_limit, is_active, created_at, last_used_at, expires_at
             FROM api_keys ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AuthError> {
        // A poisoned lock means a writer panicked mid-statement; treat the
        // store as unavailable rather than panicking the request path.
        self.conn.lock().map_err(|_| AuthError::Unavailable)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ApiKeyRecord> {
    let sports_json: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let last_used_at: Option<String> = row.get(8)?;
    let expires_at: Option<String> = row.get(9)?;

    Ok(ApiKeyRecord {
        id: row.get(0)?,
        key_hash: row.get(1)?,
        key_prefix: row.get(2)?,
        name: row.get(3)?,
        sports: SportScope::from_json(&sports_json)
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        rate_limit_per_minute: row.get(5)?,
        is_active: row.get(6)?,
        created_at: parse_timestamp(&created_at)
            .ok_or(rusqlite::Error::InvalidQuery)?,
        last_used_at: last_used_at.as_deref().and_then(parse_timestamp),
        expires_at: expires_at.as_deref().and_then(parse_timestamp),
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
