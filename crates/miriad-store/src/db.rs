// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::debug;

use crate::Result;

/// The single relational store behind the agent runtime: temporal memory,
/// present state, long-term entries, and worker rows, with two content-linked
/// full-text indexes kept in sync by triggers.
///
/// One process owns the database file.  The connection sits behind a blocking
/// mutex: every operation is a short transaction and at most one turn runs at
/// a time, so callers never contend for long.
pub struct Storage {
    pub(crate) conn: Mutex<Connection>,
}

impl Storage {
    pub fn open(db_path: &Path) -> Result<Self> {
        debug!(path = %db_path.display(), "opening database");
        let conn = Connection::open(db_path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.migrate()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.migrate()?;
        Ok(storage)
    }

    /// Apply the schema.  Idempotent: every statement is `IF NOT EXISTS` and
    /// the FTS rebuild re-derives index content from the base tables, so
    /// migrations can run on every startup.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        // journal_mode returns the resulting mode as a row, so it cannot go
        // through execute_batch.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS temporal_messages (
                id             TEXT PRIMARY KEY,
                kind           TEXT NOT NULL
                               CHECK (kind IN ('user','assistant','tool_call','tool_result')),
                content        TEXT NOT NULL,
                token_estimate INTEGER NOT NULL,
                created_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS temporal_summaries (
                id               TEXT PRIMARY KEY,
                summary_order    INTEGER NOT NULL CHECK (summary_order >= 1),
                start_id         TEXT NOT NULL,
                end_id           TEXT NOT NULL,
                narrative        TEXT NOT NULL,
                key_observations TEXT NOT NULL DEFAULT '[]',
                tags             TEXT NOT NULL DEFAULT '[]',
                token_estimate   INTEGER NOT NULL,
                created_at       TEXT NOT NULL,
                CHECK (start_id <= end_id)
            );

            CREATE TABLE IF NOT EXISTS present_state (
                id      INTEGER PRIMARY KEY CHECK (id = 1),
                mission TEXT,
                status  TEXT,
                tasks   TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS ltm_entries (
                slug        TEXT PRIMARY KEY,
                parent_slug TEXT REFERENCES ltm_entries(slug),
                path        TEXT NOT NULL UNIQUE,
                title       TEXT NOT NULL,
                body        TEXT NOT NULL,
                tags        TEXT NOT NULL DEFAULT '[]',
                links       TEXT NOT NULL DEFAULT '[]',
                version     INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
                created_by  TEXT NOT NULL,
                updated_by  TEXT NOT NULL,
                archived_at TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS workers (
                id           TEXT PRIMARY KEY,
                worker_type  TEXT NOT NULL
                             CHECK (worker_type IN ('temporal-compact','ltm-consolidate','ltm-reflect')),
                status       TEXT NOT NULL
                             CHECK (status IN ('running','completed','failed')),
                started_at   TEXT NOT NULL,
                completed_at TEXT,
                error        TEXT
            );

            CREATE TABLE IF NOT EXISTS session_config (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_summaries_range
                ON temporal_summaries(start_id, end_id);
            CREATE INDEX IF NOT EXISTS idx_ltm_parent ON ltm_entries(parent_slug);
            CREATE INDEX IF NOT EXISTS idx_ltm_path   ON ltm_entries(path);

            CREATE VIRTUAL TABLE IF NOT EXISTS temporal_messages_fts USING fts5(
                content,
                content='temporal_messages',
                content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS temporal_messages_ai
            AFTER INSERT ON temporal_messages BEGIN
                INSERT INTO temporal_messages_fts(rowid, content)
                VALUES (new.rowid, new.content);
            END;
            CREATE TRIGGER IF NOT EXISTS temporal_messages_ad
            AFTER DELETE ON temporal_messages BEGIN
                INSERT INTO temporal_messages_fts(temporal_messages_fts, rowid, content)
                VALUES ('delete', old.rowid, old.content);
            END;
            CREATE TRIGGER IF NOT EXISTS temporal_messages_au
            AFTER UPDATE ON temporal_messages BEGIN
                INSERT INTO temporal_messages_fts(temporal_messages_fts, rowid, content)
                VALUES ('delete', old.rowid, old.content);
                INSERT INTO temporal_messages_fts(rowid, content)
                VALUES (new.rowid, new.content);
            END;

            CREATE VIRTUAL TABLE IF NOT EXISTS ltm_entries_fts USING fts5(
                title,
                body,
                content='ltm_entries',
                content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS ltm_entries_ai
            AFTER INSERT ON ltm_entries BEGIN
                INSERT INTO ltm_entries_fts(rowid, title, body)
                VALUES (new.rowid, new.title, new.body);
            END;
            CREATE TRIGGER IF NOT EXISTS ltm_entries_ad
            AFTER DELETE ON ltm_entries BEGIN
                INSERT INTO ltm_entries_fts(ltm_entries_fts, rowid, title, body)
                VALUES ('delete', old.rowid, old.title, old.body);
            END;
            CREATE TRIGGER IF NOT EXISTS ltm_entries_au
            AFTER UPDATE ON ltm_entries BEGIN
                INSERT INTO ltm_entries_fts(ltm_entries_fts, rowid, title, body)
                VALUES ('delete', old.rowid, old.title, old.body);
                INSERT INTO ltm_entries_fts(rowid, title, body)
                VALUES (new.rowid, new.title, new.body);
            END;

            INSERT INTO temporal_messages_fts(temporal_messages_fts) VALUES('rebuild');
            INSERT INTO ltm_entries_fts(ltm_entries_fts) VALUES('rebuild');
            "#,
        )?;
        Ok(())
    }

    /// Persist a session-scoped key/value pair (e.g. the session id).
    pub fn set_session_value(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO session_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    pub fn session_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT value FROM session_config WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn now(&self) -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        // Running the schema a second time must not fail.
        storage.migrate().unwrap();
        storage.migrate().unwrap();
    }

    #[test]
    fn open_on_disk_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        {
            let storage = Storage::open(&path).unwrap();
            storage.set_session_value("session_id", "session_abc").unwrap();
        }
        let storage = Storage::open(&path).unwrap();
        assert_eq!(
            storage.session_value("session_id").unwrap().as_deref(),
            Some("session_abc")
        );
    }

    #[test]
    fn session_value_missing_is_none() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.session_value("nope").unwrap(), None);
    }

    #[test]
    fn session_value_overwrites() {
        let storage = Storage::open_in_memory().unwrap();
        storage.set_session_value("k", "v1").unwrap();
        storage.set_session_value("k", "v2").unwrap();
        assert_eq!(storage.session_value("k").unwrap().as_deref(), Some("v2"));
    }
}
