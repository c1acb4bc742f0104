// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::{params, OptionalExtension};

use crate::{Result, Storage, StoreError};

/// Background maintenance task families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerType {
    TemporalCompact,
    LtmConsolidate,
    LtmReflect,
}

impl WorkerType {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerType::TemporalCompact => "temporal-compact",
            WorkerType::LtmConsolidate => "ltm-consolidate",
            WorkerType::LtmReflect => "ltm-reflect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    Completed,
    Failed,
}

impl WorkerStatus {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(WorkerStatus::Running),
            "completed" => Ok(WorkerStatus::Completed),
            "failed" => Ok(WorkerStatus::Failed),
            other => Err(StoreError::Invalid(format!("unknown worker status: {other}"))),
        }
    }
}

/// Observability row for one background worker run.  Crash diagnosis only;
/// nothing in the runtime reads these back on the hot path.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: String,
    pub worker_type: String,
    pub status: WorkerStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub error: Option<String>,
}

impl Storage {
    pub fn worker_create(&self, id: &str, worker_type: WorkerType) -> Result<()> {
        let now = self.now();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO workers (id, worker_type, status, started_at)
             VALUES (?1, ?2, 'running', ?3)",
            params![id, worker_type.as_str(), now],
        )?;
        Ok(())
    }

    pub fn worker_complete(&self, id: &str) -> Result<()> {
        let now = self.now();
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE workers SET status = 'completed', completed_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn worker_fail(&self, id: &str, error: &str) -> Result<()> {
        let now = self.now();
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE workers SET status = 'failed', completed_at = ?1, error = ?2 WHERE id = ?3",
            params![now, error, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn worker_get(&self, id: &str) -> Result<Option<WorkerRecord>> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                "SELECT id, worker_type, status, started_at, completed_at, error
                 FROM workers WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);
        match raw {
            Some((id, worker_type, status, started_at, completed_at, error)) => {
                Ok(Some(WorkerRecord {
                    id,
                    worker_type,
                    status: WorkerStatus::parse(&status)?,
                    started_at,
                    completed_at,
                    error,
                }))
            }
            None => Ok(None),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_lifecycle_complete() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .worker_create("worker_01", WorkerType::TemporalCompact)
            .unwrap();
        let w = storage.worker_get("worker_01").unwrap().unwrap();
        assert_eq!(w.status, WorkerStatus::Running);
        assert!(w.completed_at.is_none());

        storage.worker_complete("worker_01").unwrap();
        let w = storage.worker_get("worker_01").unwrap().unwrap();
        assert_eq!(w.status, WorkerStatus::Completed);
        assert!(w.completed_at.is_some());
    }

    #[test]
    fn worker_lifecycle_failed_records_error() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .worker_create("worker_02", WorkerType::LtmConsolidate)
            .unwrap();
        storage.worker_fail("worker_02", "model timed out").unwrap();
        let w = storage.worker_get("worker_02").unwrap().unwrap();
        assert_eq!(w.status, WorkerStatus::Failed);
        assert_eq!(w.error.as_deref(), Some("model timed out"));
    }

    #[test]
    fn completing_unknown_worker_is_not_found() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(matches!(
            storage.worker_complete("ghost"),
            Err(StoreError::NotFound(_))
        ));
    }
}
