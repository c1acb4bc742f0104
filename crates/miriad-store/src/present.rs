// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::{Result, Storage};

/// Status of a single present-state task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub content: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

/// The agent's mutable scratchpad: current mission, status line, and task
/// list.  A single row, overwritten wholesale by the present-state tools.
#[derive(Debug, Clone, Default)]
pub struct PresentState {
    pub mission: Option<String>,
    pub status: Option<String>,
    pub tasks: Vec<Task>,
}

impl Storage {
    /// The current present state; defaults when never written.
    pub fn present(&self) -> Result<PresentState> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT mission, status, tasks FROM present_state WHERE id = 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let tasks_json: String = row.get(2)?;
                Ok(PresentState {
                    mission: row.get(0)?,
                    status: row.get(1)?,
                    tasks: serde_json::from_str(&tasks_json)?,
                })
            }
            None => Ok(PresentState::default()),
        }
    }

    pub fn set_mission(&self, mission: Option<&str>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO present_state (id, mission) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET mission = ?1",
            params![mission],
        )?;
        Ok(())
    }

    pub fn set_status(&self, status: Option<&str>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO present_state (id, status) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET status = ?1",
            params![status],
        )?;
        Ok(())
    }

    pub fn set_tasks(&self, tasks: &[Task]) -> Result<()> {
        let json = serde_json::to_string(tasks)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO present_state (id, tasks) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET tasks = ?1",
            params![json],
        )?;
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_present_state_is_default() {
        let storage = Storage::open_in_memory().unwrap();
        let present = storage.present().unwrap();
        assert!(present.mission.is_none());
        assert!(present.status.is_none());
        assert!(present.tasks.is_empty());
    }

    #[test]
    fn set_mission_round_trips() {
        let storage = Storage::open_in_memory().unwrap();
        storage.set_mission(Some("ship the feature")).unwrap();
        assert_eq!(
            storage.present().unwrap().mission.as_deref(),
            Some("ship the feature")
        );
    }

    #[test]
    fn set_mission_none_clears() {
        let storage = Storage::open_in_memory().unwrap();
        storage.set_mission(Some("x")).unwrap();
        storage.set_mission(None).unwrap();
        assert!(storage.present().unwrap().mission.is_none());
    }

    #[test]
    fn setters_are_independent() {
        let storage = Storage::open_in_memory().unwrap();
        storage.set_mission(Some("m")).unwrap();
        storage.set_status(Some("s")).unwrap();
        let present = storage.present().unwrap();
        assert_eq!(present.mission.as_deref(), Some("m"));
        assert_eq!(present.status.as_deref(), Some("s"));
    }

    #[test]
    fn set_tasks_overwrites_wholesale() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .set_tasks(&[
                Task {
                    id: "1".into(),
                    content: "first".into(),
                    status: TaskStatus::Pending,
                    blocked_reason: None,
                },
                Task {
                    id: "2".into(),
                    content: "second".into(),
                    status: TaskStatus::Blocked,
                    blocked_reason: Some("waiting on review".into()),
                },
            ])
            .unwrap();
        storage
            .set_tasks(&[Task {
                id: "3".into(),
                content: "only".into(),
                status: TaskStatus::InProgress,
                blocked_reason: None,
            }])
            .unwrap();
        let tasks = storage.present().unwrap().tasks;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "3");
        assert_eq!(tasks[0].status, TaskStatus::InProgress);
    }

    #[test]
    fn blocked_reason_survives_round_trip() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .set_tasks(&[Task {
                id: "t".into(),
                content: "c".into(),
                status: TaskStatus::Blocked,
                blocked_reason: Some("missing credentials".into()),
            }])
            .unwrap();
        let tasks = storage.present().unwrap().tasks;
        assert_eq!(tasks[0].blocked_reason.as_deref(), Some("missing credentials"));
    }
}
