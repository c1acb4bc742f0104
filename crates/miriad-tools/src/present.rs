// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use miriad_store::{Storage, Task};

use crate::Tool;

/// Overwrite the mission line of the present state.
pub struct PresentSetMissionTool {
    storage: Arc<Storage>,
}

impl PresentSetMissionTool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for PresentSetMissionTool {
    fn name(&self) -> &str {
        "present_set_mission"
    }
    fn description(&self) -> &str {
        "Set or clear the current mission. Omit `mission` to clear it."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mission": { "type": "string", "description": "The new mission statement" }
            },
            "additionalProperties": false
        })
    }
    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let mission = args.get("mission").and_then(|v| v.as_str());
        self.storage.set_mission(mission)?;
        Ok(match mission {
            Some(m) => format!("mission set: {m}"),
            None => "mission cleared".into(),
        })
    }
}

/// Overwrite the status line of the present state.
pub struct PresentSetStatusTool {
    storage: Arc<Storage>,
}

impl PresentSetStatusTool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for PresentSetStatusTool {
    fn name(&self) -> &str {
        "present_set_status"
    }
    fn description(&self) -> &str {
        "Set or clear the current status line. Omit `status` to clear it."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": { "type": "string", "description": "One-line status" }
            },
            "additionalProperties": false
        })
    }
    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let status = args.get("status").and_then(|v| v.as_str());
        self.storage.set_status(status)?;
        Ok(match status {
            Some(s) => format!("status set: {s}"),
            None => "status cleared".into(),
        })
    }
}

/// Replace the whole task list.
pub struct PresentUpdateTasksTool {
    storage: Arc<Storage>,
}

impl PresentUpdateTasksTool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for PresentUpdateTasksTool {
    fn name(&self) -> &str {
        "present_update_tasks"
    }
    fn description(&self) -> &str {
        "Replace the task list wholesale. Every task needs an id, content, and status."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "content": { "type": "string" },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed", "blocked"]
                            },
                            "blocked_reason": { "type": "string" }
                        },
                        "required": ["id", "content", "status"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["tasks"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let tasks: Vec<Task> = serde_json::from_value(args["tasks"].clone())?;
        let count = tasks.len();
        self.storage.set_tasks(&tasks)?;
        Ok(format!("task list replaced ({count} tasks)"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Arc<Storage> {
        Arc::new(Storage::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn set_mission_writes_through() {
        let s = storage();
        let tool = PresentSetMissionTool::new(s.clone());
        tool.execute(&json!({ "mission": "fix the build" }))
            .await
            .unwrap();
        assert_eq!(s.present().unwrap().mission.as_deref(), Some("fix the build"));
    }

    #[tokio::test]
    async fn omitted_mission_clears() {
        let s = storage();
        s.set_mission(Some("old")).unwrap();
        let tool = PresentSetMissionTool::new(s.clone());
        tool.execute(&json!({})).await.unwrap();
        assert!(s.present().unwrap().mission.is_none());
    }

    #[tokio::test]
    async fn update_tasks_replaces_list() {
        let s = storage();
        let tool = PresentUpdateTasksTool::new(s.clone());
        tool.execute(&json!({
            "tasks": [
                { "id": "1", "content": "a", "status": "pending" },
                { "id": "2", "content": "b", "status": "blocked", "blocked_reason": "ci down" },
            ]
        }))
        .await
        .unwrap();
        let tasks = s.present().unwrap().tasks;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].blocked_reason.as_deref(), Some("ci down"));
    }

    #[tokio::test]
    async fn malformed_task_status_is_an_error() {
        let s = storage();
        let tool = PresentUpdateTasksTool::new(s);
        let result = tool
            .execute(&json!({
                "tasks": [{ "id": "1", "content": "a", "status": "daydreaming" }]
            }))
            .await;
        assert!(result.is_err());
    }
}
