// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use miriad_store::{LtmEntry, Storage, StoreError};

use crate::Tool;

/// Render an LTM entry for the model: stable fields only, version included so
/// the model can thread it back through the CAS tools.
fn render_entry(entry: &LtmEntry) -> Value {
    json!({
        "slug": entry.slug,
        "path": entry.path,
        "title": entry.title,
        "body": entry.body,
        "tags": entry.tags,
        "links": entry.links,
        "version": entry.version,
        "updated_by": entry.updated_by,
        "updated_at": entry.updated_at,
    })
}

/// CAS failures come back to the model as a structured payload rather than a
/// bare message, so it can re-read and retry with the right version.
fn cas_error_payload(err: &StoreError) -> Option<String> {
    let payload = match err {
        StoreError::NotFound(slug) => json!({ "error": "not_found", "slug": slug }),
        StoreError::Archived(slug) => json!({ "error": "archived", "slug": slug }),
        StoreError::Conflict { expected, actual } => json!({
            "error": "conflict",
            "expected_version": expected,
            "actual_version": actual,
            "hint": "re-read the entry and retry with the current version",
        }),
        _ => return None,
    };
    Some(payload.to_string())
}

fn string_vec(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

// ─── ltm_create ───────────────────────────────────────────────────────────────

pub struct LtmCreateTool {
    storage: Arc<Storage>,
}

impl LtmCreateTool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for LtmCreateTool {
    fn name(&self) -> &str {
        "ltm_create"
    }
    fn description(&self) -> &str {
        "Create a long-term memory entry. The path is derived from the parent and fixed forever."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": { "type": "string", "description": "Unique key, no slashes" },
                "parent_slug": { "type": "string" },
                "title": { "type": "string" },
                "body": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "links": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["slug", "title", "body"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let slug = args["slug"].as_str().unwrap_or_default();
        let parent = args.get("parent_slug").and_then(|v| v.as_str());
        let title = args["title"].as_str().unwrap_or_default();
        let body = args["body"].as_str().unwrap_or_default();
        match self.storage.ltm_create(
            slug,
            parent,
            title,
            body,
            &string_vec(args, "tags"),
            &string_vec(args, "links"),
            "main",
        ) {
            Ok(entry) => Ok(render_entry(&entry).to_string()),
            Err(e) => match cas_error_payload(&e) {
                Some(payload) => Ok(payload),
                None => Err(e.into()),
            },
        }
    }
}

// ─── ltm_read ─────────────────────────────────────────────────────────────────

pub struct LtmReadTool {
    storage: Arc<Storage>,
}

impl LtmReadTool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for LtmReadTool {
    fn name(&self) -> &str {
        "ltm_read"
    }
    fn description(&self) -> &str {
        "Read a long-term memory entry by slug. Archived entries read as missing."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "slug": { "type": "string" } },
            "required": ["slug"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let slug = args["slug"].as_str().unwrap_or_default();
        match self.storage.ltm_read(slug)? {
            Some(entry) => Ok(render_entry(&entry).to_string()),
            None => Ok(json!({ "error": "not_found", "slug": slug }).to_string()),
        }
    }
}

// ─── ltm_update ───────────────────────────────────────────────────────────────

pub struct LtmUpdateTool {
    storage: Arc<Storage>,
}

impl LtmUpdateTool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for LtmUpdateTool {
    fn name(&self) -> &str {
        "ltm_update"
    }
    fn description(&self) -> &str {
        "Replace the body of an entry. Requires the entry's current version; \
         on conflict, re-read and retry."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": { "type": "string" },
                "body": { "type": "string" },
                "expected_version": { "type": "integer", "minimum": 1 }
            },
            "required": ["slug", "body", "expected_version"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let slug = args["slug"].as_str().unwrap_or_default();
        let body = args["body"].as_str().unwrap_or_default();
        let expected = args["expected_version"].as_i64().unwrap_or(0);
        match self.storage.ltm_update(slug, body, expected, "main") {
            Ok(entry) => Ok(render_entry(&entry).to_string()),
            Err(e) => match cas_error_payload(&e) {
                Some(payload) => Ok(payload),
                None => Err(e.into()),
            },
        }
    }
}

// ─── ltm_update_tags ──────────────────────────────────────────────────────────

pub struct LtmUpdateTagsTool {
    storage: Arc<Storage>,
}

impl LtmUpdateTagsTool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for LtmUpdateTagsTool {
    fn name(&self) -> &str {
        "ltm_update_tags"
    }
    fn description(&self) -> &str {
        "Replace the tag list of an entry, guarded by the current version."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "expected_version": { "type": "integer", "minimum": 1 }
            },
            "required": ["slug", "tags", "expected_version"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let slug = args["slug"].as_str().unwrap_or_default();
        let expected = args["expected_version"].as_i64().unwrap_or(0);
        match self
            .storage
            .ltm_update_tags(slug, &string_vec(args, "tags"), expected, "main")
        {
            Ok(entry) => Ok(render_entry(&entry).to_string()),
            Err(e) => match cas_error_payload(&e) {
                Some(payload) => Ok(payload),
                None => Err(e.into()),
            },
        }
    }
}

// ─── ltm_archive ──────────────────────────────────────────────────────────────

pub struct LtmArchiveTool {
    storage: Arc<Storage>,
}

impl LtmArchiveTool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for LtmArchiveTool {
    fn name(&self) -> &str {
        "ltm_archive"
    }
    fn description(&self) -> &str {
        "Archive an entry so it disappears from reads. Guarded by the current version."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": { "type": "string" },
                "expected_version": { "type": "integer", "minimum": 1 }
            },
            "required": ["slug", "expected_version"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let slug = args["slug"].as_str().unwrap_or_default();
        let expected = args["expected_version"].as_i64().unwrap_or(0);
        match self.storage.ltm_archive(slug, expected) {
            Ok(_) => Ok(json!({ "archived": slug }).to_string()),
            Err(e) => match cas_error_payload(&e) {
                Some(payload) => Ok(payload),
                None => Err(e.into()),
            },
        }
    }
}

// ─── ltm_list ─────────────────────────────────────────────────────────────────

pub struct LtmListTool {
    storage: Arc<Storage>,
}

impl LtmListTool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for LtmListTool {
    fn name(&self) -> &str {
        "ltm_list"
    }
    fn description(&self) -> &str {
        "List children of an entry (or root entries), or glob over paths with `pattern`."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "parent_slug": { "type": "string" },
                "pattern": { "type": "string", "description": "Path glob, e.g. /projects/*" },
                "max_depth": { "type": "integer", "minimum": 1 }
            },
            "additionalProperties": false
        })
    }
    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let entries = match args.get("pattern").and_then(|v| v.as_str()) {
            Some(pattern) => {
                let max_depth = args
                    .get("max_depth")
                    .and_then(|v| v.as_u64())
                    .map(|d| d as usize);
                self.storage.ltm_glob(pattern, max_depth)?
            }
            None => self
                .storage
                .ltm_children(args.get("parent_slug").and_then(|v| v.as_str()))?,
        };
        let listed: Vec<Value> = entries
            .iter()
            .map(|e| json!({ "slug": e.slug, "path": e.path, "title": e.title, "version": e.version }))
            .collect();
        Ok(json!(listed).to_string())
    }
}

// ─── ltm_search ───────────────────────────────────────────────────────────────

pub struct LtmSearchTool {
    storage: Arc<Storage>,
}

impl LtmSearchTool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for LtmSearchTool {
    fn name(&self) -> &str {
        "ltm_search"
    }
    fn description(&self) -> &str {
        "Search entry titles and bodies (case-insensitive substring), best matches first."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "path_prefix": { "type": "string" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let query = args["query"].as_str().unwrap_or_default();
        let prefix = args.get("path_prefix").and_then(|v| v.as_str());
        let hits = self.storage.ltm_search(query, prefix)?;
        let listed: Vec<Value> = hits
            .iter()
            .map(|h| {
                json!({
                    "slug": h.entry.slug,
                    "path": h.entry.path,
                    "title": h.entry.title,
                    "score": h.score,
                })
            })
            .collect();
        Ok(json!(listed).to_string())
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
    async fn create_then_read_round_trip() {
        let s = storage();
        let create = LtmCreateTool::new(s.clone());
        let created = create
            .execute(&json!({ "slug": "identity", "title": "Identity", "body": "I am miriad" }))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&created).unwrap();
        assert_eq!(parsed["path"], "/identity");
        assert_eq!(parsed["version"], 1);

        let read = LtmReadTool::new(s);
        let body = read.execute(&json!({ "slug": "identity" })).await.unwrap();
        assert!(body.contains("I am miriad"));
    }

    #[tokio::test]
    async fn conflict_surfaces_structured_payload() {
        let s = storage();
        s.ltm_create("x", None, "t", "b", &[], &[], "main").unwrap();
        s.ltm_update("x", "b2", 1, "main").unwrap();

        let update = LtmUpdateTool::new(s);
        let out = update
            .execute(&json!({ "slug": "x", "body": "late", "expected_version": 1 }))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["error"], "conflict");
        assert_eq!(parsed["expected_version"], 1);
        assert_eq!(parsed["actual_version"], 2);
    }

    #[tokio::test]
    async fn read_missing_entry_reports_not_found() {
        let s = storage();
        let read = LtmReadTool::new(s);
        let out = read.execute(&json!({ "slug": "ghost" })).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["error"], "not_found");
    }

    #[tokio::test]
    async fn archive_then_read_is_not_found() {
        let s = storage();
        s.ltm_create("old", None, "t", "b", &[], &[], "main").unwrap();
        let archive = LtmArchiveTool::new(s.clone());
        archive
            .execute(&json!({ "slug": "old", "expected_version": 1 }))
            .await
            .unwrap();
        let read = LtmReadTool::new(s);
        let out = read.execute(&json!({ "slug": "old" })).await.unwrap();
        assert!(out.contains("not_found"));
    }

    #[tokio::test]
    async fn list_with_pattern_globs_paths() {
        let s = storage();
        s.ltm_create("projects", None, "Projects", "", &[], &[], "main")
            .unwrap();
        s.ltm_create("alpha", Some("projects"), "Alpha", "", &[], &[], "main")
            .unwrap();
        let list = LtmListTool::new(s);
        let out = list
            .execute(&json!({ "pattern": "/projects/*" }))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["slug"], "alpha");
    }

    #[tokio::test]
    async fn search_orders_by_score() {
        let s = storage();
        s.ltm_create("a", None, "plain", "contains needle", &[], &[], "main")
            .unwrap();
        s.ltm_create("b", None, "needle factory", "nothing", &[], &[], "main")
            .unwrap();
        let search = LtmSearchTool::new(s);
        let out = search.execute(&json!({ "query": "needle" })).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["slug"], "b");
    }
}
