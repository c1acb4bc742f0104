// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::{params, OptionalExtension, Row};

use crate::{Result, Storage, StoreError};

/// A hierarchical long-term memory entry, keyed by slug and addressable by
/// materialized path.  Mutations use compare-and-swap on the version column.
#[derive(Debug, Clone)]
pub struct LtmEntry {
    pub slug: String,
    pub parent_slug: Option<String>,
    pub path: String,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub version: i64,
    pub created_by: String,
    pub updated_by: String,
    pub archived_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One result of [`Storage::ltm_search`], ordered by descending score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: LtmEntry,
    pub score: u32,
}

const LTM_COLUMNS: &str = "slug, parent_slug, path, title, body, tags, links, version, \
                           created_by, updated_by, archived_at, created_at, updated_at";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<(LtmEntry, String, String)> {
    let tags_json: String = row.get(5)?;
    let links_json: String = row.get(6)?;
    Ok((
        LtmEntry {
            slug: row.get(0)?,
            parent_slug: row.get(1)?,
            path: row.get(2)?,
            title: row.get(3)?,
            body: row.get(4)?,
            tags: Vec::new(),
            links: Vec::new(),
            version: row.get(7)?,
            created_by: row.get(8)?,
            updated_by: row.get(9)?,
            archived_at: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        },
        tags_json,
        links_json,
    ))
}

fn finish_entry(raw: (LtmEntry, String, String)) -> Result<LtmEntry> {
    let (mut entry, tags_json, links_json) = raw;
    entry.tags = serde_json::from_str(&tags_json)?;
    entry.links = serde_json::from_str(&links_json)?;
    Ok(entry)
}

impl Storage {
    /// Create an entry.  The path is materialized from the parent's path at
    /// creation time and is never edited afterwards.
    pub fn ltm_create(
        &self,
        slug: &str,
        parent_slug: Option<&str>,
        title: &str,
        body: &str,
        tags: &[String],
        links: &[String],
        created_by: &str,
    ) -> Result<LtmEntry> {
        if slug.is_empty() || slug.contains('/') {
            return Err(StoreError::Invalid(format!("invalid slug: {slug:?}")));
        }

        let path = match parent_slug {
            Some(parent) => {
                let parent_entry = self
                    .ltm_read_any(parent)?
                    .ok_or_else(|| StoreError::NotFound(parent.to_string()))?;
                if parent_entry.archived_at.is_some() {
                    return Err(StoreError::Archived(parent.to_string()));
                }
                format!("{}/{}", parent_entry.path, slug)
            }
            None => format!("/{slug}"),
        };

        let now = self.now();
        let conn = self.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO ltm_entries
             (slug, parent_slug, path, title, body, tags, links, version,
              created_by, updated_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8, ?9, ?9)",
            params![
                slug,
                parent_slug,
                path,
                title,
                body,
                serde_json::to_string(tags)?,
                serde_json::to_string(links)?,
                created_by,
                now,
            ],
        )?;
        drop(conn);

        if inserted == 0 {
            return Err(StoreError::Invalid(format!("duplicate slug: {slug}")));
        }
        self.ltm_read_any(slug)?
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))
    }

    /// Read an entry; archived entries read as absent.
    pub fn ltm_read(&self, slug: &str) -> Result<Option<LtmEntry>> {
        Ok(self
            .ltm_read_any(slug)?
            .filter(|e| e.archived_at.is_none()))
    }

    /// Read an entry regardless of archival.  Used internally to produce
    /// precise CAS error kinds.
    fn ltm_read_any(&self, slug: &str) -> Result<Option<LtmEntry>> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {LTM_COLUMNS} FROM ltm_entries WHERE slug = ?1"),
                [slug],
                row_to_entry,
            )
            .optional()?;
        drop(conn);
        raw.map(finish_entry).transpose()
    }

    /// CAS update of the body.  Succeeds only when the stored version equals
    /// `expected_version` and the entry is live; bumps the version by exactly
    /// one and stamps `updated_at` / `updated_by`.
    pub fn ltm_update(
        &self,
        slug: &str,
        body: &str,
        expected_version: i64,
        updated_by: &str,
    ) -> Result<LtmEntry> {
        let now = self.now();
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE ltm_entries
             SET body = ?1, version = version + 1, updated_at = ?2, updated_by = ?3
             WHERE slug = ?4 AND version = ?5 AND archived_at IS NULL",
            params![body, now, updated_by, slug, expected_version],
        )?;
        drop(conn);
        self.finish_cas(slug, expected_version, changed)
    }

    /// CAS update of the tag list.
    pub fn ltm_update_tags(
        &self,
        slug: &str,
        tags: &[String],
        expected_version: i64,
        updated_by: &str,
    ) -> Result<LtmEntry> {
        let now = self.now();
        let json = serde_json::to_string(tags)?;
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE ltm_entries
             SET tags = ?1, version = version + 1, updated_at = ?2, updated_by = ?3
             WHERE slug = ?4 AND version = ?5 AND archived_at IS NULL",
            params![json, now, updated_by, slug, expected_version],
        )?;
        drop(conn);
        self.finish_cas(slug, expected_version, changed)
    }

    /// CAS archive.  Archived entries disappear from every read path.
    pub fn ltm_archive(&self, slug: &str, expected_version: i64) -> Result<LtmEntry> {
        let now = self.now();
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE ltm_entries
             SET archived_at = ?1, version = version + 1, updated_at = ?1
             WHERE slug = ?2 AND version = ?3 AND archived_at IS NULL",
            params![now, slug, expected_version],
        )?;
        drop(conn);
        self.finish_cas(slug, expected_version, changed)
    }

    /// On a zero-row CAS result, read the current row to report the precise
    /// failure: missing, archived, or a version mismatch.
    fn finish_cas(&self, slug: &str, expected_version: i64, changed: usize) -> Result<LtmEntry> {
        if changed == 1 {
            return self
                .ltm_read_any(slug)?
                .ok_or_else(|| StoreError::NotFound(slug.to_string()));
        }
        match self.ltm_read_any(slug)? {
            None => Err(StoreError::NotFound(slug.to_string())),
            Some(e) if e.archived_at.is_some() => Err(StoreError::Archived(slug.to_string())),
            Some(e) => Err(StoreError::Conflict {
                expected: expected_version,
                actual: e.version,
            }),
        }
    }

    /// Live children of `parent_slug` (root entries when `None`), sorted by slug.
    pub fn ltm_children(&self, parent_slug: Option<&str>) -> Result<Vec<LtmEntry>> {
        let conn = self.lock();
        let sql = match parent_slug {
            Some(_) => format!(
                "SELECT {LTM_COLUMNS} FROM ltm_entries
                 WHERE parent_slug = ?1 AND archived_at IS NULL ORDER BY slug"
            ),
            None => format!(
                "SELECT {LTM_COLUMNS} FROM ltm_entries
                 WHERE parent_slug IS NULL AND archived_at IS NULL ORDER BY slug"
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let raws: Vec<(LtmEntry, String, String)> = match parent_slug {
            Some(p) => stmt
                .query_map([p], row_to_entry)?
                .collect::<rusqlite::Result<_>>()?,
            None => stmt
                .query_map([], row_to_entry)?
                .collect::<rusqlite::Result<_>>()?,
        };
        drop(stmt);
        drop(conn);
        raws.into_iter().map(finish_entry).collect()
    }

    /// Match live entries by glob on the materialized path.
    ///
    /// Baseline translation: `*` and `**` both become SQL `%` (any path
    /// characters, separators included) and `?` becomes `_`.  `max_depth`
    /// drops rows whose separator count exceeds it.
    pub fn ltm_glob(&self, pattern: &str, max_depth: Option<usize>) -> Result<Vec<LtmEntry>> {
        let like = glob_to_like(pattern);
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LTM_COLUMNS} FROM ltm_entries
             WHERE path LIKE ?1 ESCAPE '\\' AND archived_at IS NULL ORDER BY path"
        ))?;
        let raws: Vec<(LtmEntry, String, String)> = stmt
            .query_map([like], row_to_entry)?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);
        drop(conn);

        let entries: Result<Vec<LtmEntry>> = raws.into_iter().map(finish_entry).collect();
        let mut entries = entries?;
        if let Some(depth) = max_depth {
            entries.retain(|e| e.path.matches('/').count() <= depth);
        }
        Ok(entries)
    }

    /// Case-insensitive substring search over title and body of live entries.
    /// Score = 2·title_match + 1·body_match, descending; ties break by slug.
    pub fn ltm_search(&self, query: &str, path_prefix: Option<&str>) -> Result<Vec<SearchHit>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LTM_COLUMNS} FROM ltm_entries WHERE archived_at IS NULL"
        ))?;
        let raws: Vec<(LtmEntry, String, String)> = stmt
            .query_map([], row_to_entry)?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);
        drop(conn);

        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        for raw in raws {
            let entry = finish_entry(raw)?;
            if let Some(prefix) = path_prefix {
                if !entry.path.starts_with(prefix) {
                    continue;
                }
            }
            let title_match = entry.title.to_lowercase().contains(&needle) as u32;
            let body_match = entry.body.to_lowercase().contains(&needle) as u32;
            let score = 2 * title_match + body_match;
            if score > 0 {
                hits.push(SearchHit { entry, score });
            }
        }
        hits.sort_by(|a, b| b.score.cmp(&a.score).then(a.entry.slug.cmp(&b.entry.slug)));
        Ok(hits)
    }
}

/// Translate a path glob into a SQL LIKE pattern, escaping LIKE's own
/// metacharacters.  `*` and `**` deliberately collapse to the same `%`
/// wildcard in this baseline; depth filtering happens after the match.
fn glob_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                // Swallow a doubled star; both forms match any characters.
                if chars.peek() == Some(&'*') {
                    chars.next();
                }
                out.push('%');
            }
            '?' => out.push('_'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Storage {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .ltm_create("identity", None, "Identity", "I am the agent", &[], &[], "main")
            .unwrap();
        storage
            .ltm_create(
                "projects",
                None,
                "Projects",
                "Root of project notes",
                &[],
                &[],
                "main",
            )
            .unwrap();
        storage
            .ltm_create(
                "alpha",
                Some("projects"),
                "Project Alpha",
                "Notes about alpha",
                &["project".into()],
                &[],
                "main",
            )
            .unwrap();
        storage
    }

    // ── Create & path derivation ──────────────────────────────────────────────

    #[test]
    fn root_path_is_slash_slug() {
        let storage = seeded();
        let e = storage.ltm_read("identity").unwrap().unwrap();
        assert_eq!(e.path, "/identity");
        assert_eq!(e.version, 1);
    }

    #[test]
    fn child_path_extends_parent_path() {
        let storage = seeded();
        let e = storage.ltm_read("alpha").unwrap().unwrap();
        assert_eq!(e.path, "/projects/alpha");
        assert_eq!(e.parent_slug.as_deref(), Some("projects"));
    }

    #[test]
    fn duplicate_slug_is_rejected() {
        let storage = seeded();
        let err = storage
            .ltm_create("identity", None, "t", "b", &[], &[], "main")
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn missing_parent_is_not_found() {
        let storage = Storage::open_in_memory().unwrap();
        let err = storage
            .ltm_create("child", Some("ghost"), "t", "b", &[], &[], "main")
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn slug_with_slash_is_invalid() {
        let storage = Storage::open_in_memory().unwrap();
        let err = storage
            .ltm_create("a/b", None, "t", "b", &[], &[], "main")
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    // ── CAS protocol ──────────────────────────────────────────────────────────

    #[test]
    fn update_with_matching_version_bumps_by_one() {
        let storage = seeded();
        let updated = storage
            .ltm_update("identity", "new body", 1, "ltm-reflect")
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.body, "new body");
        assert_eq!(updated.updated_by, "ltm-reflect");
    }

    #[test]
    fn update_with_stale_version_is_conflict_and_noop() {
        let storage = seeded();
        storage.ltm_update("identity", "v2 body", 1, "main").unwrap();
        let err = storage
            .ltm_update("identity", "should not land", 1, "main")
            .unwrap_err();
        match err {
            StoreError::Conflict { expected, actual } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
        // State unchanged by the losing writer.
        let e = storage.ltm_read("identity").unwrap().unwrap();
        assert_eq!(e.body, "v2 body");
        assert_eq!(e.version, 2);
    }

    #[test]
    fn update_unknown_slug_is_not_found() {
        let storage = Storage::open_in_memory().unwrap();
        let err = storage.ltm_update("ghost", "b", 1, "main").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn update_archived_entry_reports_archived_not_conflict() {
        let storage = seeded();
        storage.ltm_archive("identity", 1).unwrap();
        let err = storage.ltm_update("identity", "b", 2, "main").unwrap_err();
        assert!(matches!(err, StoreError::Archived(_)), "got {err:?}");
    }

    #[test]
    fn update_tags_bumps_version() {
        let storage = seeded();
        let updated = storage
            .ltm_update_tags("alpha", &["project".into(), "active".into()], 1, "main")
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.tags, vec!["project".to_string(), "active".to_string()]);
    }

    #[test]
    fn archive_sets_timestamp_and_bumps_version() {
        let storage = seeded();
        let archived = storage.ltm_archive("alpha", 1).unwrap();
        assert!(archived.archived_at.is_some());
        assert_eq!(archived.version, 2);
    }

    // ── Archived invisibility ─────────────────────────────────────────────────

    #[test]
    fn archived_entries_hidden_from_all_reads() {
        let storage = seeded();
        storage.ltm_archive("alpha", 1).unwrap();

        assert!(storage.ltm_read("alpha").unwrap().is_none());
        assert!(storage.ltm_children(Some("projects")).unwrap().is_empty());
        assert!(storage.ltm_glob("/projects/*", None).unwrap().is_empty());
        assert!(storage.ltm_search("alpha", None).unwrap().is_empty());
    }

    // ── Children ──────────────────────────────────────────────────────────────

    #[test]
    fn children_of_root_are_parentless() {
        let storage = seeded();
        let roots = storage.ltm_children(None).unwrap();
        let slugs: Vec<&str> = roots.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["identity", "projects"]);
    }

    // ── Glob ──────────────────────────────────────────────────────────────────

    #[test]
    fn glob_star_matches_across_separators() {
        let storage = seeded();
        let hits = storage.ltm_glob("/proj*", None).unwrap();
        // Baseline semantics: `*` crosses separators, so the child matches too.
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn glob_max_depth_filters_deep_paths() {
        let storage = seeded();
        let hits = storage.ltm_glob("/proj*", Some(1)).unwrap();
        let slugs: Vec<&str> = hits.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["projects"]);
    }

    #[test]
    fn glob_question_mark_matches_single_char() {
        let storage = seeded();
        let hits = storage.ltm_glob("/identit?", None).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn glob_escapes_like_metacharacters() {
        assert_eq!(glob_to_like("/a_b%c"), "/a\\_b\\%c");
        assert_eq!(glob_to_like("/x/**"), "/x/%");
        assert_eq!(glob_to_like("/x/*"), "/x/%");
    }

    // ── Search ────────────────────────────────────────────────────────────────

    #[test]
    fn title_match_outranks_body_match() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .ltm_create("a", None, "nothing here", "mentions rust once", &[], &[], "main")
            .unwrap();
        storage
            .ltm_create("b", None, "rust handbook", "other text", &[], &[], "main")
            .unwrap();
        let hits = storage.ltm_search("rust", None).unwrap();
        assert_eq!(hits[0].entry.slug, "b");
        assert_eq!(hits[0].score, 2);
        assert_eq!(hits[1].entry.slug, "a");
        assert_eq!(hits[1].score, 1);
    }

    #[test]
    fn title_and_body_match_scores_three() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .ltm_create("n", None, "Rust notes", "all about rust", &[], &[], "main")
            .unwrap();
        let hits = storage.ltm_search("RUST", None).unwrap();
        assert_eq!(hits[0].score, 3, "search must be case-insensitive");
    }

    #[test]
    fn search_path_prefix_filters() {
        let storage = seeded();
        let hits = storage.ltm_search("notes", Some("/projects")).unwrap();
        assert!(hits.iter().all(|h| h.entry.path.starts_with("/projects")));
    }
}
