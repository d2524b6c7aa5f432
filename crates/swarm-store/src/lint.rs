//! Snapshot lint: schema shapes, owner/tag/commit rules, readiness, and
//! checksum re-verification (manual-edit detection).
//!
//! Lint works on the raw JSON so malformed records produce granular
//! messages instead of one deserialization failure.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use swarm_core::{compute_dependency_state, CommitRecord, Task, TaskIndex, TaskStatus};

use crate::error::StoreError;
use crate::snapshot::{compute_raw_checksum, read_snapshot_value, TASKS_CHECKSUM_ALGO, TASKS_MANAGED_BY};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LintReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn lint_snapshot_file(
    path: &Path,
    known_agents: &BTreeSet<String>,
    required_tags: &BTreeSet<String>,
) -> Result<LintReport, StoreError> {
    let doc = read_snapshot_value(path)?;
    Ok(lint_snapshot_value(&doc, known_agents, required_tags))
}

pub fn lint_snapshot_value(
    doc: &Value,
    known_agents: &BTreeSet<String>,
    required_tags: &BTreeSet<String>,
) -> LintReport {
    let mut errors: Vec<String> = Vec::new();
    let warnings: Vec<String> = Vec::new();

    let Some(tasks) = doc.get("tasks").and_then(Value::as_array) else {
        return LintReport {
            errors: vec!["snapshot must contain a top-level 'tasks' list".to_string()],
            warnings,
        };
    };

    match doc.get("meta").and_then(Value::as_object) {
        None => errors.push(
            "snapshot is missing a top-level 'meta' object (manual edits are not allowed)"
                .to_string(),
        ),
        Some(meta) => {
            let algo = meta.get("checksum_algo").and_then(Value::as_str).unwrap_or("");
            if algo != TASKS_CHECKSUM_ALGO {
                errors.push(format!("snapshot meta.checksum_algo must be '{TASKS_CHECKSUM_ALGO}'"));
            }
            let managed_by = meta.get("managed_by").and_then(Value::as_str).unwrap_or("");
            if managed_by != TASKS_MANAGED_BY {
                errors.push(format!("snapshot meta.managed_by must be '{TASKS_MANAGED_BY}'"));
            }
            let checksum = meta.get("checksum").and_then(Value::as_str).unwrap_or("");
            if checksum.is_empty() {
                errors.push("snapshot meta.checksum is missing/empty".to_string());
            } else if checksum != compute_raw_checksum(doc.get("tasks").unwrap_or(&Value::Null)) {
                errors.push(
                    "snapshot meta.checksum does not match tasks payload (manual edit?)"
                        .to_string(),
                );
            }
        }
    }

    let mut tasks_by_id: BTreeMap<String, &Value> = BTreeMap::new();
    for (position, task) in tasks.iter().enumerate() {
        let Some(record) = task.as_object() else {
            errors.push(format!("tasks[{position}] must be an object"));
            continue;
        };
        let task_id = record
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string();
        if task_id.is_empty() {
            errors.push(format!("tasks[{position}] is missing a non-empty id"));
            continue;
        }
        if tasks_by_id.contains_key(&task_id) {
            errors.push(format!(
                "Duplicate task id found: {task_id} (keeping first, ignoring later entries)"
            ));
            continue;
        }
        tasks_by_id.insert(task_id, task);
    }

    let lite_index = lite_index(&tasks_by_id);
    let (dep_state, dep_warnings) = compute_dependency_state(&lite_index);
    errors.extend(dep_warnings);

    for (task_id, task) in &tasks_by_id {
        let status_raw = task
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("TODO")
            .trim()
            .to_uppercase();
        let status = status_raw.parse::<TaskStatus>();
        if status.is_err() {
            errors.push(format!("{task_id}: invalid status '{status_raw}'"));
        }

        if !is_non_empty_string(task.get("title")) {
            errors.push(format!("{task_id}: title must be a non-empty string"));
        }
        if let Some(description) = task.get("description") {
            if !is_non_empty_string(Some(description)) {
                errors.push(format!(
                    "{task_id}: description must be a non-empty string when present"
                ));
            }
        }

        if let Some(owner) = task.get("owner") {
            if !is_non_empty_string(Some(owner)) {
                errors.push(format!(
                    "{task_id}: owner must be a non-empty string when present"
                ));
            }
        }
        let owner_upper = task
            .get("owner")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_uppercase();
        if !owner_upper.is_empty()
            && !known_agents.is_empty()
            && !known_agents.contains(&owner_upper)
            && owner_upper != "HUMAN"
            && owner_upper != "ORCHESTRATOR"
        {
            errors.push(format!("{task_id}: owner '{owner_upper}' is not a known agent id"));
        }

        if let Some(tags_value) = task.get("tags") {
            if !is_string_list(tags_value) {
                errors.push(format!("{task_id}: tags must be a list of non-empty strings"));
            }
        }
        if let Some(verify_value) = task.get("verify") {
            if !is_string_list(verify_value) {
                errors.push(format!("{task_id}: verify must be a list of non-empty strings"));
            }
        }

        let tags = string_list(task.get("tags"));
        let verify = string_list(task.get("verify"));
        let needs_verify = tags
            .iter()
            .map(|tag| tag.to_lowercase())
            .any(|tag| required_tags.contains(&tag));
        if needs_verify && verify.is_empty() {
            errors.push(format!(
                "{task_id}: verify commands are required for tasks with {} tags",
                join_tags(required_tags)
            ));
        }

        if let Some(comments) = task.get("comments") {
            match comments.as_array() {
                None => errors.push(format!("{task_id}: comments must be a list")),
                Some(items) => {
                    for (idx, comment) in items.iter().enumerate() {
                        let Some(record) = comment.as_object() else {
                            errors.push(format!("{task_id}: comments[{idx}] must be an object"));
                            continue;
                        };
                        if !is_non_empty_string(record.get("author")) {
                            errors.push(format!(
                                "{task_id}: comments[{idx}].author must be a non-empty string"
                            ));
                        }
                        if !is_non_empty_string(record.get("body")) {
                            errors.push(format!(
                                "{task_id}: comments[{idx}].body must be a non-empty string"
                            ));
                        }
                    }
                }
            }
        }

        let info = dep_state.get(task_id.as_str());
        let unready = info
            .map(|info| !info.missing.is_empty() || !info.incomplete.is_empty())
            .unwrap_or(false);
        if matches!(status, Ok(TaskStatus::Doing) | Ok(TaskStatus::Done)) && unready {
            errors.push(format!(
                "{task_id}: status {status_raw} but dependencies are not satisfied"
            ));
        }

        if status == Ok(TaskStatus::Done) {
            match task.get("commit").and_then(Value::as_object) {
                None => errors.push(format!("{task_id}: DONE tasks must include commit metadata")),
                Some(commit) => {
                    let hash = commit.get("hash").and_then(Value::as_str).unwrap_or("").trim();
                    let message = commit
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .trim();
                    if hash.len() < 7 {
                        errors.push(format!("{task_id}: commit.hash must be a git hash"));
                    }
                    if message.is_empty() {
                        errors.push(format!("{task_id}: commit.message must be non-empty"));
                    }
                }
            }
        }
    }

    let mut errors: Vec<String> = errors.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    errors.sort();
    LintReport { errors, warnings }
}

/// A minimal typed projection (id/status/depends_on/commit) so the shared
/// dependency computation can run over partially malformed records.
fn lite_index(tasks_by_id: &BTreeMap<String, &Value>) -> TaskIndex {
    let mut index = TaskIndex::new();
    for (task_id, task) in tasks_by_id {
        let mut lite = Task::new(task_id.clone(), "lint");
        lite.status = task
            .get("status")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<TaskStatus>().ok())
            .unwrap_or(TaskStatus::Todo);
        lite.depends_on = string_list(task.get("depends_on"));
        lite.commit = task.get("commit").and_then(|commit| {
            serde_json::from_value::<CommitRecord>(commit.clone()).ok()
        });
        index.insert(task_id.clone(), lite);
    }
    index
}

fn is_non_empty_string(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .is_some_and(|text| !text.is_empty())
}

fn is_string_list(value: &Value) -> bool {
    value.as_array().is_some_and(|items| {
        items
            .iter()
            .all(|item| item.as_str().map(str::trim).is_some_and(|text| !text.is_empty()))
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn join_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().cloned().collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::write_snapshot;
    use std::path::PathBuf;
    use swarm_core::DEFAULT_VERIFY_REQUIRED_TAGS;

    fn required_tags() -> BTreeSet<String> {
        DEFAULT_VERIFY_REQUIRED_TAGS
            .iter()
            .map(|tag| tag.to_string())
            .collect()
    }

    fn agents() -> BTreeSet<String> {
        ["CODER".to_string(), "REVIEWER".to_string()]
            .into_iter()
            .collect()
    }

    fn unique_snapshot(prefix: &str) -> PathBuf {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!("swarm-lint-{prefix}-{now}/tasks.json"))
    }

    fn write_sample(path: &Path) {
        let mut done = Task::new("202501020304-ABCD12", "Add cache");
        done.status = TaskStatus::Done;
        done.owner = Some("CODER".to_string());
        done.tags = vec!["code".to_string()];
        done.verify = vec!["make test".to_string()];
        done.commit = Some(CommitRecord {
            hash: "abcdef0123456".to_string(),
            message: "✅ ABCD12 close".to_string(),
        });
        let mut next = Task::new("202501020305-WXYZ99", "Use cache");
        next.owner = Some("REVIEWER".to_string());
        next.depends_on = vec!["202501020304-ABCD12".to_string()];
        write_snapshot(path, &[done, next]).expect("write snapshot");
    }

    #[test]
    fn clean_snapshot_lints_clean() {
        let path = unique_snapshot("clean");
        write_sample(&path);
        let report = lint_snapshot_file(&path, &agents(), &required_tags()).expect("lint");
        assert!(report.is_clean(), "errors: {:?}", report.errors);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn manual_edit_breaks_checksum() {
        let path = unique_snapshot("edited");
        write_sample(&path);
        let body = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, body.replace("Add cache", "Tampered title")).unwrap();

        let report = lint_snapshot_file(&path, &agents(), &required_tags()).expect("lint");
        assert!(report
            .errors
            .iter()
            .any(|error| error.contains("does not match tasks payload")));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    fn lint_value(doc: Value) -> LintReport {
        lint_snapshot_value(&doc, &agents(), &required_tags())
    }

    #[test]
    fn missing_meta_and_bad_records_are_reported() {
        let report = lint_value(serde_json::json!({
            "tasks": [
                { "id": "T1", "title": "", "status": "WAITING" },
                "not-an-object"
            ]
        }));
        assert!(report.errors.iter().any(|e| e.contains("missing a top-level 'meta'")));
        assert!(report.errors.iter().any(|e| e.contains("invalid status 'WAITING'")));
        assert!(report.errors.iter().any(|e| e.contains("title must be a non-empty string")));
        assert!(report.errors.iter().any(|e| e.contains("tasks[1] must be an object")));
    }

    #[test]
    fn unknown_owner_and_verify_rules() {
        let report = lint_value(serde_json::json!({
            "tasks": [
                { "id": "T1", "title": "x", "status": "TODO", "owner": "GHOST",
                  "tags": ["code"] }
            ]
        }));
        assert!(report.errors.iter().any(|e| e.contains("not a known agent id")));
        assert!(report.errors.iter().any(|e| e.contains("verify commands are required")));
    }

    #[test]
    fn human_owner_is_always_known() {
        let report = lint_value(serde_json::json!({
            "tasks": [{ "id": "T1", "title": "x", "status": "TODO", "owner": "HUMAN" }]
        }));
        assert!(!report.errors.iter().any(|e| e.contains("known agent id")));
    }

    #[test]
    fn done_without_commit_and_unready_status_fail() {
        let report = lint_value(serde_json::json!({
            "tasks": [
                { "id": "A", "title": "a", "status": "DOING", "depends_on": ["B"] },
                { "id": "B", "title": "b", "status": "DONE" }
            ]
        }));
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("B: DONE tasks must include commit metadata")));
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("A: status DOING but dependencies are not satisfied")));
    }

    #[test]
    fn cycles_are_lint_errors() {
        let report = lint_value(serde_json::json!({
            "tasks": [
                { "id": "A", "title": "a", "status": "TODO", "depends_on": ["B"] },
                { "id": "B", "title": "b", "status": "TODO", "depends_on": ["A"] }
            ]
        }));
        assert!(report.errors.iter().any(|e| e.contains("Dependency cycle detected")));
    }

    #[test]
    fn malformed_comments_are_reported() {
        let report = lint_value(serde_json::json!({
            "tasks": [
                { "id": "T1", "title": "x", "status": "TODO",
                  "comments": [{ "author": "", "body": "hi" }, 7] }
            ]
        }));
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("comments[0].author must be a non-empty string")));
        assert!(report.errors.iter().any(|e| e.contains("comments[1] must be an object")));
    }
}
