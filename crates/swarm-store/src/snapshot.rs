//! The exported snapshot: canonical JSON, checksum, meta block.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

use swarm_core::Task;

use crate::error::StoreError;

pub const TASKS_SCHEMA_VERSION: u64 = 1;
pub const TASKS_MANAGED_BY: &str = "agentctl";
pub const TASKS_CHECKSUM_ALGO: &str = "sha256";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TasksMeta {
    #[serde(default)]
    pub schema_version: u64,
    #[serde(default)]
    pub managed_by: String,
    #[serde(default)]
    pub checksum_algo: String,
    #[serde(default)]
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SnapshotDoc {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<TasksMeta>,
}

/// `{"tasks":[…]}` with sorted keys and compact separators. serde_json's
/// BTreeMap-backed objects provide the sorted form directly.
pub fn canonical_tasks_payload(tasks: &[Task]) -> Result<String, StoreError> {
    let value =
        serde_json::to_value(serde_json::json!({ "tasks": tasks })).map_err(|source| {
            StoreError::InvalidTask {
                message: format!("task set is not serializable: {source}"),
            }
        })?;
    Ok(value.to_string())
}

pub fn compute_tasks_checksum(tasks: &[Task]) -> Result<String, StoreError> {
    let payload = canonical_tasks_payload(tasks)?;
    Ok(hex::encode(Sha256::digest(payload.as_bytes())))
}

/// Same checksum computed over the raw JSON array of a snapshot file.
pub fn compute_raw_checksum(tasks: &Value) -> String {
    let payload = serde_json::json!({ "tasks": tasks }).to_string();
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// The dependency-state cache key doubles as the checksum.
pub fn tasks_cache_key(tasks: &[Task]) -> Result<String, StoreError> {
    compute_tasks_checksum(tasks)
}

pub fn build_meta(tasks: &[Task]) -> Result<TasksMeta, StoreError> {
    Ok(TasksMeta {
        schema_version: TASKS_SCHEMA_VERSION,
        managed_by: TASKS_MANAGED_BY.to_string(),
        checksum_algo: TASKS_CHECKSUM_ALGO.to_string(),
        checksum: compute_tasks_checksum(tasks)?,
    })
}

/// Writes the snapshot document with a freshly computed meta block.
pub fn write_snapshot(path: &Path, tasks: &[Task]) -> Result<(), StoreError> {
    let doc = SnapshotDoc {
        tasks: tasks.to_vec(),
        meta: Some(build_meta(tasks)?),
    };
    let value = serde_json::to_value(&doc).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let body = serde_json::to_string_pretty(&value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, body + "\n").map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_snapshot(path: &Path) -> Result<SnapshotDoc, StoreError> {
    if !path.exists() {
        return Err(StoreError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let body = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Raw snapshot value for lint, preserving whatever is in the file.
pub fn read_snapshot_value(path: &Path) -> Result<Value, StoreError> {
    if !path.exists() {
        return Err(StoreError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let body = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use swarm_core::TaskStatus;

    fn unique_temp_file(prefix: &str) -> PathBuf {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!("swarm-snapshot-{prefix}-{now}.json"))
    }

    fn sample_tasks() -> Vec<Task> {
        let mut a = Task::new("202501020304-ABCD12", "Add cache");
        a.status = TaskStatus::Doing;
        a.tags = vec!["code".to_string()];
        let b = Task::new("202501020305-XYZW99", "Write docs");
        vec![a, b]
    }

    #[test]
    fn canonical_payload_has_sorted_keys_and_compact_separators() {
        let payload = canonical_tasks_payload(&sample_tasks()).unwrap();
        assert!(payload.starts_with("{\"tasks\":[{\""));
        assert!(!payload.contains(": "), "no space separators");
        // "id" sorts before "status" and "title".
        let id_pos = payload.find("\"id\"").unwrap();
        let status_pos = payload.find("\"status\"").unwrap();
        let title_pos = payload.find("\"title\"").unwrap();
        assert!(id_pos < status_pos && status_pos < title_pos);
    }

    #[test]
    fn checksum_is_stable_and_content_sensitive() {
        let tasks = sample_tasks();
        let first = compute_tasks_checksum(&tasks).unwrap();
        let second = compute_tasks_checksum(&tasks).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        let mut changed = tasks.clone();
        changed[0].title = "Add better cache".to_string();
        assert_ne!(first, compute_tasks_checksum(&changed).unwrap());
    }

    #[test]
    fn write_then_read_round_trips_with_valid_meta() {
        let path = unique_temp_file("roundtrip");
        let tasks = sample_tasks();
        write_snapshot(&path, &tasks).expect("write snapshot");

        let doc = read_snapshot(&path).expect("read snapshot");
        assert_eq!(doc.tasks, tasks);
        let meta = doc.meta.expect("meta");
        assert_eq!(meta.schema_version, TASKS_SCHEMA_VERSION);
        assert_eq!(meta.managed_by, TASKS_MANAGED_BY);
        assert_eq!(meta.checksum_algo, TASKS_CHECKSUM_ALGO);
        assert_eq!(meta.checksum, compute_tasks_checksum(&tasks).unwrap());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn raw_checksum_matches_typed_checksum() {
        let path = unique_temp_file("raw");
        let tasks = sample_tasks();
        write_snapshot(&path, &tasks).expect("write snapshot");

        let value = read_snapshot_value(&path).expect("read raw");
        let raw = compute_raw_checksum(&value["tasks"]);
        assert_eq!(raw, compute_tasks_checksum(&tasks).unwrap());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_snapshot_is_a_typed_error() {
        let err = read_snapshot(Path::new("/nonexistent/tasks.json")).expect_err("missing");
        assert!(matches!(err, StoreError::MissingFile { .. }));
    }
}
