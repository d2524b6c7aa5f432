//! Agent descriptors: `<agents-dir>/*.json` with `{ id, role, ... }`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::config::ConfigError;

pub const OWNER_HUMAN: &str = "HUMAN";
pub const OWNER_ORCHESTRATOR: &str = "ORCHESTRATOR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: String,
}

/// Loads every agent descriptor, sorted by file name.
pub fn load_agent_descriptors(
    agents_dir: &Path,
) -> Result<Vec<(String, AgentDescriptor)>, ConfigError> {
    let mut out = Vec::new();
    if !agents_dir.exists() {
        return Ok(out);
    }
    let entries = fs::read_dir(agents_dir).map_err(|source| ConfigError::Read {
        path: agents_dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect();
    paths.sort();
    for path in paths {
        let body = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let descriptor: AgentDescriptor =
            serde_json::from_str(&body).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push((file_name, descriptor));
    }
    Ok(out)
}

/// Only the uppercase ids are consumed for owner validation.
pub fn load_agents_index(agents_dir: &Path) -> Result<BTreeSet<String>, ConfigError> {
    let mut ids = BTreeSet::new();
    for (_, descriptor) in load_agent_descriptors(agents_dir)? {
        let id = descriptor.id.trim().to_uppercase();
        if !id.is_empty() {
            ids.insert(id);
        }
    }
    Ok(ids)
}

/// HUMAN and ORCHESTRATOR are always accepted; anything else must be a
/// known agent id (when any agents are declared at all).
pub fn validate_owner(owner: &str, known: &BTreeSet<String>) -> Result<(), String> {
    let owner_upper = owner.trim().to_uppercase();
    if owner_upper.is_empty() {
        return Err("owner must be non-empty".to_string());
    }
    if owner_upper == OWNER_HUMAN || owner_upper == OWNER_ORCHESTRATOR {
        return Ok(());
    }
    if !known.is_empty() && !known.contains(&owner_upper) {
        return Err(
            "Owner must be an existing agent id. If a new agent is required, create it via CREATOR first."
                .to_string(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!("swarm-agents-{prefix}-{now}"))
    }

    #[test]
    fn loads_ids_uppercased() {
        let dir = unique_temp_dir("load");
        fs::create_dir_all(&dir).expect("create dir");
        fs::write(dir.join("coder.json"), r#"{"id": "coder", "role": "writes code"}"#)
            .expect("write coder");
        fs::write(dir.join("reviewer.json"), r#"{"id": "REVIEWER"}"#).expect("write reviewer");
        fs::write(dir.join("notes.txt"), "ignored").expect("write noise");

        let ids = load_agents_index(&dir).expect("load agents");
        assert!(ids.contains("CODER"));
        assert!(ids.contains("REVIEWER"));
        assert_eq!(ids.len(), 2);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_dir_is_empty_index() {
        let dir = unique_temp_dir("missing");
        let ids = load_agents_index(&dir).expect("load agents");
        assert!(ids.is_empty());
    }

    #[test]
    fn validate_owner_special_cases_and_known_ids() {
        let known: BTreeSet<String> = ["CODER".to_string()].into_iter().collect();
        assert!(validate_owner("HUMAN", &known).is_ok());
        assert!(validate_owner("orchestrator", &known).is_ok());
        assert!(validate_owner("coder", &known).is_ok());
        assert!(validate_owner("GHOST", &known).is_err());
        assert!(validate_owner("  ", &known).is_err());
    }

    #[test]
    fn validate_owner_accepts_anything_without_agents() {
        let known = BTreeSet::new();
        assert!(validate_owner("ANYONE", &known).is_ok());
    }
}
