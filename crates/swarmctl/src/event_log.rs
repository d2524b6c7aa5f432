//! JSONL operation log under `.codex-swarm/events/`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use swarm_core::Event;

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize event: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append to log file {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlEventLog {
    pub root: PathBuf,
    pub global_file: PathBuf,
    pub task_dir: PathBuf,
}

impl JsonlEventLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let global_file = root.join("global.jsonl");
        let task_dir = root.join("tasks");
        Self {
            root,
            global_file,
            task_dir,
        }
    }

    pub fn ensure_layout(&self) -> Result<(), EventLogError> {
        fs::create_dir_all(&self.root).map_err(|source| EventLogError::CreateDir {
            path: self.root.clone(),
            source,
        })?;
        fs::create_dir_all(&self.task_dir).map_err(|source| EventLogError::CreateDir {
            path: self.task_dir.clone(),
            source,
        })?;
        Ok(())
    }

    /// Appends to the global file and, when the event names a task, to
    /// that task's file as well.
    pub fn append(&self, event: &Event) -> Result<(), EventLogError> {
        self.ensure_layout()?;
        append_json_line(&self.global_file, event)?;
        if let Some(task_id) = &event.task_id {
            let path = self.task_dir.join(format!("{task_id}.jsonl"));
            append_json_line(&path, event)?;
        }
        Ok(())
    }
}

fn append_json_line(path: &Path, event: &Event) -> Result<(), EventLogError> {
    let line =
        serde_json::to_string(event).map_err(|source| EventLogError::Serialize { source })?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| EventLogError::Append {
            path: path.to_path_buf(),
            source,
        })?;
    writeln!(file, "{line}").map_err(|source| EventLogError::Append {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::EventKind;

    #[test]
    fn append_writes_global_and_per_task_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = JsonlEventLog::new(dir.path().join("events"));

        let event = Event::new(
            Some("202501020304-ABCD12".to_string()),
            EventKind::VerifyCompleted { success: true },
        );
        log.append(&event).expect("append");

        let global = fs::read_to_string(&log.global_file).unwrap();
        assert_eq!(global.lines().count(), 1);
        let per_task = fs::read_to_string(log.task_dir.join("202501020304-ABCD12.jsonl")).unwrap();
        assert!(per_task.contains("verify_completed"));
    }

    #[test]
    fn events_without_task_only_hit_global() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = JsonlEventLog::new(dir.path().join("events"));
        log.append(&Event::new(None, EventKind::HooksInstalled))
            .expect("append");
        assert!(log.global_file.exists());
        assert_eq!(fs::read_dir(&log.task_dir).unwrap().count(), 0);
    }
}
