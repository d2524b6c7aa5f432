//! Backend capability model.
//!
//! A backend always lists and writes tasks; everything else is an optional
//! capability the call site probes for and turns into a clear
//! "unsupported" error when absent.

use std::path::Path;

use swarm_core::Task;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Push,
    Pull,
}

impl std::str::FromStr for SyncDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "push" => Ok(SyncDirection::Push),
            "pull" => Ok(SyncDirection::Pull),
            other => Err(format!("--direction must be push|pull (got {other})")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    #[default]
    Diff,
    PreferLocal,
    PreferRemote,
    Fail,
}

impl std::str::FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "diff" => Ok(ConflictStrategy::Diff),
            "prefer-local" => Ok(ConflictStrategy::PreferLocal),
            "prefer-remote" => Ok(ConflictStrategy::PreferRemote),
            "fail" => Ok(ConflictStrategy::Fail),
            other => Err(format!(
                "--conflict must be diff|prefer-local|prefer-remote|fail (got {other})"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub direction: SyncDirection,
    pub conflict: ConflictStrategy,
    pub confirm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    NothingToPush,
    /// Push without confirmation: the dirty task lines, nothing written.
    PushPreview { dirty: Vec<String> },
    Pushed { count: usize },
    Pulled { count: usize },
}

pub trait TaskDocs {
    fn get_task_doc(&self, task_id: &str) -> Result<String, StoreError>;
    fn set_task_doc(&self, task_id: &str, doc: &str, updated_by: &str) -> Result<(), StoreError>;
    fn touch_task_doc_metadata(&self, task_id: &str, updated_by: &str) -> Result<(), StoreError>;
}

pub trait ExportTasks {
    fn export_tasks_json(&self, path: &Path) -> Result<(), StoreError>;
}

pub trait NormalizeTasks {
    fn normalize_tasks(&self) -> Result<usize, StoreError>;
}

pub trait GenerateTaskId {
    fn generate_task_id(&self, length: usize, attempts: usize) -> Result<String, StoreError>;
}

pub trait SyncTasks {
    fn sync(&self, options: &SyncOptions) -> Result<SyncOutcome, StoreError>;
}

pub trait Backend {
    fn name(&self) -> &str;

    fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

    fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    fn write_task(&self, task: &Task) -> Result<(), StoreError>;

    fn write_tasks(&self, tasks: &[Task]) -> Result<(), StoreError> {
        for task in tasks {
            self.write_task(task)?;
        }
        Ok(())
    }

    fn docs(&self) -> Option<&dyn TaskDocs> {
        None
    }

    fn exporter(&self) -> Option<&dyn ExportTasks> {
        None
    }

    fn normalizer(&self) -> Option<&dyn NormalizeTasks> {
        None
    }

    fn id_generator(&self) -> Option<&dyn GenerateTaskId> {
        None
    }

    fn syncer(&self) -> Option<&dyn SyncTasks> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ListOnly;

    impl Backend for ListOnly {
        fn name(&self) -> &str {
            "list-only"
        }
        fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
            Ok(Vec::new())
        }
        fn get_task(&self, _task_id: &str) -> Result<Option<Task>, StoreError> {
            Ok(None)
        }
        fn write_task(&self, _task: &Task) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn optional_capabilities_default_to_none() {
        let backend = ListOnly;
        assert!(backend.docs().is_none());
        assert!(backend.exporter().is_none());
        assert!(backend.normalizer().is_none());
        assert!(backend.id_generator().is_none());
        assert!(backend.syncer().is_none());
    }

    #[test]
    fn strategy_and_direction_parse() {
        assert_eq!(
            "prefer-remote".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::PreferRemote
        );
        assert!("merge".parse::<ConflictStrategy>().is_err());
        assert_eq!("PUSH".parse::<SyncDirection>().unwrap(), SyncDirection::Push);
    }
}
