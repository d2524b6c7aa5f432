//! TaskStore façade: loads from the backend or the snapshot file, caches
//! derived views keyed by the canonical checksum, and writes only changed
//! records back through the backend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use swarm_core::{
    compute_dependency_state, index_tasks, readiness, DependencyState, Task, TaskIndex,
};

use crate::backend::Backend;
use crate::error::StoreError;
use crate::snapshot::{read_snapshot, tasks_cache_key, write_snapshot};

/// Index and dependency state derived from one task-set revision.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStoreView {
    pub key: String,
    pub index: TaskIndex,
    pub index_warnings: Vec<String>,
    pub dep_state: DependencyState,
    pub dep_warnings: Vec<String>,
}

impl TaskStoreView {
    pub fn warnings(&self) -> Vec<String> {
        let mut out = self.index_warnings.clone();
        out.extend(self.dep_warnings.clone());
        out
    }

    pub fn readiness(&self, task_id: &str) -> (bool, Vec<String>) {
        let (ready, mut warnings) = readiness(task_id, &self.index, &self.dep_state);
        let mut all = self.warnings();
        all.append(&mut warnings);
        (ready, all)
    }
}

pub struct TaskStore {
    snapshot_path: PathBuf,
    backend: Option<Box<dyn Backend>>,
    cached_tasks: Option<Vec<Task>>,
    loaded_digests: HashMap<String, String>,
    view: Option<TaskStoreView>,
}

impl TaskStore {
    pub fn new(snapshot_path: impl Into<PathBuf>, backend: Option<Box<dyn Backend>>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            backend,
            cached_tasks: None,
            loaded_digests: HashMap::new(),
            view: None,
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn backend(&self) -> Option<&dyn Backend> {
        self.backend.as_deref()
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// The full task set, memoized until the next save or invalidation.
    pub fn load(&mut self) -> Result<Vec<Task>, StoreError> {
        if let Some(tasks) = &self.cached_tasks {
            return Ok(tasks.clone());
        }
        let tasks = match &self.backend {
            Some(backend) => backend.list_tasks()?,
            None => read_snapshot(&self.snapshot_path)?.tasks,
        };
        self.loaded_digests = tasks
            .iter()
            .filter(|task| !task.id.trim().is_empty())
            .map(|task| (task.id.clone(), task.digest()))
            .collect();
        self.cached_tasks = Some(tasks.clone());
        Ok(tasks)
    }

    /// Persists the task set. Snapshot mode rewrites the whole file; a
    /// backend receives only records whose digest changed since load.
    pub fn save(&mut self, tasks: Vec<Task>) -> Result<(), StoreError> {
        match &self.backend {
            None => {
                write_snapshot(&self.snapshot_path, &tasks)?;
            }
            Some(backend) => {
                let changed: Vec<Task> = tasks
                    .iter()
                    .filter(|task| !task.id.trim().is_empty())
                    .filter(|task| {
                        self.loaded_digests.get(&task.id) != Some(&task.digest())
                    })
                    .cloned()
                    .collect();
                if !changed.is_empty() {
                    backend.write_tasks(&changed)?;
                }
            }
        }
        self.loaded_digests = tasks
            .iter()
            .filter(|task| !task.id.trim().is_empty())
            .map(|task| (task.id.clone(), task.digest()))
            .collect();
        self.cached_tasks = Some(tasks);
        self.view = None;
        Ok(())
    }

    /// Index + dependency state for the current task set, rebuilt only
    /// when the canonical checksum changes.
    pub fn view(&mut self) -> Result<&TaskStoreView, StoreError> {
        let tasks = self.load()?;
        let key = tasks_cache_key(&tasks)?;
        let fresh = match &self.view {
            Some(view) => view.key != key,
            None => true,
        };
        if fresh {
            let (index, index_warnings) = index_tasks(&tasks);
            let (dep_state, dep_warnings) = compute_dependency_state(&index);
            self.view = Some(TaskStoreView {
                key,
                index,
                index_warnings,
                dep_state,
                dep_warnings,
            });
        }
        Ok(self.view.as_ref().expect("view computed"))
    }

    pub fn readiness(&mut self, task_id: &str) -> Result<(bool, Vec<String>), StoreError> {
        Ok(self.view()?.readiness(task_id))
    }

    /// Regenerates the exported snapshot (backend export when available).
    pub fn export_snapshot(&mut self, path: Option<&Path>) -> Result<PathBuf, StoreError> {
        let target = path.unwrap_or(&self.snapshot_path).to_path_buf();
        if let Some(backend) = &self.backend {
            if let Some(exporter) = backend.exporter() {
                exporter.export_tasks_json(&target)?;
                return Ok(target);
            }
        }
        let tasks = self.load()?;
        write_snapshot(&target, &tasks)?;
        Ok(target)
    }

    pub fn invalidate(&mut self) {
        self.cached_tasks = None;
        self.loaded_digests.clear();
        self.view = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use swarm_core::TaskStatus;

    fn unique_snapshot(prefix: &str) -> PathBuf {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!("swarm-store-{prefix}-{now}/tasks.json"))
    }

    fn sample_tasks() -> Vec<Task> {
        let mut done = Task::new("202501020304-ABCD12", "Add cache");
        done.status = TaskStatus::Done;
        done.commit = Some(swarm_core::CommitRecord {
            hash: "abcdef0123456".to_string(),
            message: "✅ ABCD12 close".to_string(),
        });
        let mut next = Task::new("202501020305-WXYZ99", "Use cache");
        next.depends_on = vec!["202501020304-ABCD12".to_string()];
        vec![done, next]
    }

    #[test]
    fn snapshot_mode_round_trips_and_exposes_views() {
        let path = unique_snapshot("roundtrip");
        let mut store = TaskStore::new(&path, None);
        store.save(sample_tasks()).expect("save");

        let mut reloaded = TaskStore::new(&path, None);
        let tasks = reloaded.load().expect("load");
        assert_eq!(tasks.len(), 2);

        let (ready, _) = reloaded.readiness("202501020305-WXYZ99").expect("readiness");
        assert!(ready);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn view_is_rebuilt_only_when_checksum_changes() {
        let path = unique_snapshot("viewcache");
        let mut store = TaskStore::new(&path, None);
        store.save(sample_tasks()).expect("save");

        let key_one = store.view().unwrap().key.clone();
        let key_two = store.view().unwrap().key.clone();
        assert_eq!(key_one, key_two);

        let mut tasks = store.load().unwrap();
        tasks[1].title = "Use the cache".to_string();
        store.save(tasks).expect("save changed");
        let key_three = store.view().unwrap().key.clone();
        assert_ne!(key_one, key_three);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    struct CountingBackend {
        tasks: Vec<Task>,
        writes: Arc<AtomicUsize>,
    }

    impl Backend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }
        fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
            Ok(self.tasks.clone())
        }
        fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
            Ok(self.tasks.iter().find(|task| task.id == task_id).cloned())
        }
        fn write_task(&self, _task: &Task) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn backend_saves_write_only_changed_records() {
        let writes = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            tasks: sample_tasks(),
            writes: writes.clone(),
        };
        let path = unique_snapshot("backend");
        let mut store = TaskStore::new(&path, Some(Box::new(backend)));

        let mut tasks = store.load().expect("load");
        store.save(tasks.clone()).expect("save unchanged");
        assert_eq!(writes.load(Ordering::SeqCst), 0, "no-op save writes nothing");

        tasks[0].push_comment("CODER", "Start: digging into the cache layer now");
        store.save(tasks).expect("save changed");
        assert_eq!(writes.load(Ordering::SeqCst), 1, "only the edited record");

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn export_snapshot_writes_default_path() {
        let path = unique_snapshot("export");
        let mut store = TaskStore::new(&path, None);
        store.save(sample_tasks()).expect("save");
        let target = store.export_snapshot(None).expect("export");
        assert_eq!(target, path);
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
