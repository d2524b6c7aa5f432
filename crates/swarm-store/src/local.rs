//! Local backend: one README with frontmatter per task.

use rand::Rng;
use std::path::{Path, PathBuf};

use swarm_core::{now_iso_utc, Task, TASK_ID_ALPHABET};
use swarm_docs::readme::{doc_of_body, merge_doc_into_body};

use crate::backend::{Backend, ExportTasks, GenerateTaskId, NormalizeTasks, TaskDocs};
use crate::error::StoreError;
use crate::frontmatter::{
    format_frontmatter, parse_frontmatter, task_from_frontmatter, task_to_frontmatter,
};
use crate::snapshot::write_snapshot;

pub const DOC_UPDATED_BY_DEFAULT: &str = "agentctl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.root.join(task_id)
    }

    pub fn task_readme_path(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join("README.md")
    }

    fn read_readme(&self, task_id: &str) -> Result<Option<String>, StoreError> {
        let path = self.task_readme_path(task_id);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| StoreError::Read { path, source })
    }

    fn write_readme(&self, task_id: &str, content: &str) -> Result<(), StoreError> {
        let path = self.task_readme_path(task_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, content).map_err(|source| StoreError::Write { path, source })
    }

    fn write_task_with_body(&self, task: &Task, body: &str) -> Result<(), StoreError> {
        let frontmatter = task_to_frontmatter(task)?;
        let mut content = format_frontmatter(&frontmatter);
        content.push('\n');
        let body = body.trim_start_matches('\n');
        if !body.is_empty() {
            content.push('\n');
            content.push_str(body.trim_end());
            content.push('\n');
        }
        self.write_readme(&task.id, &content)
    }

    fn load_record(&self, task_id: &str) -> Result<(Task, String), StoreError> {
        let Some(text) = self.read_readme(task_id)? else {
            return Err(StoreError::UnknownTask {
                id: task_id.to_string(),
            });
        };
        let doc = parse_frontmatter(&text);
        let task = task_from_frontmatter(&doc.frontmatter)?;
        Ok((task, doc.body))
    }

    /// Doc text when the task exists locally; None otherwise.
    pub fn try_get_task_doc(&self, task_id: &str) -> Result<Option<String>, StoreError> {
        match self.load_record(task_id) {
            Ok((_, body)) => Ok(Some(doc_of_body(&body))),
            Err(StoreError::UnknownTask { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn touch_doc_fields(task: &mut Task, updated_by: &str) {
        task.doc_version = Some(task.doc_version.unwrap_or(0) + 1);
        task.doc_updated_at = Some(now_iso_utc());
        task.doc_updated_by = Some(updated_by.to_string());
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.root).map_err(|source| StoreError::Read {
            path: self.root.clone(),
            source,
        })?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        let mut tasks = Vec::new();
        for dir in dirs {
            let readme = dir.join("README.md");
            if !readme.exists() {
                continue;
            }
            let text = std::fs::read_to_string(&readme).map_err(|source| StoreError::Read {
                path: readme.clone(),
                source,
            })?;
            let doc = parse_frontmatter(&text);
            if doc.frontmatter.is_empty() {
                continue;
            }
            tasks.push(task_from_frontmatter(&doc.frontmatter)?);
        }
        Ok(tasks)
    }

    fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        match self.load_record(task_id) {
            Ok((task, _)) => Ok(Some(task)),
            Err(StoreError::UnknownTask { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write_task(&self, task: &Task) -> Result<(), StoreError> {
        let task_id = task.id.trim();
        if task_id.is_empty() {
            return Err(StoreError::InvalidTask {
                message: "task id is required".to_string(),
            });
        }
        let body = match self.read_readme(task_id)? {
            Some(text) => parse_frontmatter(&text).body,
            None => String::new(),
        };
        self.write_task_with_body(task, &body)
    }

    fn docs(&self) -> Option<&dyn TaskDocs> {
        Some(self)
    }

    fn exporter(&self) -> Option<&dyn ExportTasks> {
        Some(self)
    }

    fn normalizer(&self) -> Option<&dyn NormalizeTasks> {
        Some(self)
    }

    fn id_generator(&self) -> Option<&dyn GenerateTaskId> {
        Some(self)
    }
}

impl TaskDocs for LocalBackend {
    fn get_task_doc(&self, task_id: &str) -> Result<String, StoreError> {
        let (_, body) = self.load_record(task_id)?;
        Ok(doc_of_body(&body))
    }

    fn set_task_doc(&self, task_id: &str, doc: &str, updated_by: &str) -> Result<(), StoreError> {
        let (mut task, body) = self.load_record(task_id)?;
        let (merged, changed) = merge_doc_into_body(&body, doc);
        if changed {
            Self::touch_doc_fields(&mut task, updated_by);
        }
        self.write_task_with_body(&task, &merged)
    }

    fn touch_task_doc_metadata(&self, task_id: &str, updated_by: &str) -> Result<(), StoreError> {
        let (mut task, body) = self.load_record(task_id)?;
        Self::touch_doc_fields(&mut task, updated_by);
        self.write_task_with_body(&task, &body)
    }
}

impl ExportTasks for LocalBackend {
    fn export_tasks_json(&self, path: &Path) -> Result<(), StoreError> {
        let tasks = self.list_tasks()?;
        write_snapshot(path, &tasks)
    }
}

impl NormalizeTasks for LocalBackend {
    fn normalize_tasks(&self) -> Result<usize, StoreError> {
        let tasks = self.list_tasks()?;
        for task in &tasks {
            self.write_task(task)?;
        }
        Ok(tasks.len())
    }
}

impl GenerateTaskId for LocalBackend {
    fn generate_task_id(&self, length: usize, attempts: usize) -> Result<String, StoreError> {
        let alphabet: Vec<char> = TASK_ID_ALPHABET.chars().collect();
        let mut rng = rand::thread_rng();
        for _ in 0..attempts.max(1) {
            let stamp = chrono::Utc::now().format("%Y%m%d%H%M");
            let suffix: String = (0..length)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect();
            let candidate = format!("{stamp}-{suffix}");
            if !self.task_dir(&candidate).exists() {
                return Ok(candidate);
            }
        }
        Err(StoreError::IdGeneration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::{is_valid_task_id, TaskStatus};
    use swarm_docs::readme::task_readme_template;

    fn unique_backend(prefix: &str) -> LocalBackend {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let root = std::env::temp_dir().join(format!("swarm-local-{prefix}-{now}"));
        LocalBackend::new(root)
    }

    fn sample_task(id: &str) -> Task {
        let mut task = Task::new(id, format!("Task {id}"));
        task.status = TaskStatus::Todo;
        task.priority = Some("med".to_string());
        task.owner = Some("CODER".to_string());
        task
    }

    #[test]
    fn write_then_list_round_trips() {
        let backend = unique_backend("roundtrip");
        let task = sample_task("202501020304-ABCD12");
        backend.write_task(&task).expect("write");

        let listed = backend.list_tasks().expect("list");
        assert_eq!(listed, vec![task]);

        let _ = std::fs::remove_dir_all(backend.root());
    }

    #[test]
    fn write_preserves_readme_body() {
        let backend = unique_backend("body");
        let mut task = sample_task("202501020304-ABCD12");
        backend.write_task(&task).expect("write");

        let sections = vec!["Summary".to_string(), "Scope".to_string()];
        let body = task_readme_template(&task.id, Some(task.title.as_str()), &sections);
        let readme = backend.task_readme_path(&task.id);
        let existing = std::fs::read_to_string(&readme).unwrap();
        std::fs::write(&readme, format!("{existing}\n{body}\n")).unwrap();

        task.status = TaskStatus::Doing;
        backend.write_task(&task).expect("rewrite");

        let text = std::fs::read_to_string(&readme).unwrap();
        assert!(text.contains("status: \"DOING\""));
        assert!(text.contains("## Summary"), "body kept across writes");

        let round = backend.get_task(&task.id).unwrap().unwrap();
        assert_eq!(round, task);

        let _ = std::fs::remove_dir_all(backend.root());
    }

    #[test]
    fn rewrite_of_unchanged_task_is_byte_stable() {
        let backend = unique_backend("stable");
        let task = sample_task("202501020304-ABCD12");
        backend.write_task(&task).expect("write");
        let readme = backend.task_readme_path(&task.id);
        let first = std::fs::read_to_string(&readme).unwrap();

        let loaded = backend.get_task(&task.id).unwrap().unwrap();
        backend.write_task(&loaded).expect("rewrite");
        let second = std::fs::read_to_string(&readme).unwrap();
        assert_eq!(first, second);

        let _ = std::fs::remove_dir_all(backend.root());
    }

    #[test]
    fn doc_set_touches_metadata_only_on_content_change() {
        let backend = unique_backend("docs");
        let task = sample_task("202501020304-ABCD12");
        backend.write_task(&task).expect("write");

        // Seed the body with a templated doc region.
        let sections = vec!["Summary".to_string(), "Scope".to_string()];
        let body = task_readme_template(&task.id, Some(task.title.as_str()), &sections);
        backend
            .write_task_with_body(&task, &body)
            .expect("seed body");

        let docs = backend.docs().expect("local supports docs");
        let new_doc = "## Summary\n\nReal content now.\n\n## Scope\n\n- cache only\n";
        docs.set_task_doc(&task.id, new_doc, "agentctl").expect("set doc");

        let updated = backend.get_task(&task.id).unwrap().unwrap();
        assert_eq!(updated.doc_version, Some(1));
        assert_eq!(updated.doc_updated_by.as_deref(), Some("agentctl"));
        assert!(updated.doc_updated_at.is_some());

        let fetched = docs.get_task_doc(&task.id).expect("get doc");
        assert!(fetched.contains("Real content now."));

        // Unchanged content does not bump the version.
        docs.set_task_doc(&task.id, new_doc, "agentctl").expect("set again");
        let same = backend.get_task(&task.id).unwrap().unwrap();
        assert_eq!(same.doc_version, Some(1));

        // An explicit touch always does.
        docs.touch_task_doc_metadata(&task.id, "agentctl").expect("touch");
        let touched = backend.get_task(&task.id).unwrap().unwrap();
        assert_eq!(touched.doc_version, Some(2));

        let _ = std::fs::remove_dir_all(backend.root());
    }

    #[test]
    fn export_writes_checksummed_snapshot() {
        let backend = unique_backend("export");
        backend.write_task(&sample_task("202501020304-ABCD12")).unwrap();
        backend.write_task(&sample_task("202501020305-WXYZ99")).unwrap();

        let out = backend.root().join("tasks.json");
        backend.exporter().unwrap().export_tasks_json(&out).expect("export");

        let doc = crate::snapshot::read_snapshot(&out).expect("read snapshot");
        assert_eq!(doc.tasks.len(), 2);
        let meta = doc.meta.expect("meta");
        assert_eq!(
            meta.checksum,
            crate::snapshot::compute_tasks_checksum(&doc.tasks).unwrap()
        );

        let _ = std::fs::remove_dir_all(backend.root());
    }

    #[test]
    fn generated_ids_match_grammar_and_avoid_collisions() {
        let backend = unique_backend("ids");
        let id = backend
            .id_generator()
            .unwrap()
            .generate_task_id(6, 100)
            .expect("generate");
        assert!(is_valid_task_id(&id), "generated id: {id}");
        assert_eq!(id.len(), 12 + 1 + 6);

        let _ = std::fs::remove_dir_all(backend.root());
    }

    #[test]
    fn normalize_rewrites_every_record() {
        let backend = unique_backend("normalize");
        backend.write_task(&sample_task("202501020304-ABCD12")).unwrap();
        let count = backend.normalizer().unwrap().normalize_tasks().expect("normalize");
        assert_eq!(count, 1);
        let _ = std::fs::remove_dir_all(backend.root());
    }

    #[test]
    fn unknown_task_doc_read_fails() {
        let backend = unique_backend("missing");
        let err = backend
            .docs()
            .unwrap()
            .get_task_doc("202501020304-ABCD12")
            .expect_err("missing task");
        assert!(matches!(err, StoreError::UnknownTask { .. }));
    }
}
