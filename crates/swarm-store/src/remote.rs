//! Remote tracker backend: HTTP/JSON issues mirrored into a local cache.
//!
//! Reads degrade to the cache when the tracker is unreachable; writes mark
//! the cached copy dirty instead of failing. 429 and 5xx responses are
//! retried with exponential backoff.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use swarm_core::{Comment, Task, TaskStatus};

use crate::backend::{
    Backend, ConflictStrategy, ExportTasks, GenerateTaskId, NormalizeTasks, SyncDirection,
    SyncOptions, SyncOutcome, SyncTasks, TaskDocs,
};
use crate::error::StoreError;
use crate::local::LocalBackend;
use crate::snapshot::write_snapshot;

pub const ENV_REMOTE_URL: &str = "REMOTE_URL";
pub const ENV_REMOTE_API_KEY: &str = "REMOTE_API_KEY";
pub const ENV_REMOTE_PROJECT_ID: &str = "REMOTE_PROJECT_ID";
pub const ENV_REMOTE_ASSIGNEE_ID: &str = "REMOTE_ASSIGNEE_ID";
pub const ENV_REMOTE_OWNER: &str = "REMOTE_OWNER";

const PAGE_LIMIT: u64 = 100;
const MAX_HTTP_ATTEMPTS: u32 = 4;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct RemoteBackend {
    base_url: String,
    api_key: String,
    project_id: String,
    assignee_id: Option<i64>,
    default_owner: Option<String>,
    status_map: BTreeMap<String, i64>,
    reverse_status: BTreeMap<i64, String>,
    custom_fields: BTreeMap<String, i64>,
    batch_size: usize,
    batch_pause: Duration,
    cache: LocalBackend,
    agent: ureq::Agent,
}

impl RemoteBackend {
    pub fn new(settings: &Map<String, Value>, cache: LocalBackend) -> Result<Self, StoreError> {
        let env = |key: &str| std::env::var(key).ok().map(|v| v.trim().to_string());
        let setting_str = |key: &str| {
            settings
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let base_url = env(ENV_REMOTE_URL)
            .filter(|v| !v.is_empty())
            .or_else(|| setting_str("url"))
            .map(|url| url.trim_end_matches('/').to_string());
        let api_key = env(ENV_REMOTE_API_KEY)
            .filter(|v| !v.is_empty())
            .or_else(|| setting_str("api_key"));
        let project_id = env(ENV_REMOTE_PROJECT_ID)
            .filter(|v| !v.is_empty())
            .or_else(|| setting_str("project_id"));
        let (Some(base_url), Some(api_key), Some(project_id)) = (base_url, api_key, project_id)
        else {
            return Err(StoreError::BackendConfig {
                message: "remote backend requires url, api_key, and project_id".to_string(),
            });
        };

        let assignee_id = env(ENV_REMOTE_ASSIGNEE_ID)
            .and_then(|v| v.parse::<i64>().ok())
            .or_else(|| settings.get("assignee_id").and_then(Value::as_i64));
        let default_owner = env(ENV_REMOTE_OWNER)
            .filter(|v| !v.is_empty())
            .or_else(|| setting_str("owner"));

        let status_map = id_map(settings.get("status_map"));
        let reverse_status = status_map
            .iter()
            .map(|(name, id)| (*id, name.clone()))
            .collect();
        let custom_fields = id_map(settings.get("custom_fields"));

        let batch_size = settings
            .get("batch_size")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .filter(|v| *v > 0)
            .unwrap_or(20);
        let batch_pause = settings
            .get("batch_pause")
            .and_then(Value::as_f64)
            .filter(|v| *v >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_else(|| Duration::from_secs(1));

        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build();

        Ok(Self {
            base_url,
            api_key,
            project_id,
            assignee_id,
            default_owner,
            status_map,
            reverse_status,
            custom_fields,
            batch_size,
            batch_pause,
            cache,
            agent: ureq::Agent::new_with_config(config),
        })
    }

    pub fn cache(&self) -> &LocalBackend {
        &self.cache
    }

    fn request_json(
        &self,
        method: &str,
        path: &str,
        params: &[(&str, String)],
        payload: Option<&Value>,
    ) -> Result<Value, StoreError> {
        let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if !params.is_empty() {
            let query: Vec<String> = params
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }

        let mut delay = Duration::from_millis(500);
        for attempt in 0..MAX_HTTP_ATTEMPTS {
            let (status, body) = self.send(method, &url, payload)?;
            if status == 429 || status >= 500 {
                if attempt + 1 < MAX_HTTP_ATTEMPTS {
                    std::thread::sleep(delay);
                    delay *= 2;
                    continue;
                }
                return Err(StoreError::RemoteHttp { status, body });
            }
            if status >= 400 {
                return Err(StoreError::RemoteHttp { status, body });
            }
            if body.trim().is_empty() {
                return Ok(json!({}));
            }
            return Ok(serde_json::from_str(&body).unwrap_or_else(|_| json!({})));
        }
        Err(StoreError::RemoteUnavailable)
    }

    fn send(
        &self,
        method: &str,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<(u16, String), StoreError> {
        let response = match (method, payload) {
            ("GET", _) => self
                .agent
                .get(url)
                .header("X-Api-Key", self.api_key.as_str())
                .call(),
            ("POST", Some(body)) => self
                .agent
                .post(url)
                .header("X-Api-Key", self.api_key.as_str())
                .send_json(body.clone()),
            ("PUT", Some(body)) => self
                .agent
                .put(url)
                .header("X-Api-Key", self.api_key.as_str())
                .send_json(body.clone()),
            _ => {
                return Err(StoreError::BackendConfig {
                    message: format!("unsupported remote request: {method}"),
                })
            }
        };
        let mut response = response.map_err(|_| StoreError::RemoteUnavailable)?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .unwrap_or_default();
        Ok((status, body))
    }

    fn custom_field_id(&self, key: &str) -> Option<i64> {
        self.custom_fields.get(key).copied()
    }

    fn custom_field_value<'a>(&self, issue: &'a Value, key: &str) -> Option<&'a str> {
        let field_id = self.custom_field_id(key)?;
        let fields = issue.get("custom_fields")?.as_array()?;
        for field in fields {
            if field.get("id").and_then(Value::as_i64) == Some(field_id) {
                return field.get("value").and_then(Value::as_str);
            }
        }
        None
    }

    fn list_tasks_remote(&self) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = Vec::new();
        let mut seen: BTreeMap<String, ()> = BTreeMap::new();
        let mut offset: u64 = 0;
        loop {
            let payload = self.request_json(
                "GET",
                "issues.json",
                &[
                    ("project_id", self.project_id.clone()),
                    ("limit", PAGE_LIMIT.to_string()),
                    ("offset", offset.to_string()),
                    ("status_id", "*".to_string()),
                ],
                None,
            )?;
            let Some(issues) = payload.get("issues").and_then(Value::as_array) else {
                break;
            };
            for issue in issues {
                let Some(task) = self.issue_to_task(issue) else {
                    continue;
                };
                if seen.insert(task.id.clone(), ()).is_some() {
                    return Err(StoreError::RemoteDuplicateTask { id: task.id });
                }
                tasks.push(task);
            }
            let total = payload.get("total_count").and_then(Value::as_u64);
            match total {
                Some(total) if offset + PAGE_LIMIT < total => offset += PAGE_LIMIT,
                _ => break,
            }
        }
        Ok(tasks)
    }

    /// Maps one remote issue onto a task record. Issues without the
    /// task_id custom field are not managed by this engine and skipped.
    fn issue_to_task(&self, issue: &Value) -> Option<Task> {
        let task_id = self.custom_field_value(issue, "task_id")?.trim().to_string();
        if task_id.is_empty() {
            return None;
        }
        let mut task = Task::new(task_id, issue.get("subject")?.as_str().unwrap_or_default());

        let description = issue
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty());
        task.description = description.map(str::to_string);

        let status_id = issue
            .get("status")
            .and_then(|status| status.get("id"))
            .and_then(Value::as_i64);
        task.status = status_id
            .and_then(|id| self.reverse_status.get(&id))
            .and_then(|name| name.parse::<TaskStatus>().ok())
            .unwrap_or(TaskStatus::Todo);

        task.priority = issue
            .get("priority")
            .and_then(|priority| priority.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        task.owner = issue
            .get("assigned_to")
            .and_then(|assigned| assigned.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.default_owner.clone());

        if let Some(tags) = issue.get("tags").and_then(Value::as_array) {
            task.tags = tags
                .iter()
                .filter_map(|tag| tag.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
        }

        task.verify = parse_json_field(self.custom_field_value(issue, "verify"))
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        task.commit = parse_json_field(self.custom_field_value(issue, "commit"))
            .and_then(|value| serde_json::from_value(value).ok());
        task.comments = parse_json_field(self.custom_field_value(issue, "comments"))
            .and_then(|value| serde_json::from_value::<Vec<Comment>>(value).ok())
            .unwrap_or_default();

        task.doc_version = self
            .custom_field_value(issue, "doc_version")
            .and_then(|raw| raw.trim().parse::<u64>().ok());
        task.doc_updated_at = non_empty(self.custom_field_value(issue, "doc_updated_at"));
        task.doc_updated_by = non_empty(self.custom_field_value(issue, "doc_updated_by"));

        if let Some(issue_id) = issue.get("id").and_then(Value::as_i64) {
            task.extra.insert("remote_id".to_string(), Value::from(issue_id));
        }
        Some(task)
    }

    fn task_to_issue_payload(&self, task: &Task) -> Value {
        let mut payload = Map::new();
        payload.insert("subject".to_string(), Value::from(task.title.clone()));
        payload.insert(
            "description".to_string(),
            Value::from(task.description.clone().unwrap_or_default()),
        );
        if let Some(status_id) = self.status_map.get(task.status.as_str()) {
            payload.insert("status_id".to_string(), Value::from(*status_id));
        }
        if let Some(assignee_id) = self.assignee_id {
            payload.insert("assigned_to_id".to_string(), Value::from(assignee_id));
        }
        if let Some(start_date) = start_date_from_task_id(&task.id) {
            payload.insert("start_date".to_string(), Value::from(start_date));
        }
        let done_ratio = if task.status == TaskStatus::Done { 100 } else { 0 };
        payload.insert("done_ratio".to_string(), Value::from(done_ratio));

        let mut custom_fields = Vec::new();
        self.push_custom_field(&mut custom_fields, "task_id", Value::from(task.id.clone()));
        self.push_custom_field(
            &mut custom_fields,
            "verify",
            serde_json::to_value(&task.verify).unwrap_or(Value::Null),
        );
        self.push_custom_field(
            &mut custom_fields,
            "commit",
            serde_json::to_value(&task.commit).unwrap_or(Value::Null),
        );
        self.push_custom_field(
            &mut custom_fields,
            "comments",
            serde_json::to_value(&task.comments).unwrap_or(Value::Null),
        );
        if let Ok(Some(doc)) = self.cache.try_get_task_doc(&task.id) {
            if !doc.is_empty() {
                self.push_custom_field(&mut custom_fields, "doc", Value::from(doc));
            }
        }
        if let Some(doc_version) = task.doc_version {
            self.push_custom_field(&mut custom_fields, "doc_version", Value::from(doc_version));
        }
        if let Some(at) = &task.doc_updated_at {
            self.push_custom_field(&mut custom_fields, "doc_updated_at", Value::from(at.clone()));
        }
        if let Some(by) = &task.doc_updated_by {
            self.push_custom_field(&mut custom_fields, "doc_updated_by", Value::from(by.clone()));
        }
        if !custom_fields.is_empty() {
            payload.insert("custom_fields".to_string(), Value::Array(custom_fields));
        }
        Value::Object(payload)
    }

    fn push_custom_field(&self, fields: &mut Vec<Value>, key: &str, value: Value) {
        let Some(field_id) = self.custom_field_id(key) else {
            return;
        };
        let value = match value {
            Value::Null => return,
            Value::Array(_) | Value::Object(_) => Value::from(value.to_string()),
            scalar => scalar,
        };
        fields.push(json!({ "id": field_id, "value": value }));
    }

    fn remote_issue_id(&self, task: &Task) -> Result<Option<i64>, StoreError> {
        if let Some(issue_id) = task.extra.get("remote_id").and_then(Value::as_i64) {
            return Ok(Some(issue_id));
        }
        for remote in self.list_tasks_remote()? {
            if remote.id == task.id {
                return Ok(remote.extra.get("remote_id").and_then(Value::as_i64));
            }
        }
        Ok(None)
    }

    fn write_task_remote(&self, task: &Task) -> Result<Task, StoreError> {
        let mut updated = task.clone();
        let payload = self.task_to_issue_payload(task);
        let issue_id = match self.remote_issue_id(task)? {
            Some(issue_id) => {
                self.request_json(
                    "PUT",
                    &format!("issues/{issue_id}.json"),
                    &[],
                    Some(&json!({ "issue": payload })),
                )?;
                issue_id
            }
            None => {
                let mut create = payload.clone();
                if let Value::Object(map) = &mut create {
                    map.insert("project_id".to_string(), Value::from(self.project_id.clone()));
                }
                let created = self.request_json(
                    "POST",
                    "issues.json",
                    &[],
                    Some(&json!({ "issue": create })),
                )?;
                let issue_id = created
                    .get("issue")
                    .and_then(|issue| issue.get("id"))
                    .and_then(Value::as_i64)
                    .ok_or_else(|| StoreError::RemoteHttp {
                        status: 200,
                        body: "create response carried no issue id".to_string(),
                    })?;
                // Some trackers drop custom fields on create; re-apply.
                self.request_json(
                    "PUT",
                    &format!("issues/{issue_id}.json"),
                    &[],
                    Some(&json!({ "issue": payload })),
                )?;
                issue_id
            }
        };
        updated
            .extra
            .insert("remote_id".to_string(), Value::from(issue_id));
        self.append_new_comment_notes(issue_id, task)?;
        Ok(updated)
    }

    /// One tracker note per comment the remote copy does not know yet.
    fn append_new_comment_notes(&self, issue_id: i64, task: &Task) -> Result<(), StoreError> {
        if task.comments.is_empty() {
            return Ok(());
        }
        let issue = self.request_json("GET", &format!("issues/{issue_id}.json"), &[], None)?;
        let known = self
            .custom_field_value(issue.get("issue").unwrap_or(&Value::Null), "comments")
            .and_then(|raw| serde_json::from_str::<Vec<Comment>>(raw).ok())
            .map(|comments| comments.len())
            .unwrap_or(0);
        for comment in task.comments.iter().skip(known) {
            self.request_json(
                "PUT",
                &format!("issues/{issue_id}.json"),
                &[],
                Some(&json!({
                    "issue": { "notes": format!("{}: {}", comment.author, comment.body) }
                })),
            )?;
        }
        Ok(())
    }

    fn cache_task(&self, task: &Task, dirty: bool) -> Result<(), StoreError> {
        let mut cached = task.clone();
        cached.dirty = Some(dirty);
        self.cache.write_task(&cached)
    }
}

fn id_map(value: Option<&Value>) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    let Some(Value::Object(map)) = value else {
        return out;
    };
    for (key, value) in map {
        if let Some(id) = value.as_i64() {
            out.insert(key.clone(), id);
        }
    }
    out
}

fn parse_json_field(raw: Option<&str>) -> Option<Value> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with('{') || raw.starts_with('[') {
        return serde_json::from_str(raw).ok();
    }
    Some(Value::from(raw))
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// `YYYYMMDD…-…` task ids carry their creation date in the prefix.
fn start_date_from_task_id(task_id: &str) -> Option<String> {
    let (prefix, _) = task_id.split_once('-')?;
    if prefix.len() < 8 || !prefix[..8].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}-{}-{}", &prefix[..4], &prefix[4..6], &prefix[6..8]))
}

/// Dirty/remote-id markers are transport metadata, not content.
fn comparable(task: &Task) -> Value {
    let mut value = serde_json::to_value(task).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.remove("dirty");
        map.remove("remote_id");
    }
    value
}

fn tasks_differ(local: &Task, remote: &Task) -> bool {
    comparable(local) != comparable(remote)
}

fn unified_task_diff(local: &Task, remote: &Task) -> String {
    let local_text = serde_json::to_string_pretty(&comparable(local)).unwrap_or_default();
    let remote_text = serde_json::to_string_pretty(&comparable(remote)).unwrap_or_default();
    similar::TextDiff::from_lines(&remote_text, &local_text)
        .unified_diff()
        .header("remote", "local")
        .to_string()
}

impl Backend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        match self.list_tasks_remote() {
            Ok(tasks) => {
                for task in &tasks {
                    let locally_dirty = self
                        .cache
                        .get_task(&task.id)?
                        .is_some_and(|cached| cached.is_dirty());
                    if !locally_dirty {
                        self.cache_task(task, false)?;
                    }
                }
                Ok(tasks)
            }
            Err(StoreError::RemoteUnavailable) => self.cache.list_tasks(),
            Err(err) => Err(err),
        }
    }

    fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        match self.list_tasks_remote() {
            Ok(tasks) => {
                let found = tasks.into_iter().find(|task| task.id == task_id);
                if let Some(task) = &found {
                    self.cache_task(task, false)?;
                }
                Ok(found)
            }
            Err(StoreError::RemoteUnavailable) => self.cache.get_task(task_id),
            Err(err) => Err(err),
        }
    }

    fn write_task(&self, task: &Task) -> Result<(), StoreError> {
        match self.write_task_remote(task) {
            Ok(updated) => self.cache_task(&updated, false),
            Err(StoreError::RemoteUnavailable) => self.cache_task(task, true),
            Err(err) => Err(err),
        }
    }

    /// Batched writes with a pause after every `batch_size` records.
    fn write_tasks(&self, tasks: &[Task]) -> Result<(), StoreError> {
        for (position, task) in tasks.iter().enumerate() {
            if position > 0 && position % self.batch_size == 0 && !self.batch_pause.is_zero() {
                std::thread::sleep(self.batch_pause);
            }
            self.write_task(task)?;
        }
        Ok(())
    }

    fn docs(&self) -> Option<&dyn TaskDocs> {
        // Doc text lives in the cached README; the doc custom field is
        // refreshed from it on the next write_task.
        self.cache.docs()
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

    fn syncer(&self) -> Option<&dyn SyncTasks> {
        Some(self)
    }
}

impl ExportTasks for RemoteBackend {
    fn export_tasks_json(&self, path: &std::path::Path) -> Result<(), StoreError> {
        let tasks = self.list_tasks()?;
        write_snapshot(path, &tasks)
    }
}

impl NormalizeTasks for RemoteBackend {
    fn normalize_tasks(&self) -> Result<usize, StoreError> {
        let tasks = self.list_tasks()?;
        self.write_tasks(&tasks)?;
        Ok(tasks.len())
    }
}

impl GenerateTaskId for RemoteBackend {
    fn generate_task_id(&self, length: usize, attempts: usize) -> Result<String, StoreError> {
        let existing: std::collections::BTreeSet<String> = match self.list_tasks_remote() {
            Ok(tasks) => tasks.into_iter().map(|task| task.id).collect(),
            Err(StoreError::RemoteUnavailable) => self
                .cache
                .list_tasks()?
                .into_iter()
                .map(|task| task.id)
                .collect(),
            Err(err) => return Err(err),
        };
        let generator = self
            .cache
            .id_generator()
            .ok_or(StoreError::Unsupported {
                operation: "generate_task_id()",
            })?;
        for _ in 0..attempts.max(1) {
            let candidate = generator.generate_task_id(length, 1)?;
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(StoreError::IdGeneration)
    }
}

impl SyncTasks for RemoteBackend {
    fn sync(&self, options: &SyncOptions) -> Result<SyncOutcome, StoreError> {
        match options.direction {
            SyncDirection::Push => {
                let dirty: Vec<Task> = self
                    .cache
                    .list_tasks()?
                    .into_iter()
                    .filter(Task::is_dirty)
                    .collect();
                if dirty.is_empty() {
                    return Ok(SyncOutcome::NothingToPush);
                }
                if !options.confirm {
                    let preview = dirty
                        .iter()
                        .map(|task| format!("{} {}", task.id, task.title))
                        .collect();
                    return Ok(SyncOutcome::PushPreview { dirty: preview });
                }
                self.write_tasks(&dirty)?;
                Ok(SyncOutcome::Pushed { count: dirty.len() })
            }
            SyncDirection::Pull => {
                let remote_tasks = self.list_tasks_remote()?;
                let count = remote_tasks.len();
                for remote in remote_tasks {
                    let local = self.cache.get_task(&remote.id)?;
                    match local {
                        Some(local) if local.is_dirty() => {
                            if !tasks_differ(&local, &remote) {
                                self.cache_task(&local, false)?;
                                continue;
                            }
                            match options.conflict {
                                ConflictStrategy::PreferLocal => self.write_task(&local)?,
                                ConflictStrategy::PreferRemote => self.cache_task(&remote, false)?,
                                ConflictStrategy::Diff => {
                                    return Err(StoreError::SyncConflict {
                                        task_id: remote.id.clone(),
                                        diff: unified_task_diff(&local, &remote),
                                    });
                                }
                                ConflictStrategy::Fail => {
                                    return Err(StoreError::SyncConflict {
                                        task_id: remote.id.clone(),
                                        diff: String::new(),
                                    });
                                }
                            }
                        }
                        _ => self.cache_task(&remote, false)?,
                    }
                }
                Ok(SyncOutcome::Pulled { count })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Map<String, Value> {
        serde_json::from_str(
            r#"{
                "url": "https://tracker.example/",
                "api_key": "k",
                "project_id": "swarm",
                "status_map": { "TODO": 1, "DOING": 2, "BLOCKED": 3, "DONE": 5 },
                "custom_fields": { "task_id": 11, "verify": 12, "commit": 13, "comments": 14 },
                "batch_size": 2,
                "batch_pause": 0.0
            }"#,
        )
        .unwrap()
    }

    fn backend() -> RemoteBackend {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let cache_root = std::env::temp_dir().join(format!("swarm-remote-cache-{now}"));
        RemoteBackend::new(&settings(), LocalBackend::new(cache_root)).expect("build backend")
    }

    fn sample_issue() -> Value {
        json!({
            "id": 4711,
            "subject": "Add cache",
            "description": "implement the cache",
            "status": { "id": 2, "name": "In Progress" },
            "priority": { "name": "High" },
            "assigned_to": { "name": "CODER" },
            "custom_fields": [
                { "id": 11, "value": "202501020304-ABCD12" },
                { "id": 12, "value": "[\"make test\"]" },
                { "id": 13, "value": "{\"hash\":\"abc1234def\",\"message\":\"✅ ABCD12 close\"}" },
                { "id": 14, "value": "[{\"author\":\"CODER\",\"body\":\"Start: working\"}]" }
            ]
        })
    }

    #[test]
    fn requires_connection_settings() {
        let empty = Map::new();
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let cache = LocalBackend::new(std::env::temp_dir().join(format!("swarm-rc-{now}")));
        let err = RemoteBackend::new(&empty, cache).expect_err("missing settings");
        assert!(matches!(err, StoreError::BackendConfig { .. }));
    }

    #[test]
    fn issue_maps_to_task_through_status_and_custom_fields() {
        let backend = backend();
        let task = backend.issue_to_task(&sample_issue()).expect("mapped task");
        assert_eq!(task.id, "202501020304-ABCD12");
        assert_eq!(task.title, "Add cache");
        assert_eq!(task.status, TaskStatus::Doing);
        assert_eq!(task.priority.as_deref(), Some("High"));
        assert_eq!(task.owner.as_deref(), Some("CODER"));
        assert_eq!(task.verify, vec!["make test".to_string()]);
        assert_eq!(task.commit.as_ref().unwrap().hash, "abc1234def");
        assert_eq!(task.comments.len(), 1);
        assert_eq!(task.extra["remote_id"], Value::from(4711));
    }

    #[test]
    fn issues_without_task_id_field_are_skipped() {
        let backend = backend();
        let mut issue = sample_issue();
        issue["custom_fields"] = json!([{ "id": 99, "value": "other" }]);
        assert!(backend.issue_to_task(&issue).is_none());
    }

    #[test]
    fn payload_carries_status_id_dates_and_custom_fields() {
        let backend = backend();
        let task = backend.issue_to_task(&sample_issue()).unwrap();
        let payload = backend.task_to_issue_payload(&task);
        assert_eq!(payload["subject"], Value::from("Add cache"));
        assert_eq!(payload["status_id"], Value::from(2));
        assert_eq!(payload["start_date"], Value::from("2025-01-02"));
        assert_eq!(payload["done_ratio"], Value::from(0));

        let fields = payload["custom_fields"].as_array().unwrap();
        let task_id_field = fields
            .iter()
            .find(|field| field["id"] == Value::from(11))
            .unwrap();
        assert_eq!(task_id_field["value"], Value::from("202501020304-ABCD12"));
        let verify_field = fields
            .iter()
            .find(|field| field["id"] == Value::from(12))
            .unwrap();
        assert_eq!(verify_field["value"], Value::from("[\"make test\"]"));
    }

    #[test]
    fn done_task_reports_full_done_ratio() {
        let backend = backend();
        let mut task = backend.issue_to_task(&sample_issue()).unwrap();
        task.status = TaskStatus::Done;
        let payload = backend.task_to_issue_payload(&task);
        assert_eq!(payload["done_ratio"], Value::from(100));
        assert_eq!(payload["status_id"], Value::from(5));
    }

    #[test]
    fn comparable_ignores_transport_metadata() {
        let backend = backend();
        let mut local = backend.issue_to_task(&sample_issue()).unwrap();
        let remote = local.clone();
        local.dirty = Some(true);
        assert!(!tasks_differ(&local, &remote));

        local.title = "Add better cache".to_string();
        assert!(tasks_differ(&local, &remote));
        let diff = unified_task_diff(&local, &remote);
        assert!(diff.contains("-  \"title\": \"Add cache\""), "diff: {diff}");
        assert!(diff.contains("+  \"title\": \"Add better cache\""));
    }

    #[test]
    fn start_date_requires_timestamp_prefix() {
        assert_eq!(
            start_date_from_task_id("202501020304-ABCD12"),
            Some("2025-01-02".to_string())
        );
        assert_eq!(start_date_from_task_id("nodate"), None);
        assert_eq!(start_date_from_task_id("abc-XYZ"), None);
    }
}
