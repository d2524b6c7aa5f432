//! Task records and the status state machine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    Doing,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::Doing => "DOING",
            TaskStatus::Blocked => "BLOCKED",
            TaskStatus::Done => "DONE",
        }
    }

    /// Returns true if the task can never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done)
    }

    /// Same-state transitions are no-ops and always allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            TaskStatus::Todo => matches!(next, TaskStatus::Doing | TaskStatus::Blocked),
            TaskStatus::Doing => matches!(next, TaskStatus::Done | TaskStatus::Blocked),
            TaskStatus::Blocked => matches!(next, TaskStatus::Todo | TaskStatus::Doing),
            TaskStatus::Done => false,
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "TODO" => Ok(TaskStatus::Todo),
            "DOING" => Ok(TaskStatus::Doing),
            "BLOCKED" => Ok(TaskStatus::Blocked),
            "DONE" => Ok(TaskStatus::Done),
            other => Err(format!(
                "invalid status '{other}'. valid values: TODO, DOING, BLOCKED, DONE"
            )),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
}

impl Comment {
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
        }
    }
}

/// Commit metadata attached to a DONE task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    pub message: String,
}

impl CommitRecord {
    /// A usable record carries at least an abbreviated hash and a subject.
    pub fn is_valid(&self) -> bool {
        self.hash.trim().len() >= 7 && !self.message.trim().is_empty()
    }

    pub fn short_hash(&self) -> &str {
        let trimmed = self.hash.trim();
        &trimmed[..trimmed.len().min(12)]
    }
}

/// One task record. Unknown fields written by other tooling (remote issue
/// ids, sync flags) survive round-trips through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verify: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: None,
            owner: None,
            tags: Vec::new(),
            depends_on: Vec::new(),
            verify: Vec::new(),
            comments: Vec::new(),
            commit: None,
            doc_version: None,
            doc_updated_at: None,
            doc_updated_by: None,
            created_at: None,
            dirty: None,
            extra: Map::new(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty == Some(true)
    }

    pub fn push_comment(&mut self, author: impl Into<String>, body: impl Into<String>) {
        self.comments.push(Comment::new(author, body));
    }

    /// Canonical single-record digest (sorted keys, compact separators).
    pub fn digest(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        value.to_string()
    }

    pub fn verify_commands(&self) -> Vec<String> {
        self.verify
            .iter()
            .map(|cmd| cmd.trim().to_string())
            .filter(|cmd| !cmd.is_empty())
            .collect()
    }
}

/// Current UTC time as ISO-8601 with seconds precision.
pub fn now_iso_utc() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S+00:00")
        .to_string()
}
