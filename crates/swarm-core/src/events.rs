//! Event types for the JSONL operation log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated {
        title: String,
    },
    StatusChanged {
        from: String,
        to: String,
    },
    CommentAdded {
        author: String,
    },
    TaskFinished {
        commit: String,
    },
    SnapshotExported,
    PrOpened {
        branch: String,
    },
    PrUpdated {
        head_sha: String,
    },
    Integrated {
        branch: String,
        strategy: String,
        merge_commit: String,
    },
    VerifyStarted {
        commands: usize,
    },
    VerifyCompleted {
        success: bool,
    },
    VerifySkipped {
        sha: String,
    },
    BranchCreated {
        branch: String,
    },
    BranchRemoved {
        branch: String,
    },
    WorktreeCreated {
        path: String,
    },
    SyncPushed {
        count: usize,
    },
    SyncPulled {
        count: usize,
    },
    HooksInstalled,
    HooksUninstalled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub task_id: Option<String>,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(task_id: Option<String>, kind: EventKind) -> Self {
        let now = Utc::now();
        Self {
            id: format!("evt-{}", now.timestamp_nanos_opt().unwrap_or_default()),
            task_id,
            at: now,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_serializes_with_snake_case_variant_names() {
        let kind = EventKind::StatusChanged {
            from: "TODO".to_string(),
            to: "DOING".to_string(),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("status_changed"), "got: {json}");
    }

    #[test]
    fn event_round_trips() {
        let event = Event::new(
            Some("202501020304-ABCD12".to_string()),
            EventKind::VerifyCompleted { success: true },
        );
        let json = serde_json::to_string(&event).unwrap();
        let decoded: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }
}
