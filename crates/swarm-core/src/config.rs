//! Workflow configuration: `.codex-swarm/config.json`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const SWARM_DIR: &str = ".codex-swarm";
pub const SWARM_CONFIG_REL: &str = ".codex-swarm/config.json";
pub const SWARM_CONFIG_SCHEMA_VERSION: u64 = 1;

pub const DEFAULT_BASE_BRANCH: &str = "main";
pub const GIT_CONFIG_BASE_BRANCH_KEY: &str = "codexswarm.baseBranch";

pub const DEFAULT_TASK_BRANCH_PREFIX: &str = "task";
pub const DEFAULT_WORKTREES_DIRNAME: &str = ".codex-swarm/worktrees";
pub const DEFAULT_TASK_ID_SUFFIX_LENGTH: usize = 6;

pub const DEFAULT_VERIFY_REQUIRED_TAGS: [&str; 3] = ["code", "backend", "frontend"];

pub const DEFAULT_TASK_DOC_SECTIONS: [&str; 7] = [
    "Summary",
    "Context",
    "Scope",
    "Risks",
    "Verify Steps",
    "Rollback Plan",
    "Notes",
];

pub const DEFAULT_TASK_DOC_REQUIRED_SECTIONS: [&str; 5] =
    ["Summary", "Scope", "Risks", "Verify Steps", "Rollback Plan"];

pub const DEFAULT_GENERIC_COMMIT_TOKENS: [&str; 8] = [
    "start", "status", "mark", "done", "wip", "update", "tasks", "task",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing swarm config: {path}")]
    Missing { path: PathBuf },
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{message}")]
    Invalid { message: String },
    #[error("config path for '{label}' must be repo-relative and stay under the repo root (got: {value})")]
    PathEscape { label: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    #[default]
    Direct,
    BranchPr,
}

impl WorkflowMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowMode::Direct => "direct",
            WorkflowMode::BranchPr => "branch_pr",
        }
    }
}

impl std::fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusCommitPolicy {
    #[default]
    Allow,
    Warn,
    Confirm,
}

impl StatusCommitPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCommitPolicy::Allow => "allow",
            StatusCommitPolicy::Warn => "warn",
            StatusCommitPolicy::Confirm => "confirm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    Start,
    Blocked,
    Verified,
}

impl CommentKind {
    fn default_rule(self) -> (&'static str, usize) {
        match self {
            CommentKind::Start => ("Start:", 40),
            CommentKind::Blocked => ("Blocked:", 40),
            CommentKind::Verified => ("Verified:", 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommentRuleConfig {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub min_chars: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommentsConfig {
    #[serde(default)]
    pub start: Option<CommentRuleConfig>,
    #[serde(default)]
    pub blocked: Option<CommentRuleConfig>,
    #[serde(default)]
    pub verified: Option<CommentRuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VerifyTagsConfig {
    #[serde(default)]
    pub required_tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DocSectionsConfig {
    #[serde(default)]
    pub sections: Option<Vec<String>>,
    #[serde(default)]
    pub required_sections: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TasksConfig {
    #[serde(default)]
    pub id_suffix_length_default: Option<u64>,
    #[serde(default)]
    pub verify: Option<VerifyTagsConfig>,
    #[serde(default)]
    pub doc: Option<DocSectionsConfig>,
    #[serde(default)]
    pub comments: Option<CommentsConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BranchSettings {
    #[serde(default)]
    pub task_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommitSettings {
    #[serde(default)]
    pub generic_tokens: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    pub tasks_path: String,
    pub agents_dir: String,
    pub agentctl_docs_path: String,
    pub workflow_dir: String,
    #[serde(default)]
    pub worktrees_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TasksBackendConfig {
    #[serde(default)]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub schema_version: u64,
    #[serde(default)]
    pub workflow_mode: Option<WorkflowMode>,
    pub paths: PathsConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub branch: BranchSettings,
    #[serde(default)]
    pub commit: CommitSettings,
    #[serde(default)]
    pub status_commit_policy: Option<StatusCommitPolicy>,
    #[serde(default)]
    pub finish_auto_status_commit: Option<bool>,
    #[serde(default)]
    pub base_branch: Option<String>,
    #[serde(default)]
    pub tasks_backend: Option<TasksBackendConfig>,
}

/// Declared backend: `{ id, kind, version, settings }` in the file named by
/// `tasks_backend.config_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDecl {
    pub id: String,
    pub kind: String,
    pub version: Value,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

/// Every configured path resolved against the repo root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub repo_root: PathBuf,
    pub tasks_path: PathBuf,
    pub tasks_path_rel: String,
    pub agents_dir: PathBuf,
    pub docs_path: PathBuf,
    pub workflow_dir: PathBuf,
    pub worktrees_dir: PathBuf,
    pub worktrees_dirname: String,
}

impl ResolvedPaths {
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.workflow_dir.join(task_id)
    }

    pub fn task_readme_path(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join("README.md")
    }

    pub fn pr_dir(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join("pr")
    }
}

pub fn parse_workflow_config(contents: &str, path: &Path) -> Result<WorkflowConfig, ConfigError> {
    let config: WorkflowConfig =
        serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if config.schema_version != SWARM_CONFIG_SCHEMA_VERSION {
        return Err(ConfigError::Invalid {
            message: format!(
                "Unsupported swarm config schema_version: {} (expected {})",
                config.schema_version, SWARM_CONFIG_SCHEMA_VERSION
            ),
        });
    }
    config.validate()?;
    Ok(config)
}

pub fn load_workflow_config(repo_root: &Path) -> Result<WorkflowConfig, ConfigError> {
    let path = repo_root.join(SWARM_CONFIG_REL);
    if !path.exists() {
        return Err(ConfigError::Missing { path });
    }
    let body = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    parse_workflow_config(&body, &path)
}

/// Rejects absolute paths and parent traversal, then joins onto the root.
pub fn resolve_repo_relative(
    repo_root: &Path,
    value: &str,
    label: &str,
) -> Result<PathBuf, ConfigError> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err(ConfigError::Invalid {
            message: format!("Missing config path for '{label}'"),
        });
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        return Err(ConfigError::PathEscape {
            label: label.to_string(),
            value: raw.to_string(),
        });
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(ConfigError::PathEscape {
                label: label.to_string(),
                value: raw.to_string(),
            });
        }
    }
    Ok(repo_root.join(path))
}

impl WorkflowConfig {
    /// Eager validation of every knob the accessors expose.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.id_suffix_length_default()?;
        self.doc_required_sections()?;
        self.task_branch_prefix()?;
        for kind in [CommentKind::Start, CommentKind::Blocked, CommentKind::Verified] {
            self.comment_rule(kind)?;
        }
        Ok(())
    }

    pub fn mode(&self) -> WorkflowMode {
        self.workflow_mode.unwrap_or_default()
    }

    pub fn is_branch_pr_mode(&self) -> bool {
        self.mode() == WorkflowMode::BranchPr
    }

    pub fn is_direct_mode(&self) -> bool {
        self.mode() == WorkflowMode::Direct
    }

    pub fn id_suffix_length_default(&self) -> Result<usize, ConfigError> {
        match self.tasks.id_suffix_length_default {
            None => Ok(DEFAULT_TASK_ID_SUFFIX_LENGTH),
            Some(raw) if (4..=12).contains(&raw) => Ok(raw as usize),
            Some(raw) => Err(ConfigError::Invalid {
                message: format!(
                    "tasks.id_suffix_length_default must be between 4 and 12 (got: {raw})"
                ),
            }),
        }
    }

    pub fn verify_required_tags(&self) -> BTreeSet<String> {
        let configured = self
            .tasks
            .verify
            .as_ref()
            .and_then(|verify| verify.required_tags.as_ref());
        match configured {
            None => DEFAULT_VERIFY_REQUIRED_TAGS
                .iter()
                .map(|tag| tag.to_string())
                .collect(),
            Some(tags) => tags
                .iter()
                .map(|tag| tag.trim().to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect(),
        }
    }

    pub fn doc_sections(&self) -> Vec<String> {
        let configured = self
            .tasks
            .doc
            .as_ref()
            .and_then(|doc| doc.sections.as_ref());
        let sections: Vec<String> = match configured {
            None => DEFAULT_TASK_DOC_SECTIONS
                .iter()
                .map(|section| section.to_string())
                .collect(),
            Some(sections) => sections
                .iter()
                .map(|section| section.trim().to_string())
                .filter(|section| !section.is_empty())
                .collect(),
        };
        let mut seen = BTreeSet::new();
        sections
            .into_iter()
            .filter(|section| seen.insert(section.clone()))
            .collect()
    }

    pub fn doc_required_sections(&self) -> Result<Vec<String>, ConfigError> {
        let configured = self
            .tasks
            .doc
            .as_ref()
            .and_then(|doc| doc.required_sections.as_ref());
        let required: Vec<String> = match configured {
            None => DEFAULT_TASK_DOC_REQUIRED_SECTIONS
                .iter()
                .map(|section| section.to_string())
                .collect(),
            Some(sections) => sections
                .iter()
                .map(|section| section.trim().to_string())
                .filter(|section| !section.is_empty())
                .collect(),
        };
        let sections = self.doc_sections();
        let unknown: Vec<&String> = required
            .iter()
            .filter(|section| !sections.contains(section))
            .collect();
        if !unknown.is_empty() {
            return Err(ConfigError::Invalid {
                message: format!(
                    "tasks.doc.required_sections contains unknown section(s): {}",
                    unknown
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }
        let mut seen = BTreeSet::new();
        Ok(required
            .into_iter()
            .filter(|section| seen.insert(section.clone()))
            .collect())
    }

    pub fn comment_rule(&self, kind: CommentKind) -> Result<(String, usize), ConfigError> {
        let (default_prefix, default_min) = kind.default_rule();
        let configured = self.tasks.comments.as_ref().and_then(|comments| match kind {
            CommentKind::Start => comments.start.as_ref(),
            CommentKind::Blocked => comments.blocked.as_ref(),
            CommentKind::Verified => comments.verified.as_ref(),
        });
        let Some(rule) = configured else {
            return Ok((default_prefix.to_string(), default_min));
        };
        let prefix = rule
            .prefix
            .as_deref()
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or(default_prefix)
            .to_string();
        let min_chars = rule.min_chars.unwrap_or(default_min);
        if min_chars < 1 {
            return Err(ConfigError::Invalid {
                message: "tasks.comments min_chars must be an integer >= 1".to_string(),
            });
        }
        Ok((prefix, min_chars))
    }

    pub fn task_branch_prefix(&self) -> Result<String, ConfigError> {
        match self.branch.task_prefix.as_deref().map(str::trim) {
            None => Ok(DEFAULT_TASK_BRANCH_PREFIX.to_string()),
            Some("") => Err(ConfigError::Invalid {
                message: "branch.task_prefix must be a non-empty string".to_string(),
            }),
            Some(prefix) if prefix.contains('/') => Err(ConfigError::Invalid {
                message: "branch.task_prefix must not contain '/'".to_string(),
            }),
            Some(prefix) => Ok(prefix.to_string()),
        }
    }

    pub fn generic_commit_tokens(&self) -> BTreeSet<String> {
        match self.commit.generic_tokens.as_ref() {
            None => DEFAULT_GENERIC_COMMIT_TOKENS
                .iter()
                .map(|token| token.to_string())
                .collect(),
            Some(tokens) => tokens
                .iter()
                .map(|token| token.trim().to_lowercase())
                .filter(|token| !token.is_empty())
                .collect(),
        }
    }

    pub fn status_commit_policy(&self) -> StatusCommitPolicy {
        self.status_commit_policy.unwrap_or_default()
    }

    pub fn finish_auto_status_commit(&self) -> bool {
        self.finish_auto_status_commit.unwrap_or(false)
    }

    pub fn config_base_branch(&self) -> Option<&str> {
        self.base_branch
            .as_deref()
            .map(str::trim)
            .filter(|branch| !branch.is_empty())
    }

    pub fn resolve_paths(&self, repo_root: &Path) -> Result<ResolvedPaths, ConfigError> {
        let tasks_path = resolve_repo_relative(repo_root, &self.paths.tasks_path, "tasks_path")?;
        let worktrees_dirname = self
            .paths
            .worktrees_dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .unwrap_or(DEFAULT_WORKTREES_DIRNAME)
            .to_string();
        Ok(ResolvedPaths {
            repo_root: repo_root.to_path_buf(),
            tasks_path_rel: self.paths.tasks_path.trim().to_string(),
            tasks_path,
            agents_dir: resolve_repo_relative(repo_root, &self.paths.agents_dir, "agents_dir")?,
            docs_path: resolve_repo_relative(
                repo_root,
                &self.paths.agentctl_docs_path,
                "agentctl_docs_path",
            )?,
            workflow_dir: resolve_repo_relative(
                repo_root,
                &self.paths.workflow_dir,
                "workflow_dir",
            )?,
            worktrees_dir: resolve_repo_relative(
                repo_root,
                &worktrees_dirname,
                "paths.worktrees_dir",
            )?,
            worktrees_dirname,
        })
    }

    /// Loads the backend declaration named by `tasks_backend.config_path`,
    /// or None when no backend is configured.
    pub fn load_backend_decl(&self, repo_root: &Path) -> Result<Option<BackendDecl>, ConfigError> {
        let Some(config_path) = self
            .tasks_backend
            .as_ref()
            .and_then(|backend| backend.config_path.as_deref())
            .map(str::trim)
            .filter(|path| !path.is_empty())
        else {
            return Ok(None);
        };
        let path = resolve_repo_relative(repo_root, config_path, "tasks_backend.config_path")?;
        let body = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let decl: BackendDecl =
            serde_json::from_str(&body).map_err(|source| ConfigError::Parse { path, source })?;
        if decl.id.trim().is_empty() || decl.kind.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: format!("{config_path} is missing required field 'id' or 'kind'"),
            });
        }
        Ok(Some(decl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "schema_version": 1,
            "workflow_mode": "branch_pr",
            "paths": {
                "tasks_path": "tasks.json",
                "agents_dir": ".codex-swarm/agents",
                "agentctl_docs_path": ".codex-swarm/agentctl.md",
                "workflow_dir": ".codex-swarm/tasks"
            },
            "tasks": {
                "id_suffix_length_default": 6,
                "verify": { "required_tags": ["code", "backend"] },
                "comments": { "start": { "prefix": "Begin:", "min_chars": 20 } }
            },
            "branch": { "task_prefix": "task" },
            "status_commit_policy": "confirm"
        }"#
    }

    fn parse(contents: &str) -> Result<WorkflowConfig, ConfigError> {
        parse_workflow_config(contents, Path::new("config.json"))
    }

    #[test]
    fn parses_sample_and_exposes_accessors() {
        let config = parse(sample()).expect("parse config");
        assert!(config.is_branch_pr_mode());
        assert_eq!(config.id_suffix_length_default().unwrap(), 6);
        assert_eq!(
            config.verify_required_tags(),
            ["backend", "code"]
                .iter()
                .map(|s| s.to_string())
                .collect::<BTreeSet<_>>()
        );
        assert_eq!(
            config.comment_rule(CommentKind::Start).unwrap(),
            ("Begin:".to_string(), 20)
        );
        assert_eq!(
            config.comment_rule(CommentKind::Verified).unwrap(),
            ("Verified:".to_string(), 60)
        );
        assert_eq!(config.status_commit_policy(), StatusCommitPolicy::Confirm);
        assert!(!config.finish_auto_status_commit());
    }

    #[test]
    fn rejects_wrong_schema_version() {
        let err = parse(&sample().replace("\"schema_version\": 1", "\"schema_version\": 2"))
            .expect_err("schema mismatch");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_unknown_workflow_mode() {
        let err = parse(&sample().replace("branch_pr", "yolo")).expect_err("bad mode");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn rejects_suffix_length_out_of_range() {
        let err = parse(&sample().replace(
            "\"id_suffix_length_default\": 6",
            "\"id_suffix_length_default\": 3",
        ))
        .expect_err("short suffix");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn default_doc_sections_apply_when_unset() {
        let config = parse(sample()).unwrap();
        assert_eq!(config.doc_sections(), DEFAULT_TASK_DOC_SECTIONS.to_vec());
        assert_eq!(
            config.doc_required_sections().unwrap(),
            DEFAULT_TASK_DOC_REQUIRED_SECTIONS.to_vec()
        );
    }

    #[test]
    fn required_sections_must_be_known() {
        let contents = sample().replace(
            "\"comments\":",
            "\"doc\": { \"required_sections\": [\"Nope\"] }, \"comments\":",
        );
        let err = parse(&contents).expect_err("unknown required section");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn resolve_paths_rejects_absolute_and_traversal() {
        let config = parse(sample()).unwrap();
        let root = Path::new("/repo");
        let resolved = config.resolve_paths(root).expect("resolve");
        assert_eq!(resolved.tasks_path, PathBuf::from("/repo/tasks.json"));
        assert_eq!(resolved.worktrees_dirname, DEFAULT_WORKTREES_DIRNAME);
        assert_eq!(
            resolved.task_readme_path("T1"),
            PathBuf::from("/repo/.codex-swarm/tasks/T1/README.md")
        );

        let absolute = parse(&sample().replace("\"tasks.json\"", "\"/etc/tasks.json\"")).unwrap();
        assert!(matches!(
            absolute.resolve_paths(root),
            Err(ConfigError::PathEscape { .. })
        ));

        let traversal = parse(&sample().replace("\"tasks.json\"", "\"../tasks.json\"")).unwrap();
        assert!(matches!(
            traversal.resolve_paths(root),
            Err(ConfigError::PathEscape { .. })
        ));
    }

    #[test]
    fn branch_prefix_must_not_contain_slash() {
        let err = parse(&sample().replace("\"task_prefix\": \"task\"", "\"task_prefix\": \"a/b\""))
            .expect_err("slash in prefix");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn generic_tokens_default_set() {
        let config = parse(sample()).unwrap();
        let tokens = config.generic_commit_tokens();
        assert!(tokens.contains("wip"));
        assert!(tokens.contains("tasks"));
        assert_eq!(tokens.len(), DEFAULT_GENERIC_COMMIT_TOKENS.len());
    }
}
