//! Per-invocation application context: repo, config, resolved paths and
//! the checkout guards every mutating verb runs through.

use std::path::{Path, PathBuf};

use swarm_core::{
    load_env_file, load_workflow_config, Event, EventKind, ResolvedPaths, WorkflowConfig,
    DEFAULT_BASE_BRANCH, GIT_CONFIG_BASE_BRANCH_KEY, SWARM_DIR,
};
use swarm_git::{self as git, GitCli, RepoHandle};
use swarm_store::{Backend, LocalBackend, RemoteBackend, TaskStore};

use crate::event_log::JsonlEventLog;
use crate::failure::Failure;

pub struct AppContext {
    pub git: GitCli,
    pub repo: RepoHandle,
    pub cwd: PathBuf,
    pub config: WorkflowConfig,
    pub paths: ResolvedPaths,
    pub branch_prefix: String,
    pub events: JsonlEventLog,
}

impl AppContext {
    /// Loads config once at entry; everything downstream receives it
    /// explicitly.
    pub fn init() -> Result<Self, Failure> {
        let cwd = std::env::current_dir().map_err(|err| Failure::msg(err.to_string()))?;
        let git = GitCli::default();
        let repo = git::discover_repo(&cwd, &git)?;
        load_env_file(&repo.root.join(".env"));
        let config = load_workflow_config(&repo.root)?;
        let paths = config.resolve_paths(&repo.root)?;
        let branch_prefix = config.task_branch_prefix()?;
        let events = JsonlEventLog::new(repo.root.join(SWARM_DIR).join("events"));
        let ctx = Self {
            git,
            repo,
            cwd,
            config,
            paths,
            branch_prefix,
            events,
        };
        ctx.maybe_pin_base_branch()?;
        Ok(ctx)
    }

    /// Base-branch priority: config value, pinned git config, "main".
    pub fn base_branch(&self) -> Result<String, Failure> {
        if let Some(branch) = self.config.config_base_branch() {
            return Ok(branch.to_string());
        }
        let pinned = git::config_get(&self.repo, &self.git, GIT_CONFIG_BASE_BRANCH_KEY)?;
        if !pinned.is_empty() {
            return Ok(pinned);
        }
        Ok(DEFAULT_BASE_BRANCH.to_string())
    }

    /// Pins the current branch as base on first use, unless it is a task
    /// branch or detached.
    fn maybe_pin_base_branch(&self) -> Result<(), Failure> {
        if self.config.config_base_branch().is_some() {
            return Ok(());
        }
        let pinned = git::config_get(&self.repo, &self.git, GIT_CONFIG_BASE_BRANCH_KEY)?;
        if !pinned.is_empty() {
            return Ok(());
        }
        let branch = git::current_branch(&self.repo, &self.git)?;
        if branch.is_empty() || branch == "HEAD" {
            return Ok(());
        }
        if branch.starts_with(&format!("{}/", self.branch_prefix)) {
            return Ok(());
        }
        git::config_set(&self.repo, &self.git, GIT_CONFIG_BASE_BRANCH_KEY, &branch)?;
        Ok(())
    }

    pub fn current_branch(&self) -> Result<String, Failure> {
        Ok(git::current_branch(&self.repo, &self.git)?)
    }

    /// True when this checkout lives under the main checkout's worktrees
    /// directory.
    pub fn is_task_worktree(&self) -> Result<bool, Failure> {
        let common = git::common_dir(&self.repo, &self.git)?;
        let Some(main_root) = common.parent() else {
            return Ok(false);
        };
        let worktrees_root = main_root.join(&self.paths.worktrees_dirname);
        let toplevel = canonical_or_lexical(&self.repo.root);
        Ok(toplevel.starts_with(canonical_or_lexical(&worktrees_root)))
    }

    pub fn context_line(&self) -> String {
        let branch = git::current_branch(&self.repo, &self.git).unwrap_or_default();
        let rel = self
            .cwd
            .strip_prefix(&self.repo.root)
            .map(|rel| {
                let text = rel.display().to_string();
                if text.is_empty() {
                    ".".to_string()
                } else {
                    text
                }
            })
            .unwrap_or_else(|_| self.cwd.display().to_string());
        format!(
            "repo_root={} cwd={} branch='{}' workflow_mode='{}'",
            self.repo.root.display(),
            rel,
            branch,
            self.config.mode()
        )
    }

    pub fn print_block(&self, label: &str, text: &str) {
        println!("{}", format!("{label}: {text}").trim_end());
    }

    pub fn require_invoked_from_repo_root(&self, action: &str) -> Result<(), Failure> {
        if canonical_or_lexical(&self.cwd) != canonical_or_lexical(&self.repo.root) {
            return Err(Failure::policy(format!(
                "Refusing {action}: command must be run from the repo root directory\n\
                 Fix:\n  1) `cd {}`\n  2) Re-run the command\n\
                 Context: {}",
                self.repo.root.display(),
                self.context_line()
            )));
        }
        Ok(())
    }

    pub fn require_not_task_worktree(&self, action: &str) -> Result<(), Failure> {
        if self.is_task_worktree()? {
            return Err(Failure::policy(format!(
                "Refusing {action}: run from the repo root checkout (not from {}/*)\n\
                 Fix:\n  1) `cd` to the main checkout\n  2) Ensure you're on the base branch (if required)\n  3) Re-run the command\n\
                 Context: {}",
                self.paths.worktrees_dirname,
                self.context_line()
            )));
        }
        Ok(())
    }

    pub fn require_branch(&self, name: &str, action: &str) -> Result<(), Failure> {
        let current = self.current_branch()?;
        if current != name {
            return Err(Failure::policy(format!(
                "Refusing {action}: must be on '{name}' (current: '{current}')\n\
                 Fix:\n  1) `git checkout {name}`\n  2) Ensure working tree is clean\n  3) Re-run the command\n\
                 Context: {}",
                self.context_line()
            )));
        }
        Ok(())
    }

    pub fn ensure_git_clean(&self, action: &str) -> Result<(), Failure> {
        let dirty = git::status_porcelain(&self.repo.root, &self.git)?;
        if !dirty.is_empty() {
            let listing = dirty
                .lines()
                .map(|line| format!("  {line}"))
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Failure::policy(format!(
                "Refusing {action}: working tree is dirty (commit/stash changes first)\n\
                 Fix:\n  1) `git status --porcelain` (review changes)\n  2) Commit/stash/reset until clean\n  3) Re-run the command\n\
                 Dirty paths:\n{listing}\n\
                 Context: {}",
                self.context_line()
            )));
        }
        Ok(())
    }

    pub fn ensure_worktrees_ignored(&self) -> Result<(), Failure> {
        let target = &self.paths.worktrees_dirname;
        if !git::check_ignored(&self.repo, &self.git, target)? {
            return Err(Failure::policy(format!(
                "Refusing operation: '{target}' is not ignored by git\n\
                 Fix:\n  1) Add `{target}` to `.gitignore`\n  2) Re-run the command\n\
                 Context: {}",
                self.context_line()
            )));
        }
        Ok(())
    }

    /// The single-writer rule for the tasks snapshot: never from a task
    /// worktree, and only from the base branch in branch_pr mode.
    pub fn require_tasks_write_context(&self, force: bool) -> Result<(), Failure> {
        if force {
            return Ok(());
        }
        if self.is_task_worktree()? {
            return Err(Failure::policy(format!(
                "Refusing tasks.json write: run from the repo root checkout (not from {}/*)\n\
                 Fix:\n  1) `cd` to the main checkout\n  2) Re-run the command\n\
                 Context: {}",
                self.paths.worktrees_dirname,
                self.context_line()
            )));
        }
        if self.config.is_branch_pr_mode() {
            self.require_branch(&self.base_branch()?, "tasks.json write")?;
        }
        Ok(())
    }

    /// Builds the task store from the configured backend, if any.
    pub fn make_store(&self) -> Result<TaskStore, Failure> {
        let Some(decl) = self.config.load_backend_decl(&self.repo.root)? else {
            return Ok(TaskStore::new(&self.paths.tasks_path, None));
        };
        let backend: Box<dyn Backend> = match decl.kind.trim() {
            "local" => {
                let root = match decl.settings.get("dir").and_then(|v| v.as_str()) {
                    Some(dir) => swarm_core::resolve_repo_relative(&self.repo.root, dir, "backend dir")?,
                    None => self.paths.workflow_dir.clone(),
                };
                Box::new(LocalBackend::new(root))
            }
            "remote" => {
                let cache_root = match decl.settings.get("cache_dir").and_then(|v| v.as_str()) {
                    Some(dir) => {
                        swarm_core::resolve_repo_relative(&self.repo.root, dir, "backend cache_dir")?
                    }
                    None => self.paths.workflow_dir.clone(),
                };
                Box::new(RemoteBackend::new(&decl.settings, LocalBackend::new(cache_root))?)
            }
            other => {
                return Err(Failure::policy(format!(
                    "Unknown backend kind '{other}' (expected local or remote)"
                )));
            }
        };
        Ok(TaskStore::new(&self.paths.tasks_path, Some(backend)))
    }

    pub fn agents_index(&self) -> Result<std::collections::BTreeSet<String>, Failure> {
        Ok(swarm_core::load_agents_index(&self.paths.agents_dir)?)
    }

    /// Best-effort: event logging never fails an operation.
    pub fn emit(&self, task_id: Option<&str>, kind: EventKind) {
        let event = Event::new(task_id.map(str::to_string), kind);
        let _ = self.events.append(&event);
    }
}

pub fn canonical_or_lexical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Resolves a caller-supplied path and requires it to stay under root.
pub fn resolve_under_root(root: &Path, raw: &str, label: &str) -> Result<PathBuf, Failure> {
    let path = Path::new(raw);
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let canonical_root = canonical_or_lexical(root);
    let canonical = canonical_or_lexical(&resolved);
    if !canonical.starts_with(&canonical_root) {
        return Err(Failure::policy(format!(
            "{label} must stay under repo root: {}",
            resolved.display()
        )));
    }
    Ok(resolved)
}
