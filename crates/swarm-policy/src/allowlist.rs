//! Path allowlists and the commit guard rule chain.

use std::collections::BTreeSet;

use swarm_core::{task_branch_name, parse_task_id_from_task_branch};

use crate::error::PolicyError;
use crate::subject::{
    commit_message_has_meaningful_summary, commit_subject_mentions_task,
    commit_subject_missing_error,
};

/// Prefix containment: `path` equals the prefix or lives under it.
pub fn path_is_under(path: &str, prefix: &str) -> bool {
    let path = strip_dot_slash(path);
    let root = strip_dot_slash(prefix).trim_end_matches('/').to_string();
    if root.is_empty() {
        return false;
    }
    path == root || path.starts_with(&format!("{root}/"))
}

fn strip_dot_slash(path: &str) -> String {
    let mut out = path.trim();
    while let Some(rest) = out.strip_prefix("./") {
        out = rest;
    }
    out.to_string()
}

/// Allow prefixes derived from changed paths: the parent directory, or
/// the file itself at repo root; deduplicated and sorted.
pub fn suggest_allow_prefixes<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut prefixes = BTreeSet::new();
    for raw in paths {
        let path = strip_dot_slash(raw.as_ref());
        if path.is_empty() {
            continue;
        }
        match path.rsplit_once('/') {
            Some((dir, _)) => prefixes.insert(dir.to_string()),
            None => prefixes.insert(path),
        };
    }
    prefixes.into_iter().collect()
}

/// Changed paths matching the allowlist; the tasks snapshot file is
/// excluded unless explicitly allowed.
pub fn filter_stageable(
    changed: &[String],
    allow: &[String],
    allow_tasks: bool,
    tasks_path_rel: &str,
) -> Vec<String> {
    let allowed: Vec<String> = allow
        .iter()
        .map(|prefix| strip_dot_slash(prefix))
        .filter(|prefix| !prefix.is_empty())
        .collect();
    let mut staged: BTreeSet<String> = BTreeSet::new();
    for path in changed {
        if !allow_tasks && path == tasks_path_rel {
            continue;
        }
        if allowed.iter().any(|prefix| path_is_under(path, prefix)) {
            staged.insert(path.clone());
        }
    }
    staged.into_iter().collect()
}

/// Everything the guard needs to know about the checkout and config.
#[derive(Debug, Clone)]
pub struct GuardContext {
    pub branch_pr_mode: bool,
    pub current_branch: String,
    pub base_branch: String,
    pub branch_prefix: String,
    pub tasks_path_rel: String,
    pub worktrees_dirname: String,
    pub in_task_worktree: bool,
    pub generic_tokens: BTreeSet<String>,
    pub context_line: String,
}

#[derive(Debug, Clone)]
pub struct GuardRequest<'a> {
    pub task_id: &'a str,
    pub message: &'a str,
    pub allow: &'a [String],
    pub allow_tasks: bool,
    pub require_clean: bool,
    pub staged: &'a [String],
    pub unstaged: &'a [String],
}

/// The full commit guard: subject rules, branch/worktree constraints,
/// clean-tree requirements and the per-file allowlist. Returns warnings
/// for conditions that are tolerated but worth surfacing.
pub fn guard_commit_check(
    request: &GuardRequest<'_>,
    ctx: &GuardContext,
) -> Result<Vec<String>, PolicyError> {
    let mut warnings = Vec::new();

    if !commit_subject_mentions_task(request.task_id, request.message) {
        return Err(PolicyError::violation(commit_subject_missing_error(
            &[request.task_id.to_string()],
            request.message,
            None,
        )));
    }
    if !commit_message_has_meaningful_summary(request.task_id, request.message, &ctx.generic_tokens)
    {
        return Err(PolicyError::violation(
            "Commit message is too generic; include a short summary (and constraints when relevant), \
             e.g. \"✨ <task-id> Add X (no network)\"",
        ));
    }

    if request.staged.is_empty() {
        return Err(PolicyError::violation("No staged files"));
    }

    if ctx.branch_pr_mode {
        let tasks_staged = request
            .staged
            .iter()
            .any(|path| path == &ctx.tasks_path_rel);

        if !request.allow_tasks && ctx.current_branch == ctx.base_branch {
            return Err(PolicyError::violation(format!(
                "Refusing commit: code/docs commits are forbidden on base branch '{}' in workflow_mode='branch_pr'\n\
                 Fix:\n  1) Create a task branch + worktree: `agentctl work start {} --agent <AGENT> --slug <slug> --worktree`\n  2) Commit from `{}`\n\
                 Context: {}",
                ctx.base_branch,
                request.task_id,
                task_branch_name(&ctx.branch_prefix, request.task_id, "<slug>"),
                ctx.context_line,
            )));
        }
        if tasks_staged && !request.allow_tasks {
            return Err(PolicyError::violation(format!(
                "Refusing commit: {} is forbidden in workflow_mode='branch_pr'\n\
                 Fix:\n  1) Remove {} from the index (`git restore --staged {}`)\n  2) Commit code/docs/PR artifacts on the task branch\n  3) Close the task on {} via INTEGRATOR (tasks file only in closure commit)\n\
                 Context: {}",
                ctx.tasks_path_rel,
                ctx.tasks_path_rel,
                ctx.tasks_path_rel,
                ctx.base_branch,
                ctx.context_line,
            )));
        }
        if tasks_staged && request.allow_tasks {
            if ctx.in_task_worktree {
                return Err(PolicyError::violation(format!(
                    "Refusing commit: {} from a worktree checkout ({}/*)\nContext: {}",
                    ctx.tasks_path_rel, ctx.worktrees_dirname, ctx.context_line,
                )));
            }
            if ctx.current_branch != ctx.base_branch {
                return Err(PolicyError::violation(format!(
                    "Refusing commit: {} allowed only on '{}' in branch_pr mode\nContext: {}",
                    ctx.tasks_path_rel, ctx.base_branch, ctx.context_line,
                )));
            }
        }
        if !request.allow_tasks {
            let parsed = parse_task_id_from_task_branch(&ctx.branch_prefix, &ctx.current_branch);
            if parsed != Some(request.task_id) {
                return Err(PolicyError::violation(format!(
                    "Refusing commit: branch '{}' does not match task {}\n\
                     Fix:\n  1) Switch to `{}`\n  2) Re-run `agentctl guard commit {} ...`\n\
                     Context: {}",
                    ctx.current_branch,
                    request.task_id,
                    task_branch_name(&ctx.branch_prefix, request.task_id, "<slug>"),
                    request.task_id,
                    ctx.context_line,
                )));
            }
        }
    }

    if request.allow.is_empty() {
        return Err(PolicyError::violation(
            "Provide at least one --allow <path> prefix",
        ));
    }

    if request.require_clean && !request.unstaged.is_empty() {
        let listing = request
            .unstaged
            .iter()
            .map(|path| format!("❌ unstaged: {path}"))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(PolicyError::violation(format!(
            "{listing}\nWorking tree is dirty"
        )));
    }
    if !request.unstaged.is_empty() {
        warnings.push(format!(
            "working tree has {} unstaged file(s); ignoring (multi-agent workspace)",
            request.unstaged.len()
        ));
    }

    for path in request.staged {
        if !request.allow_tasks && path == &ctx.tasks_path_rel {
            return Err(PolicyError::violation(format!(
                "Staged file is forbidden by default: {path} (use --allow-tasks to override)"
            )));
        }
        if !request
            .allow
            .iter()
            .any(|prefix| path_is_under(path, prefix))
        {
            return Err(PolicyError::violation(format!(
                "Staged file is outside allowlist: {path}"
            )));
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(branch_pr: bool, branch: &str) -> GuardContext {
        GuardContext {
            branch_pr_mode: branch_pr,
            current_branch: branch.to_string(),
            base_branch: "main".to_string(),
            branch_prefix: "task".to_string(),
            tasks_path_rel: "tasks.json".to_string(),
            worktrees_dirname: ".codex-swarm/worktrees".to_string(),
            in_task_worktree: false,
            generic_tokens: ["start", "status", "mark", "done", "wip", "update", "tasks", "task"]
                .iter()
                .map(|token| token.to_string())
                .collect(),
            context_line: "repo_root=/repo cwd=. branch='main' workflow_mode='direct'".to_string(),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn path_is_under_handles_roots_and_dot_slash() {
        assert!(path_is_under("src/lib.rs", "src"));
        assert!(path_is_under("./src/lib.rs", "src/"));
        assert!(path_is_under("src", "src"));
        assert!(!path_is_under("srcx/lib.rs", "src"));
        assert!(!path_is_under("src/lib.rs", ""));
    }

    #[test]
    fn suggest_prefixes_uses_parent_dirs() {
        let prefixes = suggest_allow_prefixes(["src/a.rs", "src/b.rs", "docs/x.md", "README.md"]);
        assert_eq!(prefixes, strings(&["README.md", "docs", "src"]));
    }

    #[test]
    fn filter_stageable_excludes_snapshot_by_default() {
        let changed = strings(&["src/a.rs", "tasks.json", "other/b.rs"]);
        let allow = strings(&["src", "tasks.json"]);
        assert_eq!(
            filter_stageable(&changed, &allow, false, "tasks.json"),
            strings(&["src/a.rs"])
        );
        assert_eq!(
            filter_stageable(&changed, &allow, true, "tasks.json"),
            strings(&["src/a.rs", "tasks.json"])
        );
    }

    fn base_request<'a>(
        message: &'a str,
        allow: &'a [String],
        staged: &'a [String],
        unstaged: &'a [String],
    ) -> GuardRequest<'a> {
        GuardRequest {
            task_id: "202501020304-ABCD12",
            message,
            allow,
            allow_tasks: false,
            require_clean: false,
            staged,
            unstaged,
        }
    }

    #[test]
    fn guard_passes_for_good_subject_and_allowlisted_paths() {
        let allow = strings(&["src"]);
        let staged = strings(&["src/cache.rs"]);
        let unstaged = strings(&[]);
        let request = base_request("✨ ABCD12 add cache (no network)", &allow, &staged, &unstaged);
        let warnings = guard_commit_check(&request, &ctx(false, "main")).expect("guard passes");
        assert!(warnings.is_empty());
    }

    #[test]
    fn guard_rejects_generic_subject() {
        let allow = strings(&["src"]);
        let staged = strings(&["src/cache.rs"]);
        let unstaged = strings(&[]);
        let request = base_request("done tasks update", &allow, &staged, &unstaged);
        let err = guard_commit_check(&request, &ctx(false, "main")).expect_err("generic subject");
        assert!(err.to_string().contains("does not mention task suffix"));

        let request = base_request("ABCD12 update tasks", &allow, &staged, &unstaged);
        let err = guard_commit_check(&request, &ctx(false, "main")).expect_err("only generic");
        assert!(err.to_string().contains("too generic"));
    }

    #[test]
    fn guard_rejects_outside_allowlist_and_snapshot() {
        let allow = strings(&["src"]);
        let staged = strings(&["docs/notes.md"]);
        let unstaged = strings(&[]);
        let request = base_request("✨ ABCD12 add notes", &allow, &staged, &unstaged);
        let err = guard_commit_check(&request, &ctx(false, "main")).expect_err("outside allowlist");
        assert!(err.to_string().contains("outside allowlist"));

        let allow = strings(&["tasks.json"]);
        let staged = strings(&["tasks.json"]);
        let request = base_request("✨ ABCD12 close out", &allow, &staged, &unstaged);
        let err = guard_commit_check(&request, &ctx(false, "main")).expect_err("snapshot denied");
        assert!(err.to_string().contains("forbidden by default"));
    }

    #[test]
    fn guard_requires_staged_files_and_allow_prefixes() {
        let allow = strings(&["src"]);
        let staged = strings(&[]);
        let unstaged = strings(&[]);
        let request = base_request("✨ ABCD12 add cache", &allow, &staged, &unstaged);
        let err = guard_commit_check(&request, &ctx(false, "main")).expect_err("nothing staged");
        assert!(err.to_string().contains("No staged files"));

        let allow: Vec<String> = Vec::new();
        let staged = strings(&["src/cache.rs"]);
        let request = base_request("✨ ABCD12 add cache", &allow, &staged, &unstaged);
        let err = guard_commit_check(&request, &ctx(false, "main")).expect_err("no allow");
        assert!(err.to_string().contains("--allow"));
    }

    #[test]
    fn branch_pr_mode_requires_matching_task_branch() {
        let allow = strings(&["src"]);
        let staged = strings(&["src/cache.rs"]);
        let unstaged = strings(&[]);
        let request = base_request("✨ ABCD12 add cache", &allow, &staged, &unstaged);

        let err = guard_commit_check(&request, &ctx(true, "main")).expect_err("base branch");
        assert!(err.to_string().contains("forbidden on base branch"));

        let err = guard_commit_check(&request, &ctx(true, "task/202501020399-OTHER1/x"))
            .expect_err("wrong task branch");
        assert!(err.to_string().contains("does not match task"));

        let warnings =
            guard_commit_check(&request, &ctx(true, "task/202501020304-ABCD12/add-cache"))
                .expect("matching branch passes");
        assert!(warnings.is_empty());
    }

    #[test]
    fn require_clean_rejects_unstaged_files() {
        let allow = strings(&["src"]);
        let staged = strings(&["src/cache.rs"]);
        let unstaged = strings(&["src/other.rs"]);
        let mut request = base_request("✨ ABCD12 add cache", &allow, &staged, &unstaged);
        request.require_clean = true;
        let err = guard_commit_check(&request, &ctx(false, "main")).expect_err("dirty tree");
        assert!(err.to_string().contains("Working tree is dirty"));

        request.require_clean = false;
        let warnings = guard_commit_check(&request, &ctx(false, "main")).expect("tolerated");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("1 unstaged file(s)"));
    }
}
