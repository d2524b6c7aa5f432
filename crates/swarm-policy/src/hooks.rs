//! Managed git hooks: script bodies, install/uninstall, and the checks
//! the hooks run.

use std::path::{Path, PathBuf};

use swarm_core::{parse_task_id_from_task_branch, task_branch_example};

use crate::error::PolicyError;
use crate::subject::{commit_subject_mentions_task, commit_subject_missing_error, commit_subject_tokens};

pub const HOOK_MARKER: &str = "codex-swarm: managed by agentctl";
pub const HOOK_NAMES: [&str; 2] = ["commit-msg", "pre-commit"];

pub const HOOK_ENV_TASK_ID: &str = "CODEX_SWARM_TASK_ID";
pub const HOOK_ENV_ALLOW_TASKS: &str = "CODEX_SWARM_ALLOW_TASKS";
pub const HOOK_ENV_ALLOW_BASE: &str = "CODEX_SWARM_ALLOW_BASE";

/// The env triple handed to `git commit` so managed hooks see the
/// caller's intent.
pub fn build_hook_env(
    task_id: Option<&str>,
    allow_tasks: bool,
    allow_base: bool,
) -> Vec<(String, String)> {
    let mut env = vec![
        (
            HOOK_ENV_ALLOW_TASKS.to_string(),
            if allow_tasks { "1" } else { "0" }.to_string(),
        ),
        (
            HOOK_ENV_ALLOW_BASE.to_string(),
            if allow_base { "1" } else { "0" }.to_string(),
        ),
    ];
    if let Some(task_id) = task_id.map(str::trim).filter(|id| !id.is_empty()) {
        env.push((HOOK_ENV_TASK_ID.to_string(), task_id.to_string()));
    }
    env
}

pub fn hook_script_text(hook: &str) -> Result<String, PolicyError> {
    if !HOOK_NAMES.contains(&hook) {
        return Err(PolicyError::violation(format!("Unknown hook: {hook}")));
    }
    let mut lines = vec![
        "#!/bin/sh".to_string(),
        format!("# {HOOK_MARKER} (do not edit)"),
        "set -e".to_string(),
        "ROOT=\"$(git rev-parse --show-toplevel 2>/dev/null)\"".to_string(),
        "if [ -z \"$ROOT\" ]; then".to_string(),
        "  echo \"codex-swarm hooks: unable to resolve repo root\" >&2".to_string(),
        "  exit 1".to_string(),
        "fi".to_string(),
        "if ! command -v agentctl >/dev/null 2>&1; then".to_string(),
        "  echo \"codex-swarm hooks: agentctl not found in PATH\" >&2".to_string(),
        "  exit 1".to_string(),
        "fi".to_string(),
        "cd \"$ROOT\"".to_string(),
        format!("exec agentctl hooks run {hook} \"$@\""),
    ];
    lines.push(String::new());
    Ok(lines.join("\n"))
}

pub fn hook_is_managed(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(content) => content.contains(HOOK_MARKER),
        Err(_) => false,
    }
}

/// Installs both managed hooks; refuses to overwrite foreign ones.
pub fn install_hooks(hooks_dir: &Path) -> Result<Vec<PathBuf>, PolicyError> {
    std::fs::create_dir_all(hooks_dir).map_err(|source| PolicyError::HookWrite {
        path: hooks_dir.to_path_buf(),
        source,
    })?;
    let mut installed = Vec::new();
    for hook in HOOK_NAMES {
        let path = hooks_dir.join(hook);
        if path.exists() && !hook_is_managed(&path) {
            return Err(PolicyError::UnmanagedHook { path });
        }
        std::fs::write(&path, hook_script_text(hook)?).map_err(|source| {
            PolicyError::HookWrite {
                path: path.clone(),
                source,
            }
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            std::fs::set_permissions(&path, perms).map_err(|source| PolicyError::HookWrite {
                path: path.clone(),
                source,
            })?;
        }
        installed.push(path);
    }
    Ok(installed)
}

/// Removes managed hooks; foreign hooks are reported, not touched.
pub fn uninstall_hooks(hooks_dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut removed = Vec::new();
    let mut skipped = Vec::new();
    if !hooks_dir.exists() {
        return (removed, skipped);
    }
    for hook in HOOK_NAMES {
        let path = hooks_dir.join(hook);
        if !path.exists() {
            continue;
        }
        if !hook_is_managed(&path) {
            skipped.push(path);
            continue;
        }
        if std::fs::remove_file(&path).is_ok() {
            removed.push(path);
        }
    }
    (removed, skipped)
}

/// First non-comment line of a commit message file.
pub fn read_commit_subject(content: &str) -> String {
    for line in content.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        return stripped.to_string();
    }
    String::new()
}

/// commit-msg: with an active task id, the subject must mention its
/// suffix; otherwise any known suffix is accepted.
pub fn commit_msg_check(
    subject: &str,
    active_task_id: Option<&str>,
    known_suffixes: &[String],
) -> Result<(), PolicyError> {
    if subject.is_empty() {
        return Err(PolicyError::violation("Commit message subject is empty"));
    }
    if let Some(task_id) = active_task_id.map(str::trim).filter(|id| !id.is_empty()) {
        if !commit_subject_mentions_task(task_id, subject) {
            return Err(PolicyError::violation(commit_subject_missing_error(
                &[task_id.to_string()],
                subject,
                None,
            )));
        }
        return Ok(());
    }
    if known_suffixes.is_empty() {
        return Err(PolicyError::violation(
            "No task IDs available to validate commit subject; run agentctl or uninstall hooks.",
        ));
    }
    let tokens = commit_subject_tokens(subject);
    if !known_suffixes
        .iter()
        .any(|suffix| tokens.contains(&suffix.to_lowercase()))
    {
        let sample = sample_list(known_suffixes, 3);
        return Err(PolicyError::violation(format!(
            "Commit subject must mention at least one task ID suffix (segment after the last dash).\n\
             Subject: '{subject}'\n\
             Known suffixes (sample): {sample}\n\
             Fix:\n  1) Update the subject to include the task suffix\n  2) Re-run `git commit`"
        )));
    }
    Ok(())
}

/// Checkout facts the pre-commit hook needs.
#[derive(Debug, Clone)]
pub struct HookCheckout {
    pub branch_pr_mode: bool,
    pub current_branch: String,
    pub base_branch: String,
    pub branch_prefix: String,
    pub tasks_path_rel: String,
    pub worktrees_dirname: String,
    pub in_task_worktree: bool,
    pub allow_tasks: bool,
    pub allow_base: bool,
    pub context_line: String,
}

/// pre-commit: protects the tasks snapshot and the base branch.
pub fn pre_commit_check(staged: &[String], checkout: &HookCheckout) -> Result<(), PolicyError> {
    if staged.is_empty() {
        return Ok(());
    }
    let tasks_staged = staged.iter().any(|path| path == &checkout.tasks_path_rel);

    if tasks_staged && !checkout.allow_tasks {
        return Err(PolicyError::violation(format!(
            "Refusing commit: {} is protected by codex-swarm hooks.\n\
             Fix:\n  1) Use `agentctl commit <task-id> ... --allow-tasks`\n  2) Or uninstall hooks: `agentctl hooks uninstall`",
            checkout.tasks_path_rel
        )));
    }

    if tasks_staged {
        if checkout.in_task_worktree {
            return Err(PolicyError::violation(format!(
                "Refusing commit: {} from a worktree checkout ({}/*)\nContext: {}",
                checkout.tasks_path_rel, checkout.worktrees_dirname, checkout.context_line
            )));
        }
        if checkout.branch_pr_mode && checkout.current_branch != checkout.base_branch {
            return Err(PolicyError::violation(format!(
                "Refusing commit: {} allowed only on '{}' in workflow_mode='branch_pr'\nContext: {}",
                checkout.tasks_path_rel, checkout.base_branch, checkout.context_line
            )));
        }
    }

    if checkout.branch_pr_mode {
        let non_tasks: Vec<&String> = staged
            .iter()
            .filter(|path| *path != &checkout.tasks_path_rel)
            .collect();
        if !non_tasks.is_empty() {
            if checkout.current_branch == checkout.base_branch && !checkout.allow_base {
                return Err(PolicyError::violation(format!(
                    "Refusing commit: code/docs commits are forbidden on the base branch '{}' in workflow_mode='branch_pr'\n\
                     Fix:\n  1) Create a task branch + worktree: `agentctl work start <task-id> --agent <AGENT> --slug <slug> --worktree`\n  2) Commit from `{}`\n\
                     Context: {}",
                    checkout.base_branch,
                    task_branch_example(&checkout.branch_prefix),
                    checkout.context_line
                )));
            }
            if checkout.current_branch != checkout.base_branch
                && parse_task_id_from_task_branch(&checkout.branch_prefix, &checkout.current_branch)
                    .is_none()
            {
                return Err(PolicyError::violation(format!(
                    "Refusing commit: branch '{}' is not a task branch in branch_pr mode\n\
                     Fix:\n  1) Switch to `{}`\n  2) Commit from the task branch\n\
                     Context: {}",
                    checkout.current_branch,
                    task_branch_example(&checkout.branch_prefix),
                    checkout.context_line
                )));
            }
        }
    }

    Ok(())
}

fn sample_list(items: &[String], max_items: usize) -> String {
    if items.len() <= max_items {
        return items.join(", ");
    }
    format!(
        "{}, +{}",
        items[..max_items].join(", "),
        items.len() - max_items
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn checkout(branch: &str, allow_tasks: bool, allow_base: bool) -> HookCheckout {
        HookCheckout {
            branch_pr_mode: true,
            current_branch: branch.to_string(),
            base_branch: "main".to_string(),
            branch_prefix: "task".to_string(),
            tasks_path_rel: "tasks.json".to_string(),
            worktrees_dirname: ".codex-swarm/worktrees".to_string(),
            in_task_worktree: false,
            allow_tasks,
            allow_base,
            context_line: "repo_root=/repo cwd=. branch='main' workflow_mode='branch_pr'"
                .to_string(),
        }
    }

    #[test]
    fn hook_scripts_carry_marker_and_dispatch() {
        for hook in HOOK_NAMES {
            let script = hook_script_text(hook).unwrap();
            assert!(script.starts_with("#!/bin/sh"));
            assert!(script.contains(HOOK_MARKER));
            assert!(script.contains(&format!("hooks run {hook}")));
        }
        assert!(hook_script_text("post-commit").is_err());
    }

    #[test]
    fn install_refuses_foreign_hooks_and_uninstall_skips_them() {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let dir = std::env::temp_dir().join(format!("swarm-hooks-{now}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("pre-commit"), "#!/bin/sh\necho custom\n").unwrap();

        let err = install_hooks(&dir).expect_err("foreign hook");
        assert!(matches!(err, PolicyError::UnmanagedHook { .. }));

        std::fs::remove_file(dir.join("pre-commit")).unwrap();
        let installed = install_hooks(&dir).expect("install");
        assert_eq!(installed.len(), 2);
        // Idempotent: a second install overwrites managed hooks silently.
        install_hooks(&dir).expect("re-install");

        std::fs::write(dir.join("commit-msg"), "#!/bin/sh\necho custom\n").unwrap();
        let (removed, skipped) = uninstall_hooks(&dir);
        assert_eq!(removed.len(), 1);
        assert_eq!(skipped.len(), 1);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn commit_subject_reading_skips_comments() {
        assert_eq!(
            read_commit_subject("# comment\n\n✨ ABCD12 add cache\nbody"),
            "✨ ABCD12 add cache"
        );
        assert_eq!(read_commit_subject("# only comments\n"), "");
    }

    #[test]
    fn commit_msg_check_with_active_task() {
        assert!(commit_msg_check("✨ ABCD12 add cache", Some("202501020304-ABCD12"), &[]).is_ok());
        assert!(commit_msg_check("✨ add cache", Some("202501020304-ABCD12"), &[]).is_err());
    }

    #[test]
    fn commit_msg_check_against_known_suffixes() {
        let suffixes = strings(&["ABCD12", "WXYZ99"]);
        assert!(commit_msg_check("✨ wxyz99 tweak", None, &suffixes).is_ok());
        let err = commit_msg_check("✨ nothing relevant", None, &suffixes).expect_err("no suffix");
        assert!(err.to_string().contains("Known suffixes"));
        assert!(commit_msg_check("anything", None, &[]).is_err());
    }

    #[test]
    fn pre_commit_protects_snapshot() {
        let staged = strings(&["tasks.json"]);
        let err = pre_commit_check(&staged, &checkout("main", false, false))
            .expect_err("snapshot protected");
        assert!(err.to_string().contains("protected by codex-swarm hooks"));

        assert!(pre_commit_check(&staged, &checkout("main", true, false)).is_ok());

        let mut from_worktree = checkout("task/202501020304-ABCD12/x", true, false);
        from_worktree.in_task_worktree = true;
        let err = pre_commit_check(&staged, &from_worktree).expect_err("worktree");
        assert!(err.to_string().contains("from a worktree checkout"));

        let err = pre_commit_check(&staged, &checkout("task/202501020304-ABCD12/x", true, false))
            .expect_err("non-base branch");
        assert!(err.to_string().contains("allowed only on 'main'"));
    }

    #[test]
    fn pre_commit_gates_code_on_base_and_foreign_branches() {
        let staged = strings(&["src/lib.rs"]);
        let err = pre_commit_check(&staged, &checkout("main", false, false))
            .expect_err("code on base branch");
        assert!(err.to_string().contains("forbidden on the base branch"));

        assert!(pre_commit_check(&staged, &checkout("main", false, true)).is_ok());

        let err = pre_commit_check(&staged, &checkout("feature/foo", false, false))
            .expect_err("foreign branch");
        assert!(err.to_string().contains("not a task branch"));

        assert!(
            pre_commit_check(&staged, &checkout("task/202501020304-ABCD12/x", false, false))
                .is_ok()
        );
    }

    #[test]
    fn empty_index_passes_pre_commit() {
        assert!(pre_commit_check(&[], &checkout("main", false, false)).is_ok());
    }

    #[test]
    fn hook_env_encodes_flags() {
        let env = build_hook_env(Some("202501020304-ABCD12"), true, false);
        assert!(env.contains(&(HOOK_ENV_ALLOW_TASKS.to_string(), "1".to_string())));
        assert!(env.contains(&(HOOK_ENV_ALLOW_BASE.to_string(), "0".to_string())));
        assert!(env.contains(&(HOOK_ENV_TASK_ID.to_string(), "202501020304-ABCD12".to_string())));

        let env = build_hook_env(None, false, true);
        assert_eq!(env.len(), 2);
    }
}
