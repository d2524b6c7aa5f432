//! Worktree listing, creation and removal.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command::GitCli;
use crate::error::GitError;
use crate::repo::RepoHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedWorktree {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub head: Option<String>,
}

pub fn list_worktrees(repo: &RepoHandle, git: &GitCli) -> Result<Vec<ListedWorktree>, GitError> {
    let output = git.run(&repo.root, ["worktree", "list", "--porcelain"])?;
    parse_worktree_list(&output.stdout)
}

/// Creates a worktree at `path` for `branch`; with `new_from_base` the
/// branch is created off that base (`worktree add -b`).
pub fn worktree_add(
    repo: &RepoHandle,
    git: &GitCli,
    path: &Path,
    branch: &str,
    new_from_base: Option<&str>,
) -> Result<(), GitError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| GitError::Io {
            command: format!("create_dir_all {}", parent.display()),
            source,
        })?;
    }
    let path_arg = path.as_os_str().to_os_string();
    match new_from_base {
        Some(base) => {
            let mut args = vec![
                std::ffi::OsString::from("worktree"),
                std::ffi::OsString::from("add"),
                std::ffi::OsString::from("-b"),
                std::ffi::OsString::from(branch),
                path_arg,
            ];
            args.push(std::ffi::OsString::from(base));
            git.run(&repo.root, args)?;
        }
        None => {
            git.run(
                &repo.root,
                [
                    std::ffi::OsString::from("worktree"),
                    std::ffi::OsString::from("add"),
                    path_arg,
                    std::ffi::OsString::from(branch),
                ],
            )?;
        }
    }
    Ok(())
}

pub fn worktree_remove(
    repo: &RepoHandle,
    git: &GitCli,
    path: &Path,
    force: bool,
) -> Result<(), GitError> {
    let mut args = vec![
        std::ffi::OsString::from("worktree"),
        std::ffi::OsString::from("remove"),
    ];
    if force {
        args.push(std::ffi::OsString::from("--force"));
    }
    args.push(path.as_os_str().to_os_string());
    git.run(&repo.root, args)?;
    Ok(())
}

/// The worktree a branch is checked out in, if any.
pub fn find_worktree_for_branch(
    repo: &RepoHandle,
    git: &GitCli,
    branch: &str,
) -> Result<Option<PathBuf>, GitError> {
    let want = branch.trim();
    if want.is_empty() {
        return Ok(None);
    }
    for entry in list_worktrees(repo, git)? {
        if entry.branch.as_deref() == Some(want) {
            return Ok(Some(entry.path));
        }
    }
    Ok(None)
}

/// The branch registered for a worktree path, if any.
pub fn find_branch_for_worktree(
    repo: &RepoHandle,
    git: &GitCli,
    path: &Path,
) -> Result<Option<String>, GitError> {
    let want = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    for entry in list_worktrees(repo, git)? {
        let entry_path =
            std::fs::canonicalize(&entry.path).unwrap_or_else(|_| entry.path.clone());
        if entry_path == want {
            return Ok(entry.branch);
        }
    }
    Ok(None)
}

pub fn parse_worktree_list(raw: &str) -> Result<Vec<ListedWorktree>, GitError> {
    let mut listed = Vec::new();

    let mut current_path: Option<PathBuf> = None;
    let mut current_branch: Option<String> = None;
    let mut current_head: Option<String> = None;

    for line in raw.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if let Some(path) = current_path.take() {
                listed.push(ListedWorktree {
                    path,
                    branch: current_branch.take(),
                    head: current_head.take(),
                });
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("worktree ") {
            current_path = Some(PathBuf::from(rest.trim()));
            continue;
        }
        if let Some(rest) = line.strip_prefix("branch ") {
            let branch = rest.trim().trim_start_matches("refs/heads/").to_string();
            current_branch = Some(branch);
            continue;
        }
        if let Some(rest) = line.strip_prefix("HEAD ") {
            current_head = Some(rest.trim().to_string());
            continue;
        }
    }

    if listed.is_empty() && !raw.trim().is_empty() {
        return Err(GitError::Parse {
            context: "unable to parse git worktree list output".to_string(),
        });
    }

    Ok(listed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::testutil::{init_repo, run_git};
    use crate::repo::discover_repo;
    use std::fs;

    #[test]
    fn parse_worktree_list_parses_multiple_entries_and_trims_refs_prefix() {
        let raw = "\
worktree /repo
HEAD 1111111111111111111111111111111111111111
branch refs/heads/main

worktree /repo/.codex-swarm/worktrees/T1-slug
HEAD 2222222222222222222222222222222222222222
branch refs/heads/task/T1/slug

";
        let parsed = parse_worktree_list(raw).expect("parse worktree list");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].path, PathBuf::from("/repo"));
        assert_eq!(parsed[0].branch.as_deref(), Some("main"));
        assert_eq!(parsed[1].branch.as_deref(), Some("task/T1/slug"));
    }

    #[test]
    fn parse_worktree_list_handles_detached_entry() {
        let raw = "\
worktree /repo/x
HEAD 3333333333333333333333333333333333333333
detached

";
        let parsed = parse_worktree_list(raw).expect("parse worktree list");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].branch, None);
    }

    #[test]
    fn parse_worktree_list_rejects_garbage() {
        let err = parse_worktree_list("nonsense output").expect_err("expected parse error");
        assert!(matches!(err, GitError::Parse { .. }));
    }

    #[test]
    fn create_find_and_remove_worktree() {
        let root = init_repo("worktree");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).expect("discover repo");

        let wt_path = root.join(".codex-swarm/worktrees/T1-slug");
        worktree_add(&repo, &git, &wt_path, "task/T1/slug", Some("main"))
            .expect("create worktree");
        assert!(wt_path.exists());

        assert_eq!(
            find_worktree_for_branch(&repo, &git, "task/T1/slug")
                .unwrap()
                .map(|p| std::fs::canonicalize(p).unwrap()),
            Some(std::fs::canonicalize(&wt_path).unwrap())
        );
        assert_eq!(
            find_branch_for_worktree(&repo, &git, &wt_path).unwrap(),
            Some("task/T1/slug".to_string())
        );

        worktree_remove(&repo, &git, &wt_path, true).expect("remove worktree");
        assert!(!wt_path.exists());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn worktree_add_without_base_uses_existing_branch() {
        let root = init_repo("worktree-existing");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        run_git(&root, &["branch", "task/T2/slug"]);

        let wt_path = root.join(".codex-swarm/worktrees/T2-slug");
        worktree_add(&repo, &git, &wt_path, "task/T2/slug", None).expect("attach worktree");
        assert_eq!(
            find_branch_for_worktree(&repo, &git, &wt_path).unwrap(),
            Some("task/T2/slug".to_string())
        );

        let _ = fs::remove_dir_all(root);
    }
}
