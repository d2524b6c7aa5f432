//! Mutating git operations: commit, merge, rebase, reset, branches.

use std::path::Path;

use crate::command::{GitCli, GitExit};
use crate::error::GitError;
use crate::repo::RepoHandle;

/// `git commit -m <message>` with extra env (the hook protocol), failing
/// on non-zero exit.
pub fn commit(
    cwd: &Path,
    git: &GitCli,
    message: &str,
    env: &[(String, String)],
) -> Result<(), GitError> {
    git.run_env(cwd, ["commit", "-m", message], env)?;
    Ok(())
}

/// Commit variant for pipelines that roll back on failure themselves.
pub fn try_commit(
    cwd: &Path,
    git: &GitCli,
    message: &str,
    env: &[(String, String)],
) -> Result<GitExit, GitError> {
    git.try_run_env(cwd, ["commit", "-m", message], env)
}

pub fn try_merge_squash(repo: &RepoHandle, git: &GitCli, branch: &str) -> Result<GitExit, GitError> {
    git.try_run(&repo.root, ["merge", "--squash", branch])
}

pub fn try_merge_no_ff(
    repo: &RepoHandle,
    git: &GitCli,
    branch: &str,
    message: &str,
    env: &[(String, String)],
) -> Result<GitExit, GitError> {
    git.try_run_env(&repo.root, ["merge", "--no-ff", branch, "-m", message], env)
}

pub fn try_merge_ff_only(
    repo: &RepoHandle,
    git: &GitCli,
    branch: &str,
) -> Result<GitExit, GitError> {
    git.try_run(&repo.root, ["merge", "--ff-only", branch])
}

pub fn try_rebase(cwd: &Path, git: &GitCli, base: &str) -> Result<GitExit, GitError> {
    git.try_run(cwd, ["rebase", base])
}

pub fn rebase_abort(cwd: &Path, git: &GitCli) {
    let _ = git.try_run(cwd, ["rebase", "--abort"]);
}

/// Best-effort `git reset --hard <rev>`; used to restore pre-merge state.
pub fn reset_hard(repo: &RepoHandle, git: &GitCli, rev: &str) {
    let _ = git.try_run(&repo.root, ["reset", "--hard", rev]);
}

pub fn staged_names(repo: &RepoHandle, git: &GitCli) -> Result<Vec<String>, GitError> {
    let output = git.run(&repo.root, ["diff", "--cached", "--name-only"])?;
    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// `git switch -c <branch> <base>`.
pub fn switch_create(
    repo: &RepoHandle,
    git: &GitCli,
    branch: &str,
    base: &str,
) -> Result<(), GitError> {
    git.run(&repo.root, ["switch", "-c", branch, base])?;
    Ok(())
}

pub fn delete_branch(
    repo: &RepoHandle,
    git: &GitCli,
    branch: &str,
    force: bool,
) -> Result<(), GitError> {
    let flag = if force { "-D" } else { "-d" };
    git.run(&repo.root, ["branch", flag, branch])?;
    Ok(())
}

/// Local branches under `refs/heads/<prefix>/`.
pub fn list_branches_with_prefix(
    repo: &RepoHandle,
    git: &GitCli,
    prefix: &str,
) -> Result<Vec<String>, GitError> {
    let output = git.run(
        &repo.root,
        [
            "for-each-ref",
            "--format=%(refname:short)",
            &format!("refs/heads/{prefix}"),
        ],
    )?;
    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::testutil::{init_repo, run_git};
    use crate::repo::{commit_info, discover_repo, head_sha, rev_parse};
    use std::fs;

    #[test]
    fn commit_records_message() {
        let root = init_repo("ops-commit");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        fs::write(root.join("a.txt"), "a\n").unwrap();
        run_git(&root, &["add", "a.txt"]);
        commit(&root, &git, "✨ ABCD12 add a", &[]).unwrap();
        let info = commit_info(&repo, &git, "HEAD").unwrap();
        assert_eq!(info.subject, "✨ ABCD12 add a");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn squash_merge_stages_branch_changes() {
        let root = init_repo("ops-squash");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        run_git(&root, &["switch", "-c", "task/x"]);
        fs::write(root.join("b.txt"), "b\n").unwrap();
        run_git(&root, &["add", "b.txt"]);
        run_git(&root, &["commit", "-m", "✨ X add b"]);
        run_git(&root, &["switch", "main"]);

        let exit = try_merge_squash(&repo, &git, "task/x").unwrap();
        assert!(exit.success);
        assert_eq!(staged_names(&repo, &git).unwrap(), vec!["b.txt"]);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn no_ff_merge_creates_merge_commit() {
        let root = init_repo("ops-merge");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        run_git(&root, &["switch", "-c", "task/y"]);
        fs::write(root.join("c.txt"), "c\n").unwrap();
        run_git(&root, &["add", "c.txt"]);
        run_git(&root, &["commit", "-m", "✨ Y add c"]);
        run_git(&root, &["switch", "main"]);

        let exit = try_merge_no_ff(&repo, &git, "task/y", "🔀 Y merge task/y", &[]).unwrap();
        assert!(exit.success);
        let info = commit_info(&repo, &git, "HEAD").unwrap();
        assert_eq!(info.subject, "🔀 Y merge task/y");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn reset_hard_restores_previous_head() {
        let root = init_repo("ops-reset");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        let before = head_sha(&repo, &git).unwrap();
        fs::write(root.join("d.txt"), "d\n").unwrap();
        run_git(&root, &["add", "d.txt"]);
        run_git(&root, &["commit", "-m", "extra"]);
        assert_ne!(head_sha(&repo, &git).unwrap(), before);

        reset_hard(&repo, &git, &before);
        assert_eq!(rev_parse(&repo, &git, "HEAD").unwrap(), before);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn branch_listing_and_deletion() {
        let root = init_repo("ops-branches");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        run_git(&root, &["branch", "task/202501020304-ABCD12/one"]);
        run_git(&root, &["branch", "other/zzz"]);

        let branches = list_branches_with_prefix(&repo, &git, "task").unwrap();
        assert_eq!(branches, vec!["task/202501020304-ABCD12/one"]);

        delete_branch(&repo, &git, "task/202501020304-ABCD12/one", true).unwrap();
        assert!(list_branches_with_prefix(&repo, &git, "task")
            .unwrap()
            .is_empty());

        let _ = fs::remove_dir_all(root);
    }
}
