//! Diffs and history between a base and a head ref.

use crate::command::GitCli;
use crate::error::GitError;
use crate::repo::RepoHandle;

/// Changed file names over `base...head` (merge-base diff).
pub fn diff_names(
    repo: &RepoHandle,
    git: &GitCli,
    base: &str,
    head: &str,
) -> Result<Vec<String>, GitError> {
    let output = git.run(
        &repo.root,
        ["diff", "--name-only", &format!("{base}...{head}")],
    )?;
    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// `git diff --stat base...head`, newline-terminated.
pub fn diff_stat(
    repo: &RepoHandle,
    git: &GitCli,
    base: &str,
    head: &str,
) -> Result<String, GitError> {
    let output = git.run(&repo.root, ["diff", "--stat", &format!("{base}...{head}")])?;
    Ok(format!("{}\n", output.stdout.trim_end()))
}

/// Commit subjects on `base..head`, newest first, bounded by `limit`.
pub fn log_subjects(
    repo: &RepoHandle,
    git: &GitCli,
    base: &str,
    head: &str,
    limit: usize,
) -> Result<Vec<String>, GitError> {
    let output = git.run(
        &repo.root,
        [
            "log".to_string(),
            format!("--max-count={limit}"),
            "--pretty=format:%s".to_string(),
            format!("{base}..{head}"),
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

/// Last commit subject on a branch.
pub fn last_subject(repo: &RepoHandle, git: &GitCli, branch: &str) -> Result<String, GitError> {
    let output = git.run(&repo.root, ["log", "-1", "--pretty=format:%s", branch])?;
    Ok(output.stdout.trim().to_string())
}

/// (ahead, behind) counts of `branch` relative to `base`.
pub fn ahead_behind(
    repo: &RepoHandle,
    git: &GitCli,
    branch: &str,
    base: &str,
) -> Result<(usize, usize), GitError> {
    let output = git.run(
        &repo.root,
        [
            "rev-list",
            "--left-right",
            "--count",
            &format!("{base}...{branch}"),
        ],
    )?;
    let raw = output.stdout.trim();
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() != 2 {
        return Ok((0, 0));
    }
    let behind = parts[0].parse().unwrap_or(0);
    let ahead = parts[1].parse().unwrap_or(0);
    Ok((ahead, behind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::GitCli;
    use crate::repo::discover_repo;
    use crate::repo::testutil::{init_repo, run_git};
    use std::fs;

    fn repo_with_branch() -> (std::path::PathBuf, RepoHandle, GitCli) {
        let root = init_repo("diff");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        run_git(&root, &["switch", "-c", "task/x"]);
        fs::write(root.join("feature.txt"), "feature\n").unwrap();
        run_git(&root, &["add", "feature.txt"]);
        run_git(&root, &["commit", "-m", "✨ X add feature"]);
        run_git(&root, &["switch", "main"]);
        (root, repo, git)
    }

    #[test]
    fn diff_names_lists_branch_changes() {
        let (root, repo, git) = repo_with_branch();
        assert_eq!(
            diff_names(&repo, &git, "main", "task/x").unwrap(),
            vec!["feature.txt"]
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn diff_stat_is_newline_terminated() {
        let (root, repo, git) = repo_with_branch();
        let stat = diff_stat(&repo, &git, "main", "task/x").unwrap();
        assert!(stat.contains("feature.txt"));
        assert!(stat.ends_with('\n'));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn log_subjects_and_last_subject() {
        let (root, repo, git) = repo_with_branch();
        let subjects = log_subjects(&repo, &git, "main", "task/x", 50).unwrap();
        assert_eq!(subjects, vec!["✨ X add feature"]);
        assert_eq!(last_subject(&repo, &git, "task/x").unwrap(), "✨ X add feature");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn ahead_behind_counts() {
        let (root, repo, git) = repo_with_branch();
        assert_eq!(ahead_behind(&repo, &git, "task/x", "main").unwrap(), (1, 0));
        assert_eq!(ahead_behind(&repo, &git, "main", "main").unwrap(), (0, 0));
        let _ = fs::remove_dir_all(root);
    }
}
