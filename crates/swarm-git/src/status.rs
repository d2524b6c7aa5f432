//! Working tree and index state.

use std::path::Path;

use crate::command::GitCli;
use crate::error::GitError;

pub fn status_porcelain(cwd: &Path, git: &GitCli) -> Result<String, GitError> {
    let output = git.run(cwd, ["status", "--porcelain"])?;
    Ok(output.stdout.trim().to_string())
}

pub fn is_clean(cwd: &Path, git: &GitCli) -> Result<bool, GitError> {
    Ok(status_porcelain(cwd, git)?.is_empty())
}

pub fn staged_files(cwd: &Path, git: &GitCli) -> Result<Vec<String>, GitError> {
    let output = git.run(cwd, ["diff", "--name-only", "--cached"])?;
    Ok(non_empty_lines(&output.stdout))
}

pub fn unstaged_files(cwd: &Path, git: &GitCli) -> Result<Vec<String>, GitError> {
    let output = git.run(cwd, ["diff", "--name-only"])?;
    Ok(non_empty_lines(&output.stdout))
}

/// Every changed path from `git status --porcelain`; renames resolve to
/// the new name.
pub fn changed_paths(cwd: &Path, git: &GitCli) -> Result<Vec<String>, GitError> {
    let output = git.run(cwd, ["status", "--porcelain"])?;
    let mut paths = Vec::new();
    for raw in output.stdout.lines() {
        let line = raw.trim_end();
        if line.len() < 3 {
            continue;
        }
        let mut entry = &line[3..];
        if let Some((_, renamed)) = entry.split_once(" -> ") {
            entry = renamed;
        }
        let entry = entry.trim();
        if !entry.is_empty() {
            paths.push(entry.to_string());
        }
    }
    Ok(paths)
}

pub fn stage_paths(cwd: &Path, git: &GitCli, paths: &[String]) -> Result<(), GitError> {
    let mut args: Vec<String> = vec!["add".to_string(), "--".to_string()];
    args.extend(paths.iter().cloned());
    git.run(cwd, args)?;
    Ok(())
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::testutil::{init_repo, run_git};
    use std::fs;

    #[test]
    fn clean_tree_reports_clean() {
        let root = init_repo("status-clean");
        let git = GitCli::default();
        assert!(is_clean(&root, &git).unwrap());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn staged_and_unstaged_files_are_separated() {
        let root = init_repo("status-split");
        let git = GitCli::default();

        fs::write(root.join("staged.txt"), "a\n").unwrap();
        run_git(&root, &["add", "staged.txt"]);
        fs::write(root.join("README.md"), "changed\n").unwrap();

        assert_eq!(staged_files(&root, &git).unwrap(), vec!["staged.txt"]);
        assert_eq!(unstaged_files(&root, &git).unwrap(), vec!["README.md"]);
        assert!(!is_clean(&root, &git).unwrap());

        let changed = changed_paths(&root, &git).unwrap();
        assert!(changed.contains(&"staged.txt".to_string()));
        assert!(changed.contains(&"README.md".to_string()));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn changed_paths_resolve_renames() {
        let root = init_repo("status-rename");
        let git = GitCli::default();
        run_git(&root, &["mv", "README.md", "RENAMED.md"]);
        let changed = changed_paths(&root, &git).unwrap();
        assert_eq!(changed, vec!["RENAMED.md"]);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn stage_paths_adds_to_index() {
        let root = init_repo("status-stage");
        let git = GitCli::default();
        fs::write(root.join("new.txt"), "x\n").unwrap();
        stage_paths(&root, &git, &["new.txt".to_string()]).unwrap();
        assert_eq!(staged_files(&root, &git).unwrap(), vec!["new.txt"]);
        let _ = fs::remove_dir_all(root);
    }
}
