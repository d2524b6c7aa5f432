use std::path::{Path, PathBuf};

use crate::command::GitCli;
use crate::error::GitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub root: PathBuf,
    pub git_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub subject: String,
}

pub fn discover_repo(start_path: &Path, git: &GitCli) -> Result<RepoHandle, GitError> {
    let inside = match git.run(start_path, ["rev-parse", "--is-inside-work-tree"]) {
        Ok(output) => output.stdout.trim().eq("true"),
        Err(GitError::CommandFailed { .. }) => false,
        Err(err) => return Err(err),
    };

    if !inside {
        return Err(GitError::NotARepository {
            path: start_path.to_path_buf(),
        });
    }

    let root_raw = git.run(start_path, ["rev-parse", "--show-toplevel"])?;
    let root = PathBuf::from(root_raw.stdout.trim());

    let git_dir_raw = git.run(&root, ["rev-parse", "--git-dir"])?;
    let git_dir_rel = PathBuf::from(git_dir_raw.stdout.trim());
    let git_dir = if git_dir_rel.is_absolute() {
        git_dir_rel
    } else {
        root.join(git_dir_rel)
    };

    Ok(RepoHandle { root, git_dir })
}

pub fn current_branch(repo: &RepoHandle, git: &GitCli) -> Result<String, GitError> {
    let output = git.run(&repo.root, ["rev-parse", "--abbrev-ref", "HEAD"])?;
    Ok(output.stdout.trim().to_string())
}

pub fn head_sha(repo: &RepoHandle, git: &GitCli) -> Result<String, GitError> {
    rev_parse(repo, git, "HEAD")
}

pub fn rev_parse(repo: &RepoHandle, git: &GitCli, rev: &str) -> Result<String, GitError> {
    let output = git.run(&repo.root, ["rev-parse", rev])?;
    Ok(output.stdout.trim().to_string())
}

pub fn branch_exists(repo: &RepoHandle, git: &GitCli, branch: &str) -> Result<bool, GitError> {
    let exit = git.try_run(
        &repo.root,
        [
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ],
    )?;
    Ok(exit.success)
}

/// Empty string when the key is unset.
pub fn config_get(repo: &RepoHandle, git: &GitCli, key: &str) -> Result<String, GitError> {
    let key = key.trim();
    if key.is_empty() {
        return Ok(String::new());
    }
    let exit = git.try_run(&repo.root, ["config", "--get", key])?;
    if !exit.success {
        return Ok(String::new());
    }
    Ok(exit.stdout.trim().to_string())
}

pub fn config_set(repo: &RepoHandle, git: &GitCli, key: &str, value: &str) -> Result<(), GitError> {
    git.run(&repo.root, ["config", "--local", key, value])?;
    Ok(())
}

pub fn common_dir(repo: &RepoHandle, git: &GitCli) -> Result<PathBuf, GitError> {
    let output = git.run(&repo.root, ["rev-parse", "--git-common-dir"])?;
    let raw = output.stdout.trim();
    if raw.is_empty() {
        return Err(GitError::Parse {
            context: "git rev-parse --git-common-dir returned nothing".to_string(),
        });
    }
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(repo.root.join(path))
    }
}

/// Resolves the hooks directory and refuses locations outside the repo
/// root or the common git dir.
pub fn hooks_dir(repo: &RepoHandle, git: &GitCli) -> Result<PathBuf, GitError> {
    let output = git.run(&repo.root, ["rev-parse", "--git-path", "hooks"])?;
    let raw = output.stdout.trim();
    if raw.is_empty() {
        return Err(GitError::Parse {
            context: "git rev-parse --git-path hooks returned nothing".to_string(),
        });
    }
    let path = PathBuf::from(raw);
    let path = if path.is_absolute() {
        path
    } else {
        repo.root.join(path)
    };

    let repo_root = canonical_or_lexical(&repo.root);
    let common = canonical_or_lexical(&common_dir(repo, git)?);
    let resolved = canonical_or_lexical(&path);
    if !resolved.starts_with(&repo_root) && !resolved.starts_with(&common) {
        return Err(GitError::HooksDirOutsideRepo {
            path: resolved,
            repo_root,
        });
    }
    Ok(path)
}

fn canonical_or_lexical(path: &Path) -> PathBuf {
    // Canonicalize when the path exists (hooks dirs may not, yet); the
    // lexical form is an acceptable fallback for the containment check.
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Hash and subject of a revision, via `git show -s`.
pub fn commit_info(repo: &RepoHandle, git: &GitCli, rev: &str) -> Result<CommitInfo, GitError> {
    let output = git.run(
        &repo.root,
        ["show", "-s", "--pretty=format:%H%x1f%s", rev],
    )?;
    let raw = output.stdout.trim();
    let Some((hash, subject)) = raw.split_once('\u{1f}') else {
        return Err(GitError::Parse {
            context: format!("unexpected git show output for rev {rev}"),
        });
    };
    Ok(CommitInfo {
        hash: hash.trim().to_string(),
        subject: subject.trim().to_string(),
    })
}

/// File content at `rev:relpath`, or None when the path is absent there.
pub fn show_file_at_rev(
    repo: &RepoHandle,
    git: &GitCli,
    rev: &str,
    relpath: &str,
) -> Result<Option<String>, GitError> {
    let rel = relpath.trim().trim_start_matches('/');
    if rel.is_empty() {
        return Ok(None);
    }
    let exit = git.try_run(&repo.root, ["show", &format!("{rev}:{rel}")])?;
    if !exit.success {
        return Ok(None);
    }
    Ok(Some(exit.stdout))
}

pub fn check_ignored(repo: &RepoHandle, git: &GitCli, target: &str) -> Result<bool, GitError> {
    let exit = git.try_run(&repo.root, ["check-ignore", "-q", target])?;
    Ok(exit.success)
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::process::Command;

    pub fn unique_temp_dir(prefix: &str) -> PathBuf {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!("swarm-git-{prefix}-{now}"))
    }

    pub fn run_git(cwd: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .expect("spawn git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    pub fn init_repo(prefix: &str) -> PathBuf {
        let root = unique_temp_dir(prefix);
        fs::create_dir_all(&root).expect("create temp repo");
        run_git(&root, &["init", "-b", "main"]);
        run_git(&root, &["config", "user.name", "Test User"]);
        run_git(&root, &["config", "user.email", "test@example.com"]);
        fs::write(root.join("README.md"), "init\n").expect("write file");
        run_git(&root, &["add", "README.md"]);
        run_git(&root, &["commit", "-m", "init"]);
        root
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{init_repo, run_git};
    use super::*;
    use std::fs;

    #[test]
    fn discover_and_read_basic_refs() {
        let root = init_repo("repo");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).expect("discover repo");
        assert!(repo.git_dir.ends_with(".git"));

        assert_eq!(current_branch(&repo, &git).unwrap(), "main");
        let head = head_sha(&repo, &git).unwrap();
        assert_eq!(head.len(), 40);

        let info = commit_info(&repo, &git, "HEAD").expect("commit info");
        assert_eq!(info.hash, head);
        assert_eq!(info.subject, "init");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn discover_rejects_non_repo() {
        let dir = super::testutil::unique_temp_dir("not-a-repo");
        fs::create_dir_all(&dir).expect("create dir");
        let err = discover_repo(&dir, &GitCli::default()).expect_err("not a repo");
        assert!(matches!(err, GitError::NotARepository { .. }));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn branch_exists_checks_refs() {
        let root = init_repo("branches");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        run_git(&root, &["branch", "task/x"]);
        assert!(branch_exists(&repo, &git, "task/x").unwrap());
        assert!(!branch_exists(&repo, &git, "nope").unwrap());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn config_get_set_round_trip() {
        let root = init_repo("config");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        assert_eq!(config_get(&repo, &git, "codexswarm.baseBranch").unwrap(), "");
        config_set(&repo, &git, "codexswarm.baseBranch", "main").unwrap();
        assert_eq!(
            config_get(&repo, &git, "codexswarm.baseBranch").unwrap(),
            "main"
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn show_file_at_rev_reads_committed_content() {
        let root = init_repo("show");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        let text = show_file_at_rev(&repo, &git, "HEAD", "README.md")
            .unwrap()
            .expect("content");
        assert_eq!(text, "init\n");
        assert_eq!(
            show_file_at_rev(&repo, &git, "HEAD", "missing.md").unwrap(),
            None
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn hooks_dir_stays_inside_repo() {
        let root = init_repo("hooks");
        let git = GitCli::default();
        let repo = discover_repo(&root, &git).unwrap();
        let hooks = hooks_dir(&repo, &git).expect("hooks dir");
        assert!(hooks.ends_with("hooks"));
        let _ = fs::remove_dir_all(root);
    }
}
