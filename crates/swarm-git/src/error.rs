use std::path::PathBuf;
use std::string::FromUtf8Error;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git command failed to start ({command}): {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("git command returned non-zero exit ({command}) status={status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("git command output was not valid UTF-8 ({command}, {stream}): {source}")]
    NonUtf8Output {
        command: String,
        stream: &'static str,
        #[source]
        source: FromUtf8Error,
    },
    #[error("path is not inside a git repository: {path}")]
    NotARepository { path: PathBuf },
    #[error("invalid git output: {context}")]
    Parse { context: String },
    #[error(
        "refusing to manage git hooks outside the repository (hooks_path={path}, repo_root={repo_root})"
    )]
    HooksDirOutsideRepo { path: PathBuf, repo_root: PathBuf },
}

impl GitError {
    /// Subprocess exit status when the failure came from git itself.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            GitError::CommandFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// The short message shown to users: stderr when git produced one.
    pub fn short_message(&self) -> String {
        match self {
            GitError::CommandFailed {
                command,
                stderr,
                stdout,
                ..
            } => {
                let err = stderr.trim();
                if !err.is_empty() {
                    return err.to_string();
                }
                let out = stdout.trim();
                if !out.is_empty() {
                    return out.to_string();
                }
                format!("git command failed: {command}")
            }
            other => other.to_string(),
        }
    }
}
