use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::GitError;

/// Output of a git command that exited zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Output of a git command whose exit status the caller inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitExit {
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitExit {
    /// Stderr when present, stdout otherwise; for error messages.
    pub fn message(&self) -> String {
        let err = self.stderr.trim();
        if !err.is_empty() {
            return err.to_string();
        }
        self.stdout.trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCli {
    pub binary: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
        }
    }
}

impl GitCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Runs git, requiring a zero exit status.
    pub fn run<I, S>(&self, cwd: &Path, args: I) -> Result<GitOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_env(cwd, args, &[])
    }

    /// Runs git with extra environment variables, requiring a zero exit.
    pub fn run_env<I, S>(
        &self,
        cwd: &Path,
        args: I,
        env: &[(String, String)],
    ) -> Result<GitOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (rendered, exit) = self.exec(cwd, collect_args(args), env)?;
        if !exit.success {
            return Err(GitError::CommandFailed {
                command: rendered,
                status: exit.status,
                stdout: exit.stdout,
                stderr: exit.stderr,
            });
        }
        Ok(GitOutput {
            stdout: exit.stdout,
            stderr: exit.stderr,
        })
    }

    /// Runs git and returns the exit status instead of failing on it.
    pub fn try_run<I, S>(&self, cwd: &Path, args: I) -> Result<GitExit, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.try_run_env(cwd, args, &[])
    }

    pub fn try_run_env<I, S>(
        &self,
        cwd: &Path,
        args: I,
        env: &[(String, String)],
    ) -> Result<GitExit, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (_, exit) = self.exec(cwd, collect_args(args), env)?;
        Ok(exit)
    }

    fn exec(
        &self,
        cwd: &Path,
        owned_args: Vec<OsString>,
        env: &[(String, String)],
    ) -> Result<(String, GitExit), GitError> {
        let rendered = render_command(&self.binary, &owned_args);

        let mut command = Command::new(&self.binary);
        command.current_dir(cwd);
        for arg in &owned_args {
            command.arg(arg);
        }
        for (key, value) in env {
            command.env(key, value);
        }

        let output = command.output().map_err(|source| GitError::Io {
            command: rendered.clone(),
            source,
        })?;

        let stdout =
            String::from_utf8(output.stdout).map_err(|source| GitError::NonUtf8Output {
                command: rendered.clone(),
                stream: "stdout",
                source,
            })?;
        let stderr =
            String::from_utf8(output.stderr).map_err(|source| GitError::NonUtf8Output {
                command: rendered.clone(),
                stream: "stderr",
                source,
            })?;

        Ok((
            rendered,
            GitExit {
                status: output.status.code(),
                success: output.status.success(),
                stdout,
                stderr,
            },
        ))
    }
}

fn collect_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    args.into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect()
}

fn render_command(binary: &Path, args: &[OsString]) -> String {
    let mut rendered = binary.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_captures_stdout() {
        let git = GitCli::default();
        let output = git
            .run(&std::env::temp_dir(), ["--version"])
            .expect("git --version");
        assert!(output.stdout.starts_with("git version"));
    }

    #[test]
    fn try_run_reports_nonzero_exit_without_error() {
        let git = GitCli::default();
        let exit = git
            .try_run(
                &std::env::temp_dir(),
                ["rev-parse", "--verify", "definitely-not-a-ref"],
            )
            .expect("spawn git");
        assert!(!exit.success);
    }

    #[test]
    fn run_fails_on_nonzero_exit_and_keeps_command() {
        let git = GitCli::default();
        let err = git
            .run(&std::env::temp_dir(), ["not-a-real-subcommand"])
            .expect_err("expected failure");
        match err {
            GitError::CommandFailed { command, .. } => {
                assert!(command.contains("not-a-real-subcommand"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn exit_message_prefers_stderr() {
        let exit = GitExit {
            status: Some(1),
            success: false,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        };
        assert_eq!(exit.message(), "err");

        let quiet = GitExit {
            status: Some(1),
            success: false,
            stdout: "only-out".to_string(),
            stderr: "  ".to_string(),
        };
        assert_eq!(quiet.message(), "only-out");
    }
}
