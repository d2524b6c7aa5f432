//! CLI-boundary error: a printable message plus an exit code.
//!
//! Policy, validation, state and context refusals exit 2; git failures
//! pass the subprocess status through; everything else exits 1.

use swarm_core::ConfigError;
use swarm_docs::DocError;
use swarm_git::GitError;
use swarm_policy::PolicyError;
use swarm_store::StoreError;

#[derive(Debug)]
pub struct Failure {
    pub message: String,
    pub code: i32,
}

impl Failure {
    pub fn policy(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: 2,
        }
    }

    pub fn tool(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code: if code == 0 { 1 } else { code },
        }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: 1,
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<GitError> for Failure {
    fn from(err: GitError) -> Self {
        let code = err.exit_status().unwrap_or(1);
        match err {
            GitError::HooksDirOutsideRepo { .. } => Failure::policy(err.to_string()),
            other => Failure::tool(other.short_message(), code),
        }
    }
}

impl From<ConfigError> for Failure {
    fn from(err: ConfigError) -> Self {
        Failure::policy(err.to_string())
    }
}

impl From<PolicyError> for Failure {
    fn from(err: PolicyError) -> Self {
        Failure::policy(err.to_string())
    }
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::InvalidTask { .. }
            | StoreError::UnknownTask { .. }
            | StoreError::DuplicateTask { .. }
            | StoreError::BackendConfig { .. }
            | StoreError::Unsupported { .. }
            | StoreError::RemoteDuplicateTask { .. }
            | StoreError::SyncConflict { .. }
            | StoreError::IdGeneration => Failure::policy(err.to_string()),
            _ => Failure::msg(err.to_string()),
        }
    }
}

impl From<DocError> for Failure {
    fn from(err: DocError) -> Self {
        match &err {
            DocError::Json { .. } | DocError::MissingSection { .. } => {
                Failure::policy(err.to_string())
            }
            _ => Failure::msg(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_failures_exit_two() {
        assert_eq!(Failure::policy("nope").code, 2);
        let failure: Failure = PolicyError::violation("denied").into();
        assert_eq!(failure.code, 2);
        assert_eq!(failure.message, "denied");
    }

    #[test]
    fn git_failures_pass_status_through() {
        let err = GitError::CommandFailed {
            command: "git merge".to_string(),
            status: Some(128),
            stdout: String::new(),
            stderr: "fatal: not possible".to_string(),
        };
        let failure: Failure = err.into();
        assert_eq!(failure.code, 128);
        assert_eq!(failure.message, "fatal: not possible");
    }

    #[test]
    fn store_validation_errors_exit_two_but_io_exits_one() {
        let failure: Failure = StoreError::UnknownTask {
            id: "X".to_string(),
        }
        .into();
        assert_eq!(failure.code, 2);

        let failure: Failure = StoreError::MissingFile {
            path: "/x/tasks.json".into(),
        }
        .into();
        assert_eq!(failure.code, 1);
    }

    #[test]
    fn zero_codes_are_normalized_to_one() {
        assert_eq!(Failure::tool("odd", 0).code, 1);
    }
}
