use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A policy refusal; the message carries the remediation steps.
    #[error("{message}")]
    Violation { message: String },
    #[error("refusing to overwrite existing hook: {path}\nFix:\n  1) Move the existing hook aside\n  2) Re-run `agentctl hooks install`")]
    UnmanagedHook { path: PathBuf },
    #[error("failed to write hook {path}: {source}")]
    HookWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PolicyError {
    pub fn violation(message: impl Into<String>) -> Self {
        PolicyError::Violation {
            message: message.into(),
        }
    }
}
