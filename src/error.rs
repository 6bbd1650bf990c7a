//! Error types for sitesync
//!
//! One `thiserror` enum for the whole library. Error messages include a
//! clear description of what went wrong and, where possible, a suggestion
//! for how to fix it.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for sitesync operations
pub type SitesyncResult<T> = Result<T, SitesyncError>;

/// Main error type for sitesync operations
#[derive(Error, Debug)]
pub enum SitesyncError {
    /// Malformed config file, unknown option, or invalid remote URL
    #[error("config error in {file}: {message}\n  → Fix: check the deployment config against the documented keys")]
    Config { file: PathBuf, message: String },

    /// Invalid include/ignore pattern
    #[error("invalid pattern '{pattern}': {message}")]
    Filter { pattern: String, message: String },

    /// Could not establish or authenticate a server session
    #[error("cannot connect to {target}: {message}\n  → Fix: verify host, port and credentials; the server must be reachable from this machine")]
    Connection { target: String, message: String },

    /// Mid-session I/O failure; retryable
    #[error("transfer failed for {path}: {message}")]
    Transport { path: String, message: String },

    /// Expected remote resource is absent
    #[error("remote file not found: {path}")]
    NotFound { path: String },

    /// Remote manifest exists but cannot be parsed
    #[error("cannot parse deployment manifest at line {line}: '{content}'\n  → Fix: the remote manifest is damaged; delete it to force a full redeploy")]
    ManifestParse { line: usize, content: String },

    /// A before/afterUpload/after job failed
    #[error("job '{job}' failed ({detail})")]
    Hook { job: String, detail: String },

    /// Another deployment already holds the lock sentinel
    #[error("another deployment appears to be running ({sentinel} exists)\n  → Fix: wait for it to finish, or pass --force-unlock if it crashed")]
    ConcurrentDeployment { sentinel: String },

    /// Rollback itself failed; partial remote state remains
    #[error("rollback failed, the remote may hold partial state: {message}\n  → Fix: inspect the server and remove stray *.deploytmp files by hand")]
    FatalState { message: String },

    /// Operation is not supported by this server driver
    #[error("operation '{op}' is not supported by the {driver} driver")]
    Unsupported { op: &'static str, driver: &'static str },

    /// Local IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SitesyncError {
    /// Process exit code for this error.
    ///
    /// 2 for configuration problems, 3 for the deployment lock,
    /// 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            SitesyncError::Config { .. } | SitesyncError::Filter { .. } => 2,
            SitesyncError::ConcurrentDeployment { .. } => 3,
            _ => 1,
        }
    }

    /// True for failures worth retrying within a session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SitesyncError::Transport { .. } | SitesyncError::Connection { .. }
        )
    }
}
