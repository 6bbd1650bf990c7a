//! Hook jobs
//!
//! Operator-specified actions run at phase boundaries: local shell
//! commands, remote shell commands, HTTP GET pings and copy-from-local
//! uploads. Parsing happens at config load so a typo fails the run before
//! any connection is opened.

use std::fmt;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::error::{SitesyncError, SitesyncResult};
use crate::server::Server;

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// One hook job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// `local: <shell command>` — run on this machine in the local root.
    LocalShell { cmd: String },
    /// `remote: <shell command>` — run on the server via `execute`.
    RemoteShell { cmd: String },
    /// A bare `http://`/`https://` URL — GET, any 2xx is success.
    HttpGet { url: String },
    /// `upload: <src> <dst>` — copy a local file onto the server.
    UploadCopy { src: String, dst: String },
}

impl Job {
    /// Parse a hook string from the config.
    pub fn parse(spec: &str) -> Result<Job, String> {
        let spec = spec.trim();
        if let Some(cmd) = spec.strip_prefix("local:") {
            let cmd = cmd.trim();
            if cmd.is_empty() {
                return Err("empty 'local:' command".into());
            }
            return Ok(Job::LocalShell { cmd: cmd.into() });
        }
        if let Some(cmd) = spec.strip_prefix("remote:") {
            let cmd = cmd.trim();
            if cmd.is_empty() {
                return Err("empty 'remote:' command".into());
            }
            return Ok(Job::RemoteShell { cmd: cmd.into() });
        }
        if let Some(rest) = spec.strip_prefix("upload:") {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(src), Some(dst), None) => {
                    let dst = if dst.starts_with('/') {
                        dst.to_string()
                    } else {
                        format!("/{dst}")
                    };
                    return Ok(Job::UploadCopy {
                        src: src.to_string(),
                        dst,
                    });
                }
                _ => return Err("expected 'upload: <src> <dst>'".into()),
            }
        }
        if spec.starts_with("http://") || spec.starts_with("https://") {
            return Ok(Job::HttpGet { url: spec.into() });
        }
        Err(format!(
            "unrecognized job '{spec}' (expected local:, remote:, upload: or an http(s) URL)"
        ))
    }

    /// Local jobs run even when the deployment short-circuits.
    pub fn is_local(&self) -> bool {
        matches!(self, Job::LocalShell { .. })
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::LocalShell { cmd } => write!(f, "local: {cmd}"),
            Job::RemoteShell { cmd } => write!(f, "remote: {cmd}"),
            Job::HttpGet { url } => write!(f, "{url}"),
            Job::UploadCopy { src, dst } => write!(f, "upload: {src} {dst}"),
        }
    }
}

/// Result of a successful job.
#[derive(Debug, Default)]
pub struct JobOutcome {
    pub output: String,
}

/// Capability that executes jobs.
pub trait Runner {
    fn run(&self, job: &Job) -> SitesyncResult<JobOutcome>;
}

/// The standard runner: shells, HTTP and server uploads.
pub struct JobRunner<'a> {
    server: &'a dyn Server,
    local_root: &'a Path,
}

impl<'a> JobRunner<'a> {
    pub fn new(server: &'a dyn Server, local_root: &'a Path) -> Self {
        Self { server, local_root }
    }

    fn hook_err(job: &Job, detail: String) -> SitesyncError {
        SitesyncError::Hook {
            job: job.to_string(),
            detail,
        }
    }
}

impl Runner for JobRunner<'_> {
    fn run(&self, job: &Job) -> SitesyncResult<JobOutcome> {
        match job {
            Job::LocalShell { cmd } => {
                #[cfg(unix)]
                let output = Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .current_dir(self.local_root)
                    .output()
                    .map_err(|e| Self::hook_err(job, format!("cannot spawn shell: {e}")))?;
                #[cfg(not(unix))]
                let output = Command::new("cmd")
                    .arg("/C")
                    .arg(cmd)
                    .current_dir(self.local_root)
                    .output()
                    .map_err(|e| Self::hook_err(job, format!("cannot spawn shell: {e}")))?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Self::hook_err(
                        job,
                        format!(
                            "exit code {}: {}",
                            output.status.code().unwrap_or(-1),
                            stderr.trim()
                        ),
                    ));
                }
                Ok(JobOutcome {
                    output: String::from_utf8_lossy(&output.stdout).into_owned(),
                })
            }

            Job::RemoteShell { cmd } => {
                let output = self
                    .server
                    .execute(cmd)
                    .map_err(|e| Self::hook_err(job, e.to_string()))?;
                Ok(JobOutcome { output })
            }

            Job::HttpGet { url } => {
                let client = reqwest::blocking::Client::builder()
                    .timeout(HTTP_TIMEOUT)
                    .build()
                    .map_err(|e| Self::hook_err(job, e.to_string()))?;
                let response = client
                    .get(url)
                    .send()
                    .map_err(|e| Self::hook_err(job, e.to_string()))?;
                let status = response.status();
                let body = response.text().unwrap_or_default();
                if !status.is_success() {
                    return Err(Self::hook_err(job, format!("HTTP status {status}")));
                }
                Ok(JobOutcome { output: body })
            }

            Job::UploadCopy { src, dst } => {
                let local = self.local_root.join(src.trim_start_matches('/'));
                self.server
                    .write_file(&local, dst, &mut |_| {})
                    .map_err(|e| Self::hook_err(job, e.to_string()))?;
                Ok(JobOutcome::default())
            }
        }
    }
}
