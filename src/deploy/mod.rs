//! Deployment engine
//!
//! Orchestrates a run: lock, scan, diff, hooks, staged upload, the commit
//! rename dance, deletes, purges, and rollback when anything fails before
//! the manifest goes live.

mod plan;
mod use_case;
mod workers;

pub use plan::{staging_name, UploadItem, UploadPlan};
pub use use_case::Deployer;

use crate::error::SitesyncResult;
use crate::server::Server;

/// Staging suffix for files uploaded but not yet live.
pub const STAGING_SUFFIX: &str = ".deploytmp";

/// Factory producing a fresh driver session; each upload worker owns one.
pub type ServerFactory<'a> = dyn Fn() -> SitesyncResult<Box<dyn Server>> + Sync + 'a;

/// Runtime options on top of the site config.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Print the diff and stop without touching the remote.
    pub test_mode: bool,
    /// Re-upload every file regardless of the remote manifest.
    pub redeploy: bool,
    /// Upload worker pool size.
    pub workers: usize,
    /// Break a stale deployment lock.
    pub force_unlock: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            test_mode: false,
            redeploy: false,
            workers: 10,
            force_unlock: false,
        }
    }
}

/// Final counts of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploySummary {
    pub uploaded: usize,
    pub deleted: usize,
    pub purged: usize,
    pub skipped: usize,
    /// True when the run stopped after printing the diff.
    pub test_mode: bool,
}

/// Presentation capability: the engine reports, something else renders.
#[allow(unused_variables)]
pub trait Logger {
    /// A phase heading ("Connecting", "Uploading", ...).
    fn phase(&mut self, title: &str) {}

    fn info(&mut self, message: &str) {}

    fn warn(&mut self, message: &str) {}

    /// The upload phase starts with this many files.
    fn begin_transfers(&mut self, total: usize) {}

    /// Per-file percent, monotone within a file.
    fn transfer_progress(&mut self, rel: &str, percent: u8) {}

    fn transfer_done(&mut self, rel: &str) {}

    fn transfer_failed(&mut self, rel: &str, message: &str, retrying: bool) {}
}

/// Logger that swallows everything.
pub struct NullLogger;

impl Logger for NullLogger {}
