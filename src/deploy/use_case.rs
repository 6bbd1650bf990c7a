//! The deployment use case
//!
//! Runs the phases in order, each a barrier:
//!
//! 0. connect and take the remote lock sentinel
//! 1. scan and hash the local tree
//! 2. read the remote manifest
//! 3. diff (test mode stops here)
//! 4. before hooks
//! 5. staged upload (`*.deploytmp`), then the staged manifest
//! 6. commit: afterUpload hooks, renames, the manifest rename (the
//!    linearization point), deletes, purges, after hooks
//!
//! Any failure before the manifest rename rolls back by deleting the
//! staged files; afterwards the deployment is live and problems are
//! reported as warnings.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::deploy::plan::{staging_name, UploadPlan};
use crate::deploy::workers::upload_files;
use crate::deploy::{DeployOptions, DeploySummary, Logger, ServerFactory};
use crate::error::{SitesyncError, SitesyncResult};
use crate::filter::PathFilter;
use crate::manifest::{Changes, Manifest};
use crate::preprocess::Preprocessor;
use crate::runner::{Job, JobRunner, Runner};
use crate::scan::{scan, LocalSet};
use crate::server::{connect_with_retry, Server};

/// A lock sentinel older than this may be broken with `--force-unlock`.
const STALE_LOCK_MINUTES: i64 = 30;

/// Orchestrates one site deployment.
pub struct Deployer<'a> {
    config: &'a Config,
    options: DeployOptions,
    factory: &'a ServerFactory<'a>,
}

impl<'a> Deployer<'a> {
    pub fn new(
        config: &'a Config,
        options: DeployOptions,
        factory: &'a ServerFactory<'a>,
    ) -> Self {
        Self {
            config,
            options,
            factory,
        }
    }

    /// Run the whole deployment.
    pub fn run(&self, logger: &mut dyn Logger) -> SitesyncResult<DeploySummary> {
        let scratch = self.make_scratch()?;

        logger.phase(&format!(
            "Deploying to {}",
            self.config.remote.display_target()
        ));
        let mut server = (self.factory)()?;
        connect_with_retry(server.as_mut())?;

        self.acquire_lock(server.as_ref(), scratch.path(), logger)?;

        let mut staged: Vec<String> = Vec::new();
        let outcome = self.deploy_locked(server.as_ref(), scratch.path(), logger, &mut staged);

        match outcome {
            Ok(summary) => {
                if let Err(err) = server.remove_file(&self.config.lock_name()) {
                    logger.warn(&format!("could not release deployment lock: {err}"));
                }
                Ok(summary)
            }
            Err(err) => {
                let rolled_back = self.rollback(server.as_ref(), &staged, logger);
                if let Err(lock_err) = server.remove_file(&self.config.lock_name()) {
                    logger.warn(&format!("could not release deployment lock: {lock_err}"));
                }
                match rolled_back {
                    Ok(()) => Err(err),
                    Err(fatal) => Err(fatal),
                }
            }
        }
    }

    fn make_scratch(&self) -> SitesyncResult<tempfile::TempDir> {
        match &self.config.temp_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Ok(tempfile::TempDir::with_prefix_in("sitesync-", dir)?)
            }
            None => Ok(tempfile::TempDir::with_prefix("sitesync-")?),
        }
    }

    // Phase 0: the advisory lock. A sentinel file next to the manifest
    // marks a deployment in flight; its first line is the start
    // timestamp, the remaining lines are the paths the run staged (see
    // `journal_planned_uploads`).
    fn acquire_lock(
        &self,
        server: &dyn Server,
        scratch: &Path,
        logger: &mut dyn Logger,
    ) -> SitesyncResult<()> {
        let lock_rel = self.config.lock_name();
        let tmp = scratch.join("lock.remote");
        match server.read_file(&lock_rel, &tmp) {
            Err(SitesyncError::NotFound { .. }) => self.write_lock(server, scratch),
            Ok(()) => {
                let content = fs::read_to_string(&tmp).unwrap_or_default();
                if self.options.force_unlock && lock_is_stale(&content) {
                    logger.warn(&format!("breaking stale deployment lock {lock_rel}"));
                    let swept = self.sweep_journaled_staging(server, &content);
                    if swept > 0 {
                        logger.info(&format!(
                            "removed {swept} staging files left by the crashed run"
                        ));
                    }
                    server.remove_file(&lock_rel)?;
                    self.write_lock(server, scratch)
                } else {
                    Err(SitesyncError::ConcurrentDeployment { sentinel: lock_rel })
                }
            }
            Err(other) => Err(other),
        }
    }

    fn write_lock(&self, server: &dyn Server, scratch: &Path) -> SitesyncResult<()> {
        let tmp = scratch.join("lock.new");
        fs::write(&tmp, Utc::now().to_rfc3339())?;
        server.write_file(&tmp, &self.config.lock_name(), &mut |_| {})
    }

    /// Rewrite the sentinel with the paths this run is about to stage.
    ///
    /// A hard crash leaves both the sentinel and the `*.deploytmp` files
    /// behind; the recovery run reads the list back out of the sentinel,
    /// so staging files are found even for paths no longer present in
    /// either manifest (a new file deleted locally after the crash).
    fn journal_planned_uploads(
        &self,
        server: &dyn Server,
        scratch: &Path,
        plan: &UploadPlan,
        manifest_rel: &str,
    ) -> SitesyncResult<()> {
        let mut body = Utc::now().to_rfc3339();
        for item in &plan.files {
            body.push('\n');
            body.push_str(&item.rel);
        }
        body.push('\n');
        body.push_str(manifest_rel);
        let tmp = scratch.join("lock.journal");
        fs::write(&tmp, body)?;
        server.write_file(&tmp, &self.config.lock_name(), &mut |_| {})
    }

    /// Delete the staging files a crashed run recorded in its sentinel.
    fn sweep_journaled_staging(&self, server: &dyn Server, sentinel: &str) -> usize {
        let mut swept = 0;
        for path in sentinel.lines().skip(1).filter(|l| l.starts_with('/')) {
            let _ = server.remove_file(&staging_name(path));
            swept += 1;
        }
        swept
    }

    fn deploy_locked(
        &self,
        server: &dyn Server,
        scratch: &Path,
        logger: &mut dyn Logger,
        staged: &mut Vec<String>,
    ) -> SitesyncResult<DeploySummary> {
        // Phase 1
        logger.phase("Scanning local files");
        let filter = PathFilter::new(
            &self.config.include_patterns,
            &self.config.ignore_patterns,
        )?;
        let preprocessor =
            Preprocessor::new(&self.config.preprocess_masks, &scratch.join("preprocess"))?;
        let local = scan(&self.config.local_root, &filter, &preprocessor)?;
        logger.info(&format!("{} entries hashed", local.manifest.len()));

        // Phase 2
        logger.phase("Reading remote manifest");
        let remote_manifest = self.read_remote_manifest(server, scratch, logger)?;

        // Phase 3
        let changes = local.manifest.changes_from(
            &remote_manifest,
            self.config.allow_delete,
            self.options.redeploy,
        );
        let skipped = local.manifest.len() - changes.to_upload.len();

        if self.options.test_mode || self.config.test_mode {
            return self.finish_test_mode(server, logger, &changes, skipped);
        }

        if changes.is_empty() && self.config.purge_paths.is_empty() {
            logger.info("Everything is up to date");
            self.run_local_jobs("before", &self.config.before_jobs, server, logger)?;
            self.run_local_jobs("after", &self.config.after_jobs, server, logger)?;
            return Ok(DeploySummary {
                skipped,
                ..Default::default()
            });
        }

        let plan = UploadPlan::build(&changes, &local, &remote_manifest);

        // Phase 4
        if !self.config.before_jobs.is_empty() {
            logger.phase("Running before jobs");
            self.run_jobs(&self.config.before_jobs, server, logger)?;
        }

        // Phase 5
        logger.phase(&format!(
            "Uploading {} files ({} new directories)",
            plan.files.len(),
            plan.dirs.len()
        ));
        let manifest_rel = self.config.manifest_path();
        self.journal_planned_uploads(server, scratch, &plan, &manifest_rel)?;
        for dir in &plan.dirs {
            server.create_dir(dir)?;
        }
        self.sweep_stale_staging(server, &local, &remote_manifest, &plan);

        let report = upload_files(self.factory, &plan.files, self.options.workers, logger);
        staged.extend(report.staged.iter().cloned());
        if let Some(err) = report.error {
            return Err(err);
        }

        let manifest_tmp = scratch.join("manifest.new");
        fs::write(&manifest_tmp, local.manifest.serialize())?;
        server.write_file(&manifest_tmp, &staging_name(&manifest_rel), &mut |_| {})?;
        staged.push(manifest_rel.clone());

        // Phase 6
        if !self.config.after_upload_jobs.is_empty() {
            logger.phase("Running afterUpload jobs");
            self.run_jobs(&self.config.after_upload_jobs, server, logger)?;
        }

        logger.phase("Committing");
        for rel in plan.rename_order() {
            server.rename_file(&staging_name(rel), rel)?;
        }
        // The linearization point: after this rename the new deployment
        // is what the server presents.
        server.rename_file(&staging_name(&manifest_rel), &manifest_rel)?;

        let mut summary = DeploySummary {
            uploaded: plan.files.len(),
            skipped,
            ..Default::default()
        };
        self.finish_live(server, logger, &plan, &mut summary);
        Ok(summary)
    }

    /// Post-linearization work: failures are warnings, never rollback.
    fn finish_live(
        &self,
        server: &dyn Server,
        logger: &mut dyn Logger,
        plan: &UploadPlan,
        summary: &mut DeploySummary,
    ) {
        for rel in &plan.delete_files {
            match server.remove_file(rel) {
                Ok(()) => summary.deleted += 1,
                Err(err) => logger.warn(&format!("could not delete {rel}: {err}")),
            }
        }
        for rel in &plan.delete_dirs {
            match server.remove_dir(rel) {
                Ok(()) => summary.deleted += 1,
                Err(err) => logger.warn(&format!("could not remove directory {rel}: {err}")),
            }
        }

        for purge_path in &self.config.purge_paths {
            logger.phase(&format!("Purging {purge_path}"));
            let mut count = 0usize;
            let result = server.purge(purge_path, &mut |_entry| count += 1);
            match result {
                Ok(()) => summary.purged += count,
                Err(err) => logger.warn(&format!("could not purge {purge_path}: {err}")),
            }
        }

        if !self.config.after_jobs.is_empty() {
            logger.phase("Running after jobs");
            let runner = JobRunner::new(server, &self.config.local_root);
            for job in &self.config.after_jobs {
                logger.info(&format!("→ {job}"));
                if let Err(err) = runner.run(job) {
                    logger.warn(&err.to_string());
                }
            }
        }
    }

    fn finish_test_mode(
        &self,
        server: &dyn Server,
        logger: &mut dyn Logger,
        changes: &Changes,
        skipped: usize,
    ) -> SitesyncResult<DeploySummary> {
        logger.phase("Test mode, no changes will be made");
        for path in &changes.to_upload {
            logger.info(&format!("would upload {path}"));
        }
        for path in &changes.to_delete {
            logger.info(&format!("would delete {path}"));
        }
        if changes.is_empty() {
            logger.info("Everything is up to date");
        }
        self.run_local_jobs("before", &self.config.before_jobs, server, logger)?;
        Ok(DeploySummary {
            skipped,
            test_mode: true,
            ..Default::default()
        })
    }

    fn read_remote_manifest(
        &self,
        server: &dyn Server,
        scratch: &Path,
        logger: &mut dyn Logger,
    ) -> SitesyncResult<Manifest> {
        let tmp = scratch.join("manifest.remote");
        match server.read_file(&self.config.manifest_path(), &tmp) {
            Ok(()) => {
                let text = fs::read_to_string(&tmp)?;
                Manifest::parse(&text)
            }
            Err(SitesyncError::NotFound { .. }) => {
                logger.info("No remote manifest, this is a first deployment");
                Ok(Manifest::new())
            }
            Err(other) => Err(other),
        }
    }

    /// Remove `*.deploytmp` leftovers a crashed previous run may have
    /// staged. Second layer of crash recovery: the sentinel journal
    /// (swept at unlock time) names the crashed run's paths; this sweep
    /// additionally covers the staging name of every path either
    /// manifest knows about, for leftovers whose sentinel is already
    /// gone (a partially failed rollback). Removal is idempotent and
    /// paths about to be uploaded get overwritten anyway.
    fn sweep_stale_staging(
        &self,
        server: &dyn Server,
        local: &LocalSet,
        remote: &Manifest,
        plan: &UploadPlan,
    ) {
        let uploading: HashSet<&str> = plan.files.iter().map(|f| f.rel.as_str()).collect();
        let candidates = local
            .manifest
            .iter()
            .chain(remote.iter())
            .filter(|(_, hash)| *hash != crate::manifest::DIR_HASH)
            .map(|(path, _)| path)
            .filter(|path| !uploading.contains(path));
        for path in candidates {
            let _ = server.remove_file(&staging_name(path));
        }
    }

    fn run_jobs(
        &self,
        jobs: &[Job],
        server: &dyn Server,
        logger: &mut dyn Logger,
    ) -> SitesyncResult<()> {
        let runner = JobRunner::new(server, &self.config.local_root);
        for job in jobs {
            logger.info(&format!("→ {job}"));
            let outcome = runner.run(job)?;
            let output = outcome.output.trim();
            if !output.is_empty() {
                logger.info(output);
            }
        }
        Ok(())
    }

    /// `local:` jobs run even when everything else is skipped.
    fn run_local_jobs(
        &self,
        label: &str,
        jobs: &[Job],
        server: &dyn Server,
        logger: &mut dyn Logger,
    ) -> SitesyncResult<()> {
        let local_jobs: Vec<Job> = jobs.iter().filter(|j| j.is_local()).cloned().collect();
        if local_jobs.is_empty() {
            return Ok(());
        }
        logger.phase(&format!("Running {label} jobs (local only)"));
        self.run_jobs(&local_jobs, server, logger)
    }

    /// Phase R: best-effort removal of every staged temp file; the live
    /// tree and the old manifest stay as they were.
    fn rollback(
        &self,
        server: &dyn Server,
        staged: &[String],
        logger: &mut dyn Logger,
    ) -> SitesyncResult<()> {
        if staged.is_empty() {
            return Ok(());
        }
        logger.phase("Rolling back");
        let mut failures = Vec::new();
        for rel in staged {
            if let Err(err) = server.remove_file(&staging_name(rel)) {
                failures.push(format!("{rel}: {err}"));
            }
        }
        if failures.is_empty() {
            logger.info(&format!("removed {} staged files", staged.len()));
            Ok(())
        } else {
            Err(SitesyncError::FatalState {
                message: failures.join("; "),
            })
        }
    }
}

fn lock_is_stale(content: &str) -> bool {
    // Only the first line is the timestamp; the rest is the staging
    // journal.
    let stamp = content.lines().next().unwrap_or("").trim();
    match DateTime::parse_from_rfc3339(stamp) {
        Ok(ts) => {
            let age = Utc::now().signed_duration_since(ts.with_timezone(&Utc));
            age > chrono::Duration::minutes(STALE_LOCK_MINUTES)
        }
        // An unreadable sentinel cannot be aged; the operator asked.
        Err(_) => true,
    }
}
