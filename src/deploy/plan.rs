//! Diff-to-action translation
//!
//! Turns the manifest diff into the ordered work lists the phases consume:
//! directories to create (shallow first), files to upload, files to delete
//! and directories to remove afterwards (deep first).

use std::path::PathBuf;

use crate::deploy::STAGING_SUFFIX;
use crate::manifest::{Changes, Manifest};
use crate::scan::LocalSet;

/// Staging name a path is uploaded under until the commit rename.
pub fn staging_name(path: &str) -> String {
    format!("{path}{STAGING_SUFFIX}")
}

/// One file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    /// Remote-relative live name.
    pub rel: String,
    /// Local file holding the bytes to send.
    pub source: PathBuf,
}

/// Ordered work lists for one deployment.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UploadPlan {
    /// Directories to create, shallow to deep.
    pub dirs: Vec<String>,
    /// Files to upload to their staging names.
    pub files: Vec<UploadItem>,
    /// Files to delete after commit.
    pub delete_files: Vec<String>,
    /// Directories to remove after the files, deep to shallow.
    pub delete_dirs: Vec<String>,
}

impl UploadPlan {
    pub fn build(changes: &Changes, local: &LocalSet, remote: &Manifest) -> UploadPlan {
        let mut plan = UploadPlan::default();

        for path in &changes.to_upload {
            if local.manifest.is_dir(path) {
                plan.dirs.push(path.clone());
            } else if let Some(source) = local.sources.get(path) {
                plan.files.push(UploadItem {
                    rel: path.clone(),
                    source: source.clone(),
                });
            }
        }
        plan.dirs.sort_by_key(|p| depth(p));

        for path in &changes.to_delete {
            if remote.is_dir(path) {
                plan.delete_dirs.push(path.clone());
            } else {
                plan.delete_files.push(path.clone());
            }
        }
        plan.delete_dirs.sort_by_key(|p| std::cmp::Reverse(depth(p)));

        plan
    }

    /// Live names in commit-rename order: shortest path first so a path
    /// whose kind flipped (directory became file or the reverse) resolves
    /// before its former children.
    pub fn rename_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = self.files.iter().map(|f| f.rel.as_str()).collect();
        order.sort_by_key(|p| (depth(p), p.len(), *p));
        order
    }
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}
