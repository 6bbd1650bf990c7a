//! Local tree scan
//!
//! Walks the local root, prunes ignored directories, preprocesses and
//! hashes the surviving files, and produces the local manifest together
//! with the map of bytes to upload per path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{SitesyncError, SitesyncResult};
use crate::filter::PathFilter;
use crate::hasher;
use crate::manifest::Manifest;
use crate::preprocess::Preprocessor;

/// The scanned local state: manifest plus upload sources.
#[derive(Debug, Default)]
pub struct LocalSet {
    pub manifest: Manifest,
    /// `rel path -> absolute file holding the bytes to upload`
    /// (the preprocessed temp file when preprocessing applied).
    pub sources: HashMap<String, PathBuf>,
}

/// Scan `local_root` into a [`LocalSet`].
pub fn scan(
    local_root: &Path,
    filter: &PathFilter,
    preprocessor: &Preprocessor,
) -> SitesyncResult<LocalSet> {
    if !local_root.is_dir() {
        return Err(SitesyncError::Config {
            file: local_root.to_path_buf(),
            message: "local root is not a directory".into(),
        });
    }

    let mut set = LocalSet::default();

    let walker = WalkDir::new(local_root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let rel = rel_path(local_root, entry.path());
            !filter.prunes(&rel)
        });

    for entry in walker {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if entry.depth() == 0 {
            continue;
        }
        let rel = rel_path(local_root, entry.path());

        if entry.file_type().is_dir() {
            if filter.accepts(&rel, true) {
                set.manifest.insert_dir(rel);
            }
        } else if entry.file_type().is_file() {
            if !filter.accepts(&rel, false) {
                continue;
            }
            let source = preprocessor.process(&rel, entry.path())?;
            let hash = hasher::hash_file(&source)?;
            record_ancestors(&mut set.manifest, &rel);
            set.manifest.insert(rel.clone(), hash);
            set.sources.insert(rel, source);
        }
    }

    Ok(set)
}

/// Remote-relative path: `/`-rooted, `/`-separated.
fn rel_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut out = String::from("/");
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    out.push_str(&joined);
    out
}

/// Directories containing an included file are deployed even when no
/// pattern names them, so `create_dir` has a manifest entry to work from.
fn record_ancestors(manifest: &mut Manifest, rel: &str) {
    for (idx, b) in rel.bytes().enumerate().skip(1) {
        if b == b'/' {
            let ancestor = &rel[..idx];
            if !manifest.contains(ancestor) {
                manifest.insert_dir(ancestor);
            }
        }
    }
}
