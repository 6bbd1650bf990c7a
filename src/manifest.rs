//! Deployment manifest
//!
//! The manifest is the server-side source of truth for "what is deployed":
//! an ordered mapping from remote-relative path to content hash, persisted
//! as one `hash path` record per line. Directories are recorded with the
//! sentinel hash `dir` so first deployments create them even when empty.

use std::collections::BTreeMap;

use crate::error::{SitesyncError, SitesyncResult};

/// Hash sentinel marking a directory entry.
pub const DIR_HASH: &str = "dir";

/// Ordered mapping `remote-relative path -> hex hash`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

/// Outcome of diffing a local manifest against the remote one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    /// Paths to upload (or directories to create), sorted.
    pub to_upload: Vec<String>,
    /// Paths present remotely but gone locally, sorted.
    pub to_delete: Vec<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_delete.is_empty()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` with `hash`; `path` must be `/`-rooted.
    pub fn insert(&mut self, path: impl Into<String>, hash: impl Into<String>) {
        self.entries.insert(path.into(), hash.into());
    }

    pub fn insert_dir(&mut self, path: impl Into<String>) {
        self.entries.insert(path.into(), DIR_HASH.to_string());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.get(path) == Some(DIR_HASH)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, h)| (p.as_str(), h.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Serialize: `<hash><SP><path><LF>` per entry, sorted by path,
    /// trailing newline, UTF-8 without BOM.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (path, hash) in &self.entries {
            out.push_str(hash);
            out.push(' ');
            out.push_str(path);
            out.push('\n');
        }
        out
    }

    /// Parse manifest text. Blank lines and CRLF line endings are
    /// tolerated; anything else malformed aborts.
    pub fn parse(text: &str) -> SitesyncResult<Manifest> {
        let mut manifest = Manifest::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let parsed = line.split_once(' ').and_then(|(hash, path)| {
                let valid_hash = !hash.is_empty()
                    && (hash == DIR_HASH || hash.chars().all(|c| c.is_ascii_hexdigit()));
                (valid_hash && path.starts_with('/')).then(|| (hash, path))
            });
            match parsed {
                Some((hash, path)) => manifest.insert(path, hash),
                None => {
                    return Err(SitesyncError::ManifestParse {
                        line: idx + 1,
                        content: line.to_string(),
                    })
                }
            }
        }
        Ok(manifest)
    }

    /// Compute what a deployment has to do to make `remote` equal `self`.
    ///
    /// `redeploy` forces every local path into `to_upload` regardless of
    /// remote content; `allow_delete = false` empties `to_delete`.
    pub fn changes_from(&self, remote: &Manifest, allow_delete: bool, redeploy: bool) -> Changes {
        let to_upload = self
            .entries
            .iter()
            .filter(|(path, hash)| redeploy || remote.get(path) != Some(hash.as_str()))
            .map(|(path, _)| path.clone())
            .collect();

        let to_delete = if allow_delete {
            remote
                .entries
                .keys()
                .filter(|path| !self.entries.contains_key(*path))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        Changes {
            to_upload,
            to_delete,
        }
    }
}

impl FromIterator<(String, String)> for Manifest {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Manifest {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(entries: &[(&str, &str)]) -> Manifest {
        entries
            .iter()
            .map(|(p, h)| (p.to_string(), h.to_string()))
            .collect()
    }

    #[test]
    fn serialize_is_sorted_with_trailing_newline() {
        let m = manifest(&[("/b.txt", "beef"), ("/a.txt", "cafe")]);
        assert_eq!(m.serialize(), "cafe /a.txt\nbeef /b.txt\n");
    }

    #[test]
    fn serialize_empty_is_empty() {
        assert_eq!(Manifest::new().serialize(), "");
    }

    #[test]
    fn parse_round_trips() {
        let m = manifest(&[("/a", "aa"), ("/dir", DIR_HASH), ("/x/y.css", "12ef")]);
        let parsed = Manifest::parse(&m.serialize()).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn parse_tolerates_blank_lines_and_crlf() {
        let parsed = Manifest::parse("aa /a\r\n\r\n\nbb /b\n").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get("/a"), Some("aa"));
        assert_eq!(parsed.get("/b"), Some("bb"));
    }

    #[test]
    fn parse_accepts_paths_with_spaces() {
        let parsed = Manifest::parse("abcd /my dir/file name.txt\n").unwrap();
        assert_eq!(parsed.get("/my dir/file name.txt"), Some("abcd"));
    }

    #[test]
    fn parse_rejects_garbage_line() {
        let err = Manifest::parse("aa /ok\nthisisnotarecord\n").unwrap_err();
        match err {
            SitesyncError::ManifestParse { line, content } => {
                assert_eq!(line, 2);
                assert_eq!(content, "thisisnotarecord");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_rejects_relative_path() {
        assert!(Manifest::parse("aa relative/path\n").is_err());
    }

    #[test]
    fn parse_rejects_non_hex_hash() {
        assert!(Manifest::parse("nothex! /a\n").is_err());
    }

    #[test]
    fn diff_empty_remote_uploads_everything() {
        let local = manifest(&[("/a", "aa"), ("/d", DIR_HASH)]);
        let changes = local.changes_from(&Manifest::new(), true, false);
        assert_eq!(changes.to_upload, vec!["/a", "/d"]);
        assert!(changes.to_delete.is_empty());
    }

    #[test]
    fn diff_identical_is_empty() {
        let local = manifest(&[("/a", "aa"), ("/b", "bb")]);
        let changes = local.changes_from(&local.clone(), true, false);
        assert!(changes.is_empty());
    }

    #[test]
    fn diff_detects_change_and_delete() {
        let local = manifest(&[("/a", "a2")]);
        let remote = manifest(&[("/a", "a1"), ("/b", "bb")]);
        let changes = local.changes_from(&remote, true, false);
        assert_eq!(changes.to_upload, vec!["/a"]);
        assert_eq!(changes.to_delete, vec!["/b"]);
    }

    #[test]
    fn delete_guard_empties_to_delete() {
        let local = manifest(&[("/a", "aa")]);
        let remote = manifest(&[("/a", "aa"), ("/b", "bb"), ("/c", "cc")]);
        let changes = local.changes_from(&remote, false, false);
        assert!(changes.to_delete.is_empty());
        assert!(changes.to_upload.is_empty());
    }

    #[test]
    fn redeploy_uploads_all_but_deletes_normally() {
        let local = manifest(&[("/a", "aa"), ("/b", "bb")]);
        let remote = manifest(&[("/a", "aa"), ("/gone", "gg")]);
        let changes = local.changes_from(&remote, true, true);
        assert_eq!(changes.to_upload, vec!["/a", "/b"]);
        assert_eq!(changes.to_delete, vec!["/gone"]);
    }

    #[test]
    fn dir_sentinel_mismatch_forces_upload() {
        // A path that was a file and is now a directory must be redeployed.
        let local = manifest(&[("/a", DIR_HASH)]);
        let remote = manifest(&[("/a", "aa")]);
        let changes = local.changes_from(&remote, true, false);
        assert_eq!(changes.to_upload, vec!["/a"]);
    }
}
