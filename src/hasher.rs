//! Content fingerprints
//!
//! The manifest records one stable hex digest per file, computed over the
//! exact bytes that go over the wire (post-preprocess when a file is
//! preprocessed). SHA-256, streamed, lowercase hex.

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::SitesyncResult;

/// Hash a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hash a file's content without loading it whole.
pub fn hash_file(path: &Path) -> SitesyncResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
