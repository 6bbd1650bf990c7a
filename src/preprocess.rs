//! File preprocessing
//!
//! Files matched by the configured masks are transformed before hashing and
//! upload: `*.js` and `*.css` are compacted (comments stripped, whitespace
//! collapsed), anything else is copied through unchanged. The transformed
//! bytes are materialized under a scratch directory mirroring the remote
//! relative path, and both the hasher and the uploader read that file, so
//! the manifest always describes the wire bytes exactly.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{SitesyncError, SitesyncResult};

/// Preprocessor over a set of file masks and a scratch directory.
#[derive(Debug)]
pub struct Preprocessor {
    masks: Vec<GlobMatcher>,
    temp_root: PathBuf,
}

impl Preprocessor {
    /// Compile masks; `temp_root` receives the materialized files.
    pub fn new(masks: &[String], temp_root: &Path) -> SitesyncResult<Self> {
        let masks = masks
            .iter()
            .map(|mask| {
                let unanchored = if mask.contains('/') {
                    mask.trim_start_matches('/').to_string()
                } else {
                    format!("**/{mask}")
                };
                GlobBuilder::new(&unanchored)
                    .literal_separator(true)
                    .build()
                    .map(|g| g.compile_matcher())
                    .map_err(|e| SitesyncError::Filter {
                        pattern: mask.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<SitesyncResult<Vec<_>>>()?;
        Ok(Self {
            masks,
            temp_root: temp_root.to_path_buf(),
        })
    }

    /// Whether `rel_path` is selected for preprocessing.
    pub fn selects(&self, rel_path: &str) -> bool {
        let rel = rel_path.trim_start_matches('/');
        self.masks.iter().any(|m| m.is_match(rel))
    }

    /// Transform `src` (at `rel_path`) if selected.
    ///
    /// Returns the path holding the bytes to hash and upload: the
    /// materialized temp file for selected files, `src` itself otherwise.
    pub fn process(&self, rel_path: &str, src: &Path) -> SitesyncResult<PathBuf> {
        if !self.selects(rel_path) {
            return Ok(src.to_path_buf());
        }

        let out_path = self.temp_root.join(rel_path.trim_start_matches('/'));
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let ext = src
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "js" | "css" => {
                let content = fs::read_to_string(src)?;
                fs::write(&out_path, compact_source(&content))?;
            }
            _ => {
                fs::copy(src, &out_path)?;
            }
        }
        Ok(out_path)
    }
}

/// Strip comments and compact whitespace in JS/CSS source.
///
/// Newlines inside code are preserved (semicolon insertion must not be
/// disturbed); comments become nothing, trailing/leading whitespace per
/// line goes away and blank lines are dropped. String, template and
/// character literals pass through untouched.
fn compact_source(input: &str) -> String {
    #[derive(Clone, Copy)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str(char),
    }

    let mut out = String::with_capacity(input.len());
    let mut state = State::Code;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                }
                '"' | '\'' | '`' => {
                    out.push(c);
                    state = State::Str(c);
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                }
            }
            State::Str(quote) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == quote {
                    state = State::Code;
                }
            }
        }
    }

    let mut compacted = String::with_capacity(out.len());
    for line in out.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !compacted.is_empty() {
            compacted.push('\n');
        }
        compacted.push_str(trimmed);
    }
    compacted
}
