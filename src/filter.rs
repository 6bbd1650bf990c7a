//! Include/ignore path filtering
//!
//! Decides which local paths participate in a deployment. Two ordered
//! pattern lists drive the decision: a non-empty include list flips the
//! default to *reject* and its patterns add inclusions; the ignore list
//! defaults to *accept* and its patterns add exclusions. Within a list the
//! **last matching pattern wins**, and a `!` prefix inverts the rule.
//!
//! Pattern tokens: `/foo` anchors at the deployment root, `foo/` matches
//! directories only, `*` matches within one path segment, `**` crosses
//! segments, `?` matches one non-separator character, `[abc]` is a
//! character class.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{SitesyncError, SitesyncResult};

/// Which base action a list's non-negated patterns carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Include,
    Exclude,
}

/// Path filter over a remote-relative path space (`/`-rooted, `/`-separated).
#[derive(Debug)]
pub struct PathFilter {
    include: PatternList,
    ignore: PatternList,
}

impl PathFilter {
    pub fn new(include: &[String], ignore: &[String]) -> SitesyncResult<Self> {
        Ok(Self {
            include: PatternList::compile(include, Polarity::Include)?,
            ignore: PatternList::compile(ignore, Polarity::Exclude)?,
        })
    }

    /// Filter that accepts everything.
    pub fn accept_all() -> Self {
        Self::new(&[], &[]).expect("empty filter always compiles")
    }

    /// Whether `rel_path` participates in the deployment.
    ///
    /// Deterministic given only the pattern lists and the path. Directories
    /// are accepted by an include list only when a pattern names them
    /// directly; ancestors of included files are added by the scanner, so
    /// an unmatched intermediate directory is still deployed when needed.
    pub fn accepts(&self, rel_path: &str, is_dir: bool) -> bool {
        let rel = rel_path.trim_start_matches('/');
        let included = if self.include.is_empty() {
            true
        } else {
            self.include.verdict(rel, is_dir).unwrap_or(false)
        };
        let excluded = self.ignore.verdict(rel, is_dir).unwrap_or(false);
        included && !excluded
    }

    /// Whether the walker may skip descending into `rel_path`.
    ///
    /// Only an ignore match with no `!` rule anywhere in the list allows
    /// pruning; a negation could re-include something underneath, and an
    /// include list never prunes (the walk over-descends and lets files
    /// decide).
    pub fn prunes(&self, rel_path: &str) -> bool {
        if self.ignore.has_negation {
            return false;
        }
        let rel = rel_path.trim_start_matches('/');
        self.ignore.verdict(rel, true).unwrap_or(false)
    }
}

#[derive(Debug)]
struct PatternList {
    rules: Vec<Rule>,
    has_negation: bool,
}

impl PatternList {
    fn compile(patterns: &[String], polarity: Polarity) -> SitesyncResult<Self> {
        let mut rules = Vec::with_capacity(patterns.len());
        let mut has_negation = false;
        for pattern in patterns {
            let rule = Rule::compile(pattern, polarity)?;
            has_negation |= rule.negated;
            rules.push(rule);
        }
        Ok(Self {
            rules,
            has_negation,
        })
    }

    fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Last matching rule's decision: `Some(true)` means the list's base
    /// action applies, `Some(false)` means a `!` rule inverted it.
    fn verdict(&self, rel: &str, is_dir: bool) -> Option<bool> {
        let mut decision = None;
        for rule in &self.rules {
            if rule.matches(rel, is_dir) {
                decision = Some(!rule.negated);
            }
        }
        decision
    }
}

#[derive(Debug)]
struct Rule {
    negated: bool,
    dir_only: bool,
    direct: Vec<GlobMatcher>,
    descendant: Vec<GlobMatcher>,
}

impl Rule {
    fn compile(pattern: &str, polarity: Polarity) -> SitesyncResult<Rule> {
        let (negated, body) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        let anchored = body.starts_with('/');
        let dir_only = body.ends_with('/') && body.len() > 1;
        let core = body
            .trim_start_matches('/')
            .trim_end_matches('/')
            .to_string();
        if core.is_empty() {
            return Err(SitesyncError::Filter {
                pattern: pattern.to_string(),
                message: "empty pattern".into(),
            });
        }

        let mut direct = vec![core.clone()];
        if !anchored {
            direct.push(format!("**/{core}"));
        }

        // Excluding (or re-including) a directory covers its subtree.
        let effective_exclude = (polarity == Polarity::Exclude) != negated;
        let mut descendant = Vec::new();
        if dir_only || effective_exclude {
            descendant.push(format!("{core}/**"));
            if !anchored {
                descendant.push(format!("**/{core}/**"));
            }
        }

        Ok(Rule {
            negated,
            dir_only,
            direct: compile_globs(&direct, pattern)?,
            descendant: compile_globs(&descendant, pattern)?,
        })
    }

    fn matches(&self, rel: &str, is_dir: bool) -> bool {
        if (!self.dir_only || is_dir) && self.direct.iter().any(|m| m.is_match(rel)) {
            return true;
        }
        self.descendant.iter().any(|m| m.is_match(rel))
    }
}

fn compile_globs(patterns: &[String], original: &str) -> SitesyncResult<Vec<GlobMatcher>> {
    patterns
        .iter()
        .map(|p| {
            GlobBuilder::new(p)
                .literal_separator(true)
                .backslash_escape(true)
                .build()
                .map(|g| g.compile_matcher())
                .map_err(|e| SitesyncError::Filter {
                    pattern: original.to_string(),
                    message: e.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], ignore: &[&str]) -> PathFilter {
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let ignore: Vec<String> = ignore.iter().map(|s| s.to_string()).collect();
        PathFilter::new(&include, &ignore).unwrap()
    }

    #[test]
    fn empty_lists_accept_everything() {
        let f = filter(&[], &[]);
        assert!(f.accepts("/index.php", false));
        assert!(f.accepts("/deep/nested/file.css", false));
        assert!(f.accepts("/dir", true));
    }

    #[test]
    fn ignore_excludes_matching_files() {
        let f = filter(&[], &["*.log"]);
        assert!(!f.accepts("/error.log", false));
        assert!(!f.accepts("/var/log/error.log", false));
        assert!(f.accepts("/index.php", false));
    }

    #[test]
    fn anchored_pattern_matches_root_only() {
        let f = filter(&[], &["/temp"]);
        assert!(!f.accepts("/temp", true));
        assert!(!f.accepts("/temp/cache.bin", false));
        assert!(f.accepts("/app/temp", true));
    }

    #[test]
    fn unanchored_pattern_matches_any_depth() {
        let f = filter(&[], &["temp"]);
        assert!(!f.accepts("/temp", true));
        assert!(!f.accepts("/app/temp", true));
        assert!(!f.accepts("/app/temp/file", false));
    }

    #[test]
    fn trailing_slash_matches_directories_only() {
        let f = filter(&[], &["build/"]);
        assert!(!f.accepts("/build", true));
        assert!(!f.accepts("/build/out.bin", false));
        // A plain file named "build" is not a directory match.
        assert!(f.accepts("/build", false));
    }

    #[test]
    fn excluded_directory_covers_subtree() {
        let f = filter(&[], &[".git"]);
        assert!(!f.accepts("/.git", true));
        assert!(!f.accepts("/.git/HEAD", false));
        assert!(!f.accepts("/vendor/.git/config", false));
    }

    #[test]
    fn negation_re_includes() {
        let f = filter(&[], &["*.log", "!keep.log"]);
        assert!(!f.accepts("/error.log", false));
        assert!(f.accepts("/keep.log", false));
        assert!(f.accepts("/logs/keep.log", false));
    }

    #[test]
    fn last_match_wins_order_matters() {
        // Re-exclusion after re-inclusion: the later rule decides.
        let f = filter(&[], &["*.log", "!keep.log", "keep.log"]);
        assert!(!f.accepts("/keep.log", false));

        let f = filter(&[], &["!keep.log", "*.log"]);
        assert!(!f.accepts("/keep.log", false), "later *.log overrides earlier negation");
    }

    #[test]
    fn include_list_defaults_to_reject() {
        let f = filter(&["*.php"], &[]);
        assert!(f.accepts("/index.php", false));
        assert!(f.accepts("/app/admin.php", false));
        assert!(!f.accepts("/style.css", false));
    }

    #[test]
    fn include_and_ignore_combine() {
        let f = filter(&["**"], &["*.tmp"]);
        assert!(f.accepts("/a.txt", false));
        assert!(!f.accepts("/a.tmp", false));
    }

    #[test]
    fn include_negation_excludes() {
        let f = filter(&["**", "!secret/"], &[]);
        assert!(f.accepts("/public/index.html", false));
        assert!(!f.accepts("/secret", true));
        assert!(!f.accepts("/secret/key.pem", false));
    }

    #[test]
    fn question_mark_is_single_segment_char() {
        let f = filter(&[], &["file.?"]);
        assert!(!f.accepts("/file.a", false));
        assert!(f.accepts("/file.ab", false));
        assert!(f.accepts("/file./x", false));
    }

    #[test]
    fn character_class() {
        let f = filter(&[], &["project.pp[jx]"]);
        assert!(!f.accepts("/project.ppj", false));
        assert!(!f.accepts("/project.ppx", false));
        assert!(f.accepts("/project.ppk", false));
    }

    #[test]
    fn star_does_not_cross_separator() {
        let f = filter(&[], &["/a*"]);
        assert!(!f.accepts("/abc", false));
        assert!(f.accepts("/x/abc", false));
        // `*` stops at the separator, but excluding /a covers its subtree.
        assert!(!f.accepts("/abc/inner", false));
        let g = filter(&["/src/*.rs"], &[]);
        assert!(g.accepts("/src/main.rs", false));
        assert!(!g.accepts("/src/deep/main.rs", false));
    }

    #[test]
    fn double_star_crosses_separators() {
        let f = filter(&["/app/**.php"], &[]);
        assert!(f.accepts("/app/index.php", false));
        assert!(f.accepts("/app/sub/page.php", false));
        assert!(!f.accepts("/web/index.php", false));
    }

    #[test]
    fn pruning_requires_negation_free_ignore_list() {
        let f = filter(&[], &["cache/"]);
        assert!(f.prunes("/cache"));
        assert!(!f.prunes("/app"));

        let g = filter(&[], &["cache/", "!cache/keep.txt"]);
        assert!(!g.prunes("/cache"), "negation forbids pruning");
    }

    #[test]
    fn include_list_never_prunes() {
        let f = filter(&["/app/**"], &[]);
        assert!(!f.prunes("/other"));
        assert!(!f.accepts("/other/file", false));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = PathFilter::new(&[], &["[".to_string()]).unwrap_err();
        assert!(matches!(err, SitesyncError::Filter { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn empty_pattern_is_reported() {
        assert!(PathFilter::new(&[], &["!".to_string()]).is_err());
        assert!(PathFilter::new(&[], &["/".to_string()]).is_err());
    }

    #[test]
    fn decision_matrix() {
        // include, ignore, path, is_dir, expected
        let cases: &[(&[&str], &[&str], &str, bool, bool)] = &[
            (&[], &[], "/a", false, true),
            (&["*.php"], &[], "/a.php", false, true),
            (&["*.php"], &[], "/a.css", false, false),
            (&["*.php"], &["a*"], "/a.php", false, false),
            (&["*.php"], &["a*", "!ab*"], "/ab.php", false, true),
            (&[], &["/x/**", "!/x/keep"], "/x/keep", false, true),
            (&[], &["/x/**", "!/x/keep"], "/x/drop", false, false),
            (&["**", "!*.bak"], &[], "/f.bak", false, false),
            (&["**", "!*.bak", "*.bak"], &[], "/f.bak", false, true),
            (&[], &["node_modules"], "/a/node_modules/b/c.js", false, false),
        ];
        for (include, ignore, path, is_dir, expected) in cases {
            let f = filter(include, ignore);
            assert_eq!(
                f.accepts(path, *is_dir),
                *expected,
                "include={include:?} ignore={ignore:?} path={path}"
            );
        }
    }
}
