//! Include/exclude glob filtering over source-relative paths.
//!
//! Paths are POSIX-style and relative to the source root (`notes/a.md`).
//! Patterns use shell-glob semantics: `*` and `?` stay within one path
//! segment, `**` spans segments, `[...]` is a character class. A pattern with
//! no `/` is matched against the file name alone, so `*.md` selects Markdown
//! files at any depth.
//!
//! Any exclude match removes a path. With no include patterns every
//! remaining path is included; otherwise at least one include must match.
//! Malformed patterns are dropped: they never match and never fail.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Compiled include/exclude pattern sets for one source.
#[derive(Debug, Clone)]
pub struct PathFilter {
    includes: PatternSet,
    excludes: PatternSet,
    include_all: bool,
}

#[derive(Debug, Clone)]
struct PatternSet {
    paths: GlobSet,
    names: GlobSet,
}

impl PatternSet {
    fn build(patterns: &[String]) -> Self {
        let mut paths = GlobSetBuilder::new();
        let mut names = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) => glob,
                Err(e) => {
                    tracing::debug!(pattern = %pattern, error = %e, "ignoring malformed glob");
                    continue;
                }
            };
            if pattern.contains('/') {
                paths.add(glob);
            } else {
                names.add(glob);
            }
        }
        Self {
            paths: paths.build().unwrap_or_else(|_| GlobSet::empty()),
            names: names.build().unwrap_or_else(|_| GlobSet::empty()),
        }
    }

    fn is_match(&self, rel_path: &str) -> bool {
        if self.paths.is_match(rel_path) {
            return true;
        }
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        self.names.is_match(name)
    }
}

impl PathFilter {
    pub fn new(includes: &[String], excludes: &[String]) -> Self {
        Self {
            includes: PatternSet::build(includes),
            excludes: PatternSet::build(excludes),
            include_all: includes.is_empty(),
        }
    }

    /// Whether `rel_path` belongs to the source.
    pub fn is_included(&self, rel_path: &str) -> bool {
        if self.excludes.is_match(rel_path) {
            return false;
        }
        self.include_all || self.includes.is_match(rel_path)
    }
}

/// One-shot form of [`PathFilter::is_included`].
pub fn included(rel_path: &str, includes: &[String], excludes: &[String]) -> bool {
    PathFilter::new(includes, excludes).is_included(rel_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globs(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn empty_includes_accepts_everything() {
        assert!(included("a/b/c.bin", &[], &[]));
    }

    #[test]
    fn exclude_wins_over_include() {
        let inc = globs(&["**/*.md"]);
        let exc = globs(&["**/.git/**"]);
        assert!(included("a.md", &inc, &exc));
        assert!(included("deep/dir/a.md", &inc, &exc));
        assert!(!included(".git/c.md", &inc, &exc));
        assert!(!included("sub/.git/refs/c.md", &inc, &exc));
        assert!(!included("b.txt", &inc, &exc));
    }

    #[test]
    fn single_star_stays_in_segment() {
        let inc = globs(&["notes/*.md"]);
        assert!(included("notes/a.md", &inc, &[]));
        assert!(!included("notes/sub/a.md", &inc, &[]));
    }

    #[test]
    fn slashless_pattern_matches_file_name() {
        let inc = globs(&["*.md"]);
        assert!(included("a.md", &inc, &[]));
        assert!(included("x/y/a.md", &inc, &[]));
        assert!(!included("x/y/a.mdx", &inc, &[]));
    }

    #[test]
    fn question_mark_and_class() {
        let inc = globs(&["ch?/[ab]*.txt"]);
        assert!(included("ch1/alpha.txt", &inc, &[]));
        assert!(!included("ch1/gamma.txt", &inc, &[]));
        assert!(!included("ch10/alpha.txt", &inc, &[]));
    }

    #[test]
    fn malformed_pattern_never_matches() {
        let inc = globs(&["[unclosed"]);
        assert!(!included("[unclosed", &inc, &[]));
        assert!(!included("a.md", &inc, &[]));

        let exc = globs(&["[unclosed", "**/*.tmp"]);
        assert!(included("a.md", &[], &exc));
        assert!(!included("a.tmp", &[], &exc));
    }
}
