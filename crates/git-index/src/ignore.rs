//! `.gitignore` pattern matching.
//!
//! A stack of pattern files accumulated while walking the worktree top-down
//! (repository root `.gitignore`, then each directory's own, then
//! `.git/info/exclude` and `core.excludesFile`, all pushed via
//! [`IgnoreStack::add_patterns`] in that precedence order). The *last*
//! matching pattern across the whole stack decides, exactly as C git's
//! `last_matching_pattern` does — a later `!negated` entry can un-ignore
//! something an earlier broader pattern excluded.

use std::path::Path;

use bstr::{BStr, BString, ByteSlice};
use git_utils::wildmatch::{wildmatch, WildmatchFlags};

/// One parsed line from a `.gitignore`-style file.
#[derive(Debug, Clone)]
struct IgnorePattern {
    negate: bool,
    dir_only: bool,
    /// Contains a `/` other than a trailing one: matched against the full
    /// path rather than treated as a basename pattern at any depth.
    anchored: bool,
    pattern: BString,
}

/// An ordered collection of ignore patterns from one or more files.
#[derive(Debug, Clone, Default)]
pub struct IgnoreStack {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `content` (the bytes of a `.gitignore`-style file) and append
    /// its patterns. `source_path` and `base_dir` are accepted for parity
    /// with callers that need to report which file a pattern came from;
    /// this implementation only uses pattern content.
    pub fn add_patterns(&mut self, content: &[u8], _source_path: &Path, _base_dir: &Path) {
        for raw_line in content.split(|&b| b == b'\n') {
            let mut line = raw_line;
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if line.is_empty() || line[0] == b'#' {
                continue;
            }

            let (negate, rest) = match line.split_first() {
                Some((b'!', rest)) => (true, rest),
                _ => (false, line),
            };
            if rest.is_empty() {
                continue;
            }

            let mut pat: Vec<u8> = if rest.len() > 1 && rest[0] == b'\\' && matches!(rest[1], b'#' | b'!') {
                rest[1..].to_vec()
            } else {
                rest.to_vec()
            };

            while pat.last() == Some(&b' ') {
                pat.pop();
            }
            if pat.is_empty() {
                continue;
            }

            let dir_only = pat.last() == Some(&b'/');
            if dir_only {
                pat.pop();
            }

            let anchored = pat.contains(&b'/');
            if pat.first() == Some(&b'/') {
                pat.remove(0);
            }

            self.patterns.push(IgnorePattern {
                negate,
                dir_only,
                anchored,
                pattern: BString::from(pat),
            });
        }
    }

    /// Number of parsed patterns across all files added so far.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Is `path` (slash-separated, relative to the repository root) ignored?
    /// `is_dir` allows directory-only (`pattern/`) entries to apply.
    pub fn is_ignored(&self, path: &BStr, is_dir: bool) -> bool {
        let mut result = false;
        for p in &self.patterns {
            if p.dir_only && !is_dir {
                continue;
            }
            if pattern_matches(p, path) {
                result = !p.negate;
            }
        }
        result
    }
}

fn pattern_matches(p: &IgnorePattern, path: &BStr) -> bool {
    let flags = WildmatchFlags::PATHNAME;
    if p.anchored {
        return wildmatch(BStr::new(p.pattern.as_slice()), path, flags);
    }

    let mut full = Vec::with_capacity(p.pattern.len() + 3);
    full.extend_from_slice(b"**/");
    full.extend_from_slice(p.pattern.as_slice());
    wildmatch(BStr::new(&full), path, flags)
}
