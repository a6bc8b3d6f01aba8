//! Pathspec parsing and matching (`git add <pathspec>`, `git diff -- <pathspec>`).
//!
//! Supports the long `:(magic,...)pattern` form and the short `:!pattern` /
//! `:^pattern` (exclude) and `:/pattern` (top) forms. Patterns without any
//! magic and without glob metacharacters act as directory prefixes, matching
//! the path itself and everything under it — mirroring C git's `match_pathspec`.

use bstr::{BStr, BString, ByteSlice};
use git_utils::wildmatch::{wildmatch, WildmatchFlags};

/// A pathspec parse error: an unrecognized magic keyword or unterminated `(`.
#[derive(Debug, thiserror::Error)]
pub enum PathspecError {
    #[error("invalid pathspec magic in '{0}'")]
    InvalidMagic(String),
}

/// Magic keywords attached to a single pathspec element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathspecMagic {
    /// `:(top)` / `:/` — match relative to the repository root rather than the cwd.
    pub top: bool,
    /// `:(icase)` — case-insensitive match.
    pub icase: bool,
    /// `:(exclude)` / `:!` / `:^` — remove matches from the result instead of adding them.
    pub exclude: bool,
    /// `:(literal)` — disable glob metacharacters; match the pattern verbatim.
    pub literal: bool,
}

/// One parsed pathspec element.
#[derive(Debug, Clone)]
pub struct PathspecPattern {
    pub magic: PathspecMagic,
    pub pattern: BString,
}

/// A set of pathspec elements, combined by OR for includes and then
/// subtracting anything an exclude element matches.
#[derive(Debug, Clone, Default)]
pub struct Pathspec {
    pub patterns: Vec<PathspecPattern>,
}

impl Pathspec {
    /// Parse pathspec strings as given on a command line. An empty slice
    /// matches everything.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self, PathspecError> {
        let patterns = specs
            .iter()
            .map(|s| parse_one(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Pathspec { patterns })
    }

    /// Does `path` match this pathspec? `is_dir` allows directory-only magic
    /// (none currently distinguishes on it, but callers pass it through for
    /// parity with future magic such as `:(attr)`).
    pub fn matches(&self, path: &BStr, is_dir: bool) -> bool {
        let mut includes = self.patterns.iter().filter(|p| !p.magic.exclude).peekable();
        let included = if includes.peek().is_none() {
            true
        } else {
            includes.any(|p| pattern_matches(p, path, is_dir))
        };
        if !included {
            return false;
        }
        let excluded = self
            .patterns
            .iter()
            .filter(|p| p.magic.exclude)
            .any(|p| pattern_matches(p, path, is_dir));
        !excluded
    }
}

fn parse_one(spec: &str) -> Result<PathspecPattern, PathspecError> {
    let mut magic = PathspecMagic::default();

    let Some(after_colon) = spec.strip_prefix(':') else {
        return Ok(PathspecPattern {
            magic,
            pattern: BString::from(spec),
        });
    };

    if let Some(rest) = after_colon.strip_prefix('(') {
        let close = rest
            .find(')')
            .ok_or_else(|| PathspecError::InvalidMagic(spec.to_string()))?;
        let (keywords, pattern) = (&rest[..close], &rest[close + 1..]);
        for kw in keywords.split(',') {
            match kw {
                "top" => magic.top = true,
                "icase" => magic.icase = true,
                "exclude" => magic.exclude = true,
                "literal" => magic.literal = true,
                "glob" | "attr" | "" => {}
                other => return Err(PathspecError::InvalidMagic(other.to_string())),
            }
        }
        return Ok(PathspecPattern {
            magic,
            pattern: BString::from(pattern),
        });
    }

    if let Some(p) = after_colon.strip_prefix('!').or_else(|| after_colon.strip_prefix('^')) {
        magic.exclude = true;
        return Ok(PathspecPattern {
            magic,
            pattern: BString::from(p),
        });
    }

    if let Some(p) = after_colon.strip_prefix('/') {
        magic.top = true;
        return Ok(PathspecPattern {
            magic,
            pattern: BString::from(p),
        });
    }

    Ok(PathspecPattern {
        magic,
        pattern: BString::from(after_colon),
    })
}

fn pattern_matches(p: &PathspecPattern, path: &BStr, _is_dir: bool) -> bool {
    let pat = p.pattern.as_slice();

    if p.magic.literal {
        return bytes_eq(pat, path.as_bytes(), p.magic.icase);
    }

    let has_glob_chars = pat.iter().any(|&b| matches!(b, b'*' | b'?' | b'['));
    if !has_glob_chars {
        if bytes_eq(pat, path.as_bytes(), p.magic.icase) {
            return true;
        }
        let mut prefix = pat.to_vec();
        prefix.push(b'/');
        return bytes_starts_with(path.as_bytes(), &prefix, p.magic.icase);
    }

    let mut flags = WildmatchFlags::PATHNAME;
    if p.magic.icase {
        flags |= WildmatchFlags::CASEFOLD;
    }
    wildmatch(BStr::new(pat), path, flags)
}

fn bytes_eq(a: &[u8], b: &[u8], icase: bool) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if icase {
        a.iter().zip(b).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
    } else {
        a == b
    }
}

fn bytes_starts_with(haystack: &[u8], prefix: &[u8], icase: bool) -> bool {
    if haystack.len() < prefix.len() {
        return false;
    }
    bytes_eq(&haystack[..prefix.len()], prefix, icase)
}
