//! `[include]` and `[includeIf "<condition>"]` directive expansion.
//!
//! Mirrors C git's `git_config_include`: each file in a [`ConfigSet`](crate::ConfigSet)
//! is scanned in order for `include.path` and `includeIf.<condition>.path`
//! entries; matching directives pull in another file, which is appended and
//! then itself scanned (depth-bounded, cycle-detected). A missing include
//! target is silently ignored — only a cycle is an error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;

use crate::error::ConfigError;
use crate::parse::ConfigEvent;
use crate::ConfigFile;

const MAX_INCLUDE_DEPTH: usize = 10;

/// Expand all `include`/`includeIf` directives found in `files`, appending
/// newly loaded files to the vector. `git_dir` feeds `gitdir:`/`gitdir/i:`
/// conditions and `branch` feeds `onbranch:`; pass `None` when that context
/// isn't available (no repository, detached HEAD).
pub fn process_includes(
    files: &mut Vec<ConfigFile>,
    git_dir: Option<&Path>,
    branch: Option<&str>,
) -> Result<(), ConfigError> {
    let root_count = files.len();
    for root in 0..root_count {
        let mut stack = HashSet::new();
        if let Some(path) = files[root].path() {
            stack.insert(normalize(path));
        }
        expand(files, root, git_dir, branch, stack, 0)?;
    }
    Ok(())
}

fn expand(
    files: &mut Vec<ConfigFile>,
    at: usize,
    git_dir: Option<&Path>,
    branch: Option<&str>,
    stack: HashSet<PathBuf>,
    depth: usize,
) -> Result<(), ConfigError> {
    if depth >= MAX_INCLUDE_DEPTH {
        return Err(ConfigError::IncludeDepthExceeded(MAX_INCLUDE_DEPTH));
    }

    let directives = collect_directives(&files[at], git_dir, branch);
    let base_dir = files[at].path().and_then(Path::parent).map(Path::to_path_buf);
    let scope = files[at].scope();

    for raw_path in directives {
        let resolved = resolve_path(&raw_path, base_dir.as_deref());
        if !resolved.is_file() {
            continue;
        }

        let normalized = normalize(&resolved);
        if stack.contains(&normalized) {
            return Err(ConfigError::CircularInclude(resolved.display().to_string()));
        }

        let content = std::fs::read(&resolved)?;
        let included = ConfigFile::parse(&content, Some(&resolved), scope)?;
        files.push(included);
        let new_idx = files.len() - 1;

        let mut child_stack = stack.clone();
        child_stack.insert(normalized);
        expand(files, new_idx, git_dir, branch, child_stack, depth + 1)?;
    }

    Ok(())
}

/// Collect the resolved (but not yet existence-checked) include paths named
/// by `include.path` and by matching `includeIf.<cond>.path` entries.
fn collect_directives(file: &ConfigFile, git_dir: Option<&Path>, branch: Option<&str>) -> Vec<String> {
    let mut out = Vec::new();
    let mut current_section: Option<(String, Option<String>)> = None;

    for event in file.events() {
        match event {
            ConfigEvent::SectionHeader { section, subsection, .. } => {
                current_section = Some((
                    section.to_str_lossy().to_string(),
                    subsection.as_ref().map(|s| s.to_str_lossy().to_string()),
                ));
            }
            ConfigEvent::Entry { key, value, .. } => {
                let Some((section, subsection)) = &current_section else {
                    continue;
                };
                if key.as_slice() != b"path" {
                    continue;
                }
                let Some(value) = value else { continue };
                let path = value.to_str_lossy().to_string();

                let include = if section == "include" {
                    true
                } else if section == "includeif" {
                    subsection
                        .as_deref()
                        .is_some_and(|cond| condition_matches(cond, file, git_dir, branch))
                } else {
                    false
                };

                if include {
                    out.push(path);
                }
            }
            _ => {}
        }
    }

    out
}

fn condition_matches(condition: &str, file: &ConfigFile, git_dir: Option<&Path>, branch: Option<&str>) -> bool {
    if let Some(pattern) = condition.strip_prefix("onbranch:") {
        return branch_matches(pattern, branch);
    }
    if let Some(pattern) = condition.strip_prefix("gitdir/i:") {
        return gitdir_matches(pattern, git_dir, true);
    }
    if let Some(pattern) = condition.strip_prefix("gitdir:") {
        return gitdir_matches(pattern, git_dir, false);
    }
    if let Some(rest) = condition.strip_prefix("hasconfig:") {
        return hasconfig_matches(rest, file);
    }
    false
}

fn branch_matches(pattern: &str, branch: Option<&str>) -> bool {
    let Some(branch) = branch else { return false };
    let name = branch.strip_prefix("refs/heads/").unwrap_or(branch);
    let flags = git_utils::wildmatch::WildmatchFlags::PATHNAME;
    git_utils::wildmatch::wildmatch(
        bstr::BStr::new(pattern.as_bytes()),
        bstr::BStr::new(name.as_bytes()),
        flags,
    )
}

fn gitdir_matches(pattern: &str, git_dir: Option<&Path>, case_insensitive: bool) -> bool {
    let Some(git_dir) = git_dir else { return false };
    let mut subject = git_dir.display().to_string().replace('\\', "/");
    if !subject.ends_with('/') {
        subject.push('/');
    }

    let mut pat = pattern.to_string();
    if !pat.contains('/') {
        pat = format!("**/{pat}");
    }
    if pat.ends_with('/') {
        pat.push_str("**");
    } else if !pat.ends_with("/**") {
        pat.push_str("/**");
    }

    let mut flags = git_utils::wildmatch::WildmatchFlags::PATHNAME;
    if case_insensitive {
        flags |= git_utils::wildmatch::WildmatchFlags::CASEFOLD;
    }
    git_utils::wildmatch::wildmatch(
        bstr::BStr::new(pat.as_bytes()),
        bstr::BStr::new(subject.as_bytes()),
        flags,
    )
}

/// `hasconfig:<key-pattern>:<value-pattern>` — true if any entry in `file`
/// whose canonical key matches `key-pattern` has a value matching
/// `value-pattern`. Both patterns use plain (non-pathname) glob matching,
/// since config keys and values aren't path-shaped.
fn hasconfig_matches(rest: &str, file: &ConfigFile) -> bool {
    let Some((key_pattern, value_pattern)) = rest.split_once(':') else {
        return false;
    };
    let flags = git_utils::wildmatch::WildmatchFlags::empty();

    for entry in file.entries() {
        let canonical = entry.key.to_canonical();
        if !git_utils::wildmatch::wildmatch(
            bstr::BStr::new(key_pattern.as_bytes()),
            bstr::BStr::new(canonical.as_bytes()),
            flags,
        ) {
            continue;
        }
        let Some(value) = entry.value.as_ref() else { continue };
        if git_utils::wildmatch::wildmatch(
            bstr::BStr::new(value_pattern.as_bytes()),
            bstr::BStr::new(value.as_bytes()),
            flags,
        ) {
            return true;
        }
    }
    false
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
