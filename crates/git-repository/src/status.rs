//! Worktree iterator and three-way status calculator.
//!
//! Compares `HEAD` tree, the staging area, and the on-disk worktree the way
//! `git status` does: each tracked path gets an independent verdict for
//! "staged" (index vs HEAD) and "unstaged" (worktree vs index), and paths
//! present on disk but absent from the index are reported as untracked
//! unless `.gitignore` says otherwise.

use std::collections::BTreeMap;
use std::path::Path;

use bstr::{BStr, BString, ByteSlice};
use git_hash::{HashAlgorithm, ObjectId};
use git_index::builder::read_tree;
use git_index::ignore::IgnoreStack;
use git_index::Stage;
use git_object::{FileMode, Object};

use crate::{RepoError, Repository};

/// Change between the committed tree and the index, or between the index
/// and the worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    TypeChanged,
}

/// Status of a single path relative to `HEAD` and the worktree.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub path: BString,
    /// `None` means no difference between HEAD and the index for this path.
    pub staged: Option<ChangeType>,
    /// `None` means no difference between the index and the worktree.
    /// Untracked paths have `staged: None` and `unstaged: Some(Added)`.
    pub unstaged: Option<ChangeType>,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.staged.is_none() && self.unstaged == Some(ChangeType::Added)
    }
}

/// Compute full repository status: staged changes, unstaged changes, and
/// untracked files. Requires a worktree (bare repositories have none to walk).
pub fn status(repo: &mut Repository) -> Result<Vec<StatusEntry>, RepoError> {
    let work_tree = repo.work_tree().ok_or(RepoError::BareNoWorkTree)?.to_path_buf();

    let head_entries = head_tree_entries(repo)?;
    let index_entries: Vec<(BString, ObjectId, FileMode)> = repo
        .index()?
        .iter()
        .filter(|e| e.stage == Stage::Normal)
        .map(|e| (e.path.clone(), e.oid, e.mode))
        .collect();

    let mut by_path: BTreeMap<BString, (Option<(ObjectId, FileMode)>, Option<(ObjectId, FileMode)>)> =
        BTreeMap::new();

    for (path, oid, mode) in head_entries {
        by_path.entry(path).or_default().0 = Some((oid, mode));
    }
    for (path, oid, mode) in index_entries {
        by_path.entry(path).or_default().1 = Some((oid, mode));
    }

    let mut out = Vec::new();
    for (path, (head, idx)) in &by_path {
        let staged = match (head, idx) {
            (None, Some(_)) => Some(ChangeType::Added),
            (Some(_), None) => Some(ChangeType::Deleted),
            (Some((h_oid, h_mode)), Some((i_oid, i_mode))) => {
                if h_mode.is_blob() != i_mode.is_blob() {
                    Some(ChangeType::TypeChanged)
                } else if h_oid != i_oid || h_mode.raw() != i_mode.raw() {
                    Some(ChangeType::Modified)
                } else {
                    None
                }
            }
            (None, None) => None,
        };

        let unstaged = match idx {
            Some((i_oid, i_mode)) => {
                worktree_change(&work_tree, path.as_ref(), *i_oid, *i_mode, repo.hash_algo())?
            }
            None => None,
        };

        if staged.is_some() || unstaged.is_some() {
            out.push(StatusEntry {
                path: path.clone(),
                staged,
                unstaged,
            });
        }
    }

    let tracked: std::collections::HashSet<&BStr> =
        by_path.keys().map(|p| p.as_ref()).collect();
    for path in untracked_paths(&work_tree, &tracked)? {
        out.push(StatusEntry {
            path,
            staged: None,
            unstaged: Some(ChangeType::Added),
        });
    }

    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

fn head_tree_entries(repo: &mut Repository) -> Result<Vec<(BString, ObjectId, FileMode)>, RepoError> {
    let Some(head_oid) = repo.head_oid()? else {
        return Ok(Vec::new());
    };
    let Some(Object::Commit(commit)) = repo.odb().read(&head_oid)? else {
        return Err(RepoError::InvalidHead(format!("{head_oid} is not a commit")));
    };
    let tree_index = read_tree(repo.odb(), commit.tree)?;
    Ok(tree_index
        .iter()
        .map(|e| (e.path.clone(), e.oid, e.mode))
        .collect())
}

fn worktree_change(
    work_tree: &Path,
    path: &BStr,
    index_oid: ObjectId,
    index_mode: FileMode,
    hash_algo: HashAlgorithm,
) -> Result<Option<ChangeType>, RepoError> {
    let full_path = work_tree.join(path.to_str_lossy().as_ref());
    let meta = match std::fs::symlink_metadata(&full_path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Some(ChangeType::Deleted))
        }
        Err(e) => return Err(e.into()),
    };

    let is_symlink = meta.file_type().is_symlink();
    if is_symlink != index_mode.is_symlink() {
        return Ok(Some(ChangeType::TypeChanged));
    }

    let data = if is_symlink {
        std::fs::read_link(&full_path)?
            .to_string_lossy()
            .into_owned()
            .into_bytes()
    } else {
        std::fs::read(&full_path)?
    };

    let current_oid = git_hash::Hasher::hash_object(hash_algo, "blob", &data)?;
    if current_oid != index_oid {
        return Ok(Some(ChangeType::Modified));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if !is_symlink {
            let executable = meta.permissions().mode() & 0o111 != 0;
            if executable != matches!(index_mode, FileMode::Executable) {
                return Ok(Some(ChangeType::Modified));
            }
        }
    }

    Ok(None)
}

fn untracked_paths(
    work_tree: &Path,
    tracked: &std::collections::HashSet<&BStr>,
) -> Result<Vec<BString>, RepoError> {
    let mut ignore = IgnoreStack::new();
    let root_ignore = work_tree.join(".gitignore");
    if let Ok(content) = std::fs::read(&root_ignore) {
        ignore.add_patterns(&content, &root_ignore, work_tree);
    }
    let exclude_path = work_tree.join(".git/info/exclude");
    if let Ok(content) = std::fs::read(&exclude_path) {
        ignore.add_patterns(&content, &exclude_path, work_tree);
    }

    let mut out = Vec::new();
    walk_untracked(work_tree, work_tree, &ignore, tracked, &mut out)?;
    Ok(out)
}

fn walk_untracked(
    root: &Path,
    dir: &Path,
    ignore: &IgnoreStack,
    tracked: &std::collections::HashSet<&BStr>,
    out: &mut Vec<BString>,
) -> Result<(), RepoError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }
        let full = entry.path();
        let rel = full.strip_prefix(root).unwrap_or(&full);
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        let rel_bytes = BString::from(rel_str.as_bytes());

        let file_type = entry.file_type()?;
        let is_dir = file_type.is_dir();

        if ignore.is_ignored(BStr::new(&rel_bytes), is_dir) {
            continue;
        }

        if is_dir {
            if tracked.iter().any(|t| t.starts_with(rel_bytes.as_slice())) {
                walk_untracked(root, &full, ignore, tracked, out)?;
            } else {
                out.push(rel_bytes);
            }
        } else if !tracked.contains(BStr::new(rel_bytes.as_slice())) {
            out.push(rel_bytes);
        }
    }

    Ok(())
}
