//! Builder and Editor APIs for constructing and mutating an [`Index`].
//!
//! `Builder` collects entries in any order and replaces the index wholesale
//! on [`finish`](Builder::finish). `Editor` applies targeted per-path edits
//! while leaving every other entry untouched — cheaper than a full rebuild
//! for small updates.

use std::collections::HashSet;

use bstr::BStr;
use git_hash::ObjectId;
use git_object::{FileMode, Object};
use git_odb::ObjectDatabase;

use crate::entry::{EntryFlags, IndexEntry, StatData};
use crate::{cmp_entries, Index, IndexError, Stage};

/// Collects entries out of order and produces a brand new [`Index`].
pub struct Builder {
    entries: Vec<IndexEntry>,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add an entry. Order does not matter; duplicates are caught in `finish`.
    pub fn add(&mut self, entry: IndexEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Validate, sort canonically, and produce the replacement index.
    ///
    /// Fails if two entries share the same `(path, stage)` pair.
    pub fn finish(mut self) -> Result<Index, IndexError> {
        self.entries.sort_by(cmp_entries);

        for pair in self.entries.windows(2) {
            if pair[0].path == pair[1].path && pair[0].stage == pair[1].stage {
                return Err(IndexError::InvalidEntry {
                    offset: 0,
                    reason: format!(
                        "duplicate entry for path {:?} at stage {:?}",
                        pair[0].path, pair[0].stage
                    ),
                });
            }
        }

        Ok(Index::from_entries(self.entries))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// A targeted edit to apply to one path's stage-0 entry.
///
/// `apply` receives the current entry (`None` if absent) and returns the
/// entry that should replace it (`None` to remove).
pub struct Edit<'a> {
    pub path: &'a BStr,
    pub apply: Box<dyn FnOnce(Option<&IndexEntry>) -> Option<IndexEntry> + 'a>,
}

/// Applies a batch of targeted edits to an index, preserving unaffected entries.
pub struct Editor<'idx> {
    index: &'idx mut Index,
}

impl<'idx> Editor<'idx> {
    pub fn new(index: &'idx mut Index) -> Self {
        Self { index }
    }

    /// Apply one edit immediately.
    pub fn apply(&mut self, edit: Edit<'_>) {
        let current = self.index.get(edit.path, Stage::Normal).cloned();
        match (edit.apply)(current.as_ref()) {
            Some(new_entry) => self.index.add(new_entry),
            None => {
                self.index.remove(edit.path, Stage::Normal);
            }
        }
    }

    /// Apply a batch of edits in sequence.
    pub fn apply_all(&mut self, edits: Vec<Edit<'_>>) {
        for edit in edits {
            self.apply(edit);
        }
    }
}

/// Replace the index with stage-0 entries for every blob leaf reachable
/// from `tree_oid`. File mode is taken from the tree entry; `size` and
/// `mtime` are left at zero since no working-tree stat is available.
pub fn read_tree(odb: &ObjectDatabase, tree_oid: ObjectId) -> Result<Index, IndexError> {
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    collect_tree_entries(odb, tree_oid, b"", &mut entries, &mut seen)?;
    Ok(Index::from_entries(entries))
}

fn collect_tree_entries(
    odb: &ObjectDatabase,
    tree_oid: ObjectId,
    prefix: &[u8],
    out: &mut Vec<IndexEntry>,
    seen: &mut HashSet<ObjectId>,
) -> Result<(), IndexError> {
    if !seen.insert(tree_oid) {
        return Ok(());
    }

    let object = odb
        .read(&tree_oid)?
        .ok_or(IndexError::InvalidEntry {
            offset: 0,
            reason: format!("tree object {tree_oid} missing from object database"),
        })?;

    let tree = match object {
        Object::Tree(tree) => tree,
        _ => {
            return Err(IndexError::InvalidEntry {
                offset: 0,
                reason: format!("object {tree_oid} is not a tree"),
            })
        }
    };

    for child in &tree.entries {
        let mut path = prefix.to_vec();
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(&child.name);

        if child.mode == FileMode::Tree {
            collect_tree_entries(odb, child.oid, &path, out, seen)?;
        } else {
            out.push(IndexEntry {
                path: path.into(),
                oid: child.oid,
                mode: child.mode,
                stage: Stage::Normal,
                stat: StatData::default(),
                flags: EntryFlags::default(),
            });
        }
    }

    Ok(())
}
