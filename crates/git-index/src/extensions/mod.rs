//! Index extensions: TREE, REUC, and unknown/raw.

pub mod tree;

use bstr::BString;
use git_hash::{HashAlgorithm, ObjectId};
use git_object::FileMode;

use crate::IndexError;

/// Raw unknown extension (preserved for round-trip).
#[derive(Debug, Clone)]
pub struct RawExtension {
    pub signature: [u8; 4],
    pub data: Vec<u8>,
}

/// Resolve-undo extension (REUC) — records the conflicted stages of a path
/// so they can be restored if a merge is undone after `add` resolves it.
#[derive(Debug, Clone)]
pub struct ResolveUndo {
    pub entries: Vec<ResolveUndoEntry>,
}

/// A single resolve-undo entry.
#[derive(Debug, Clone)]
pub struct ResolveUndoEntry {
    pub path: BString,
    pub modes: [Option<FileMode>; 3], // base, ours, theirs
    pub oids: [Option<ObjectId>; 3],
}

impl ResolveUndo {
    /// Extension signature.
    pub const SIGNATURE: &'static [u8; 4] = b"REUC";

    /// Parse a REUC extension from raw data.
    pub fn parse(data: &[u8]) -> Result<Self, IndexError> {
        let mut cursor = 0;
        let mut entries = Vec::new();

        while cursor < data.len() {
            let path_end = data[cursor..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| IndexError::InvalidExtension {
                    sig: "REUC".into(),
                    reason: "missing path terminator".into(),
                })?
                + cursor;
            let path = BString::from(&data[cursor..path_end]);
            cursor = path_end + 1;

            let mut modes = [None, None, None];
            for mode_slot in modes.iter_mut() {
                let mode_end = data[cursor..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| IndexError::InvalidExtension {
                        sig: "REUC".into(),
                        reason: "missing mode terminator".into(),
                    })?
                    + cursor;
                let mode_str = std::str::from_utf8(&data[cursor..mode_end]).map_err(|_| {
                    IndexError::InvalidExtension {
                        sig: "REUC".into(),
                        reason: "invalid mode string".into(),
                    }
                })?;
                let mode_raw = u32::from_str_radix(mode_str, 8).map_err(|_| {
                    IndexError::InvalidExtension {
                        sig: "REUC".into(),
                        reason: format!("invalid octal mode: {mode_str}"),
                    }
                })?;
                *mode_slot = if mode_raw == 0 {
                    None
                } else {
                    Some(FileMode::from_raw(mode_raw))
                };
                cursor = mode_end + 1;
            }

            let mut oids = [None, None, None];
            for (slot, mode) in oids.iter_mut().zip(modes.iter()) {
                if mode.is_some() {
                    if cursor + 20 > data.len() {
                        return Err(IndexError::InvalidExtension {
                            sig: "REUC".into(),
                            reason: "truncated OID".into(),
                        });
                    }
                    *slot = Some(
                        ObjectId::from_bytes(&data[cursor..cursor + 20], HashAlgorithm::Sha1)
                            .map_err(|_| IndexError::InvalidExtension {
                                sig: "REUC".into(),
                                reason: "invalid OID".into(),
                            })?,
                    );
                    cursor += 20;
                }
            }

            entries.push(ResolveUndoEntry { path, modes, oids });
        }

        Ok(ResolveUndo { entries })
    }

    /// Serialize to raw bytes for writing.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for entry in &self.entries {
            buf.extend_from_slice(&entry.path);
            buf.push(0);

            for mode in &entry.modes {
                let raw = mode.map(|m| m.raw()).unwrap_or(0);
                buf.extend_from_slice(format!("{:o}", raw).as_bytes());
                buf.push(0);
            }

            for (mode, oid) in entry.modes.iter().zip(entry.oids.iter()) {
                if mode.is_some() {
                    if let Some(oid) = oid {
                        buf.extend_from_slice(oid.as_bytes());
                    }
                }
            }
        }
        buf
    }
}
