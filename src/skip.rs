//! Skip-if-unchanged detection
//!
//! Decides whether a destination already matches a source regular file
//! closely enough to skip the transfer: same kind, identical size, and a
//! modification time not older than the source's. This is a heuristic by
//! size and timestamp, deliberately not a content comparison.

use crate::walk::{EntryKind, TreeEntry};
use filetime::FileTime;
use std::fs;

/// True when the transfer of `entry` can be skipped because `dest_meta`
/// (the destination's metadata, if the destination exists) already matches.
///
/// Timestamps compare at whole-second granularity; an equal timestamp
/// counts as unchanged, since there is no differentiating signal left short
/// of reading content.
pub fn should_skip(entry: &TreeEntry, dest_meta: Option<&fs::Metadata>) -> bool {
    let Some(meta) = dest_meta else {
        return false;
    };
    if entry.kind != EntryKind::Regular || !meta.file_type().is_file() {
        return false;
    }
    if meta.len() != entry.len {
        return false;
    }
    let dest_mtime = FileTime::from_last_modification_time(meta);
    dest_mtime.unix_seconds() >= entry.mtime.unix_seconds()
}
