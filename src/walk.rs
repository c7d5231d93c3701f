//! Directory tree traversal
//!
//! Produces a lazy, depth-first sequence of [`TreeEntry`] values for a
//! source/destination root pair. Directories are emitted before their
//! children so destinations can be created ahead of the files placed inside
//! them. Symlinks are classified with `symlink_metadata` and never descended
//! into, which also breaks symlink cycles.

use crate::error::{EngineError, Result};
use filetime::FileTime;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Classification of one filesystem object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file, transferred by content
    Regular,
    /// Directory, replicated structurally
    Directory,
    /// Symbolic link, recreated with the same target string
    Symlink,
    /// Socket, device or FIFO; reported but never copied
    Other,
}

impl EntryKind {
    fn classify(meta: &fs::Metadata) -> Self {
        let ft = meta.file_type();
        if ft.is_dir() {
            EntryKind::Directory
        } else if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_file() {
            EntryKind::Regular
        } else {
            EntryKind::Other
        }
    }
}

/// One enumerated filesystem object, paired with its destination path.
///
/// Immutable once produced; consumed by the skip detector and the copy
/// engine.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Path relative to the walk root ("." for the root itself)
    pub relative: PathBuf,
    /// Absolute (as given) source path
    pub source: PathBuf,
    /// Destination path the entry maps to
    pub dest: PathBuf,
    /// Entry classification
    pub kind: EntryKind,
    /// Size in bytes (regular files)
    pub len: u64,
    /// Permission bits
    pub mode: u32,
    /// Modification time
    pub mtime: FileTime,
    /// Access time
    pub atime: FileTime,
    /// Owning user id
    pub uid: u32,
    /// Owning group id
    pub gid: u32,
}

impl TreeEntry {
    /// Build an entry from `symlink_metadata` of `source`
    pub fn probe(relative: PathBuf, source: PathBuf, dest: PathBuf) -> Result<Self> {
        let meta = fs::symlink_metadata(&source).map_err(|e| EngineError::SourceUnreadable {
            path: source.clone(),
            source: e,
        })?;
        Ok(Self::from_metadata(relative, source, dest, &meta))
    }

    fn from_metadata(
        relative: PathBuf,
        source: PathBuf,
        dest: PathBuf,
        meta: &fs::Metadata,
    ) -> Self {
        Self {
            relative,
            source,
            dest,
            kind: EntryKind::classify(meta),
            len: meta.len(),
            mode: meta.mode() & 0o7777,
            mtime: FileTime::from_last_modification_time(meta),
            atime: FileTime::from_last_access_time(meta),
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }
}

/// Lazy depth-first walker over a source tree.
///
/// Yields the root entry first, then each directory before its children.
/// Children are sorted by name so runs are deterministic. A directory that
/// cannot be read below the root yields one error item and traversal
/// continues with its siblings; the caller decides whether a failing root is
/// fatal.
pub struct TreeWalker {
    stack: Vec<Result<TreeEntry>>,
}

impl TreeWalker {
    /// Start a walk mapping `source` onto `dest`
    pub fn new(source: &Path, dest: &Path) -> Self {
        let root = TreeEntry::probe(
            PathBuf::from("."),
            source.to_path_buf(),
            dest.to_path_buf(),
        );
        Self { stack: vec![root] }
    }

    fn push_children(&mut self, dir: &TreeEntry) {
        let reader = match fs::read_dir(&dir.source) {
            Ok(reader) => reader,
            Err(e) => {
                self.stack.push(Err(EngineError::SourceUnreadable {
                    path: dir.source.clone(),
                    source: e,
                }));
                return;
            }
        };

        let mut children = Vec::new();
        for item in reader {
            match item {
                Ok(item) => {
                    let name = item.file_name();
                    children.push(TreeEntry::probe(
                        dir.relative.join(&name),
                        dir.source.join(&name),
                        dir.dest.join(&name),
                    ));
                }
                Err(e) => children.push(Err(EngineError::SourceUnreadable {
                    path: dir.source.clone(),
                    source: e,
                })),
            }
        }

        children.sort_by(|a, b| match (a, b) {
            (Ok(a), Ok(b)) => a.source.cmp(&b.source),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => std::cmp::Ordering::Equal,
        });
        // popped in reverse, so reverse here to keep name order
        children.reverse();
        self.stack.append(&mut children);
    }
}

impl Iterator for TreeWalker {
    type Item = Result<TreeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.stack.pop()?;
        if let Ok(entry) = &item {
            if entry.kind == EntryKind::Directory {
                let dir = entry.clone();
                self.push_children(&dir);
            }
        }
        Some(item)
    }
}
