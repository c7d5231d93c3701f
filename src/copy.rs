//! Single-file copy operations
//!
//! This module transfers the content of one regular file onto a destination
//! path using the most efficient kernel primitive available, then carries
//! the source's permission bits and timestamps over. Metadata is applied
//! only after a complete content transfer, so a partially written
//! destination never looks finished.

use crate::cli::CopyMethod;
use crate::error::{EngineError, Result};
use crate::splice::{copy_buffered, transfer_file_range, transfer_via_pipe};
use crate::walk::TreeEntry;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::PermissionsExt;

/// Advisory lock flavors used while a file is being read or rewritten
#[derive(Debug, Clone, Copy)]
pub enum LockMode {
    /// Shared lock, taken on sources
    Shared,
    /// Exclusive lock, taken on destinations
    Exclusive,
}

/// Try to take a non-blocking advisory lock on `file`.
///
/// Returns `Ok(false)` when another process holds a conflicting lock. The
/// lock is released when the last descriptor of this open file closes.
pub fn try_lock(file: &File, mode: LockMode) -> io::Result<bool> {
    let op = match mode {
        LockMode::Shared => libc::LOCK_SH,
        LockMode::Exclusive => libc::LOCK_EX,
    } | libc::LOCK_NB;
    let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

/// Copy one regular file described by `entry` and preserve its metadata.
///
/// The source is locked shared and the destination exclusive, both
/// non-blocking; a file locked elsewhere is skipped with
/// [`EngineError::Locked`]. The destination is truncated only once its lock
/// is held.
///
/// # Errors
///
/// Besides per-path open and lock failures, returns
/// [`EngineError::SizeMismatch`] when fewer bytes than the source's size
/// could be moved; the partial destination is left in place and metadata is
/// withheld.
pub fn copy_file(entry: &TreeEntry, method: CopyMethod) -> Result<u64> {
    let src = File::open(&entry.source).map_err(|e| EngineError::SourceUnreadable {
        path: entry.source.clone(),
        source: e,
    })?;
    if !try_lock(&src, LockMode::Shared)? {
        return Err(EngineError::Locked {
            path: entry.source.clone(),
        });
    }

    let dst = OpenOptions::new()
        .write(true)
        .create(true)
        .open(&entry.dest)
        .map_err(|e| EngineError::DestinationUnwritable {
            path: entry.dest.clone(),
            source: e,
        })?;
    if !try_lock(&dst, LockMode::Exclusive)? {
        return Err(EngineError::Locked {
            path: entry.dest.clone(),
        });
    }
    dst.set_len(0).map_err(|e| EngineError::DestinationUnwritable {
        path: entry.dest.clone(),
        source: e,
    })?;

    // fstat after open; the walk-time size may already be stale
    let len = src
        .metadata()
        .map_err(|e| EngineError::SourceUnreadable {
            path: entry.source.clone(),
            source: e,
        })?
        .len();

    let moved = match method {
        CopyMethod::Auto | CopyMethod::Sendfile => transfer_file_range(&src, &dst, len)?,
        CopyMethod::Splice => transfer_via_pipe(&src, &dst, len)?,
        CopyMethod::ReadWrite => copy_buffered(&src, &dst, len)?,
    };
    if moved != len {
        return Err(EngineError::SizeMismatch {
            path: entry.source.clone(),
            moved,
            expected: len,
        });
    }

    preserve_metadata(&dst, entry)?;
    Ok(moved)
}

/// Copy permission bits and timestamps from `entry` onto the open
/// destination. Called only after a complete transfer.
fn preserve_metadata(dst: &File, entry: &TreeEntry) -> Result<()> {
    dst.set_permissions(fs::Permissions::from_mode(entry.mode))
        .map_err(|e| EngineError::DestinationUnwritable {
            path: entry.dest.clone(),
            source: e,
        })?;
    filetime::set_file_handle_times(dst, Some(entry.atime), Some(entry.mtime)).map_err(|e| {
        EngineError::DestinationUnwritable {
            path: entry.dest.clone(),
            source: e,
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::io::Write;
    use std::path::PathBuf;

    fn entry(src: &std::path::Path, dst: &std::path::Path) -> TreeEntry {
        TreeEntry::probe(PathBuf::from("."), src.to_path_buf(), dst.to_path_buf()).unwrap()
    }

    #[test]
    fn copies_content_and_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        File::create(&src).unwrap().write_all(b"payload").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o640)).unwrap();
        filetime::set_file_mtime(&src, FileTime::from_unix_time(1_234_567, 0)).unwrap();

        let moved = copy_file(&entry(&src, &dst), CopyMethod::Auto).unwrap();
        assert_eq!(moved, 7);
        assert_eq!(fs::read(&dst).unwrap(), b"payload");

        let meta = fs::metadata(&dst).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o640);
        assert_eq!(
            FileTime::from_last_modification_time(&meta).unix_seconds(),
            1_234_567
        );
    }

    #[test]
    fn truncates_previous_destination_content() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        File::create(&src).unwrap().write_all(b"new").unwrap();
        File::create(&dst)
            .unwrap()
            .write_all(b"something much longer")
            .unwrap();

        copy_file(&entry(&src, &dst), CopyMethod::ReadWrite).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"new");
    }

    #[test]
    fn locked_destination_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        File::create(&src).unwrap().write_all(b"x").unwrap();
        let holder = File::create(&dst).unwrap();
        assert!(try_lock(&holder, LockMode::Exclusive).unwrap());

        let err = copy_file(&entry(&src, &dst), CopyMethod::Auto).unwrap_err();
        assert!(matches!(err, EngineError::Locked { .. }));
    }

    #[test]
    fn splice_method_copies_content() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        File::create(&src).unwrap().write_all(b"via pipe").unwrap();

        copy_file(&entry(&src, &dst), CopyMethod::Splice).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"via pipe");
    }
}
