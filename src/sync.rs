//! Tree synchronization engine
//!
//! Orchestrates the tree walker, the skip detector, the per-file copy path
//! and attribute preservation to replicate one or more sources onto a
//! destination. Inputs are processed strictly sequentially; a failing entry
//! is reported and counted, and processing continues with the remaining
//! entries. Only an unreadable root aborts the invocation.

use crate::cli::CopyMethod;
use crate::copy::copy_file;
use crate::error::{EngineError, Result};
use crate::progress::ProgressTracker;
use crate::skip::should_skip;
use crate::walk::{EntryKind, TreeEntry, TreeWalker};
use filetime::FileTime;
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Behavior switches for one sync invocation
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Skip files whose destination already matches (sync semantics);
    /// otherwise copy unconditionally
    pub sync: bool,
    /// Walk and report without writing anything
    pub dry_run: bool,
    /// Transfer primitive selection
    pub method: CopyMethod,
    /// Show a byte-rate progress display
    pub progress: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            sync: false,
            dry_run: false,
            method: CopyMethod::Auto,
            progress: false,
        }
    }
}

/// Statistics for a synchronization operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    /// Regular files fully transferred
    pub files_copied: u64,
    /// Regular files left untouched by the skip detector or lock contention
    pub files_skipped: u64,
    /// Destination directories created
    pub directories_created: u64,
    /// Symlinks recreated
    pub symlinks_created: u64,
    /// Sockets, devices and FIFOs reported but not copied
    pub entries_unsupported: u64,
    /// Total content bytes moved
    pub bytes_copied: u64,
    /// Entries that failed and were skipped over
    pub errors: u64,
    /// Wall-clock duration of the invocation
    pub duration: Duration,
}

/// Replicate `sources` onto `destination`.
///
/// With more than one source, or with a source mapped into an existing
/// directory, each source lands at `destination/<basename>` — the behavior
/// of conventional copy tools. Each file is fully transferred or fully
/// skipped before the next begins.
///
/// # Errors
///
/// Fatal errors only: invalid source/destination combinations and unreadable
/// roots. Per-entry failures are reported, counted in
/// [`SyncStats::errors`], and do not abort the run.
pub fn sync(sources: &[PathBuf], destination: &Path, opts: &SyncOptions) -> Result<SyncStats> {
    let start = Instant::now();

    if sources.is_empty() {
        return Err(EngineError::InvalidConfig(
            "at least one source is required".to_string(),
        ));
    }
    let dest_is_dir = destination.is_dir();
    if sources.len() > 1 && !dest_is_dir {
        return Err(EngineError::InvalidConfig(format!(
            "destination must be an existing directory for multiple sources: {}",
            destination.display()
        )));
    }

    let progress = opts.progress.then(ProgressTracker::new);
    let mut stats = SyncStats::default();

    for source in sources {
        // an unreadable root is fatal; anything deeper is not
        fs::symlink_metadata(source).map_err(|e| EngineError::SourceUnreadable {
            path: source.clone(),
            source: e,
        })?;

        let dest = if dest_is_dir {
            match source.file_name() {
                Some(name) => destination.join(name),
                None => destination.to_path_buf(),
            }
        } else {
            destination.to_path_buf()
        };

        info!("sync: {} -> {}", source.display(), dest.display());
        sync_tree(source, &dest, opts, &mut stats, progress.as_ref());
    }

    if let Some(progress) = &progress {
        progress.finish();
    }
    stats.duration = start.elapsed();
    Ok(stats)
}

fn sync_tree(
    source: &Path,
    dest: &Path,
    opts: &SyncOptions,
    stats: &mut SyncStats,
    progress: Option<&ProgressTracker>,
) {
    // directory timestamps are restored after their contents, deepest first
    let mut dir_times: Vec<(PathBuf, FileTime, FileTime)> = Vec::new();

    for item in TreeWalker::new(source, dest) {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                warn!("{}", e);
                stats.errors += 1;
                continue;
            }
        };

        let outcome = match entry.kind {
            EntryKind::Directory => sync_directory(&entry, opts, stats, &mut dir_times),
            EntryKind::Symlink => sync_symlink(&entry, opts, stats),
            EntryKind::Regular => sync_regular(&entry, opts, stats, progress),
            EntryKind::Other => Err(EngineError::UnsupportedEntry {
                path: entry.source.clone(),
            }),
        };

        match outcome {
            Ok(()) => {}
            Err(EngineError::Locked { path }) => {
                warn!("locked, skipping: {}", path.display());
                stats.files_skipped += 1;
            }
            Err(e @ EngineError::UnsupportedEntry { .. }) => {
                warn!("{}", e);
                stats.entries_unsupported += 1;
                stats.errors += 1;
            }
            Err(e) => {
                warn!("{}", e);
                stats.errors += 1;
            }
        }
    }

    if !opts.dry_run {
        for (path, atime, mtime) in dir_times.iter().rev() {
            if let Err(e) = filetime::set_file_times(path, *atime, *mtime) {
                warn!("cannot set times on {}: {}", path.display(), e);
            }
        }
    }
}

fn sync_directory(
    entry: &TreeEntry,
    opts: &SyncOptions,
    stats: &mut SyncStats,
    dir_times: &mut Vec<(PathBuf, FileTime, FileTime)>,
) -> Result<()> {
    match fs::symlink_metadata(&entry.dest) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::DestinationUnwritable {
                path: entry.dest.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "exists and is not a directory",
                ),
            });
        }
        Err(_) => {
            if opts.dry_run {
                info!("would create directory {}", entry.dest.display());
                return Ok(());
            }
            fs::create_dir_all(&entry.dest).map_err(|e| EngineError::DestinationUnwritable {
                path: entry.dest.clone(),
                source: e,
            })?;
            fs::set_permissions(&entry.dest, fs::Permissions::from_mode(entry.mode)).map_err(
                |e| EngineError::DestinationUnwritable {
                    path: entry.dest.clone(),
                    source: e,
                },
            )?;
            stats.directories_created += 1;
            debug!("created directory {}", entry.dest.display());
        }
    }
    if !opts.dry_run {
        dir_times.push((entry.dest.clone(), entry.atime, entry.mtime));
    }
    Ok(())
}

fn sync_symlink(entry: &TreeEntry, opts: &SyncOptions, stats: &mut SyncStats) -> Result<()> {
    let target = fs::read_link(&entry.source).map_err(|e| EngineError::SourceUnreadable {
        path: entry.source.clone(),
        source: e,
    })?;

    match fs::symlink_metadata(&entry.dest) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let unchanged = fs::read_link(&entry.dest)
                .map(|existing| existing == target)
                .unwrap_or(false);
            if unchanged {
                debug!("skip symlink: {}", entry.dest.display());
                stats.files_skipped += 1;
                return Ok(());
            }
            remove_destination(&entry.dest, opts)?;
        }
        Ok(meta) if meta.is_dir() => {
            return Err(EngineError::DestinationUnwritable {
                path: entry.dest.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "directory in the way of a symlink",
                ),
            });
        }
        Ok(_) => remove_destination(&entry.dest, opts)?,
        Err(_) => {}
    }

    if opts.dry_run {
        info!(
            "would link {} -> {}",
            entry.dest.display(),
            target.display()
        );
        return Ok(());
    }
    symlink(&target, &entry.dest).map_err(|e| EngineError::DestinationUnwritable {
        path: entry.dest.clone(),
        source: e,
    })?;
    stats.symlinks_created += 1;
    info!("link: {} -> {}", entry.dest.display(), target.display());
    Ok(())
}

fn remove_destination(path: &Path, opts: &SyncOptions) -> Result<()> {
    if opts.dry_run {
        return Ok(());
    }
    fs::remove_file(path).map_err(|e| EngineError::DestinationUnwritable {
        path: path.to_path_buf(),
        source: e,
    })
}

fn sync_regular(
    entry: &TreeEntry,
    opts: &SyncOptions,
    stats: &mut SyncStats,
    progress: Option<&ProgressTracker>,
) -> Result<()> {
    if opts.sync {
        let dest_meta = fs::symlink_metadata(&entry.dest).ok();
        if should_skip(entry, dest_meta.as_ref()) {
            debug!("skip: {}", entry.source.display());
            stats.files_skipped += 1;
            return Ok(());
        }
    }
    if opts.dry_run {
        info!(
            "would copy {} -> {}",
            entry.source.display(),
            entry.dest.display()
        );
        return Ok(());
    }

    let moved = copy_file(entry, opts.method)?;
    stats.files_copied += 1;
    stats.bytes_copied += moved;
    if let Some(progress) = progress {
        progress.update(moved);
    }
    info!("copy: {} -> {}", entry.source.display(), entry.dest.display());
    Ok(())
}
