//! zcp: zero-copy file and directory tree synchronization
//!
//! Replicates files and trees with sendfile/splice so content never passes
//! through user-space buffers, skipping unchanged files in sync mode.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use zerocp::cli::{self, SyncArgs};

fn main() -> Result<()> {
    let args = SyncArgs::parse();

    cli::init_logging(args.verbose, args.quiet)?;
    args.validate().context("invalid arguments")?;

    let stats = zerocp::sync(args.sources(), args.destination(), &args.options())?;

    info!(
        "copied {} files ({} bytes), skipped {}, created {} directories and {} symlinks in {:?}",
        stats.files_copied,
        stats.bytes_copied,
        stats.files_skipped,
        stats.directories_created,
        stats.symlinks_created,
        stats.duration
    );
    if stats.errors > 0 {
        tracing::error!("{} entries failed", stats.errors);
        std::process::exit(1);
    }
    Ok(())
}
