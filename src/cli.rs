//! Command-line interface definitions

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Transfer primitive used for file content
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CopyMethod {
    /// Automatically choose the best method available
    Auto,
    /// In-kernel file-to-file transfer
    Sendfile,
    /// Zero-copy transfer through an intermediate pipe
    Splice,
    /// Traditional buffered read/write
    ReadWrite,
}

/// Where digest computation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DigestBackend {
    /// Kernel crypto API when available, software otherwise
    Auto,
    /// Kernel crypto API only
    Kernel,
    /// User-space hashers only
    Software,
}

/// Zero-copy file and directory tree synchronization
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct SyncArgs {
    /// One or more source paths followed by the destination
    #[arg(value_name = "PATH", required = true, num_args = 2..)]
    pub paths: Vec<PathBuf>,

    /// Skip files whose destination already matches (sync semantics)
    #[arg(short = 'S', long)]
    pub sync: bool,

    /// Show what would be copied without writing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Transfer primitive to use
    #[arg(long, value_enum, default_value = "auto")]
    pub copy_method: CopyMethod,

    /// Show progress information
    #[arg(long)]
    pub progress: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl SyncArgs {
    /// All paths but the last
    pub fn sources(&self) -> &[PathBuf] {
        &self.paths[..self.paths.len() - 1]
    }

    /// The last path given
    pub fn destination(&self) -> &Path {
        self.paths.last().expect("clap enforces at least two paths")
    }

    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - Fewer than two paths were given
    /// - A source path does not exist
    /// - Multiple sources are given and the destination is not a directory
    /// - Both --quiet and --verbose options are used
    pub fn validate(&self) -> Result<()> {
        if self.paths.len() < 2 {
            anyhow::bail!("at least one source and a destination are required");
        }
        for source in self.sources() {
            if std::fs::symlink_metadata(source).is_err() {
                anyhow::bail!("source path does not exist: {}", source.display());
            }
        }
        if self.sources().len() > 1 && !self.destination().is_dir() {
            anyhow::bail!(
                "destination must be an existing directory for multiple sources: {}",
                self.destination().display()
            );
        }
        if self.quiet && self.verbose > 0 {
            anyhow::bail!("cannot use both --quiet and --verbose options");
        }
        Ok(())
    }

    /// Engine options derived from the flags
    pub fn options(&self) -> crate::sync::SyncOptions {
        crate::sync::SyncOptions {
            sync: self.sync,
            dry_run: self.dry_run,
            method: self.copy_method,
            progress: self.progress,
        }
    }
}

/// File digests through the kernel crypto API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct HashArgs {
    /// Digest algorithm
    #[arg(short, long, default_value = "sha256")]
    pub algorithm: String,

    /// Digest backend to use
    #[arg(long, value_enum, default_value = "auto")]
    pub backend: DigestBackend,

    /// Input files, hashed in the given order
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl HashArgs {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// This function will return an error if the algorithm is unknown or
    /// both --quiet and --verbose options are used.
    pub fn validate(&self) -> Result<()> {
        if crate::digest::digest_len(&self.algorithm).is_none() {
            anyhow::bail!(
                "unsupported algorithm: {} (expected one of: {})",
                self.algorithm,
                crate::digest::algorithm_names().join(", ")
            );
        }
        if self.quiet && self.verbose > 0 {
            anyhow::bail!("cannot use both --quiet and --verbose options");
        }
        Ok(())
    }
}

/// Initialize logging based on verbosity and quiet mode
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
