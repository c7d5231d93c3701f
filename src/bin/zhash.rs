//! zhash: file digests through the kernel crypto API
//!
//! Prints one `<hex digest>  <path>` line per input file, in input order.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use zerocp::cli::{self, HashArgs};
use zerocp::digest::digest_file;

fn main() -> Result<()> {
    let args = HashArgs::parse();

    cli::init_logging(args.verbose, args.quiet)?;
    args.validate().context("invalid arguments")?;

    let mut failed = false;
    for path in &args.files {
        match digest_file(path, &args.algorithm, args.backend) {
            Ok(digest) => println!("{}  {}", hex::encode(digest), path.display()),
            Err(e) if e.is_fatal() => {
                return Err(e).context("digest failed");
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failed = true;
            }
        }
    }
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
