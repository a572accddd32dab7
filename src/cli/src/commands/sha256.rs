//! `kiln sha256` command.

use std::fs::File;
use std::path::PathBuf;

use clap::Args;
use kiln_core::Hash;
use kiln_image::fs::write_atomic;

#[derive(Args, Debug)]
pub struct Sha256Args {
    /// File to hash
    #[arg(long)]
    pub input: PathBuf,

    /// File to write the hex digest to
    #[arg(long)]
    pub output: PathBuf,
}

pub fn execute(args: Sha256Args) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(&args.input)
        .map_err(|e| format!("Failed to open {}: {}", args.input.display(), e))?;
    let (hash, size) = Hash::from_reader(file)?;
    write_atomic(&args.output, hash.hex().as_bytes())?;
    tracing::debug!(input = %args.input.display(), size, digest = %hash, "Hashed file");
    Ok(())
}
