//! `kiln write-layout` command.

use std::path::PathBuf;

use clap::Args;
use kiln_image::{validate_image, write_image, ValidateOptions};

use super::AssembleArgs;

#[derive(Args, Debug)]
pub struct WriteLayoutArgs {
    #[command(flatten)]
    pub image: AssembleArgs,

    /// Directory to write the layout into
    #[arg(long)]
    pub dst: PathBuf,

    /// Re-read the written layout and re-hash every blob
    #[arg(long)]
    pub verify: bool,
}

pub fn execute(args: WriteLayoutArgs) -> Result<(), Box<dyn std::error::Error>> {
    let image = args.image.assemble()?;
    let layout = write_image(image.as_ref(), &args.dst)?;

    if args.verify {
        let written = layout.image()?;
        validate_image(&written, ValidateOptions { verify_blobs: true })?;
        tracing::info!(dir = %args.dst.display(), "Verified layout");
    }
    Ok(())
}
