//! `kiln digest` command.

use std::path::PathBuf;

use clap::Args;
use kiln_image::write_digest;

use super::AssembleArgs;

#[derive(Args, Debug)]
pub struct DigestArgs {
    #[command(flatten)]
    pub image: AssembleArgs,

    /// File to write `sha256:<hex>` to
    #[arg(long)]
    pub dst: PathBuf,
}

pub fn execute(args: DigestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let image = args.image.assemble()?;
    write_digest(image.as_ref(), &args.dst)?;
    Ok(())
}
