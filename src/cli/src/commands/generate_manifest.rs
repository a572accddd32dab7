//! `kiln generate-manifest` command.

use std::path::PathBuf;

use clap::Args;
use kiln_image::generate_manifest;

#[derive(Args, Debug)]
pub struct GenerateManifestArgs {
    /// Layout directory holding config.json and NNN.tar.gz files
    #[arg(long)]
    pub dir: PathBuf,
}

pub fn execute(args: GenerateManifestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = generate_manifest(&args.dir)?;
    tracing::info!(
        dir = %args.dir.display(),
        layers = manifest.layers.len(),
        "Manifest ready"
    );
    Ok(())
}
