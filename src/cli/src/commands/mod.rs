//! CLI command definitions and dispatch.

mod create_config;
mod digest;
mod generate_manifest;
mod index;
mod sha256;
mod write_layout;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use kiln_image::{as_oci_image, read_image, ImageFormat, ImageParts, ImageView, LayerParts};

/// Kiln - build container image metadata without a daemon.
#[derive(Parser)]
#[command(name = "kiln", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Apply build overrides to a base image config
    CreateConfig(create_config::CreateConfigArgs),
    /// Assemble an image from parts and write its manifest digest
    Digest(digest::DigestArgs),
    /// Assemble an image from parts and write the intermediate layout
    WriteLayout(write_layout::WriteLayoutArgs),
    /// Synthesize manifest.json for a layout directory
    GenerateManifest(generate_manifest::GenerateManifestArgs),
    /// Combine per-platform layouts into an image index
    Index(index::IndexArgs),
    /// Write the hex SHA-256 of a file
    Sha256(sha256::Sha256Args),
}

/// A config plus ordered layer parts, as taken by the assembling commands.
#[derive(Args, Debug)]
pub(crate) struct AssembleArgs {
    /// Image config JSON
    #[arg(long)]
    pub config: PathBuf,

    /// Layer as COMPRESSED,DIFF_ID_FILE[,DIGEST_FILE], can be repeated
    #[arg(long = "layer", value_name = "PARTS")]
    pub layers: Vec<LayerParts>,

    /// Base image manifest whose foreign layers are carried into the result
    #[arg(long)]
    pub base_manifest: Option<PathBuf>,

    /// Manifest family of the result (docker or oci)
    #[arg(long, default_value_t = ImageFormat::Docker)]
    pub format: ImageFormat,
}

impl AssembleArgs {
    /// Assemble the image and re-wrap it in the requested format.
    pub(crate) fn assemble(&self) -> Result<Arc<dyn ImageView>, Box<dyn std::error::Error>> {
        let image: Arc<dyn ImageView> = Arc::new(read_image(&ImageParts {
            config: self.config.clone(),
            base_manifest: self.base_manifest.clone(),
            layers: self.layers.clone(),
        })?);
        Ok(match self.format {
            ImageFormat::Docker => image,
            ImageFormat::Oci => Arc::new(as_oci_image(image)?),
        })
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::CreateConfig(args) => create_config::execute(args),
        Command::Digest(args) => digest::execute(args),
        Command::WriteLayout(args) => write_layout::execute(args),
        Command::GenerateManifest(args) => generate_manifest::execute(args),
        Command::Index(args) => index::execute(args),
        Command::Sha256(args) => sha256::execute(args),
    }
}
