//! `kiln index` command: combine per-platform layouts into an image index.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::Args;
use kiln_core::Platform;
use kiln_image::fs::write_atomic;
use kiln_image::{
    as_oci_index, digest_report, ImageFormat, ImageIndex, ImageIndexView, ImageView,
    IntermediateLayout,
};

/// `os/arch[/variant]=DIR`
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformImage {
    pub platform: Platform,
    pub dir: PathBuf,
}

impl FromStr for PlatformImage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (platform, dir) = s
            .split_once('=')
            .filter(|(p, d)| !p.is_empty() && !d.is_empty())
            .ok_or_else(|| format!("expected PLATFORM=DIR, got '{}'", s))?;
        let platform = platform.parse::<Platform>().map_err(|e| e.to_string())?;
        Ok(Self {
            platform,
            dir: PathBuf::from(dir),
        })
    }
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Child image as PLATFORM=LAYOUT_DIR, can be repeated
    #[arg(long = "image", value_name = "PLATFORM=DIR", required = true)]
    pub images: Vec<PlatformImage>,

    /// Manifest family of the index (docker or oci)
    #[arg(long, default_value_t = ImageFormat::Docker)]
    pub format: ImageFormat,

    /// File to write the digest report to
    #[arg(long)]
    pub dst: PathBuf,

    /// File to write the raw index manifest to
    #[arg(long)]
    pub manifest: Option<PathBuf>,
}

fn build_index(args: &IndexArgs) -> Result<Box<dyn ImageIndexView>, Box<dyn std::error::Error>> {
    let mut platforms = Vec::with_capacity(args.images.len());
    let mut images: Vec<Arc<dyn ImageView>> = Vec::with_capacity(args.images.len());
    for entry in &args.images {
        let image = IntermediateLayout::open(&entry.dir)?.image()?;
        platforms.push(entry.platform.clone());
        images.push(Arc::new(image));
    }

    let index = ImageIndex::new(platforms, images)?;
    Ok(match args.format {
        ImageFormat::Docker => Box::new(index),
        ImageFormat::Oci => Box::new(as_oci_index(&index)?),
    })
}

pub fn execute(args: IndexArgs) -> Result<(), Box<dyn std::error::Error>> {
    let index = build_index(&args)?;
    write_atomic(&args.dst, digest_report(index.as_ref())?.as_bytes())?;
    if let Some(path) = &args.manifest {
        write_atomic(path, &index.raw_manifest()?)?;
    }
    tracing::info!(
        images = args.images.len(),
        format = %args.format,
        digest = %index.digest()?,
        "Wrote image index"
    );
    Ok(())
}
