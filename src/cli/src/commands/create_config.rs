//! `kiln create-config` command: apply build overrides to a base config.

use std::path::PathBuf;

use clap::Args;
use kiln_core::ConfigFile;
use kiln_image::fs::{read_blob, write_atomic};
use kiln_image::override_config::{
    DEFAULT_ARCHITECTURE, DEFAULT_AUTHOR, DEFAULT_CREATED_BY, DEFAULT_OS,
};
use kiln_image::{override_image_config, OverrideOptions};

#[derive(Args, Debug)]
pub struct CreateConfigArgs {
    /// Base image config JSON (an empty config when omitted)
    #[arg(long)]
    pub base: Option<PathBuf>,

    /// Where to write the resulting config
    #[arg(long)]
    pub output: PathBuf,

    /// Base image manifest, copied to --output-manifest
    #[arg(long)]
    pub base_manifest: Option<PathBuf>,

    /// Where to copy the base manifest (`{}` when there is none)
    #[arg(long)]
    pub output_manifest: Option<PathBuf>,

    /// Creation time: epoch seconds or milliseconds, or RFC 3339
    #[arg(long)]
    pub creation_time: Option<String>,

    #[arg(long, default_value = "")]
    pub user: String,

    #[arg(long, default_value = "")]
    pub workdir: String,

    /// Clear the base entrypoint
    #[arg(long)]
    pub null_entrypoint: bool,

    /// Entrypoint argument, can be repeated
    #[arg(long, allow_hyphen_values = true)]
    pub entrypoint: Vec<String>,

    /// Prepended to the final entrypoint, can be repeated
    #[arg(long, allow_hyphen_values = true)]
    pub entrypoint_prefix: Vec<String>,

    /// Clear the base command
    #[arg(long)]
    pub null_cmd: bool,

    /// Command argument, can be repeated
    #[arg(long, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// KEY=VALUE, values may reference the base environment
    #[arg(long)]
    pub env: Vec<String>,

    /// KEY=VALUE or KEY=@file
    #[arg(long)]
    pub label: Vec<String>,

    /// Exposed port, e.g. 80 or 53/udp
    #[arg(long)]
    pub port: Vec<String>,

    #[arg(long)]
    pub volume: Vec<String>,

    /// Diff-id of an added layer (hex, sha256:hex or @file)
    #[arg(long)]
    pub layer: Vec<String>,

    #[arg(long, default_value = DEFAULT_OS)]
    pub operating_system: String,

    #[arg(long, default_value = DEFAULT_ARCHITECTURE)]
    pub architecture: String,

    /// History `created_by` for added layers
    #[arg(long, default_value = DEFAULT_CREATED_BY)]
    pub created_by: String,

    #[arg(long, default_value = DEFAULT_AUTHOR)]
    pub author: String,

    /// Stamp info file with KEY VALUE lines, can be repeated
    #[arg(long)]
    pub stamp_info_file: Vec<PathBuf>,

    /// Fail on undefined variables in --env values
    #[arg(long)]
    pub strict_env: bool,
}

impl CreateConfigArgs {
    fn options(&self) -> Result<OverrideOptions, Box<dyn std::error::Error>> {
        let base_config = match &self.base {
            Some(path) => Some(ConfigFile::from_path(path)?),
            None => None,
        };

        Ok(OverrideOptions {
            base_config,
            output_config: self.output.clone(),
            creation_time: self.creation_time.clone(),
            user: self.user.clone(),
            workdir: self.workdir.clone(),
            null_entrypoint: self.null_entrypoint,
            entrypoint: self.entrypoint.clone(),
            entrypoint_prefix: self.entrypoint_prefix.clone(),
            null_cmd: self.null_cmd,
            command: self.command.clone(),
            env: self.env.clone(),
            labels: self.label.clone(),
            ports: self.port.clone(),
            volumes: self.volume.clone(),
            layers: self.layer.clone(),
            operating_system: self.operating_system.clone(),
            architecture: self.architecture.clone(),
            created_by: self.created_by.clone(),
            author: self.author.clone(),
            stamp_info_files: self.stamp_info_file.clone(),
            strict_env: self.strict_env,
        })
    }
}

pub fn execute(args: CreateConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let opts = args.options()?;
    override_image_config(&opts)?;

    if let Some(dst) = &args.output_manifest {
        let manifest = match &args.base_manifest {
            Some(path) => read_blob(path)?,
            None => b"{}".to_vec(),
        };
        write_atomic(dst, &manifest)?;
    }
    Ok(())
}
