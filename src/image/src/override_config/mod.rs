//! Image config override engine.
//!
//! Takes a base image config and a set of build-time overrides and produces
//! the config of the new image. The steps run in a fixed order; each one
//! only touches its own part of the config, and a failure is reported
//! together with the step that raised it.

mod env;
mod time;

pub use env::{expand, merge_env, parse_key_values};
pub use time::parse_creation_time;

use std::fmt;
use std::path::{Path, PathBuf};

use kiln_core::error::{KilnError, Result};
use kiln_core::image_config::Empty;
use kiln_core::{ConfigFile, Hash, History, Stamper};
use regex::Regex;

use crate::fs::{read_trimmed, write_atomic};

pub const DEFAULT_CREATED_BY: &str = "bazel build ...";
pub const DEFAULT_AUTHOR: &str = "Bazel";
pub const DEFAULT_OS: &str = "linux";
pub const DEFAULT_ARCHITECTURE: &str = "amd64";

/// Ports given with an explicit protocol are used verbatim.
const PORT_WITH_PROTOCOL: &str = r"^[0-9]+/(tcp|udp)$";

/// Build-time overrides applied on top of a base config.
///
/// Empty strings and empty lists mean "leave the base value alone".
#[derive(Debug, Clone)]
pub struct OverrideOptions {
    /// Config to start from; an empty config when absent
    pub base_config: Option<ConfigFile>,
    /// Where the resulting config is written
    pub output_config: PathBuf,
    /// Seconds or milliseconds since the epoch, or RFC 3339; may be stamped
    pub creation_time: Option<String>,
    pub user: String,
    pub workdir: String,
    /// Clear the entrypoint (wins over `entrypoint`)
    pub null_entrypoint: bool,
    pub entrypoint: Vec<String>,
    /// Prepended to the final entrypoint
    pub entrypoint_prefix: Vec<String>,
    /// Clear the command (wins over `command`)
    pub null_cmd: bool,
    pub command: Vec<String>,
    /// `KEY=VALUE`; values may reference the base environment
    pub env: Vec<String>,
    /// `KEY=VALUE` or `KEY=@file`
    pub labels: Vec<String>,
    /// `80` or `80/tcp`
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    /// Diff-ids of the layers added on top of the base, as hex or `@file`
    pub layers: Vec<String>,
    pub operating_system: String,
    pub architecture: String,
    pub created_by: String,
    pub author: String,
    /// Stamp info files, later files win
    pub stamp_info_files: Vec<PathBuf>,
    /// Fail on unresolved `$VAR` references in env values
    pub strict_env: bool,
}

impl OverrideOptions {
    pub fn new(output_config: impl Into<PathBuf>) -> Self {
        Self {
            base_config: None,
            output_config: output_config.into(),
            creation_time: None,
            user: String::new(),
            workdir: String::new(),
            null_entrypoint: false,
            entrypoint: Vec::new(),
            entrypoint_prefix: Vec::new(),
            null_cmd: false,
            command: Vec::new(),
            env: Vec::new(),
            labels: Vec::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            layers: Vec::new(),
            operating_system: DEFAULT_OS.to_string(),
            architecture: DEFAULT_ARCHITECTURE.to_string(),
            created_by: DEFAULT_CREATED_BY.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            stamp_info_files: Vec::new(),
            strict_env: false,
        }
    }
}

/// The override steps that can fail, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideStep {
    Stamp,
    Env,
    Labels,
    ExposedPorts,
    Layers,
    Write,
}

impl fmt::Display for OverrideStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stamp => "stamp",
            Self::Env => "env",
            Self::Labels => "labels",
            Self::ExposedPorts => "exposed-ports",
            Self::Layers => "layers",
            Self::Write => "write",
        };
        f.write_str(name)
    }
}

fn at<T>(step: OverrideStep, result: Result<T>) -> Result<T> {
    result.map_err(|e| KilnError::OverrideFailed {
        step: step.to_string(),
        source: Box::new(e),
    })
}

/// Apply `opts` to the base config and write the result to
/// `opts.output_config`.
///
/// # Errors
///
/// `OverrideFailed` naming the step that failed.
pub fn override_image_config(opts: &OverrideOptions) -> Result<ConfigFile> {
    let stamper = at(
        OverrideStep::Stamp,
        Stamper::from_files(&opts.stamp_info_files),
    )?;
    let base = opts.base_config.clone().unwrap_or_default();
    let config = update_config(base, opts, &stamper)?;

    let bytes = at(OverrideStep::Write, config.to_vec())?;
    at(OverrideStep::Write, write_atomic(&opts.output_config, &bytes))?;

    tracing::info!(
        output = %opts.output_config.display(),
        digest = %Hash::sha256(&bytes),
        "Wrote image config"
    );
    Ok(config)
}

/// Apply `opts` to `config` in memory. Deterministic for equal inputs.
pub fn update_config(
    mut config: ConfigFile,
    opts: &OverrideOptions,
    stamper: &Stamper,
) -> Result<ConfigFile> {
    // Defaults
    config.author = non_empty_or(&opts.author, DEFAULT_AUTHOR);
    config.os = non_empty_or(&opts.operating_system, DEFAULT_OS);
    config.architecture = non_empty_or(&opts.architecture, DEFAULT_ARCHITECTURE);

    let creation_time = stamper.stamp(opts.creation_time.as_deref().unwrap_or_default());
    config.created = Some(parse_creation_time(&creation_time));

    if opts.null_entrypoint {
        config.config.entrypoint = Vec::new();
    } else if !opts.entrypoint.is_empty() {
        config.config.entrypoint = stamper.stamp_all(&opts.entrypoint);
    }

    if opts.null_cmd {
        config.config.cmd = Vec::new();
    } else if !opts.command.is_empty() {
        config.config.cmd = stamper.stamp_all(&opts.command);
    }

    if !opts.user.is_empty() {
        config.config.user = stamper.stamp(&opts.user);
    }
    if !opts.workdir.is_empty() {
        config.config.working_dir = stamper.stamp(&opts.workdir);
    }

    if !opts.env.is_empty() {
        config.config.env = at(
            OverrideStep::Env,
            merge_env(&config.config.env, &opts.env, stamper, opts.strict_env),
        )?;
    }

    if !opts.labels.is_empty() {
        let labels = at(OverrideStep::Labels, resolve_labels(&opts.labels, stamper))?;
        config.config.labels.extend(labels);
    }

    if !opts.ports.is_empty() {
        let ports = at(OverrideStep::ExposedPorts, normalize_ports(&opts.ports))?;
        for port in ports {
            config.config.exposed_ports.insert(port, Empty {});
        }
    }

    for volume in &opts.volumes {
        config.config.volumes.insert(volume.clone(), Empty {});
    }

    at(OverrideStep::Layers, add_layers(&mut config, opts))?;

    let prefix = stamper.stamp_all(&opts.entrypoint_prefix);
    if !prefix.is_empty() {
        let mut entrypoint = prefix;
        entrypoint.append(&mut config.config.entrypoint);
        config.config.entrypoint = entrypoint;
    }

    Ok(config)
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Parse label overrides. `@path` values are read from the file; values
/// with `{` are stamped.
fn resolve_labels(entries: &[String], stamper: &Stamper) -> Result<Vec<(String, String)>> {
    let mut labels = Vec::with_capacity(entries.len());
    for entry in entries {
        let (key, value) = env::split_key_value(entry)?;
        let value = if let Some(path) = value.strip_prefix('@') {
            std::fs::read_to_string(path).map_err(|e| KilnError::blob_read(path, e))?
        } else if value.contains('{') {
            stamper.stamp(value)
        } else {
            value.to_string()
        };
        labels.push((key.to_string(), value));
    }
    Ok(labels)
}

/// `80` becomes `80/tcp`; `53/udp` is kept.
fn normalize_ports(ports: &[String]) -> Result<Vec<String>> {
    let with_protocol =
        Regex::new(PORT_WITH_PROTOCOL).map_err(|e| KilnError::InvalidOptions(e.to_string()))?;
    Ok(ports
        .iter()
        .map(|port| {
            if with_protocol.is_match(port) {
                port.clone()
            } else {
                format!("{}/tcp", port)
            }
        })
        .collect())
}

/// Record the new layers: diff-ids for real layers, history entries for all.
///
/// The new history block goes in front of the base history, in the order
/// the layers were given. An empty entry, or one naming the empty digest,
/// is recorded as an `empty_layer` history entry without a diff-id. The
/// rootfs type is only touched when at least one layer is added.
fn add_layers(config: &mut ConfigFile, opts: &OverrideOptions) -> Result<()> {
    if opts.layers.is_empty() {
        return Ok(());
    }
    if opts.created_by.is_empty() {
        return Err(KilnError::InvalidOptions(
            "created_by must be set when adding layers".to_string(),
        ));
    }
    if opts.author.is_empty() {
        return Err(KilnError::InvalidOptions(
            "author must be set when adding layers".to_string(),
        ));
    }

    config.rootfs.fs_type = "layers".to_string();
    let mut history = Vec::with_capacity(opts.layers.len() + config.history.len());
    for entry in &opts.layers {
        let empty_layer = match layer_digest(entry)? {
            Some(digest) if !digest.is_empty_digest() => {
                config.rootfs.diff_ids.push(digest);
                false
            }
            _ => true,
        };
        history.push(History {
            author: opts.author.clone(),
            created: config.created,
            created_by: opts.created_by.clone(),
            comment: String::new(),
            empty_layer,
        });
    }
    history.append(&mut config.history);
    config.history = history;
    Ok(())
}

/// A layer diff-id given as hex, `sha256:<hex>` or `@file`. `None` when
/// the entry (or the file it names) is empty.
fn layer_digest(entry: &str) -> Result<Option<Hash>> {
    let value = match entry.strip_prefix('@') {
        Some(path) => read_trimmed(Path::new(path))?,
        None => entry.trim().to_string(),
    };
    if value.is_empty() {
        Ok(None)
    } else if value.contains(':') {
        value.parse().map(Some)
    } else {
        Hash::from_hex(&value).map(Some)
    }
}
