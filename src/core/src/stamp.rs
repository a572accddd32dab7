//! Build stamping.
//!
//! Build tools write "stamp info" files with one `KEY VALUE` pair per line
//! (`BUILD_USER alice`, `BUILD_TIMESTAMP 1553200000`). A [`Stamper`] loads
//! those files and replaces `{KEY}` placeholders in user supplied strings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{KilnError, Result};

/// Immutable `{KEY}` substitution table.
#[derive(Debug, Clone, Default)]
pub struct Stamper {
    values: HashMap<String, String>,
}

impl Stamper {
    /// Load every stamp info file in order. Keys in later files (or later
    /// lines) replace earlier ones with a warning.
    ///
    /// # Errors
    ///
    /// Returns `StampLoad` if any file cannot be read.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut stamper = Self::default();
        for path in paths {
            let path = path.as_ref();
            let contents = std::fs::read_to_string(path).map_err(|e| KilnError::StampLoad {
                path: PathBuf::from(path),
                message: e.to_string(),
            })?;
            stamper.load(path, &contents);
        }
        tracing::debug!(keys = stamper.values.len(), "Loaded stamp info");
        Ok(stamper)
    }

    /// Build a stamper from explicit pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn load(&mut self, path: &Path, contents: &str) {
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k, v),
                None => (line, ""),
            };
            if let Some(previous) = self.values.insert(key.to_string(), value.to_string()) {
                tracing::warn!(
                    key,
                    previous = %previous,
                    value,
                    file = %path.display(),
                    "Duplicate stamp key, later value wins"
                );
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every `{KEY}` whose key is known.
    ///
    /// Substitution is a single left-to-right pass: inserted values are not
    /// scanned again and unknown placeholders stay as written.
    pub fn stamp(&self, input: &str) -> String {
        if self.values.is_empty() || !input.contains('{') {
            return input.to_string();
        }
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let replaced = after.find('}').and_then(|close| {
                let key = &after[..close];
                self.get(key).map(|value| (value, close))
            });
            match replaced {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Stamp each element of a list.
    pub fn stamp_all(&self, inputs: &[String]) -> Vec<String> {
        inputs.iter().map(|s| self.stamp(s)).collect()
    }
}
