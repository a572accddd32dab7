use std::path::PathBuf;

use thiserror::Error;

/// Kiln error types
#[derive(Error, Debug)]
pub enum KilnError {
    /// A digest string did not have the `sha256:<64 lowercase hex>` shape
    #[error("Malformed digest: {0}")]
    MalformedDigest(String),

    /// A stamp info file could not be opened or read
    #[error("Failed to load stamp info file {path}: {message}")]
    StampLoad { path: PathBuf, message: String },

    /// An intermediate layout directory is missing required files
    #[error("Invalid image layout at {path}: {message}")]
    LayoutInvalid { path: PathBuf, message: String },

    /// The intermediate layout can only name 1000 layers (000..999)
    #[error("Too many layers: {count} (at most {max} are supported)")]
    TooManyLayers { count: usize, max: usize },

    /// A `KEY=VALUE` entry without `=`
    #[error("Malformed key/value entry: {0:?}")]
    MalformedKeyValue(String),

    /// Override options are inconsistent
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A media type the adapter does not know how to map
    #[error("Unknown media type: {0}")]
    UnknownMediaType(String),

    /// Indices inside indices are not supported
    #[error("Nested image index unsupported: {0}")]
    NestedIndexUnsupported(String),

    /// Platforms and images passed to the index builder disagree
    #[error("Invalid index inputs: {0}")]
    InvalidIndexInputs(String),

    /// A step of the config override engine failed
    #[error("Config override failed at step '{step}': {source}")]
    OverrideFailed {
        step: String,
        #[source]
        source: Box<KilnError>,
    },

    /// A blob could not be read
    #[error("Failed to read {path}: {message}")]
    BlobRead { path: PathBuf, message: String },

    /// A blob could not be written
    #[error("Failed to write {path}: {message}")]
    BlobWrite { path: PathBuf, message: String },

    /// A manifest could not be synthesized from layout contents
    #[error("Manifest synthesis error: {0}")]
    ManifestSynthesis(String),

    /// A blob or image lookup found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// An image failed a consistency check
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for KilnError {
    fn from(err: serde_json::Error) -> Self {
        KilnError::Serialization(err.to_string())
    }
}

impl KilnError {
    pub fn blob_read(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        KilnError::BlobRead {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn blob_write(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        KilnError::BlobWrite {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn layout_invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        KilnError::LayoutInvalid {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for kiln operations
pub type Result<T> = std::result::Result<T, KilnError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_malformed_digest_display() {
        let error = KilnError::MalformedDigest("sha256:xyz".to_string());
        assert_eq!(error.to_string(), "Malformed digest: sha256:xyz");
    }

    #[test]
    fn test_stamp_load_display() {
        let error = KilnError::StampLoad {
            path: PathBuf::from("/tmp/stable-status.txt"),
            message: "No such file or directory".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to load stamp info file /tmp/stable-status.txt: No such file or directory"
        );
    }

    #[test]
    fn test_too_many_layers_display() {
        let error = KilnError::TooManyLayers {
            count: 1001,
            max: 1000,
        };
        assert_eq!(
            error.to_string(),
            "Too many layers: 1001 (at most 1000 are supported)"
        );
    }

    #[test]
    fn test_malformed_key_value_display() {
        let error = KilnError::MalformedKeyValue("FOO".to_string());
        assert_eq!(error.to_string(), "Malformed key/value entry: \"FOO\"");
    }

    #[test]
    fn test_override_failed_keeps_source() {
        let error = KilnError::OverrideFailed {
            step: "env".to_string(),
            source: Box::new(KilnError::MalformedKeyValue("PATH".to_string())),
        };
        assert_eq!(
            error.to_string(),
            "Config override failed at step 'env': Malformed key/value entry: \"PATH\""
        );
        let source = error.source().unwrap();
        assert_eq!(source.to_string(), "Malformed key/value entry: \"PATH\"");
    }

    #[test]
    fn test_layout_invalid_helper() {
        let error = KilnError::layout_invalid("/out", "missing digest");
        assert_eq!(
            error.to_string(),
            "Invalid image layout at /out: missing digest"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: KilnError = io_error.into();
        assert!(matches!(error, KilnError::Io(_)));
        assert!(error.to_string().contains("File not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{ invalid").unwrap_err();
        let error: KilnError = json_error.into();
        assert!(matches!(error, KilnError::Serialization(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_err() -> Result<i32> {
            Err(KilnError::NotFound("blob".to_string()))
        }
        assert!(returns_err().is_err());
    }
}
