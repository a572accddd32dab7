//! Docker and OCI media types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{KilnError, Result};

/// A manifest, config or layer media type.
///
/// Strings kiln does not recognise are kept in [`MediaType::Other`] so that
/// reading and re-writing a manifest never loses information.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaType {
    DockerManifestSchema2,
    DockerManifestList,
    DockerConfigJson,
    DockerLayer,
    DockerUncompressedLayer,
    DockerForeignLayer,
    OciManifestSchema1,
    OciImageIndex,
    OciConfigJson,
    OciLayer,
    OciUncompressedLayer,
    OciNondistributableLayer,
    Other(String),
}

impl MediaType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DockerManifestSchema2 => "application/vnd.docker.distribution.manifest.v2+json",
            Self::DockerManifestList => {
                "application/vnd.docker.distribution.manifest.list.v2+json"
            }
            Self::DockerConfigJson => "application/vnd.docker.container.image.v1+json",
            Self::DockerLayer => "application/vnd.docker.image.rootfs.diff.tar.gzip",
            Self::DockerUncompressedLayer => "application/vnd.docker.image.rootfs.diff.tar",
            Self::DockerForeignLayer => "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip",
            Self::OciManifestSchema1 => "application/vnd.oci.image.manifest.v1+json",
            Self::OciImageIndex => "application/vnd.oci.image.index.v1+json",
            Self::OciConfigJson => "application/vnd.oci.image.config.v1+json",
            Self::OciLayer => "application/vnd.oci.image.layer.v1.tar+gzip",
            Self::OciUncompressedLayer => "application/vnd.oci.image.layer.v1.tar",
            Self::OciNondistributableLayer => {
                "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip"
            }
            Self::Other(s) => s,
        }
    }

    /// Map to the OCI equivalent. OCI types map to themselves.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMediaType` for [`MediaType::Other`].
    pub fn to_oci(&self) -> Result<MediaType> {
        Ok(match self {
            Self::DockerManifestSchema2 | Self::OciManifestSchema1 => Self::OciManifestSchema1,
            Self::DockerManifestList | Self::OciImageIndex => Self::OciImageIndex,
            Self::DockerConfigJson | Self::OciConfigJson => Self::OciConfigJson,
            Self::DockerLayer | Self::OciLayer => Self::OciLayer,
            Self::DockerUncompressedLayer | Self::OciUncompressedLayer => {
                Self::OciUncompressedLayer
            }
            Self::DockerForeignLayer | Self::OciNondistributableLayer => {
                Self::OciNondistributableLayer
            }
            Self::Other(s) => return Err(KilnError::UnknownMediaType(s.clone())),
        })
    }

    /// Map to the Docker equivalent. Docker types map to themselves.
    pub fn to_docker(&self) -> Result<MediaType> {
        Ok(match self {
            Self::DockerManifestSchema2 | Self::OciManifestSchema1 => Self::DockerManifestSchema2,
            Self::DockerManifestList | Self::OciImageIndex => Self::DockerManifestList,
            Self::DockerConfigJson | Self::OciConfigJson => Self::DockerConfigJson,
            Self::DockerLayer | Self::OciLayer => Self::DockerLayer,
            Self::DockerUncompressedLayer | Self::OciUncompressedLayer => {
                Self::DockerUncompressedLayer
            }
            Self::DockerForeignLayer | Self::OciNondistributableLayer => Self::DockerForeignLayer,
            Self::Other(s) => return Err(KilnError::UnknownMediaType(s.clone())),
        })
    }

    pub fn is_layer(&self) -> bool {
        matches!(
            self,
            Self::DockerLayer
                | Self::DockerUncompressedLayer
                | Self::DockerForeignLayer
                | Self::OciLayer
                | Self::OciUncompressedLayer
                | Self::OciNondistributableLayer
        )
    }

    /// Layers whose blobs live outside the image and are fetched from the
    /// descriptor's `urls`.
    pub fn is_foreign(&self) -> bool {
        matches!(self, Self::DockerForeignLayer | Self::OciNondistributableLayer)
    }

    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            Self::DockerLayer
                | Self::DockerForeignLayer
                | Self::OciLayer
                | Self::OciNondistributableLayer
        )
    }

    pub fn is_image_manifest(&self) -> bool {
        matches!(self, Self::DockerManifestSchema2 | Self::OciManifestSchema1)
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Self::DockerManifestList | Self::OciImageIndex)
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::DockerConfigJson | Self::OciConfigJson)
    }

    pub fn is_oci(&self) -> bool {
        matches!(
            self,
            Self::OciManifestSchema1
                | Self::OciImageIndex
                | Self::OciConfigJson
                | Self::OciLayer
                | Self::OciUncompressedLayer
                | Self::OciNondistributableLayer
        )
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        match s {
            "application/vnd.docker.distribution.manifest.v2+json" => Self::DockerManifestSchema2,
            "application/vnd.docker.distribution.manifest.list.v2+json" => {
                Self::DockerManifestList
            }
            "application/vnd.docker.container.image.v1+json" => Self::DockerConfigJson,
            "application/vnd.docker.image.rootfs.diff.tar.gzip" => Self::DockerLayer,
            "application/vnd.docker.image.rootfs.diff.tar" => Self::DockerUncompressedLayer,
            "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip" => {
                Self::DockerForeignLayer
            }
            "application/vnd.oci.image.manifest.v1+json" => Self::OciManifestSchema1,
            "application/vnd.oci.image.index.v1+json" => Self::OciImageIndex,
            "application/vnd.oci.image.config.v1+json" => Self::OciConfigJson,
            "application/vnd.oci.image.layer.v1.tar+gzip" => Self::OciLayer,
            "application/vnd.oci.image.layer.v1.tar" => Self::OciUncompressedLayer,
            "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip" => {
                Self::OciNondistributableLayer
            }
            other => Self::Other(other.to_string()),
        }
    }
}

impl FromStr for MediaType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MediaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [MediaType; 12] = [
        MediaType::DockerManifestSchema2,
        MediaType::DockerManifestList,
        MediaType::DockerConfigJson,
        MediaType::DockerLayer,
        MediaType::DockerUncompressedLayer,
        MediaType::DockerForeignLayer,
        MediaType::OciManifestSchema1,
        MediaType::OciImageIndex,
        MediaType::OciConfigJson,
        MediaType::OciLayer,
        MediaType::OciUncompressedLayer,
        MediaType::OciNondistributableLayer,
    ];

    #[test]
    fn test_string_mapping_is_bijective() {
        for mt in ALL.iter() {
            assert_eq!(&MediaType::from(mt.as_str()), mt);
        }
    }

    #[test]
    fn test_unknown_string_is_preserved() {
        let mt = MediaType::from("application/x-custom");
        assert_eq!(mt, MediaType::Other("application/x-custom".to_string()));
        assert_eq!(mt.to_string(), "application/x-custom");
    }

    #[test]
    fn test_to_oci_is_idempotent() {
        for mt in ALL.iter() {
            let once = mt.to_oci().unwrap();
            assert!(once.is_oci());
            assert_eq!(once.to_oci().unwrap(), once);
        }
    }

    #[test]
    fn test_to_docker_round_trips_through_oci() {
        assert_eq!(
            MediaType::DockerLayer.to_oci().unwrap(),
            MediaType::OciLayer
        );
        assert_eq!(
            MediaType::OciLayer.to_docker().unwrap(),
            MediaType::DockerLayer
        );
        assert_eq!(
            MediaType::DockerUncompressedLayer.to_oci().unwrap(),
            MediaType::OciUncompressedLayer
        );
        assert_eq!(
            MediaType::DockerManifestList.to_oci().unwrap(),
            MediaType::OciImageIndex
        );
    }

    #[test]
    fn test_other_does_not_map() {
        let mt = MediaType::Other("text/plain".to_string());
        assert!(matches!(mt.to_oci(), Err(KilnError::UnknownMediaType(_))));
        assert!(matches!(mt.to_docker(), Err(KilnError::UnknownMediaType(_))));
    }

    #[test]
    fn test_predicates() {
        assert!(MediaType::DockerLayer.is_layer());
        assert!(MediaType::DockerLayer.is_compressed());
        assert!(!MediaType::OciUncompressedLayer.is_compressed());
        assert!(MediaType::OciImageIndex.is_index());
        assert!(MediaType::DockerManifestSchema2.is_image_manifest());
        assert!(MediaType::OciConfigJson.is_config());
        assert!(!MediaType::DockerConfigJson.is_layer());
        assert!(MediaType::DockerForeignLayer.is_layer());
        assert!(MediaType::DockerForeignLayer.is_foreign());
        assert!(!MediaType::DockerLayer.is_foreign());
    }

    #[test]
    fn test_foreign_layer_maps_between_formats() {
        assert_eq!(
            MediaType::DockerForeignLayer.to_oci().unwrap(),
            MediaType::OciNondistributableLayer
        );
        assert_eq!(
            MediaType::OciNondistributableLayer.to_docker().unwrap(),
            MediaType::DockerForeignLayer
        );
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&MediaType::OciLayer).unwrap();
        assert_eq!(json, "\"application/vnd.oci.image.layer.v1.tar+gzip\"");
        let back: MediaType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MediaType::OciLayer);
    }
}
