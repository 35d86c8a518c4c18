//! Media types for Docker and OCI image documents.
//!
//! Every media type string maps onto a closed set of known types. Anything
//! unrecognised (signatures, attestations, future formats) lands in
//! [`MediaType::Unknown`] and is carried through conversion untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const DOCKER_UNCOMPRESSED_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar";

pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const OCI_UNCOMPRESSED_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

/// A Docker or OCI media type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaType {
    DockerLayer,
    DockerUncompressedLayer,
    OciLayer,
    OciUncompressedLayer,
    DockerManifest,
    OciManifest,
    DockerConfig,
    OciConfig,
    DockerIndex,
    OciIndex,
    /// Any other media type, including the empty string.
    Unknown(String),
}

impl MediaType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DockerLayer => DOCKER_LAYER,
            Self::DockerUncompressedLayer => DOCKER_UNCOMPRESSED_LAYER,
            Self::OciLayer => OCI_LAYER,
            Self::OciUncompressedLayer => OCI_UNCOMPRESSED_LAYER,
            Self::DockerManifest => DOCKER_MANIFEST,
            Self::OciManifest => OCI_MANIFEST,
            Self::DockerConfig => DOCKER_CONFIG,
            Self::OciConfig => OCI_CONFIG,
            Self::DockerIndex => DOCKER_MANIFEST_LIST,
            Self::OciIndex => OCI_INDEX,
            Self::Unknown(s) => s,
        }
    }

    /// The OCI equivalent of a Docker media type.
    ///
    /// OCI types and unknown types map to themselves.
    pub fn to_oci(&self) -> MediaType {
        match self {
            Self::DockerLayer => Self::OciLayer,
            Self::DockerUncompressedLayer => Self::OciUncompressedLayer,
            Self::DockerManifest => Self::OciManifest,
            Self::DockerConfig => Self::OciConfig,
            Self::DockerIndex => Self::OciIndex,
            other => other.clone(),
        }
    }

    /// True for media types describing a single-platform image manifest.
    pub fn is_image(&self) -> bool {
        matches!(self, Self::DockerManifest | Self::OciManifest)
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        match s {
            DOCKER_LAYER => Self::DockerLayer,
            DOCKER_UNCOMPRESSED_LAYER => Self::DockerUncompressedLayer,
            OCI_LAYER => Self::OciLayer,
            OCI_UNCOMPRESSED_LAYER => Self::OciUncompressedLayer,
            DOCKER_MANIFEST => Self::DockerManifest,
            OCI_MANIFEST => Self::OciManifest,
            DOCKER_CONFIG => Self::DockerConfig,
            OCI_CONFIG => Self::OciConfig,
            DOCKER_MANIFEST_LIST => Self::DockerIndex,
            OCI_INDEX => Self::OciIndex,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for MediaType {
    fn from(s: String) -> Self {
        match MediaType::from(s.as_str()) {
            Self::Unknown(_) => Self::Unknown(s),
            known => known,
        }
    }
}

impl From<MediaType> for String {
    fn from(media_type: MediaType) -> Self {
        match media_type {
            MediaType::Unknown(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when a descriptor with this media type should be converted as an image.
///
/// Indexes, unknown artifacts and empty media types are not images.
pub fn is_image_media_type(media_type: &MediaType) -> bool {
    media_type.is_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_to_oci_mapping() {
        let table = [
            (DOCKER_MANIFEST, OCI_MANIFEST),
            (DOCKER_CONFIG, OCI_CONFIG),
            (DOCKER_LAYER, OCI_LAYER),
            (DOCKER_UNCOMPRESSED_LAYER, OCI_UNCOMPRESSED_LAYER),
            (DOCKER_MANIFEST_LIST, OCI_INDEX),
        ];
        for (docker, oci) in table {
            assert_eq!(MediaType::from(docker).to_oci().as_str(), oci);
        }
    }

    #[test]
    fn test_oci_and_unknown_map_to_themselves() {
        assert_eq!(MediaType::OciLayer.to_oci(), MediaType::OciLayer);
        let sig = MediaType::from("application/vnd.dev.cosign.simplesigning.v1+json");
        assert_eq!(sig.to_oci(), sig);
    }

    #[test]
    fn test_unknown_preserves_string() {
        let media_type = MediaType::from("application/vnd.in-toto+json".to_string());
        assert_eq!(
            media_type,
            MediaType::Unknown("application/vnd.in-toto+json".to_string())
        );
        assert_eq!(media_type.to_string(), "application/vnd.in-toto+json");
    }

    #[test]
    fn test_is_image_media_type() {
        assert!(is_image_media_type(&MediaType::DockerManifest));
        assert!(is_image_media_type(&MediaType::OciManifest));
        assert!(!is_image_media_type(&MediaType::DockerIndex));
        assert!(!is_image_media_type(&MediaType::OciIndex));
        assert!(!is_image_media_type(&MediaType::OciLayer));
        assert!(!is_image_media_type(&MediaType::Unknown(String::new())));
        assert!(!is_image_media_type(&MediaType::from(
            "application/vnd.in-toto+json"
        )));
    }

    #[test]
    fn test_serde_uses_wire_strings() {
        let json = serde_json::to_string(&MediaType::DockerLayer).unwrap();
        assert_eq!(json, format!("\"{}\"", DOCKER_LAYER));

        let parsed: MediaType = serde_json::from_str(&format!("\"{}\"", OCI_INDEX)).unwrap();
        assert_eq!(parsed, MediaType::OciIndex);
    }

    #[test]
    fn test_classification() {
        assert!(MediaType::DockerManifest.is_image());
        assert!(MediaType::OciManifest.is_image());
        assert!(!MediaType::DockerIndex.is_image());
        assert!(!MediaType::DockerUncompressedLayer.is_image());
    }
}
