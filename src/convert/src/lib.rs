//! Ocify - Docker-to-OCI image conversion.
//!
//! Converts images and multi-platform image indices that use Docker's
//! schema 2 media types into spec-compliant OCI images and indices, keeping
//! layer content byte-for-byte identical.

pub mod oci;

// Re-export common types
pub use ocify_core::{ConvertConfig, ConvertError, LayerBuffer, Result};
pub use oci::{convert_image, convert_image_index, Converter};
pub use oci::{BuiltImage, BuiltIndex, Image, ImageBuilder, ImageIndex, IndexBuilder};
pub use oci::{BlobLayer, Layer, LayoutImage, LayoutIndex, MediaType};

/// Ocify version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
