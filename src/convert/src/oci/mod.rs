//! Docker-to-OCI image conversion.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  convert_image_index                                          │
//! │    for each image entry ──► convert_image                     │
//! │                               ├── filter_config   (once)      │
//! │                               └── transcode_layer (per layer) │
//! │    remove old entries, append converted ones                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only media-type labels and the config field set change. Layer bytes,
//! and therefore layer digests and diff IDs, are carried over exactly.

pub mod config;
mod convert;
pub mod descriptor;
pub mod digest;
mod image;
mod index;
mod layer;
pub mod layout;
pub mod media_type;

#[cfg(test)]
mod testutil;

pub use config::{filter_config, Config, ConfigFile, HealthConfig, History, RootFs};
pub use convert::{convert_image, convert_image_index, Converter};
pub use descriptor::{Descriptor, IndexManifest, Manifest};
pub use digest::{Digest, DigestWriter};
pub use image::{BuiltImage, Image, ImageBuilder};
pub use index::{BuiltIndex, ImageIndex, IndexAddendum, IndexBuilder};
pub use layer::{transcode_layer, BlobLayer, Layer};
pub use layout::{write_image_layout, write_index_layout, LayoutImage, LayoutIndex};
pub use media_type::{is_image_media_type, MediaType};
