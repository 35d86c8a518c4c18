//! Docker-to-OCI conversion of images and image indices.
//!
//! Conversion is synchronous and all-or-nothing: any failure aborts the call
//! with an error naming the stage that failed, and no partial image or index
//! is returned. Inputs are never modified; results are new values.

use ocify_core::config::ConvertConfig;
use ocify_core::error::{Result, StageExt};
use std::sync::Arc;

use super::config::filter_config;
use super::image::{BuiltImage, Image, ImageBuilder};
use super::index::{BuiltIndex, ImageIndex, IndexAddendum, IndexBuilder};
use super::layer::transcode_layer;
use super::media_type::{is_image_media_type, MediaType};

/// Converts Docker-typed images and indices to their OCI equivalents.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    config: ConvertConfig,
}

impl Converter {
    pub fn new(config: ConvertConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Convert a single-platform image.
    ///
    /// Layers keep their order, bytes, digests and diff IDs. Manifest and
    /// config media types become OCI, manifest annotations are carried over,
    /// and the config file is reduced to its OCI-portable fields.
    pub fn convert_image(&self, image: &dyn Image) -> Result<BuiltImage> {
        let manifest = image.manifest().stage("getting manifest")?;

        let config_file = image.config_file().stage("getting config file")?;
        let config_file = filter_config(&config_file);

        let layers = image.layers().stage("getting image layers")?;
        let layer_count = layers.len();

        let mut builder = ImageBuilder::empty();
        for layer in layers {
            let media_type = layer.media_type().stage("getting layer media type")?;
            let layer = transcode_layer(layer, &media_type, &self.config).stage("converting layers")?;
            builder = builder.append_layer(layer);
        }

        let converted = builder
            .media_type(MediaType::OciManifest)
            .config_media_type(MediaType::OciConfig)
            .annotations(manifest.annotations)
            .config_file(config_file)
            .build()?;

        tracing::info!(
            digest = %converted.digest().stage("computing image digest")?,
            from = %manifest.media_type,
            layers = layer_count,
            "Converted image to OCI"
        );

        Ok(converted)
    }

    /// Convert every image entry of an index.
    ///
    /// Entries that are not single images (nested indices, signatures,
    /// attestations, unknown artifacts, empty media types) are left exactly
    /// as they are. Converted entries are removed and re-appended after the
    /// untouched ones, keeping their URLs, annotations and platform.
    pub fn convert_image_index(&self, index: Arc<dyn ImageIndex>) -> Result<BuiltIndex> {
        let manifest = index.index_manifest().stage("getting index manifest")?;

        let mut builder = IndexBuilder::new(index.clone()).media_type(MediaType::OciIndex);
        let mut additions = Vec::new();
        let mut skipped = 0usize;

        for descriptor in &manifest.manifests {
            if !is_image_media_type(&descriptor.media_type) {
                tracing::debug!(
                    digest = %descriptor.digest,
                    media_type = %descriptor.media_type,
                    "Leaving non-image index entry untouched"
                );
                skipped += 1;
                continue;
            }

            let image = index
                .image(&descriptor.digest)
                .stage(format!("getting image {}", descriptor.digest))?;
            let converted = self
                .convert_image(image.as_ref())
                .stage(format!("converting image {}", descriptor.digest))?;

            builder = builder.remove(descriptor.digest.clone());
            additions.push(IndexAddendum::inheriting(Arc::new(converted), descriptor));
        }

        let converted_count = additions.len();
        for addendum in additions {
            builder = builder.append(addendum);
        }
        let converted = builder.build().stage("building index")?;

        tracing::info!(
            converted = converted_count,
            untouched = skipped,
            "Converted image index to OCI"
        );

        Ok(converted)
    }
}

/// Convert an image with the default configuration.
pub fn convert_image(image: &dyn Image) -> Result<BuiltImage> {
    Converter::default().convert_image(image)
}

/// Convert an image index with the default configuration.
pub fn convert_image_index(index: Arc<dyn ImageIndex>) -> Result<BuiltIndex> {
    Converter::default().convert_image_index(index)
}
