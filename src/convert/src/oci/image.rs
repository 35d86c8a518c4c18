//! Images and the immutable image builder.

use ocify_core::error::{Result, StageExt};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::config::ConfigFile;
use super::descriptor::{Descriptor, Manifest};
use super::digest::Digest;
use super::layer::Layer;
use super::media_type::MediaType;

/// A single-platform image as supplied by an image source.
pub trait Image: Send + Sync + fmt::Debug {
    fn manifest(&self) -> Result<Manifest>;

    fn config_file(&self) -> Result<ConfigFile>;

    /// Layers in manifest order, bottom to top.
    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>>;

    /// Manifest bytes exactly as they are addressed by [`Image::digest`].
    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.manifest()?.to_bytes()?)
    }

    /// Config bytes exactly as they are addressed by the manifest's config descriptor.
    fn raw_config_file(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.config_file()?)?)
    }

    fn media_type(&self) -> Result<MediaType> {
        Ok(self.manifest()?.media_type)
    }

    fn digest(&self) -> Result<Digest> {
        Ok(Digest::sha256(&self.raw_manifest()?))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.raw_manifest()?.len() as u64)
    }
}

/// Builds a new [`BuiltImage`] from an empty base.
///
/// Every setter consumes and returns the builder; nothing is shared with the
/// image the layers came from.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    layers: Vec<Arc<dyn Layer>>,
    media_type: MediaType,
    config_media_type: MediaType,
    annotations: Option<BTreeMap<String, String>>,
    config_file: Option<ConfigFile>,
}

impl ImageBuilder {
    /// An image with no layers and Docker schema 2 media types.
    pub fn empty() -> Self {
        Self {
            layers: Vec::new(),
            media_type: MediaType::DockerManifest,
            config_media_type: MediaType::DockerConfig,
            annotations: None,
            config_file: None,
        }
    }

    pub fn append_layer(mut self, layer: Arc<dyn Layer>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn config_media_type(mut self, media_type: MediaType) -> Self {
        self.config_media_type = media_type;
        self
    }

    pub fn annotations(mut self, annotations: Option<BTreeMap<String, String>>) -> Self {
        self.annotations = annotations;
        self
    }

    /// Replace the config file wholesale.
    ///
    /// Without one, the image gets an empty config whose rootfs lists the
    /// appended layers' diff IDs.
    pub fn config_file(mut self, config_file: ConfigFile) -> Self {
        self.config_file = Some(config_file);
        self
    }

    pub fn build(self) -> Result<BuiltImage> {
        let mut layer_descriptors = Vec::with_capacity(self.layers.len());
        let mut diff_ids = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let descriptor = layer_descriptor(layer.as_ref()).stage("appending layers")?;
            diff_ids.push(layer.diff_id().stage("appending layers")?);
            layer_descriptors.push(descriptor);
        }

        let config_file = self.config_file.unwrap_or_else(|| {
            let mut config = ConfigFile::default();
            config.rootfs.diff_ids = diff_ids;
            config
        });
        let raw_config = serde_json::to_vec(&config_file).stage("setting config file")?;

        let manifest = Manifest {
            schema_version: 2,
            media_type: self.media_type,
            config: Descriptor::new(
                self.config_media_type,
                raw_config.len() as u64,
                Digest::sha256(&raw_config),
            ),
            layers: layer_descriptors,
            annotations: self.annotations,
        };
        let raw_manifest = manifest.to_bytes().stage("serializing manifest")?;

        Ok(BuiltImage {
            manifest,
            raw_manifest,
            config_file,
            raw_config,
            layers: self.layers,
        })
    }
}

fn layer_descriptor(layer: &dyn Layer) -> Result<Descriptor> {
    Ok(Descriptor::new(
        layer.media_type()?,
        layer.size()?,
        layer.digest()?,
    ))
}

/// An image produced by [`ImageBuilder`]. Immutable once built.
#[derive(Debug, Clone)]
pub struct BuiltImage {
    manifest: Manifest,
    raw_manifest: Vec<u8>,
    config_file: ConfigFile,
    raw_config: Vec<u8>,
    layers: Vec<Arc<dyn Layer>>,
}

impl Image for BuiltImage {
    fn manifest(&self) -> Result<Manifest> {
        Ok(self.manifest.clone())
    }

    fn config_file(&self) -> Result<ConfigFile> {
        Ok(self.config_file.clone())
    }

    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>> {
        Ok(self.layers.clone())
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.clone())
    }

    fn raw_config_file(&self) -> Result<Vec<u8>> {
        Ok(self.raw_config.clone())
    }

    fn media_type(&self) -> Result<MediaType> {
        Ok(self.manifest.media_type.clone())
    }
}
