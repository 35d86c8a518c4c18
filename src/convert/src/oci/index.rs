//! Image indices and the immutable index builder.

use oci_spec::image::Platform;
use ocify_core::error::{ConvertError, Result, StageExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::descriptor::{Descriptor, IndexManifest};
use super::digest::Digest;
use super::image::Image;
use super::media_type::MediaType;

/// A multi-platform image index as supplied by an image source.
pub trait ImageIndex: Send + Sync + fmt::Debug {
    fn media_type(&self) -> Result<MediaType>;

    fn index_manifest(&self) -> Result<IndexManifest>;

    /// Resolve an image entry of this index by digest.
    fn image(&self, digest: &Digest) -> Result<Arc<dyn Image>>;

    /// Raw bytes of any blob the index can reach, for entries that are not images.
    fn blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        Err(ConvertError::SourceRead(format!(
            "Blob {} is not available from this index",
            digest
        )))
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.index_manifest()?.to_bytes()?)
    }

    fn digest(&self) -> Result<Digest> {
        Ok(Digest::sha256(&self.raw_manifest()?))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.raw_manifest()?.len() as u64)
    }
}

/// An image to add to an index, with descriptor metadata to carry over.
///
/// Digest, size and media type are always taken from the image itself.
#[derive(Debug, Clone)]
pub struct IndexAddendum {
    pub image: Arc<dyn Image>,
    pub urls: Option<Vec<String>>,
    pub annotations: Option<BTreeMap<String, String>>,
    pub platform: Option<Platform>,
}

impl IndexAddendum {
    /// Copy URLs, annotations and platform from an existing descriptor.
    pub fn inheriting(image: Arc<dyn Image>, descriptor: &Descriptor) -> Self {
        Self {
            image,
            urls: descriptor.urls.clone(),
            annotations: descriptor.annotations.clone(),
            platform: descriptor.platform.clone(),
        }
    }

    fn descriptor(&self) -> Result<Descriptor> {
        Ok(Descriptor {
            media_type: self.image.media_type()?,
            size: self.image.size()?,
            digest: self.image.digest()?,
            urls: self.urls.clone(),
            annotations: self.annotations.clone(),
            platform: self.platform.clone(),
            artifact_type: None,
            extra: BTreeMap::new(),
        })
    }
}

/// Builds a new [`BuiltIndex`] on top of an existing index.
///
/// Removals are applied first, then additions are appended in order.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    base: Arc<dyn ImageIndex>,
    media_type: Option<MediaType>,
    removals: Vec<Digest>,
    additions: Vec<IndexAddendum>,
}

impl IndexBuilder {
    pub fn new(base: Arc<dyn ImageIndex>) -> Self {
        Self {
            base,
            media_type: None,
            removals: Vec::new(),
            additions: Vec::new(),
        }
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    /// Drop every entry with this digest.
    pub fn remove(mut self, digest: Digest) -> Self {
        self.removals.push(digest);
        self
    }

    pub fn append(mut self, addendum: IndexAddendum) -> Self {
        self.additions.push(addendum);
        self
    }

    pub fn build(self) -> Result<BuiltIndex> {
        let mut manifest = self
            .base
            .index_manifest()
            .stage("getting index manifest")?;

        if let Some(media_type) = self.media_type {
            manifest.media_type = media_type;
        }

        let removed: HashSet<&Digest> = self.removals.iter().collect();
        manifest.manifests.retain(|d| !removed.contains(&d.digest));

        let mut images = HashMap::new();
        for addendum in self.additions {
            let descriptor = addendum.descriptor().stage("appending manifests")?;
            images.insert(descriptor.digest.clone(), addendum.image);
            manifest.manifests.push(descriptor);
        }

        let raw_manifest = manifest.to_bytes().stage("serializing index manifest")?;

        Ok(BuiltIndex {
            base: self.base,
            manifest,
            raw_manifest,
            images,
        })
    }
}

/// An index produced by [`IndexBuilder`]. Immutable once built.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    base: Arc<dyn ImageIndex>,
    manifest: IndexManifest,
    raw_manifest: Vec<u8>,
    images: HashMap<Digest, Arc<dyn Image>>,
}

impl ImageIndex for BuiltIndex {
    fn media_type(&self) -> Result<MediaType> {
        Ok(self.manifest.media_type.clone())
    }

    fn index_manifest(&self) -> Result<IndexManifest> {
        Ok(self.manifest.clone())
    }

    fn image(&self, digest: &Digest) -> Result<Arc<dyn Image>> {
        match self.images.get(digest) {
            Some(image) => Ok(image.clone()),
            None => self.base.image(digest),
        }
    }

    fn blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        match self.images.get(digest) {
            Some(image) => image.raw_manifest(),
            None => self.base.blob(digest),
        }
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.clone())
    }
}
