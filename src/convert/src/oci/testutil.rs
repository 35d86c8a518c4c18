//! Fixtures shared by unit tests.

use flate2::write::GzEncoder;
use flate2::Compression;
use ocify_core::error::{ConvertError, Result};
use oci_spec::image::Platform;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read};
use std::sync::Arc;

use super::config::ConfigFile;
use super::descriptor::{Descriptor, IndexManifest, Manifest};
use super::digest::Digest;
use super::image::Image;
use super::index::ImageIndex;
use super::layer::Layer;
use super::media_type::MediaType;

pub fn plain_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn gzip_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&plain_tar(files)).unwrap();
    encoder.finish().unwrap()
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Open,
    MidStream,
    Metadata,
    WrongDigest,
}

/// A layer that fails in a chosen way.
#[derive(Debug)]
pub struct FailingLayer {
    failure: Failure,
    bytes: Vec<u8>,
}

impl FailingLayer {
    pub fn on_open() -> Self {
        Self {
            failure: Failure::Open,
            bytes: Vec::new(),
        }
    }

    pub fn mid_stream() -> Self {
        Self {
            failure: Failure::MidStream,
            bytes: vec![0x1f, 0x8b, 0x08, 0x00],
        }
    }

    pub fn on_metadata() -> Self {
        Self {
            failure: Failure::Metadata,
            bytes: Vec::new(),
        }
    }

    /// Serves `bytes` but reports a digest that does not match them.
    pub fn wrong_digest(bytes: Vec<u8>) -> Self {
        Self {
            failure: Failure::WrongDigest,
            bytes,
        }
    }

    fn metadata<T>(&self, value: T) -> Result<T> {
        match self.failure {
            Failure::Metadata => Err(ConvertError::SourceRead("registry unavailable".to_string())),
            _ => Ok(value),
        }
    }
}

struct BrokenReader<'a> {
    served: &'a [u8],
}

impl Read for BrokenReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.served.is_empty() {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let n = self.served.read(buf)?;
        Ok(n)
    }
}

impl Layer for FailingLayer {
    fn digest(&self) -> Result<Digest> {
        self.metadata(Digest::sha256(b"not the content"))
    }

    fn diff_id(&self) -> Result<Digest> {
        self.metadata(Digest::sha256(b"not the tar"))
    }

    fn size(&self) -> Result<u64> {
        self.metadata(self.bytes.len() as u64)
    }

    fn media_type(&self) -> Result<MediaType> {
        self.metadata(MediaType::DockerLayer)
    }

    fn compressed(&self) -> Result<Box<dyn Read + Send + '_>> {
        match self.failure {
            Failure::Open => Err(ConvertError::SourceRead("blob not found".to_string())),
            Failure::MidStream => Ok(Box::new(BrokenReader {
                served: &self.bytes,
            })),
            Failure::Metadata | Failure::WrongDigest => Ok(Box::new(&self.bytes[..])),
        }
    }

    fn uncompressed(&self) -> Result<Box<dyn Read + Send + '_>> {
        self.compressed()
    }
}

/// Which accessor of [`FailingImage`] errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFailure {
    Manifest,
    ConfigFile,
    Layers,
}

/// An image whose manifest, config, or layer list cannot be fetched.
#[derive(Debug)]
pub struct FailingImage {
    pub failure: ImageFailure,
    pub inner: Arc<dyn Image>,
}

impl FailingImage {
    fn check(&self, accessor: ImageFailure) -> Result<()> {
        if self.failure == accessor {
            return Err(ConvertError::SourceRead(format!("{:?} unavailable", accessor)));
        }
        Ok(())
    }
}

impl Image for FailingImage {
    fn manifest(&self) -> Result<Manifest> {
        self.check(ImageFailure::Manifest)?;
        self.inner.manifest()
    }

    fn config_file(&self) -> Result<ConfigFile> {
        self.check(ImageFailure::ConfigFile)?;
        self.inner.config_file()
    }

    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>> {
        self.check(ImageFailure::Layers)?;
        self.inner.layers()
    }
}

/// An in-memory index over prebuilt images.
#[derive(Debug)]
pub struct MemoryIndex {
    media_type: MediaType,
    manifests: Vec<Descriptor>,
    images: HashMap<Digest, Arc<dyn Image>>,
}

impl MemoryIndex {
    pub fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            manifests: Vec::new(),
            images: HashMap::new(),
        }
    }

    pub fn with_image(self, image: Arc<dyn Image>, platform: Option<Platform>) -> Self {
        self.with_annotated_image(image, platform, None)
    }

    pub fn with_annotated_image(
        mut self,
        image: Arc<dyn Image>,
        platform: Option<Platform>,
        annotations: Option<BTreeMap<String, String>>,
    ) -> Self {
        let mut descriptor = Descriptor::new(
            image.media_type().unwrap(),
            image.size().unwrap(),
            image.digest().unwrap(),
        );
        descriptor.platform = platform;
        descriptor.annotations = annotations;
        self.images.insert(descriptor.digest.clone(), image);
        self.manifests.push(descriptor);
        self
    }

    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.manifests.push(descriptor);
        self
    }
}

impl ImageIndex for MemoryIndex {
    fn media_type(&self) -> Result<MediaType> {
        Ok(self.media_type.clone())
    }

    fn index_manifest(&self) -> Result<IndexManifest> {
        Ok(IndexManifest::new(
            self.media_type.clone(),
            self.manifests.clone(),
        ))
    }

    fn image(&self, digest: &Digest) -> Result<Arc<dyn Image>> {
        self.images
            .get(digest)
            .cloned()
            .ok_or_else(|| ConvertError::SourceRead(format!("image {} not found", digest)))
    }
}
