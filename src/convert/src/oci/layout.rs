//! OCI image layout directories as image sources and publish targets.
//!
//! ```text
//! image/
//! ├── oci-layout           (layout marker)
//! ├── index.json           (image index)
//! └── blobs/
//!     └── sha256/
//!         ├── <manifest>   (image manifest or manifest list)
//!         ├── <config>     (image configuration)
//!         └── <layers>     (filesystem layers)
//! ```
//!
//! Docker-typed manifests and manifest lists are accepted on read. Manifest,
//! config and index blobs are checked against their digest when read; layer
//! streams are checked when they reach end of file.

use flate2::read::MultiGzDecoder;
use ocify_core::error::{ConvertError, Result, StageExt};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::config::ConfigFile;
use super::descriptor::{Descriptor, IndexManifest, Manifest};
use super::digest::{Digest, DigestWriter};
use super::image::Image;
use super::index::ImageIndex;
use super::layer::Layer;
use super::media_type::{is_image_media_type, MediaType};

const OCI_LAYOUT_FILE: &str = "oci-layout";
const INDEX_FILE: &str = "index.json";
const BLOBS_DIR: &str = "blobs";
const OCI_LAYOUT_CONTENT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;

/// An image stored in an OCI layout directory.
#[derive(Debug)]
pub struct LayoutImage {
    root_dir: PathBuf,
    manifest: Manifest,
    raw_manifest: Vec<u8>,
    config_file: ConfigFile,
    raw_config: Vec<u8>,
}

impl LayoutImage {
    /// Open the first image listed in the layout's `index.json`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let index = LayoutIndex::open(path)?;
        let descriptor = index
            .manifest
            .manifests
            .iter()
            .find(|d| is_image_media_type(&d.media_type))
            .ok_or_else(|| {
                ConvertError::OciImageError(format!(
                    "No image manifest in {}",
                    index.root_dir.join(INDEX_FILE).display()
                ))
            })?;

        Self::from_digest(&index.root_dir, &descriptor.digest)
    }

    /// Load the image whose manifest blob has the given digest.
    pub fn from_digest(root_dir: impl AsRef<Path>, digest: &Digest) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();

        let raw_manifest = read_blob(&root_dir, digest)?;
        let manifest: Manifest = serde_json::from_slice(&raw_manifest).map_err(|e| {
            ConvertError::OciImageError(format!("Failed to parse manifest {}: {}", digest, e))
        })?;

        let raw_config = read_blob(&root_dir, &manifest.config.digest)?;
        let config_file: ConfigFile = serde_json::from_slice(&raw_config).map_err(|e| {
            ConvertError::OciImageError(format!(
                "Failed to parse config {}: {}",
                manifest.config.digest, e
            ))
        })?;

        Ok(Self {
            root_dir,
            manifest,
            raw_manifest,
            config_file,
            raw_config,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

impl Image for LayoutImage {
    fn manifest(&self) -> Result<Manifest> {
        Ok(self.manifest.clone())
    }

    fn config_file(&self) -> Result<ConfigFile> {
        Ok(self.config_file.clone())
    }

    fn layers(&self) -> Result<Vec<Arc<dyn Layer>>> {
        let diff_ids = &self.config_file.rootfs.diff_ids;
        if diff_ids.len() != self.manifest.layers.len() {
            return Err(ConvertError::SourceRead(format!(
                "Config lists {} diff IDs for {} layers",
                diff_ids.len(),
                self.manifest.layers.len()
            )));
        }

        Ok(self
            .manifest
            .layers
            .iter()
            .zip(diff_ids)
            .map(|(descriptor, diff_id)| {
                Arc::new(LayoutLayer {
                    path: blob_path(&self.root_dir, &descriptor.digest),
                    descriptor: descriptor.clone(),
                    diff_id: diff_id.clone(),
                }) as Arc<dyn Layer>
            })
            .collect())
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.clone())
    }

    fn raw_config_file(&self) -> Result<Vec<u8>> {
        Ok(self.raw_config.clone())
    }
}

/// A layer blob read lazily from disk.
#[derive(Debug)]
struct LayoutLayer {
    path: PathBuf,
    descriptor: Descriptor,
    diff_id: Digest,
}

impl LayoutLayer {
    fn is_gzip(&self) -> bool {
        match &self.descriptor.media_type {
            MediaType::DockerLayer | MediaType::OciLayer => true,
            MediaType::Unknown(s) => s.ends_with("gzip"),
            _ => false,
        }
    }
}

impl Layer for LayoutLayer {
    fn digest(&self) -> Result<Digest> {
        Ok(self.descriptor.digest.clone())
    }

    fn diff_id(&self) -> Result<Digest> {
        Ok(self.diff_id.clone())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.descriptor.size)
    }

    fn media_type(&self) -> Result<MediaType> {
        Ok(self.descriptor.media_type.clone())
    }

    fn compressed(&self) -> Result<Box<dyn Read + Send + '_>> {
        let file = File::open(&self.path).map_err(|e| {
            ConvertError::SourceRead(format!(
                "Failed to open layer blob {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Box::new(VerifyingReader::new(file, self.descriptor.digest.clone())))
    }

    fn uncompressed(&self) -> Result<Box<dyn Read + Send + '_>> {
        let compressed = self.compressed()?;
        if self.is_gzip() {
            Ok(Box::new(MultiGzDecoder::new(compressed)))
        } else {
            Ok(compressed)
        }
    }
}

/// Hashes a stream and fails at end of file if it does not match `expected`.
struct VerifyingReader<R> {
    inner: R,
    hasher: Option<DigestWriter<io::Sink>>,
    expected: Digest,
}

impl<R: Read> VerifyingReader<R> {
    fn new(inner: R, expected: Digest) -> Self {
        Self {
            inner,
            hasher: Some(DigestWriter::new(io::sink())),
            expected,
        }
    }
}

impl<R: Read> Read for VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            if let Some(hasher) = self.hasher.as_mut() {
                hasher.write_all(&buf[..n])?;
            }
        } else if !buf.is_empty() {
            if let Some(hasher) = self.hasher.take() {
                let (actual, _) = hasher.finish();
                if actual != self.expected {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("blob digest mismatch: expected {}, got {}", self.expected, actual),
                    ));
                }
            }
        }
        Ok(n)
    }
}

/// An index stored as an OCI layout's `index.json` or as a blob within it.
#[derive(Debug)]
pub struct LayoutIndex {
    root_dir: PathBuf,
    manifest: IndexManifest,
    raw_manifest: Vec<u8>,
}

impl LayoutIndex {
    /// Open the layout's `index.json`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root_dir = path.as_ref().to_path_buf();
        validate_oci_layout(&root_dir)?;

        let index_path = root_dir.join(INDEX_FILE);
        let raw_manifest = fs::read(&index_path).map_err(|e| {
            ConvertError::SourceRead(format!(
                "Failed to read index.json at {}: {}",
                index_path.display(),
                e
            ))
        })?;
        let manifest = parse_index(&raw_manifest, INDEX_FILE)?;

        Ok(Self {
            root_dir,
            manifest,
            raw_manifest,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

impl ImageIndex for LayoutIndex {
    fn media_type(&self) -> Result<MediaType> {
        // index.json carries no media type in older layouts; it is an OCI index by definition.
        if self.manifest.media_type.as_str().is_empty() {
            return Ok(MediaType::OciIndex);
        }
        Ok(self.manifest.media_type.clone())
    }

    fn index_manifest(&self) -> Result<IndexManifest> {
        Ok(self.manifest.clone())
    }

    fn image(&self, digest: &Digest) -> Result<Arc<dyn Image>> {
        Ok(Arc::new(LayoutImage::from_digest(&self.root_dir, digest)?))
    }

    fn blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        read_blob(&self.root_dir, digest)
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.clone())
    }
}

fn parse_index(raw: &[u8], name: &str) -> Result<IndexManifest> {
    serde_json::from_slice(raw).map_err(|e| {
        ConvertError::OciImageError(format!("Failed to parse index {}: {}", name, e))
    })
}

/// Validate that the directory contains a valid OCI layout.
fn validate_oci_layout(root_dir: &Path) -> Result<()> {
    for required in [OCI_LAYOUT_FILE, INDEX_FILE, BLOBS_DIR] {
        if !root_dir.join(required).exists() {
            return Err(ConvertError::OciImageError(format!(
                "Not a valid OCI layout: missing {} in {}",
                required,
                root_dir.display()
            )));
        }
    }
    Ok(())
}

/// Get the path to a blob by digest.
fn blob_path(root_dir: &Path, digest: &Digest) -> PathBuf {
    root_dir
        .join(BLOBS_DIR)
        .join(digest.algorithm())
        .join(digest.hex())
}

/// Read a whole blob and check it against its digest.
fn read_blob(root_dir: &Path, digest: &Digest) -> Result<Vec<u8>> {
    let path = blob_path(root_dir, digest);
    let content = fs::read(&path).map_err(|e| {
        ConvertError::SourceRead(format!("Failed to read blob at {}: {}", path.display(), e))
    })?;

    if !digest.matches(&content) {
        return Err(ConvertError::SourceRead(format!(
            "Blob {} does not match digest {}",
            path.display(),
            digest
        )));
    }

    Ok(content)
}

/// Write an image into a layout directory whose `index.json` lists just that image.
///
/// Returns the descriptor recorded in `index.json`.
pub fn write_image_layout(dir: impl AsRef<Path>, image: &dyn Image) -> Result<Descriptor> {
    let dir = dir.as_ref();
    init_layout(dir)?;

    let descriptor = write_image_blobs(dir, image)?;
    let index = IndexManifest::new(MediaType::OciIndex, vec![descriptor.clone()]);
    let raw_index = index.to_bytes().stage("serializing index.json")?;
    write_file(&dir.join(INDEX_FILE), &raw_index)?;

    tracing::info!(
        dir = %dir.display(),
        digest = %descriptor.digest,
        "Wrote image layout"
    );

    Ok(descriptor)
}

/// Write an index and everything it references into a layout directory.
///
/// The index itself becomes `index.json`. Image entries are written in full;
/// other entries are copied blob by blob, following any descriptors they list.
pub fn write_index_layout(dir: impl AsRef<Path>, index: &dyn ImageIndex) -> Result<()> {
    let dir = dir.as_ref();
    init_layout(dir)?;

    let manifest = index.index_manifest().stage("getting index manifest")?;
    for descriptor in &manifest.manifests {
        if is_image_media_type(&descriptor.media_type) {
            let image = index
                .image(&descriptor.digest)
                .stage(format!("getting image {}", descriptor.digest))?;
            write_image_blobs(dir, image.as_ref())
                .stage(format!("writing image {}", descriptor.digest))?;
        } else {
            copy_blob_tree(dir, index, &descriptor.digest)
                .stage(format!("copying {}", descriptor.digest))?;
        }
    }

    let raw_index = index.raw_manifest().stage("serializing index.json")?;
    write_file(&dir.join(INDEX_FILE), &raw_index)?;

    tracing::info!(
        dir = %dir.display(),
        entries = manifest.manifests.len(),
        "Wrote index layout"
    );

    Ok(())
}

fn init_layout(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir.join(BLOBS_DIR).join("sha256")).map_err(|e| {
        ConvertError::OciImageError(format!(
            "Failed to create layout directory {}: {}",
            dir.display(),
            e
        ))
    })?;
    write_file(&dir.join(OCI_LAYOUT_FILE), OCI_LAYOUT_CONTENT.as_bytes())
}

fn write_image_blobs(dir: &Path, image: &dyn Image) -> Result<Descriptor> {
    for layer in image.layers().stage("getting image layers")? {
        write_layer_blob(dir, layer.as_ref()).stage("writing layers")?;
    }

    let raw_config = image.raw_config_file().stage("getting config file")?;
    write_blob(dir, &Digest::sha256(&raw_config), &raw_config)?;

    let raw_manifest = image.raw_manifest().stage("getting manifest")?;
    let digest = Digest::sha256(&raw_manifest);
    write_blob(dir, &digest, &raw_manifest)?;

    Ok(Descriptor::new(
        image.media_type().stage("getting manifest")?,
        raw_manifest.len() as u64,
        digest,
    ))
}

fn write_layer_blob(dir: &Path, layer: &dyn Layer) -> Result<()> {
    let digest = layer.digest()?;
    let path = blob_path(dir, &digest);
    if path.exists() {
        return Ok(());
    }

    let tmp = tempfile::NamedTempFile::new_in(dir.join(BLOBS_DIR))?;
    let mut writer = DigestWriter::new(tmp);
    let mut reader = layer.compressed()?;
    io::copy(&mut reader, &mut writer)
        .map_err(|e| ConvertError::SourceRead(format!("Failed to read layer {}: {}", digest, e)))?;
    writer.flush()?;

    let (actual, _, tmp) = writer.into_parts();
    if actual != digest {
        return Err(ConvertError::Construction(format!(
            "Layer {} streamed content with digest {}",
            digest, actual
        )));
    }

    tmp.persist(&path).map_err(|e| {
        ConvertError::OciImageError(format!(
            "Failed to store layer blob {}: {}",
            path.display(),
            e
        ))
    })?;

    tracing::debug!(digest = %digest, "Wrote layer blob");
    Ok(())
}

/// Minimal view of any manifest-like document: the descriptors it references.
#[derive(Deserialize)]
struct References {
    #[serde(default)]
    config: Option<Reference>,
    #[serde(default)]
    layers: Vec<Reference>,
    #[serde(default)]
    manifests: Vec<Reference>,
    #[serde(default)]
    blobs: Vec<Reference>,
}

#[derive(Deserialize)]
struct Reference {
    digest: Digest,
}

fn copy_blob_tree(dir: &Path, index: &dyn ImageIndex, digest: &Digest) -> Result<()> {
    let content = index.blob(digest)?;
    write_blob(dir, digest, &content)?;

    // Opaque blobs reference nothing further.
    let Ok(references) = serde_json::from_slice::<References>(&content) else {
        return Ok(());
    };

    let children = references
        .config
        .into_iter()
        .chain(references.layers)
        .chain(references.manifests)
        .chain(references.blobs);
    for child in children {
        if !blob_path(dir, &child.digest).exists() {
            copy_blob_tree(dir, index, &child.digest)?;
        }
    }
    Ok(())
}

fn write_blob(dir: &Path, digest: &Digest, content: &[u8]) -> Result<()> {
    let path = blob_path(dir, digest);
    if path.exists() {
        return Ok(());
    }
    write_file(&path, content)
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content).map_err(|e| {
        ConvertError::OciImageError(format!("Failed to write {}: {}", path.display(), e))
    })
}
