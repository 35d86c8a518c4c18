//! Layers and media-type transcoding.
//!
//! A layer is a filesystem changeset available as two byte streams: the
//! compressed (wire) form hashed into its `digest`, and the uncompressed tar
//! hashed into its `diff_id`. Transcoding a Docker layer to OCI re-wraps the
//! exact same bytes under a new media type, so both hashes survive.

use flate2::read::MultiGzDecoder;
use ocify_core::config::{ConvertConfig, LayerBuffer};
use ocify_core::error::{ConvertError, Result, StageExt};
use std::fmt;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

use super::digest::{Digest, DigestWriter};
use super::media_type::MediaType;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A read-only handle to one image layer.
pub trait Layer: Send + Sync + fmt::Debug {
    /// Digest of the compressed byte stream.
    fn digest(&self) -> Result<Digest>;

    /// Digest of the uncompressed byte stream.
    fn diff_id(&self) -> Result<Digest>;

    /// Size of the compressed byte stream.
    fn size(&self) -> Result<u64>;

    fn media_type(&self) -> Result<MediaType>;

    /// Open the compressed (wire) byte stream.
    fn compressed(&self) -> Result<Box<dyn Read + Send + '_>>;

    /// Open the uncompressed tar stream.
    fn uncompressed(&self) -> Result<Box<dyn Read + Send + '_>>;
}

/// Bytes held either in memory or in a spooled temp file.
#[derive(Clone)]
enum Blob {
    Memory(Arc<[u8]>),
    Spooled(Arc<NamedTempFile>),
}

impl Blob {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        match self {
            Blob::Memory(bytes) => Ok(Box::new(io::Cursor::new(&bytes[..]))),
            Blob::Spooled(file) => Ok(Box::new(file.reopen()?)),
        }
    }

    /// Copy `reader` into a new blob, hashing along the way.
    fn spool(reader: &mut dyn Read, config: &ConvertConfig) -> io::Result<(Blob, Digest, u64)> {
        match config.layer_buffer {
            LayerBuffer::Memory => {
                let mut writer = DigestWriter::new(Vec::new());
                io::copy(reader, &mut writer)?;
                let (digest, size, bytes) = writer.into_parts();
                Ok((Blob::Memory(bytes.into()), digest, size))
            }
            LayerBuffer::TempFile => {
                let file = match &config.spool_dir {
                    Some(dir) => spool_file_in(dir)?,
                    None => tempfile::Builder::new().prefix("ocify-layer-").tempfile()?,
                };
                let mut writer = DigestWriter::new(file);
                io::copy(reader, &mut writer)?;
                writer.flush()?;
                let (digest, size, file) = writer.into_parts();
                Ok((Blob::Spooled(Arc::new(file)), digest, size))
            }
        }
    }

    fn starts_with(&self, prefix: &[u8]) -> io::Result<bool> {
        let mut head = vec![0u8; prefix.len()];
        let mut reader = self.open()?;
        let mut filled = 0;
        while filled < head.len() {
            match reader.read(&mut head[filled..])? {
                0 => return Ok(false),
                n => filled += n,
            }
        }
        Ok(head == prefix)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blob::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
            Blob::Spooled(file) => write!(f, "Spooled({})", file.path().display()),
        }
    }
}

fn spool_file_in(dir: &Path) -> io::Result<NamedTempFile> {
    std::fs::create_dir_all(dir)?;
    tempfile::Builder::new()
        .prefix("ocify-layer-")
        .tempfile_in(dir)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Gzip,
    Plain,
}

/// A layer rebuilt from a byte stream.
#[derive(Debug, Clone)]
pub struct BlobLayer {
    blob: Blob,
    encoding: Encoding,
    media_type: MediaType,
    digest: Digest,
    diff_id: Digest,
    size: u64,
}

impl BlobLayer {
    /// Build a layer from a gzip-compressed tar stream.
    ///
    /// The bytes are kept verbatim; the diff ID is computed by decompressing them.
    pub fn from_compressed(
        mut reader: impl Read,
        media_type: MediaType,
        config: &ConvertConfig,
    ) -> Result<Self> {
        let (blob, digest, size) = Blob::spool(&mut reader, config).map_err(|e| {
            ConvertError::Construction(format!("Failed to read compressed layer: {}", e))
        })?;

        let is_gzip = blob.starts_with(&GZIP_MAGIC).map_err(|e| {
            ConvertError::Construction(format!("Failed to inspect layer {}: {}", digest, e))
        })?;
        if !is_gzip {
            return Err(ConvertError::Construction(format!(
                "Layer {} is not gzip-compressed",
                digest
            )));
        }

        let diff_id = blob
            .open()
            .and_then(|r| Digest::from_reader(&mut MultiGzDecoder::new(r)))
            .map(|(diff_id, _)| diff_id)
            .map_err(|e| {
                ConvertError::Construction(format!("Failed to decompress layer {}: {}", digest, e))
            })?;

        Ok(Self {
            blob,
            encoding: Encoding::Gzip,
            media_type,
            digest,
            diff_id,
            size,
        })
    }

    /// Build a layer from an uncompressed tar stream.
    ///
    /// The wire form is the tar itself, so digest and diff ID coincide.
    pub fn from_uncompressed(
        mut reader: impl Read,
        media_type: MediaType,
        config: &ConvertConfig,
    ) -> Result<Self> {
        let (blob, digest, size) = Blob::spool(&mut reader, config).map_err(|e| {
            ConvertError::Construction(format!("Failed to read uncompressed layer: {}", e))
        })?;

        Ok(Self {
            blob,
            encoding: Encoding::Plain,
            media_type,
            diff_id: digest.clone(),
            digest,
            size,
        })
    }

    /// Whether the bytes live in a temp file rather than memory.
    pub fn is_spooled(&self) -> bool {
        matches!(self.blob, Blob::Spooled(_))
    }
}

impl Layer for BlobLayer {
    fn digest(&self) -> Result<Digest> {
        Ok(self.digest.clone())
    }

    fn diff_id(&self) -> Result<Digest> {
        Ok(self.diff_id.clone())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn media_type(&self) -> Result<MediaType> {
        Ok(self.media_type.clone())
    }

    fn compressed(&self) -> Result<Box<dyn Read + Send + '_>> {
        Ok(self.blob.open()?)
    }

    fn uncompressed(&self) -> Result<Box<dyn Read + Send + '_>> {
        let reader = self.blob.open()?;
        match self.encoding {
            Encoding::Gzip => Ok(Box::new(MultiGzDecoder::new(reader))),
            Encoding::Plain => Ok(reader),
        }
    }
}

/// Re-tag a layer with its OCI media type.
///
/// Docker gzip layers are rebuilt from their compressed stream, Docker
/// uncompressed layers from their uncompressed stream. Any other media type
/// is returned as the very same handle.
pub fn transcode_layer(
    layer: Arc<dyn Layer>,
    media_type: &MediaType,
    config: &ConvertConfig,
) -> Result<Arc<dyn Layer>> {
    let rebuilt = match media_type {
        MediaType::DockerLayer => {
            let reader = layer.compressed().stage("opening compressed layer")?;
            BlobLayer::from_compressed(reader, media_type.to_oci(), config)
                .stage("building OCI layer")?
        }
        MediaType::DockerUncompressedLayer => {
            let reader = layer.uncompressed().stage("opening uncompressed layer")?;
            BlobLayer::from_uncompressed(reader, media_type.to_oci(), config)
                .stage("building OCI layer")?
        }
        other => {
            tracing::debug!(media_type = %other, "Passing layer through unchanged");
            return Ok(layer);
        }
    };

    if config.verify_digests {
        verify_same_content(layer.as_ref(), &rebuilt)?;
    }

    tracing::debug!(
        digest = %rebuilt.digest,
        from = %media_type,
        to = %rebuilt.media_type,
        spooled = rebuilt.is_spooled(),
        "Transcoded layer"
    );

    Ok(Arc::new(rebuilt))
}

fn verify_same_content(original: &dyn Layer, rebuilt: &BlobLayer) -> Result<()> {
    let digest = original.digest().stage("getting layer digest")?;
    if digest != rebuilt.digest {
        return Err(ConvertError::Construction(format!(
            "Rebuilt layer digest {} does not match source {}",
            rebuilt.digest, digest
        )));
    }

    let diff_id = original.diff_id().stage("getting layer diff ID")?;
    if diff_id != rebuilt.diff_id {
        return Err(ConvertError::Construction(format!(
            "Rebuilt layer diff ID {} does not match source {}",
            rebuilt.diff_id, diff_id
        )));
    }

    Ok(())
}
