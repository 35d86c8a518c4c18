//! Content digests (`sha256:<hex>`, `sha512:<hex>`).
//!
//! New content is always hashed with sha256. sha512 digests are accepted on
//! input so entries addressed that way can be carried and checked.

use ocify_core::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha512};
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

const SHA256_PREFIX: &str = "sha256:";
const SHA256: &str = "sha256";
const SHA512: &str = "sha512";

/// A content digest in `<algorithm>:<hex>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Digest of an in-memory byte slice.
    pub fn sha256(bytes: &[u8]) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(bytes))
    }

    /// Digest of everything a reader yields, together with its length.
    pub fn from_reader(reader: &mut impl Read) -> io::Result<(Self, u64)> {
        let mut writer = DigestWriter::new(io::sink());
        let size = io::copy(reader, &mut writer)?;
        let (digest, _) = writer.finish();
        Ok((digest, size))
    }

    fn from_hasher(hasher: Sha256) -> Self {
        Digest(format!("{}{}", SHA256_PREFIX, hex::encode(hasher.finalize())))
    }

    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(alg, _)| alg).unwrap_or_default()
    }

    pub fn hex(&self) -> &str {
        self.0.split_once(':').map(|(_, hex)| hex).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `bytes` hash to this digest under its own algorithm.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        let actual = match self.algorithm() {
            SHA512 => hex::encode(Sha512::digest(bytes)),
            _ => hex::encode(Sha256::digest(bytes)),
        };
        actual == self.hex()
    }
}

impl FromStr for Digest {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, hex) = s.split_once(':').ok_or_else(|| {
            ConvertError::OciImageError(format!("Invalid digest: {}", s))
        })?;
        let expected_len = match algorithm {
            SHA256 => 64,
            SHA512 => 128,
            _ => {
                return Err(ConvertError::OciImageError(format!(
                    "Unsupported digest algorithm: {}",
                    s
                )))
            }
        };
        if hex.len() != expected_len
            || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(ConvertError::OciImageError(format!(
                "Invalid {} digest: {}",
                algorithm, s
            )));
        }
        Ok(Digest(s.to_string()))
    }
}

impl TryFrom<String> for Digest {
    type Error = ConvertError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A writer that hashes and counts everything passed through to `inner`.
pub struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Finish hashing, returning the digest and the number of bytes written.
    pub fn finish(self) -> (Digest, u64) {
        (Digest::from_hasher(self.hasher), self.written)
    }

    pub fn into_parts(self) -> (Digest, u64, W) {
        (Digest::from_hasher(self.hasher), self.written, self.inner)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
