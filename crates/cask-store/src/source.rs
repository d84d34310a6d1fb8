use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use cask_types::{DigestAlgorithm, DigestHasher};

/// A staged source of file bytes for one commit.
///
/// Sources are a tagged variant, not a trait hierarchy: the checksum wrapper
/// is a decorator variant that can wrap any other variant, including another
/// wrapper. Each variant owns its underlying handle, so dropping a source --
/// on success or on any error path -- releases it exactly once.
pub enum ByteSource {
    /// Bytes supplied inline in the request body.
    Inline(Cursor<Bytes>),
    /// A file on a reachable filesystem, opened for reading when staged.
    Referenced { path: PathBuf, file: File },
    /// Digest-verifying decorator: hashes everything read from the inner
    /// source and fails the final read if the digest does not match.
    Checksummed(ChecksummedSource),
}

impl ByteSource {
    /// Stage inline bytes.
    pub fn inline(data: impl Into<Bytes>) -> Self {
        Self::Inline(Cursor::new(data.into()))
    }

    /// Stage a filesystem path, opening it for reading immediately.
    pub fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        Ok(Self::Referenced { path, file })
    }

    /// Wrap this source so its digest is verified as it is read.
    pub fn with_checksum(self, algorithm: DigestAlgorithm, expected: impl Into<String>) -> Self {
        Self::Checksummed(ChecksummedSource {
            inner: Box::new(self),
            algorithm,
            expected: expected.into(),
            hasher: Some(algorithm.hasher()),
        })
    }

    /// The filesystem path behind this source, if it is file-backed.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Inline(_) => None,
            Self::Referenced { path, .. } => Some(path),
            Self::Checksummed(wrapped) => wrapped.inner.path(),
        }
    }

    /// Drain the source to its end, verifying any checksum wrappers.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Inline(cursor) => cursor.read(buf),
            Self::Referenced { file, .. } => file.read(buf),
            Self::Checksummed(wrapped) => wrapped.read(buf),
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(cursor) => write!(f, "ByteSource::Inline({} bytes)", cursor.get_ref().len()),
            Self::Referenced { path, .. } => write!(f, "ByteSource::Referenced({})", path.display()),
            Self::Checksummed(wrapped) => write!(
                f,
                "ByteSource::Checksummed({} {}, {:?})",
                wrapped.algorithm, wrapped.expected, wrapped.inner
            ),
        }
    }
}

/// Digest-verifying wrapper over another [`ByteSource`].
pub struct ChecksummedSource {
    inner: Box<ByteSource>,
    algorithm: DigestAlgorithm,
    expected: String,
    // Taken at end-of-stream so verification runs exactly once.
    hasher: Option<DigestHasher>,
}

impl Read for ChecksummedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            if let Some(hasher) = self.hasher.as_mut() {
                hasher.update(&buf[..n]);
            }
            return Ok(n);
        }
        if let Some(hasher) = self.hasher.take() {
            let actual = hasher.finalize_hex();
            if !actual.eq_ignore_ascii_case(self.expected.trim()) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    FixityMismatch {
                        algorithm: self.algorithm,
                        expected: self.expected.trim().to_ascii_lowercase(),
                        actual,
                    },
                ));
            }
        }
        Ok(0)
    }
}

/// Payload of the I/O error a [`ChecksummedSource`] raises at end-of-stream
/// when the computed digest differs from the declared one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixityMismatch {
    pub algorithm: DigestAlgorithm,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for FixityMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fixity check failed: expected {} {}, got {}",
            self.algorithm, self.expected, self.actual
        )
    }
}

impl std::error::Error for FixityMismatch {}

/// A (name, byte source) pair staged for ingestion.
#[derive(Debug)]
pub struct FileEntry {
    pub name: String,
    pub source: ByteSource,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, source: ByteSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn inline_reads_all_bytes() {
        let mut source = ByteSource::inline(&b"hello world"[..]);
        assert_eq!(source.read_to_vec().unwrap(), b"hello world");
    }

    #[test]
    fn referenced_reads_file_contents() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"on disk").unwrap();
        let mut source = ByteSource::from_path(tmp.path()).unwrap();
        assert_eq!(source.path(), Some(tmp.path()));
        assert_eq!(source.read_to_vec().unwrap(), b"on disk");
    }

    #[test]
    fn from_path_missing_file_fails() {
        let err = ByteSource::from_path("/definitely/not/here.bin").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn checksum_match_passes() {
        let digest = DigestAlgorithm::Md5.hash_hex(b"abc");
        let mut source =
            ByteSource::inline(&b"abc"[..]).with_checksum(DigestAlgorithm::Md5, digest);
        assert_eq!(source.read_to_vec().unwrap(), b"abc");
    }

    #[test]
    fn checksum_is_case_insensitive() {
        let digest = DigestAlgorithm::Md5.hash_hex(b"abc").to_ascii_uppercase();
        let mut source =
            ByteSource::inline(&b"abc"[..]).with_checksum(DigestAlgorithm::Md5, digest);
        assert!(source.read_to_vec().is_ok());
    }

    #[test]
    fn checksum_mismatch_fails_at_end_of_stream() {
        let mut source = ByteSource::inline(&b"abc"[..])
            .with_checksum(DigestAlgorithm::Md5, "00000000000000000000000000000000");
        let err = source.read_to_vec().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let mismatch = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<FixityMismatch>())
            .expect("mismatch payload");
        assert_eq!(mismatch.expected, "00000000000000000000000000000000");
        assert_eq!(mismatch.actual, DigestAlgorithm::Md5.hash_hex(b"abc"));
    }

    #[test]
    fn double_wrapped_sources_both_verify() {
        let md5 = DigestAlgorithm::Md5.hash_hex(b"xyz");
        let sha = DigestAlgorithm::Sha256.hash_hex(b"xyz");
        let mut source = ByteSource::inline(&b"xyz"[..])
            .with_checksum(DigestAlgorithm::Md5, md5)
            .with_checksum(DigestAlgorithm::Sha256, sha);
        assert_eq!(source.read_to_vec().unwrap(), b"xyz");
    }

    #[test]
    fn double_wrap_inner_mismatch_still_fails() {
        let sha = DigestAlgorithm::Sha256.hash_hex(b"xyz");
        let mut source = ByteSource::inline(&b"xyz"[..])
            .with_checksum(DigestAlgorithm::Md5, "0000")
            .with_checksum(DigestAlgorithm::Sha256, sha);
        assert!(source.read_to_vec().is_err());
    }

    #[test]
    fn verification_runs_once() {
        let digest = DigestAlgorithm::Md5.hash_hex(b"abc");
        let mut source =
            ByteSource::inline(&b"abc"[..]).with_checksum(DigestAlgorithm::Md5, digest);
        source.read_to_vec().unwrap();
        // Reads past end-of-stream stay Ok(0); no second verification.
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn checksummed_path_delegates_to_inner() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let source = ByteSource::from_path(tmp.path())
            .unwrap()
            .with_checksum(DigestAlgorithm::Md5, "irrelevant");
        assert_eq!(source.path(), Some(tmp.path()));
    }
}
