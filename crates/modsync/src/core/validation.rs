//! Archive integrity verification against catalog metadata
//!
//! A file is valid when it exists, its length equals the expected size, and,
//! when the catalog published one, its MD5 digest matches. Metadata without a
//! hash falls back to a size-only check. That is a weaker guarantee than a
//! digest comparison and is accepted as such: callers must not read more into
//! a passing size-only check.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::core::error::{FileOperation, Result, SyncError};
use crate::core::Modfile;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Size and content digest of a local file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub size: u64,
    /// Lowercase hex MD5
    pub md5: String,
}

impl FileDigest {
    /// Stream a file through MD5 without loading it into memory
    pub async fn compute<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| SyncError::fs(path, FileOperation::Read, e))?;

        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut size = 0u64;

        loop {
            let bytes_read = file
                .read(&mut buffer)
                .await
                .map_err(|e| SyncError::fs(path, FileOperation::Read, e))?;
            if bytes_read == 0 {
                break;
            }
            context.consume(&buffer[..bytes_read]);
            size += bytes_read as u64;
        }

        Ok(Self {
            size,
            md5: format!("{:x}", context.compute()),
        })
    }
}

/// Expected size and optional MD5 of an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileValidation {
    pub expected_size: u64,
    pub md5: Option<String>,
}

impl FileValidation {
    pub fn new(expected_size: u64) -> Self {
        Self {
            expected_size,
            md5: None,
        }
    }

    pub fn with_md5<S: Into<String>>(mut self, md5: S) -> Self {
        self.md5 = Some(md5.into());
        self
    }

    /// Validation parameters published for a modfile
    pub fn for_modfile(modfile: &Modfile) -> Self {
        Self {
            expected_size: modfile.file_size,
            md5: modfile.expected_md5().map(str::to_string),
        }
    }

    /// Validate a file, returning `Ok(false)` for a missing or mismatched file
    ///
    /// Errors are reserved for I/O failures on a file that does exist.
    pub async fn validate_file<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        let path = path.as_ref();
        let file_size = match fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(SyncError::fs(path, FileOperation::Metadata, e)),
        };

        // Size first, it is free
        if file_size != self.expected_size {
            debug!(
                "Size mismatch for {}: expected {}, got {}",
                path.display(),
                self.expected_size,
                file_size
            );
            return Ok(false);
        }

        let Some(expected_md5) = self.md5.as_deref() else {
            return Ok(true);
        };

        let digest = FileDigest::compute(path).await?;
        let passed = digest.size == self.expected_size
            && digest.md5.eq_ignore_ascii_case(expected_md5.trim());
        debug!(
            "MD5 validation for {}: expected={}, actual={}, passed={}",
            path.display(),
            expected_md5,
            digest.md5,
            passed
        );
        Ok(passed)
    }

    /// Infallible form of [`validate_file`](Self::validate_file); I/O errors count as invalid
    pub async fn is_valid<P: AsRef<Path>>(&self, path: P) -> bool {
        match self.validate_file(path).await {
            Ok(valid) => valid,
            Err(e) => {
                debug!("Treating unreadable file as invalid: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CONTENT: &[u8] = b"Hello, World!";
    // md5("Hello, World!")
    const CONTENT_MD5: &str = "65a8e27d8879283831b664bd8b7f0ad4";

    async fn write_file(dir: &Path, content: &[u8]) -> std::path::PathBuf {
        let path = dir.join("archive.zip");
        fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_digest_matches_known_md5() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), CONTENT).await;

        let digest = FileDigest::compute(&path).await.unwrap();
        assert_eq!(digest.size, CONTENT.len() as u64);
        assert_eq!(digest.md5, CONTENT_MD5);
    }

    #[tokio::test]
    async fn test_valid_with_size_and_hash() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), CONTENT).await;

        let validation = FileValidation::new(CONTENT.len() as u64).with_md5(CONTENT_MD5);
        assert!(validation.is_valid(&path).await);
    }

    #[tokio::test]
    async fn test_hash_comparison_ignores_case() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), CONTENT).await;

        let validation =
            FileValidation::new(CONTENT.len() as u64).with_md5(CONTENT_MD5.to_uppercase());
        assert!(validation.is_valid(&path).await);
    }

    #[tokio::test]
    async fn test_single_mutated_byte_is_invalid() {
        let dir = tempdir().unwrap();
        let mut mutated = CONTENT.to_vec();
        mutated[0] ^= 0x01;
        let path = write_file(dir.path(), &mutated).await;

        let validation = FileValidation::new(CONTENT.len() as u64).with_md5(CONTENT_MD5);
        assert!(!validation.is_valid(&path).await);
    }

    #[tokio::test]
    async fn test_wrong_expected_size_is_invalid() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), CONTENT).await;

        let validation = FileValidation::new(CONTENT.len() as u64 + 1).with_md5(CONTENT_MD5);
        assert!(!validation.is_valid(&path).await);
    }

    #[tokio::test]
    async fn test_missing_hash_checks_size_only() {
        let dir = tempdir().unwrap();
        let mut different = CONTENT.to_vec();
        different[3] = b'X';
        let path = write_file(dir.path(), &different).await;

        // Same length, different content: passes without a hash
        assert!(FileValidation::new(CONTENT.len() as u64).is_valid(&path).await);
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_not_error() {
        let dir = tempdir().unwrap();
        let validation = FileValidation::new(1);

        let result = validation.validate_file(dir.path().join("absent.zip")).await;
        assert!(matches!(result, Ok(false)));
    }

    #[tokio::test]
    async fn test_directory_is_invalid() {
        let dir = tempdir().unwrap();
        assert!(!FileValidation::new(0).is_valid(dir.path()).await);
    }
}
