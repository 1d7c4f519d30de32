//! Fingerprint derivation from media files
//!
//! SHA-256 of the full file content, read in 1MB chunks on a blocking
//! thread, plus the byte size. Duration is supplied by the caller when known.

use crate::db::models::Fingerprint;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

const CHUNK_SIZE: usize = 1024 * 1024;

impl Fingerprint {
    /// Hash a media file into a fingerprint
    ///
    /// An unreadable file is an error; nothing is guessed.
    pub async fn from_file(path: &Path, duration_seconds: Option<f64>) -> Result<Self> {
        let path_buf = path.to_path_buf();
        tracing::debug!(path = %path_buf.display(), "Calculating content hash");

        let (hash, byte_size) = tokio::task::spawn_blocking(move || -> Result<(String, i64)> {
            use std::fs::File;
            use std::io::Read;

            let mut file = File::open(&path_buf).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to open {} for hashing: {}", path_buf.display(), e),
                ))
            })?;

            let mut hasher = Sha256::new();
            let mut buffer = vec![0u8; CHUNK_SIZE];
            let mut total: u64 = 0;

            loop {
                let bytes_read = file.read(&mut buffer).map_err(|e| {
                    Error::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to read {} for hashing: {}", path_buf.display(), e),
                    ))
                })?;

                if bytes_read == 0 {
                    break;
                }

                hasher.update(&buffer[..bytes_read]);
                total += bytes_read as u64;
            }

            let byte_size = i64::try_from(total)
                .map_err(|_| Error::InvalidInput(format!("File too large: {} bytes", total)))?;

            Ok((format!("{:x}", hasher.finalize()), byte_size))
        })
        .await
        .map_err(|e| Error::Internal(format!("Hash calculation task failed: {}", e)))??;

        let duration_seconds = duration_seconds.filter(|d| d.is_finite() && *d >= 0.0);

        Ok(Fingerprint::new(hash, byte_size, duration_seconds))
    }
}
