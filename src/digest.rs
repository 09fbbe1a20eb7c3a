//! Streaming MD5 digest over arbitrary file paths.
//!
//! The file is read in 1 MiB chunks and fed to a streaming MD5 so the whole
//! file is never loaded into memory. The chunked-read loop is synchronous
//! and runs inside `spawn_blocking`, since large avatar bundles (gigabytes)
//! would otherwise stall the async reactor.

use md5::{Digest, Md5};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::IoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub bytes: [u8; 16],
    pub size: u64,
}

impl FileDigest {
    pub fn hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.bytes)
    }
}

const CHUNK_SIZE: usize = 1024 * 1024;

/// Compute the MD5 digest and byte size of a file without loading it
/// entirely into memory.
pub async fn md5_file(path: impl AsRef<Path>) -> Result<FileDigest, IoError> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || md5_file_blocking(&path))
        .await
        .expect("digest task panicked")
}

fn md5_file_blocking(path: &PathBuf) -> Result<FileDigest, IoError> {
    let mut file = std::fs::File::open(path).map_err(|e| IoError::at(path, e))?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut size: u64 = 0;

    loop {
        let n = file.read(&mut buf).map_err(|e| IoError::at(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    let bytes: [u8; 16] = hasher.finalize().into();
    Ok(FileDigest { bytes, size })
}
