//! Content digests of files.

use std::{
    fs::File,
    io::{Error, ErrorKind, Read, Result},
    path::Path,
};

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    sha2::{Digest, Sha256},
};

/// Size of the chunks files are streamed in.
const CHUNK_SIZE: usize = 64 * 1024;

/// Something that can compute the checksum of a path.
///
/// Called from a blocking thread, one request at a time.
pub trait ChecksumSource: Send + Sync + 'static {
    /// Computes the checksum of `path`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error that prevented reading the file.
    fn checksum(&self, path: &Path) -> Result<String>;
}

/// SHA-256 of the file content, base64 encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileChecksummer;

impl ChecksumSource for FileChecksummer {
    fn checksum(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => hasher.update(&buffer[..read]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        drop(file);

        Ok(STANDARD.encode(hasher.finalize()))
    }
}

/// Whether an error means another process holds the file for now.
#[must_use]
pub fn is_busy(error: &Error) -> bool {
    error.kind() == ErrorKind::ResourceBusy
}
