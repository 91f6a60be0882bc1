//! Corpus fingerprinting.
//!
//! One SHA-256 digest over the concatenated bytes of every eligible file,
//! visited in sorted file-name order. File names and metadata do not
//! contribute, only content and order. Files are streamed in fixed-size
//! reads so large documents are never held in memory.
//!
//! A file that is not valid UTF-8 counts as unreadable, matching the
//! loader, which cannot index it either.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::DocumentsConfig;
use crate::loader::{self, DocumentFile};
use crate::models::CorpusFingerprint;

const READ_BUF_SIZE: usize = 4096;

/// Fingerprint the documents directory.
///
/// # Errors
///
/// Only when the directory cannot be listed. Individual unreadable files
/// are logged and reported in [`CorpusFingerprint::skipped`].
pub fn fingerprint_dir(config: &DocumentsConfig) -> Result<CorpusFingerprint> {
    let files = loader::discover(config)?;
    Ok(fingerprint_files(&files))
}

/// Fingerprint an already discovered, sorted file list.
pub fn fingerprint_files(files: &[DocumentFile]) -> CorpusFingerprint {
    let mut hasher = Sha256::new();
    let mut files_hashed = 0;
    let mut skipped = Vec::new();

    for file in files {
        // Bytes of a file that fails midway are discarded, so a partial
        // read never leaks into the digest.
        let mut file_hasher = hasher.clone();
        match stream_into(&file.path, &mut file_hasher) {
            Ok(bytes) => {
                debug!(file = %file.name, bytes, "hashed");
                hasher = file_hasher;
                files_hashed += 1;
            }
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "could not hash file, skipping");
                skipped.push(file.name.clone());
            }
        }
    }

    CorpusFingerprint {
        digest: format!("{:x}", hasher.finalize()),
        files_hashed,
        skipped,
    }
}

fn stream_into(path: &Path, hasher: &mut Sha256) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut total = 0u64;
    // Tail of a multi-byte character cut by the read boundary.
    let mut pending: Vec<u8> = Vec::with_capacity(READ_BUF_SIZE + 4);

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            if !pending.is_empty() {
                return Err(not_utf8());
            }
            return Ok(total);
        }
        hasher.update(&buf[..n]);
        total += n as u64;

        pending.extend_from_slice(&buf[..n]);
        match std::str::from_utf8(&pending) {
            Ok(_) => pending.clear(),
            Err(e) if e.error_len().is_none() => {
                pending.drain(..e.valid_up_to());
            }
            Err(_) => return Err(not_utf8()),
        }
    }
}

fn not_utf8() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "stream did not contain valid UTF-8")
}
