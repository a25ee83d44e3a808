//! Streaming file comparison for plain (non dictionary-like) outputs.

use crate::error::{Result, ResultExt as _};
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{BufReader, Read as _};
use std::path::Path;

/// Buffer size for streaming file reads (8 KB).
const BUFFER_SIZE: usize = 8192;

/// Compute the SHA-256 of a file without loading it into memory.
///
/// Returns the digest as a lowercase hexadecimal string.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether two files have identical contents.
///
/// Sizes are compared first so differing files of different length are
/// never read.
pub fn files_identical(golden: &Path, candidate: &Path) -> Result<bool> {
    let golden_len = std::fs::metadata(golden)
        .with_context(|| format!("Failed to stat {}", golden.display()))?
        .len();
    let candidate_len = std::fs::metadata(candidate)
        .with_context(|| format!("Failed to stat {}", candidate.display()))?
        .len();

    if golden_len != candidate_len {
        tracing::debug!(
            "{} is {golden_len} bytes, {} is {candidate_len} bytes",
            golden.display(),
            candidate.display()
        );
        return Ok(false);
    }

    Ok(compute_file_hash(golden)? == compute_file_hash(candidate)?)
}
