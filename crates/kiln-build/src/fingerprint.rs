//! Build number computation
//!
//! The build number is a SHA-256 over the per-file SHA-256 digests, taken in
//! collection order. It depends only on file contents and their order.

use crate::error::{BuildError, BuildResult};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// SHA-256 of a file's contents
pub fn file_digest(path: &Path) -> BuildResult<[u8; 32]> {
    let mut file = File::open(path).map_err(|e| BuildError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| BuildError::io(path, e))?;
    Ok(hasher.finalize().into())
}

/// Hex-encoded hash of hashes over `files`
pub fn build_number(files: &[PathBuf]) -> BuildResult<String> {
    let digests = files
        .par_iter()
        .map(|path| file_digest(path))
        .collect::<BuildResult<Vec<_>>>()?;

    let mut hasher = Sha256::new();
    for digest in &digests {
        hasher.update(digest);
    }
    Ok(hex::encode(hasher.finalize()))
}
