use reelsmith_core::captions::load_words;
use reelsmith_core::types::Stage;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::Result;

/// A temporary file next to `dest`, with the same extension so encoders
/// pick the right container. Dropping it removes the file.
pub fn staging_file(dest: &Path) -> Result<NamedTempFile> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = dest
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix(&format!(".{stem}."))
        .suffix(&suffix)
        .tempfile_in(dir)?;
    Ok(file)
}

/// Write `bytes` to `dest` through a temp file and rename.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = staging_file(dest)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(dest)?;
    Ok(())
}

/// Size and SHA-256 (lowercase hex) of a file.
pub fn hash_file(path: &Path) -> Result<(u64, String)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut bytes = 0u64;
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        bytes += read as u64;
        hasher.update(&buffer[..read]);
    }
    Ok((bytes, format!("{:x}", hasher.finalize())))
}

/// Whether `path` holds a usable artifact for `stage`: present, non-empty,
/// and for the word list, parseable.
pub fn is_valid_artifact(stage: Stage, path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() || meta.len() == 0 {
        return false;
    }
    match stage {
        Stage::Transcript => load_words(path).is_ok(),
        _ => true,
    }
}
