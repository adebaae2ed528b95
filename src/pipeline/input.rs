//! Input loading: read a user-supplied path into a [`SourceFile`].
//!
//! The library itself never guesses kinds; this is where the CLI (and any
//! caller holding paths rather than bytes) does. Extension first, then the
//! leading magic bytes.

use crate::error::StitchError;
use crate::source::{SourceFile, SourceKind};
use std::path::Path;
use tracing::debug;

/// Read `path` and tag it with a detected kind.
///
/// Returns `Ok(None)` for files whose kind cannot be worked out; the caller
/// decides whether to skip or reject them.
pub async fn load_source(path: impl AsRef<Path>) -> Result<Option<SourceFile>, StitchError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StitchError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    let name = display_name(path);
    let kind = detect_kind(&name, &bytes);
    match kind {
        Some(kind) => {
            debug!("Loaded {} ({}, {} bytes)", name, kind, bytes.len());
            Ok(Some(SourceFile::new(name, kind, bytes)))
        }
        None => {
            debug!("Could not identify {} ({} bytes)", name, bytes.len());
            Ok(None)
        }
    }
}

/// Kind from the file name, falling back to magic bytes.
pub fn detect_kind(name: &str, bytes: &[u8]) -> Option<SourceKind> {
    SourceKind::detect(name, None).or_else(|| SourceKind::sniff(bytes))
}

/// Final path component, or the whole path when there is none.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
