//! Output types and output-file helpers.

use crate::error::{FileWarning, StitchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A finished PDF plus a suggested file name.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub page_count: usize,
}

impl fmt::Debug for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionResult")
            .field("filename", &self.filename)
            .field("page_count", &self.page_count)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Counters for a multi-file conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Files handed to the batch.
    pub total_files: usize,
    /// Files that produced at least one page.
    pub converted_files: usize,
    /// Files recorded as warnings.
    pub failed_files: usize,
    /// Pages in the returned PDF.
    pub page_count: usize,
    /// Wall-clock time for the whole batch.
    pub duration_ms: u64,
}

/// Result of [`crate::convert::convert_batch`]: one PDF plus the files that
/// did not make it into it.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub result: ConversionResult,
    /// Names of the converted files, in input order.
    pub converted: Vec<String>,
    pub warnings: Vec<FileWarning>,
    pub stats: ConversionStats,
}

impl BatchOutput {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// ISO-8601 UTC to the second, with `:` replaced by `-` so the result is
/// safe in file names on every platform.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// `name` with its last extension removed.
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

pub fn merged_filename(now: DateTime<Utc>) -> String {
    format!("merged-{}.pdf", timestamp(now))
}

pub fn converted_filename(source_name: &str, now: DateTime<Utc>) -> String {
    format!("{}-converted-{}.pdf", file_stem(source_name), timestamp(now))
}

pub fn batch_filename(now: DateTime<Utc>) -> String {
    format!("converted-{}.pdf", timestamp(now))
}

/// Write `result` to disk and return the path written.
///
/// `target` may be an existing directory (the suggested file name is used
/// inside it) or a file path. Uses atomic write (temp file + rename) so an
/// interrupted run never leaves a truncated PDF behind.
pub async fn write_result(result: &ConversionResult, target: impl AsRef<Path>) -> Result<PathBuf, StitchError> {
    let target = target.as_ref();
    let path = if tokio::fs::metadata(target)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        target.join(&result.filename)
    } else {
        target.to_path_buf()
    };

    let write_err = |e: std::io::Error| StitchError::OutputWriteFailed {
        path: path.clone(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &result.bytes)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, &path).await.map_err(write_err)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap()
    }

    #[test]
    fn timestamp_is_filename_safe() {
        assert_eq!(timestamp(fixed_now()), "2024-05-01T12-30-45");
    }

    #[test]
    fn stems_drop_last_extension_only() {
        assert_eq!(file_stem("report.docx"), "report");
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(file_stem("README"), "README");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn filenames() {
        let now = fixed_now();
        assert_eq!(merged_filename(now), "merged-2024-05-01T12-30-45.pdf");
        assert_eq!(
            converted_filename("photo.jpg", now),
            "photo-converted-2024-05-01T12-30-45.pdf"
        );
        assert_eq!(batch_filename(now), "converted-2024-05-01T12-30-45.pdf");
    }

    fn result() -> ConversionResult {
        ConversionResult {
            bytes: b"%PDF-1.7 test".to_vec(),
            filename: "out.pdf".into(),
            page_count: 1,
        }
    }

    #[tokio::test]
    async fn write_into_directory_uses_suggested_name() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_result(&result(), dir.path()).await.unwrap();
        assert_eq!(written, dir.path().join("out.pdf"));
        assert_eq!(std::fs::read(&written).unwrap(), b"%PDF-1.7 test");
        assert!(!dir.path().join("out.pdf.tmp").exists());
    }

    #[tokio::test]
    async fn write_to_explicit_path_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/deeper/final.pdf");
        let written = write_result(&result(), &target).await.unwrap();
        assert_eq!(written, target);
        assert!(target.exists());
    }

    #[test]
    fn debug_hides_bytes() {
        let dbg = format!("{:?}", result());
        assert!(dbg.contains("len: 13"), "got: {dbg}");
    }
}
