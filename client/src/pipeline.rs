use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// ISO-8601 UTC with millis, made filename-safe (`:` and `.` become `-`).
fn file_stamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

pub fn snapshot_filename(now: DateTime<Utc>) -> String {
    format!("snapshot_{}.jpg", file_stamp(now))
}

pub fn recording_filename(now: DateTime<Utc>) -> String {
    format!("recording_{}.webm", file_stamp(now))
}

/// Write a snapshot JPEG into `dir`, returning the path written.
pub async fn save_snapshot(dir: &Path, jpeg: &[u8], now: DateTime<Utc>) -> Result<PathBuf, PipelineError> {
    let path = dir.join(snapshot_filename(now));
    tokio::fs::write(&path, jpeg)
        .await
        .map_err(|e| PipelineError::Write(path.clone(), e))?;
    info!(path = %path.display(), bytes = jpeg.len(), "snapshot saved");
    Ok(path)
}

/// Concatenate recorded chunks into one WebM file in `dir`.
pub async fn save_recording(
    dir: &Path,
    chunks: &[Bytes],
    now: DateTime<Utc>,
) -> Result<PathBuf, PipelineError> {
    let path = dir.join(recording_filename(now));
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| PipelineError::Write(path.clone(), e))?;
    let mut total = 0;
    for chunk in chunks {
        file.write_all(chunk)
            .await
            .map_err(|e| PipelineError::Write(path.clone(), e))?;
        total += chunk.len();
    }
    file.flush()
        .await
        .map_err(|e| PipelineError::Write(path.clone(), e))?;
    info!(path = %path.display(), bytes = total, chunks = chunks.len(), "recording saved");
    Ok(path)
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 18, 9, 30, 5).unwrap() + chrono::Duration::milliseconds(42)
    }

    #[test]
    fn filenames_are_stamped_and_safe() {
        assert_eq!(snapshot_filename(at()), "snapshot_2026-02-18T09-30-05-042Z.jpg");
        assert_eq!(recording_filename(at()), "recording_2026-02-18T09-30-05-042Z.webm");

        let name = snapshot_filename(Utc::now());
        let stem = name.strip_suffix(".jpg").unwrap();
        assert!(!stem.contains(':') && !stem.contains('.'));
    }

    #[tokio::test]
    async fn saves_snapshot_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_snapshot(dir.path(), &[0xFF, 0xD8, 0xFF, 0xD9], at()).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "snapshot_2026-02-18T09-30-05-042Z.jpg");
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[tokio::test]
    async fn concatenates_recording_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = vec![
            Bytes::from_static(b"\x1a\x45\xdf\xa3"),
            Bytes::from_static(b"cluster-1"),
            Bytes::from_static(b"cluster-2"),
        ];
        let path = save_recording(dir.path(), &chunks, at()).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"\x1a\x45\xdf\xa3cluster-1cluster-2");
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let err = save_snapshot(Path::new("/nonexistent/dir"), b"x", at()).await;
        assert!(matches!(err, Err(PipelineError::Write(..))));
    }
}
