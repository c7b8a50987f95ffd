//! Utility functions

use crate::error::{Result, ThumbError};
use std::ffi::OsStr;
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Calculate checksum (CRC32) for data
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFFu32;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}

/// Verify checksum
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    calculate_checksum(data) == expected
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Index of the middle element of a list of `len` items (`len / 2`, integer division)
pub fn middle_index(len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(len / 2)
    }
}

/// Files of a directory, sorted by name
///
/// Hidden entries (leading `.`) and subdirectories are skipped. Symlinks are
/// followed, so linked planes are listed and dangling links are not. A
/// missing directory is reported as `NotFound`.
pub async fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut read_dir = match fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ThumbError::NotFound(format!(
                "slice directory {} does not exist",
                dir.display()
            )))
        }
        Err(e) => return Err(ThumbError::Io(e)),
    };

    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        if is_hidden(&entry.file_name()) {
            continue;
        }
        let path = entry.path();
        if is_regular_file(fs::metadata(&path).await)? {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

/// Blocking variant of [`sorted_files`] for use inside worker threads
pub fn sorted_files_blocking(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ThumbError::NotFound(format!(
                "slice directory {} does not exist",
                dir.display()
            )))
        }
        Err(e) => return Err(ThumbError::Io(e)),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if is_hidden(&entry.file_name()) {
            continue;
        }
        let path = entry.path();
        if is_regular_file(std::fs::metadata(&path))? {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Interpret followed metadata; a dangling link is not a file
fn is_regular_file(metadata: std::io::Result<Metadata>) -> Result<bool> {
    match metadata {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ThumbError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_checksum() {
        let data = b"Hello, world!";
        let checksum = calculate_checksum(data);
        assert!(verify_checksum(data, checksum));
        assert!(!verify_checksum(data, checksum + 1));
        // Standard CRC32 check value
        assert_eq!(calculate_checksum(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }

    #[test]
    fn test_middle_index_uses_integer_division() {
        let five = ["s0", "s1", "s2", "s3", "s4"];
        assert_eq!(middle_index(five.len()).map(|i| five[i]), Some("s2"));
        assert_eq!(middle_index(4), Some(2));
        assert_eq!(middle_index(1), Some(0));
        assert_eq!(middle_index(0), None);
    }

    #[tokio::test]
    async fn test_sorted_files() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["s2.tif", "s0.tif", "s1.tif", ".hidden"] {
            std::fs::write(temp_dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(temp_dir.path().join("nested")).unwrap();

        let files = sorted_files(temp_dir.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["s0.tif", "s1.tif", "s2.tif"]);
        assert_eq!(sorted_files_blocking(temp_dir.path()).unwrap(), files);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sorted_files_follows_symlinks() {
        let planes = TempDir::new().unwrap();
        let linked = TempDir::new().unwrap();
        for name in ["a.tif", "b.tif", "c.tif"] {
            let target = planes.path().join(name);
            std::fs::write(&target, b"x").unwrap();
            std::os::unix::fs::symlink(&target, linked.path().join(name)).unwrap();
        }
        std::os::unix::fs::symlink(
            planes.path().join("gone.tif"),
            linked.path().join("dangling.tif"),
        )
        .unwrap();

        let files = sorted_files(linked.path()).await.unwrap();
        assert_eq!(
            files,
            vec![
                linked.path().join("a.tif"),
                linked.path().join("b.tif"),
                linked.path().join("c.tif"),
            ]
        );
        assert_eq!(sorted_files_blocking(linked.path()).unwrap(), files);
    }

    #[tokio::test]
    async fn test_sorted_files_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let err = sorted_files(&temp_dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, ThumbError::NotFound(_)));
    }
}
