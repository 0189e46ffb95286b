//! Host status to [`FileAttr`] translation.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{VfsError, VfsResult};
use crate::types::{FileAttr, FileType};

/// Query host status for `path` and translate it.
///
/// Symlinks are not followed. Fails with `NotFound` if the path is gone
/// by the time the status query runs.
pub fn translate(path: &Path) -> VfsResult<FileAttr> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| VfsError::from_io(e, path))?;
    Ok(from_metadata(&meta))
}

/// Convert host metadata to a [`FileAttr`], copying every field verbatim.
pub fn from_metadata(meta: &Metadata) -> FileAttr {
    FileAttr {
        ino: meta.ino(),
        kind: file_type(meta),
        size: meta.size(),
        mode: meta.mode(),
        nlink: meta.nlink(),
        uid: meta.uid(),
        gid: meta.gid(),
        atime: unix_time(meta.atime(), meta.atime_nsec()),
        mtime: unix_time(meta.mtime(), meta.mtime_nsec()),
        ctime: unix_time(meta.ctime(), meta.ctime_nsec()),
    }
}

/// Map host metadata onto the bridge's two node kinds.
pub fn file_type(meta: &Metadata) -> FileType {
    if meta.is_dir() {
        FileType::Directory
    } else {
        FileType::File
    }
}

// Raw stat timestamps, so pre-epoch times survive instead of failing.
fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_translate_file_matches_host() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hi").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let attr = translate(&path).unwrap();
        let host = std::fs::metadata(&path).unwrap();

        assert_eq!(attr.kind, FileType::File);
        assert_eq!(attr.size, 2);
        assert_eq!(attr.ino, host.ino());
        assert_eq!(attr.mode, host.mode());
        assert_eq!(attr.perm(), 0o640);
        assert_eq!(attr.mtime, host.modified().unwrap());
    }

    #[test]
    fn test_translate_directory() {
        let dir = TempDir::new().unwrap();
        let attr = translate(dir.path()).unwrap();
        assert!(attr.is_dir());
        assert!(attr.nlink >= 2);
    }

    #[test]
    fn test_translate_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = translate(&dir.path().join("nope"));
        assert!(matches!(result, Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_unix_time_handles_pre_epoch() {
        let t = unix_time(-1, 500_000_000);
        assert_eq!(UNIX_EPOCH.duration_since(t).unwrap(), Duration::from_millis(500));
    }
}
