//! Directory enumeration.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::attr;
use crate::error::{VfsError, VfsResult};
use crate::types::DirEntry;

/// One pass over a host directory.
///
/// Entries come out in host enumeration order, unsorted. The inode of each
/// child is taken from a status query rather than from the enumeration
/// record. The iterator cannot be restarted; list the directory again for a
/// fresh view.
#[derive(Debug)]
pub struct ReadDir {
    dir: PathBuf,
    inner: fs::ReadDir,
}

impl Iterator for ReadDir {
    type Item = VfsResult<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(VfsError::from_io(e, &self.dir))),
            };

            let path = entry.path();
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // Removed since enumeration; it is no longer a child.
                    debug!(path = %path.display(), "entry vanished during readdir");
                    continue;
                }
                Err(e) => return Some(Err(VfsError::from_io(e, &path))),
            };
            if meta.file_type().is_symlink() {
                debug!(path = %path.display(), "skipping symlink");
                continue;
            }

            let kind = attr::file_type(&meta);
            return Some(Ok(DirEntry::new(entry.file_name(), meta.ino(), kind)));
        }
    }
}

/// Start enumerating `dir`.
pub fn list(dir: &Path) -> VfsResult<ReadDir> {
    let inner = fs::read_dir(dir).map_err(|e| VfsError::from_io(e, dir))?;
    Ok(ReadDir {
        dir: dir.to_path_buf(),
        inner,
    })
}
