//! Open file handles.
//!
//! A [`FileHandle`] owns exactly one host descriptor from open (or create)
//! until [`FileHandle::release`]. Release consumes the handle, so using it
//! afterwards does not compile; dropping an unreleased handle still closes
//! the descriptor, but only an explicit release reports a close failure.
//!
//! Opens refuse a final symlink component (`O_NOFOLLOW`).

use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{IntoRawFd, RawFd};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use rustix::fs::OFlags;

use crate::error::{VfsError, VfsResult};
use crate::node::{FileNode, Node};
use crate::resolve;
use crate::types::OpenFlags;

/// What a handle was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Opened for reading only.
    ReadOnly,
    /// Opened with write, append or truncate requested.
    ReadWrite,
}

/// An open mirrored file.
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    file: File,
    mode: AccessMode,
}

impl FileHandle {
    /// Open an existing file for reading.
    pub fn open_for_read(path: &Path) -> VfsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(no_follow())
            .open(path)
            .map_err(|e| VfsError::from_io(e, path))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mode: AccessMode::ReadOnly,
        })
    }

    /// Open an existing file with the caller's access flags, unchanged.
    ///
    /// The file's permission bits are left as they are.
    pub fn open_for_read_write(path: &Path, flags: OpenFlags) -> VfsResult<Self> {
        let file = OpenOptions::new()
            .read(flags.read)
            .write(flags.write)
            .append(flags.append)
            .truncate(flags.truncate)
            .custom_flags(no_follow())
            .open(path)
            .map_err(|e| VfsError::from_io(e, path))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mode: AccessMode::ReadWrite,
        })
    }

    /// Create `parent/name` and open it read-write.
    ///
    /// The create is exclusive (`O_CREAT | O_EXCL`): an existing entry fails
    /// with `AlreadyExists` and there is no window in which two creators
    /// both succeed. `mode` goes to the host as-is, so the umask applies.
    pub fn create_and_open(
        parent: &Path,
        name: impl AsRef<OsStr>,
        mode: u32,
    ) -> VfsResult<(Node, Self)> {
        let name = name.as_ref();
        resolve::validate_name(name)?;
        let path = parent.join(name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&path)
            .map_err(|e| VfsError::from_io(e, &path))?;

        let node = Node::File(FileNode::new(path.clone()));
        let handle = Self {
            path,
            file,
            mode: AccessMode::ReadWrite,
        };
        Ok((node, handle))
    }

    /// Real path this handle was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Access mode chosen at open.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Read up to `size` bytes at `offset`.
    ///
    /// Positional: the descriptor's own offset is neither used nor moved.
    /// Returns fewer bytes at end of file and nothing past it.
    pub fn read_at(&self, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let mut buffer = vec![0u8; size as usize];
        let mut filled = 0;

        while filled < buffer.len() {
            let at = offset.saturating_add(filled as u64);
            match self.file.read_at(&mut buffer[filled..], at) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(VfsError::from_io(e, &self.path)),
            }
        }

        buffer.truncate(filled);
        Ok(buffer)
    }

    /// Write `data` at `offset` with a single host write.
    ///
    /// Returns the host's count, which may be less than `data.len()`. The
    /// caller retries the remainder.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> VfsResult<u32> {
        if data.len() > u32::MAX as usize {
            return Err(VfsError::invalid(format!("write of {} bytes", data.len())));
        }
        let written = self
            .file
            .write_at(data, offset)
            .map_err(|e| VfsError::from_io(e, &self.path))?;
        Ok(written as u32)
    }

    /// Close a duplicate of the descriptor, so errors the host defers to
    /// close time (network filesystems, quota) surface here. The handle
    /// stays open.
    pub fn flush(&self) -> VfsResult<()> {
        let dup = self
            .file
            .try_clone()
            .map_err(|e| VfsError::from_io(e, &self.path))?;
        close_fd(dup.into_raw_fd(), &self.path)
    }

    /// Sync to storage; data only when `datasync` is set.
    pub fn fsync(&self, datasync: bool) -> VfsResult<()> {
        let result = if datasync {
            self.file.sync_data()
        } else {
            self.file.sync_all()
        };
        result.map_err(|e| VfsError::from_io(e, &self.path))
    }

    /// Close the descriptor and report the host's close result.
    pub fn release(self) -> VfsResult<()> {
        let Self { path, file, .. } = self;
        close_fd(file.into_raw_fd(), &path)
    }
}

fn no_follow() -> i32 {
    OFlags::NOFOLLOW.bits() as i32
}

/// Close an owned descriptor exactly once. The fd is gone afterwards even
/// when the host reports an error.
fn close_fd(fd: RawFd, path: &Path) -> VfsResult<()> {
    // SAFETY: callers pass a descriptor taken out of an owned `File`, so no
    // other owner will close or reuse it.
    if unsafe { libc::close(fd) } == -1 {
        return Err(VfsError::from_io(io::Error::last_os_error(), path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeOps;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::write(&path, b"hello world").unwrap();
        (dir, path)
    }

    #[test]
    fn test_partial_read() {
        let (_dir, path) = setup();
        let handle = FileHandle::open_for_read(&path).unwrap();

        assert_eq!(handle.read_at(6, 5).unwrap(), b"world");
        assert_eq!(handle.read_at(0, 5).unwrap(), b"hello");
        assert_eq!(handle.mode(), AccessMode::ReadOnly);
    }

    #[test]
    fn test_read_clamps_at_eof() {
        let (_dir, path) = setup();
        let handle = FileHandle::open_for_read(&path).unwrap();

        assert_eq!(handle.read_at(6, 100).unwrap(), b"world");
        assert!(handle.read_at(11, 10).unwrap().is_empty());
        assert!(handle.read_at(1000, 10).unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = FileHandle::open_for_read(&dir.path().join("missing"));
        assert!(matches!(result, Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_write_at_offset() {
        let (_dir, path) = setup();
        let handle = FileHandle::open_for_read_write(&path, OpenFlags::read_write()).unwrap();

        assert_eq!(handle.write_at(6, b"rusty").unwrap(), 5);
        handle.release().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello rusty");
    }

    #[test]
    fn test_open_truncate_and_append() {
        let (_dir, path) = setup();

        let handle =
            FileHandle::open_for_read_write(&path, OpenFlags::read_write().with_truncate())
                .unwrap();
        handle.release().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"");

        std::fs::write(&path, b"log:").unwrap();
        let handle =
            FileHandle::open_for_read_write(&path, OpenFlags::write_only().with_append()).unwrap();
        handle.write_at(0, b"one").unwrap();
        handle.release().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"log:one");
    }

    #[test]
    fn test_open_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, path) = setup();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o604)).unwrap();

        let handle = FileHandle::open_for_read_write(&path, OpenFlags::read_write()).unwrap();
        handle.release().unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o604);
    }

    #[test]
    fn test_create_and_open() {
        let dir = TempDir::new().unwrap();
        let (node, handle) = FileHandle::create_and_open(dir.path(), "new.txt", 0o644).unwrap();

        assert!(node.is_file());
        assert_eq!(node.path(), dir.path().join("new.txt"));
        assert_eq!(handle.write_at(0, b"data").unwrap(), 4);
        assert_eq!(handle.read_at(0, 16).unwrap(), b"data");
        handle.fsync(true).unwrap();
        handle.flush().unwrap();
        handle.release().unwrap();

        assert_eq!(std::fs::read(dir.path().join("new.txt")).unwrap(), b"data");
    }

    #[test]
    fn test_create_existing_fails() {
        let (dir, _path) = setup();
        let result = FileHandle::create_and_open(dir.path(), "test.txt", 0o644);
        assert!(matches!(result, Err(VfsError::AlreadyExists(_))));
        // Exclusive create must not have clobbered the file.
        assert_eq!(std::fs::read(dir.path().join("test.txt")).unwrap(), b"hello world");
    }

    #[test]
    fn test_create_rejects_bad_name() {
        let dir = TempDir::new().unwrap();
        let result = FileHandle::create_and_open(dir.path(), "../escape", 0o644);
        assert!(matches!(result, Err(VfsError::Invalid(_))));
    }

    #[test]
    fn test_close_error_is_reported() {
        let err = close_fd(-1, Path::new("/mirror/f")).unwrap_err();
        assert!(matches!(err, VfsError::Io(_)));
        assert_eq!(err.errno(), rustix::io::Errno::BADF);
    }

    #[test]
    fn test_flush_keeps_handle_open() {
        let (_dir, path) = setup();
        let handle = FileHandle::open_for_read_write(&path, OpenFlags::read_write()).unwrap();

        handle.write_at(0, b"HELLO").unwrap();
        handle.flush().unwrap();
        handle.flush().unwrap();
        assert_eq!(handle.read_at(0, 11).unwrap(), b"HELLO world");
        handle.release().unwrap();
    }

    #[test]
    fn test_open_refuses_symlink() {
        let (dir, path) = setup();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&path, &link).unwrap();

        assert!(FileHandle::open_for_read(&link).is_err());
        let truncating = OpenFlags::write_only().with_truncate();
        assert!(FileHandle::open_for_read_write(&link, truncating).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }
}
