//! The bridge entry point.
//!
//! [`MirrorFs`] binds a validated mirrored root to the operation set a
//! kernel transport calls: one method per request, each returning its own
//! `VfsResult`. Nothing here is fatal to the process except construction.
//!
//! Open files are named by [`HandleId`]s handed out from a concurrent table.
//! A handle is inserted only once its descriptor is fully open, so an
//! abandoned request never leaves a half-registered handle behind.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::MirrorConfig;
use crate::error::{VfsError, VfsResult};
use crate::handle::FileHandle;
use crate::mutate;
use crate::node::{DirNode, FileNode, Node, NodeOps};
use crate::types::{DirEntry, FileAttr, OpenFlags, SetAttr, StatFs};

/// Transport-visible name for an open handle. Never reused.
pub type HandleId = u64;

/// A filesystem mirroring one host directory.
///
/// `Send + Sync`; requests may arrive on any number of threads. The bridge
/// adds no locking around host I/O.
#[derive(Debug)]
pub struct MirrorFs {
    config: MirrorConfig,
    root: PathBuf,
    handles: DashMap<HandleId, Arc<FileHandle>>,
    next_handle: AtomicU64,
}

impl MirrorFs {
    /// Validate the mirrored root and build the bridge.
    ///
    /// The root is canonicalized here, once. A missing root or one that is
    /// not a directory is a startup failure.
    pub fn new(config: MirrorConfig) -> VfsResult<Self> {
        let root = config
            .root
            .canonicalize()
            .map_err(|e| VfsError::from_io(e, &config.root))?;
        if !root.is_dir() {
            return Err(VfsError::not_a_directory(root.display().to_string()));
        }

        info!(
            root = %root.display(),
            fs_name = %config.fs_name,
            subtype = %config.subtype,
            read_only = config.read_only,
            "mirrored root ready"
        );

        Ok(Self {
            config,
            root,
            handles: DashMap::new(),
            next_handle: AtomicU64::new(1),
        })
    }

    /// Mount configuration, including the reported name and subtype.
    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Canonical host path of the mirrored root.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// True if mutating requests are refused.
    pub fn read_only(&self) -> bool {
        self.config.read_only
    }

    fn check_writable(&self) -> VfsResult<()> {
        if self.config.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// The root directory node.
    pub fn root(&self) -> DirNode {
        DirNode::new(self.root.clone())
    }

    /// Fresh host attributes for `node`.
    pub fn getattr(&self, node: &Node) -> VfsResult<FileAttr> {
        debug!(path = %node.path().display(), "getattr");
        node.getattr()
    }

    /// Resolve a child of `dir` by exact name.
    pub fn lookup(&self, dir: &DirNode, name: impl AsRef<OsStr>) -> VfsResult<Node> {
        let name = name.as_ref();
        debug!(path = %dir.path().display(), ?name, "lookup");
        dir.lookup(name)
    }

    /// List `dir` in host order. Fails as a whole if any entry fails.
    pub fn readdir(&self, dir: &DirNode) -> VfsResult<Vec<DirEntry>> {
        debug!(path = %dir.path().display(), "readdir");
        dir.readdir()
    }

    /// Resolve a `/`-separated path relative to the root by successive
    /// lookups. Empty and `.` segments are skipped; `..` is refused.
    pub fn walk(&self, path: &str) -> VfsResult<Node> {
        let mut node = Node::Dir(self.root());
        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(VfsError::path_escapes_root(path)),
                name => {
                    let dir = node.into_dir()?;
                    node = self.lookup(&dir, name)?;
                }
            }
        }
        Ok(node)
    }

    // ========================================================================
    // Handles
    // ========================================================================

    fn register(&self, handle: FileHandle) -> HandleId {
        let fh = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(fh, Arc::new(handle));
        fh
    }

    fn handle(&self, fh: HandleId) -> VfsResult<Arc<FileHandle>> {
        self.handles
            .get(&fh)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(VfsError::BadHandle(fh))
    }

    /// Number of handles opened and not yet released.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Open `file` and register the handle.
    pub fn open(&self, file: &FileNode, flags: OpenFlags) -> VfsResult<HandleId> {
        if flags.is_mutating() {
            self.check_writable()?;
        }
        let handle = file.open(flags)?;
        let fh = self.register(handle);
        debug!(path = %file.path().display(), fh, ?flags, "open");
        Ok(fh)
    }

    /// Read up to `size` bytes at `offset`.
    pub fn read(&self, fh: HandleId, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        debug!(fh, offset, size, "read");
        self.handle(fh)?.read_at(offset, size)
    }

    /// One positional write; returns the host's byte count.
    pub fn write(&self, fh: HandleId, offset: u64, data: &[u8]) -> VfsResult<u32> {
        debug!(fh, offset, size = data.len(), "write");
        self.check_writable()?;
        self.handle(fh)?.write_at(offset, data)
    }

    /// Report deferred write errors for the handle without closing it.
    pub fn flush(&self, fh: HandleId) -> VfsResult<()> {
        self.handle(fh)?.flush()
    }

    /// Sync the handle's file to storage.
    pub fn fsync(&self, fh: HandleId, datasync: bool) -> VfsResult<()> {
        self.handle(fh)?.fsync(datasync)
    }

    /// Release a handle. Releasing an id twice fails with `BadHandle` and
    /// leaves every other handle alone.
    pub fn release(&self, fh: HandleId) -> VfsResult<()> {
        let (_, handle) = self.handles.remove(&fh).ok_or(VfsError::BadHandle(fh))?;
        debug!(fh, path = %handle.path().display(), "release");
        match Arc::try_unwrap(handle) {
            Ok(handle) => handle.release(),
            // An in-flight read or write still holds it; the descriptor
            // closes when that call returns.
            Err(_) => Ok(()),
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Exclusively create `name` in `dir` and open it read-write.
    pub fn create(
        &self,
        dir: &DirNode,
        name: impl AsRef<OsStr>,
        mode: u32,
    ) -> VfsResult<(Node, HandleId)> {
        self.check_writable()?;
        let (node, handle) = FileHandle::create_and_open(dir.path(), name, mode)?;
        let fh = self.register(handle);
        debug!(path = %node.path().display(), fh, mode = format_args!("{mode:o}"), "create");
        Ok((node, fh))
    }

    /// Create directory `name` in `dir`.
    pub fn mkdir(&self, dir: &DirNode, name: impl AsRef<OsStr>, mode: u32) -> VfsResult<Node> {
        self.check_writable()?;
        let name = name.as_ref();
        debug!(path = %dir.path().display(), ?name, mode = format_args!("{mode:o}"), "mkdir");
        mutate::mkdir(dir.path(), name, mode)
    }

    /// Remove the file or empty directory `name` from `dir`.
    pub fn remove(&self, dir: &DirNode, name: impl AsRef<OsStr>) -> VfsResult<()> {
        self.check_writable()?;
        let name = name.as_ref();
        debug!(path = %dir.path().display(), ?name, "remove");
        mutate::remove(dir.path(), name)
    }

    /// Apply every requested attribute change; see [`mutate::setattr`].
    pub fn setattr(&self, node: &Node, changes: &SetAttr) -> VfsResult<()> {
        self.check_writable()?;
        debug!(path = %node.path().display(), ?changes, "setattr");
        mutate::setattr(node.path(), changes)
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Host filesystem statistics for the mirrored root.
    pub fn statfs(&self) -> VfsResult<StatFs> {
        let stat = rustix::fs::statvfs(&self.root).map_err(|e| VfsError::Io(e.into()))?;

        Ok(StatFs {
            blocks: stat.f_blocks,
            bfree: stat.f_bfree,
            bavail: stat.f_bavail,
            files: stat.f_files,
            ffree: stat.f_ffree,
            bsize: stat.f_bsize as u32,
            namelen: stat.f_namemax as u32,
            frsize: stat.f_frsize as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (MirrorFs, TempDir) {
        let dir = TempDir::new().unwrap();
        let fs = MirrorFs::new(MirrorConfig::new(dir.path())).unwrap();
        (fs, dir)
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let result = MirrorFs::new(MirrorConfig::new(dir.path().join("gone")));
        assert!(matches!(result, Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_new_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"").unwrap();
        let result = MirrorFs::new(MirrorConfig::new(&file));
        assert!(matches!(result, Err(VfsError::NotADirectory(_))));
    }

    #[test]
    fn test_double_release_is_bad_handle() {
        let (fs, _dir) = setup();
        let (_, a) = fs.create(&fs.root(), "a", 0o644).unwrap();
        let (_, b) = fs.create(&fs.root(), "b", 0o644).unwrap();
        assert_ne!(a, b);

        fs.release(a).unwrap();
        assert!(matches!(fs.release(a), Err(VfsError::BadHandle(id)) if id == a));
        assert!(matches!(fs.read(a, 0, 1), Err(VfsError::BadHandle(_))));

        // The other handle is untouched.
        assert_eq!(fs.write(b, 0, b"ok").unwrap(), 2);
        fs.release(b).unwrap();
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_handle_ids_not_reused() {
        let (fs, dir) = setup();
        std::fs::write(dir.path().join("f"), b"x").unwrap();
        let file = fs.walk("f").unwrap().into_file().unwrap();

        let first = fs.open(&file, OpenFlags::read()).unwrap();
        fs.release(first).unwrap();
        let second = fs.open(&file, OpenFlags::read()).unwrap();
        assert!(second > first);
        fs.release(second).unwrap();
    }

    #[test]
    fn test_walk() {
        let (fs, dir) = setup();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.txt"), b"x").unwrap();

        assert!(fs.walk("").unwrap().is_dir());
        assert!(fs.walk("/a/./b/").unwrap().is_dir());
        assert!(fs.walk("a/b/c.txt").unwrap().is_file());
        assert!(matches!(fs.walk("a/missing"), Err(VfsError::NotFound(_))));
        assert!(matches!(fs.walk("a/b/c.txt/d"), Err(VfsError::NotADirectory(_))));
        assert!(matches!(fs.walk("a/../.."), Err(VfsError::PathEscapesRoot(_))));
    }

    #[test]
    fn test_read_only_rejects_mutations() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f"), b"keep").unwrap();
        let fs = MirrorFs::new(MirrorConfig::new(dir.path()).with_read_only(true)).unwrap();
        let root = fs.root();
        let file = fs.walk("f").unwrap();

        assert!(matches!(fs.create(&root, "n", 0o644), Err(VfsError::ReadOnly)));
        assert!(matches!(fs.mkdir(&root, "d", 0o755), Err(VfsError::ReadOnly)));
        assert!(matches!(fs.remove(&root, "f"), Err(VfsError::ReadOnly)));
        assert!(matches!(
            fs.setattr(&file, &SetAttr::new().with_size(0)),
            Err(VfsError::ReadOnly)
        ));
        let file = file.into_file().unwrap();
        assert!(matches!(
            fs.open(&file, OpenFlags::read_write()),
            Err(VfsError::ReadOnly)
        ));

        let fh = fs.open(&file, OpenFlags::read()).unwrap();
        assert_eq!(fs.read(fh, 0, 16).unwrap(), b"keep");
        assert!(matches!(fs.write(fh, 0, b"x"), Err(VfsError::ReadOnly)));
        fs.release(fh).unwrap();

        assert_eq!(std::fs::read(dir.path().join("f")).unwrap(), b"keep");
    }

    #[test]
    fn test_statfs() {
        let (fs, _dir) = setup();
        let stat = fs.statfs().unwrap();
        assert!(stat.bsize > 0);
        assert!(stat.namelen > 0);
    }

    #[test]
    fn test_concurrent_reads_share_nothing() {
        let (fs, dir) = setup();
        std::fs::write(dir.path().join("f"), b"0123456789").unwrap();
        let file = fs.walk("f").unwrap().into_file().unwrap();
        let fs = Arc::new(fs);

        let threads: Vec<_> = (0..4u64)
            .map(|i| {
                let fs = Arc::clone(&fs);
                let file = file.clone();
                std::thread::spawn(move || {
                    let fh = fs.open(&file, OpenFlags::read()).unwrap();
                    let data = fs.read(fh, i, 2).unwrap();
                    fs.release(fh).unwrap();
                    data
                })
            })
            .collect();

        for (i, thread) in threads.into_iter().enumerate() {
            let expected = &b"0123456789"[i..i + 2];
            assert_eq!(thread.join().unwrap(), expected);
        }
        assert_eq!(fs.open_handles(), 0);
    }
}
