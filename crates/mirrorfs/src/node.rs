//! Mirrored nodes.
//!
//! A node is a real path tagged with its kind, nothing more. It holds no
//! attribute data, so every query goes back to the host. Nodes are built
//! fresh by resolution and dropped when the request is done; there is no
//! node table.
//!
//! Capabilities follow the kind: [`NodeOps`] (getattr) is shared, lookup and
//! readdir exist only on [`DirNode`], open only on [`FileNode`].

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::attr;
use crate::error::{VfsError, VfsResult};
use crate::handle::FileHandle;
use crate::readdir::{self, ReadDir};
use crate::resolve;
use crate::types::{DirEntry, FileAttr, FileType, OpenFlags};

/// Operations every node supports.
pub trait NodeOps {
    /// Real path on the host.
    fn path(&self) -> &Path;

    /// Node kind as observed at resolution time.
    fn kind(&self) -> FileType;

    /// Fresh attributes from the host.
    fn getattr(&self) -> VfsResult<FileAttr> {
        attr::translate(self.path())
    }
}

/// A mirrored directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirNode {
    path: PathBuf,
}

impl DirNode {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Resolve a child by name. See [`resolve::resolve`].
    pub fn lookup(&self, name: impl AsRef<OsStr>) -> VfsResult<Node> {
        resolve::resolve(&self.path, name)
    }

    /// Lazily enumerate children.
    pub fn entries(&self) -> VfsResult<ReadDir> {
        readdir::list(&self.path)
    }

    /// Enumerate all children in one pass; any failure fails the whole call.
    pub fn readdir(&self) -> VfsResult<Vec<DirEntry>> {
        self.entries()?.collect()
    }

    /// Real path of a prospective child, after name validation.
    pub fn child_path(&self, name: impl AsRef<OsStr>) -> VfsResult<PathBuf> {
        let name = name.as_ref();
        resolve::validate_name(name)?;
        Ok(self.path.join(name))
    }
}

impl NodeOps for DirNode {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> FileType {
        FileType::Directory
    }
}

/// A mirrored regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    path: PathBuf,
}

impl FileNode {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Open the file. Read-only flags take the read path, anything that
    /// mutates takes the read-write path.
    pub fn open(&self, flags: OpenFlags) -> VfsResult<FileHandle> {
        if flags.is_mutating() {
            FileHandle::open_for_read_write(&self.path, flags)
        } else {
            FileHandle::open_for_read(&self.path)
        }
    }
}

impl NodeOps for FileNode {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> FileType {
        FileType::File
    }
}

/// A resolved node of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A directory.
    Dir(DirNode),
    /// A regular file, or any other non-directory.
    File(FileNode),
}

impl Node {
    pub(crate) fn from_kind(path: PathBuf, kind: FileType) -> Self {
        match kind {
            FileType::Directory => Node::Dir(DirNode::new(path)),
            FileType::File => Node::File(FileNode::new(path)),
        }
    }

    /// Borrow as a directory, if it is one.
    pub fn as_dir(&self) -> Option<&DirNode> {
        match self {
            Node::Dir(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    /// Borrow as a file, if it is one.
    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(file) => Some(file),
            Node::Dir(_) => None,
        }
    }

    /// Convert to a directory or fail with `NotADirectory`.
    pub fn into_dir(self) -> VfsResult<DirNode> {
        match self {
            Node::Dir(dir) => Ok(dir),
            Node::File(file) => Err(VfsError::not_a_directory(file.path.display().to_string())),
        }
    }

    /// Convert to a file or fail with `IsADirectory`.
    pub fn into_file(self) -> VfsResult<FileNode> {
        match self {
            Node::File(file) => Ok(file),
            Node::Dir(dir) => Err(VfsError::is_a_directory(dir.path.display().to_string())),
        }
    }

    /// True for [`Node::Dir`].
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    /// True for [`Node::File`].
    pub fn is_file(&self) -> bool {
        matches!(self, Node::File(_))
    }
}

impl NodeOps for Node {
    fn path(&self) -> &Path {
        match self {
            Node::Dir(dir) => dir.path(),
            Node::File(file) => file.path(),
        }
    }

    fn kind(&self) -> FileType {
        match self {
            Node::Dir(dir) => dir.kind(),
            Node::File(file) => file.kind(),
        }
    }
}
