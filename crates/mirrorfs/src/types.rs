//! Core bridge types.
//!
//! Attribute records and directory entries are derived values: they are
//! rebuilt from the host on every query and never stored.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::time::SystemTime;

/// Kind of a mirrored node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file (and any other non-directory the host reports).
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File attributes as reported to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttr {
    /// Host inode number.
    pub ino: u64,
    /// Node kind.
    pub kind: FileType,
    /// Size in bytes.
    pub size: u64,
    /// Raw host mode bits, passed through unchanged.
    pub mode: u32,
    /// Number of hard links.
    pub nlink: u64,
    /// Owner user ID.
    pub uid: u32,
    /// Owner group ID.
    pub gid: u32,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
}

impl FileAttr {
    /// Permission bits only (`mode & 0o7777`).
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path), exactly as the host stores it.
    pub name: OsString,
    /// Host inode number.
    pub ino: u64,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<OsString>, ino: u64, kind: FileType) -> Self {
        Self {
            name: name.into(),
            ino,
            kind,
        }
    }
}

/// Attribute change-set for setattr.
///
/// Each field is independently valid: `Some` requests the change, `None`
/// leaves that attribute untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetAttr {
    /// Truncate or extend to this size.
    pub size: Option<u64>,
    /// New access time.
    pub atime: Option<SystemTime>,
    /// New modification time.
    pub mtime: Option<SystemTime>,
    /// New owner user ID.
    pub uid: Option<u32>,
    /// New owner group ID.
    pub gid: Option<u32>,
    /// New permission bits.
    pub mode: Option<u32>,
}

impl SetAttr {
    /// Create an empty change-set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the access time.
    pub fn with_atime(mut self, atime: SystemTime) -> Self {
        self.atime = Some(atime);
        self
    }

    /// Set the modification time.
    pub fn with_mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Set the owner user ID.
    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Set the owner group ID.
    pub fn with_gid(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }

    /// Set permission bits.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// True if no field is marked valid.
    pub fn is_empty(&self) -> bool {
        self.size.is_none()
            && self.atime.is_none()
            && self.mtime.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
            && self.mode.is_none()
    }
}

/// The independently applied parts of a change-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetAttrField {
    /// Truncate.
    Size,
    /// atime and/or mtime.
    Times,
    /// uid and/or gid.
    Owner,
    /// Permission bits.
    Mode,
}

impl fmt::Display for SetAttrField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetAttrField::Size => "size",
            SetAttrField::Times => "times",
            SetAttrField::Owner => "owner",
            SetAttrField::Mode => "mode",
        })
    }
}

/// Open file flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Append mode.
    pub append: bool,
    /// Truncate on open.
    pub truncate: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            truncate: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Read-write access.
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Write-only access.
    pub fn write_only() -> Self {
        Self {
            read: false,
            write: true,
            ..Default::default()
        }
    }

    /// Add append mode.
    pub fn with_append(mut self) -> Self {
        self.append = true;
        self
    }

    /// Add truncate-on-open.
    pub fn with_truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    /// Decode the access bits of an `open(2)` flag word.
    pub fn from_raw(flags: u32) -> Self {
        use rustix::fs::OFlags;

        let flags = OFlags::from_bits_retain(flags);
        let write_only = flags.contains(OFlags::WRONLY);
        let read_write = flags.contains(OFlags::RDWR);
        Self {
            read: !write_only,
            write: write_only || read_write,
            append: flags.contains(OFlags::APPEND),
            truncate: flags.contains(OFlags::TRUNC),
        }
    }

    /// True if the open would modify the file.
    pub fn is_mutating(&self) -> bool {
        self.write || self.append || self.truncate
    }
}

/// Filesystem statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatFs {
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Available blocks (to non-root).
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Block size.
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
    /// Fragment size.
    pub frsize: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
    }

    #[test]
    fn test_setattr_builder() {
        let attr = SetAttr::new().with_size(0).with_mode(0o600);
        assert_eq!(attr.size, Some(0));
        assert_eq!(attr.mode, Some(0o600));
        assert!(attr.mtime.is_none());
        assert!(attr.uid.is_none());
        assert!(!attr.is_empty());
        assert!(SetAttr::new().is_empty());
    }

    #[test]
    fn test_open_flags() {
        let read = OpenFlags::read();
        assert!(read.read);
        assert!(!read.is_mutating());

        let append = OpenFlags::write_only().with_append();
        assert!(!append.read);
        assert!(append.is_mutating());
    }

    #[test]
    fn test_open_flags_from_raw() {
        use rustix::fs::OFlags;

        let flags = OpenFlags::from_raw(OFlags::RDONLY.bits());
        assert_eq!(flags, OpenFlags::read());

        let flags = OpenFlags::from_raw((OFlags::RDWR | OFlags::TRUNC).bits());
        assert_eq!(flags, OpenFlags::read_write().with_truncate());

        let flags = OpenFlags::from_raw((OFlags::WRONLY | OFlags::APPEND).bits());
        assert_eq!(flags, OpenFlags::write_only().with_append());
    }
}
