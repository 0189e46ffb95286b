//! Bridge error types.

use std::fmt;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::types::SetAttrField;

/// Bridge error type.
///
/// Every host failure is classified into one of these variants so the
/// transport can answer with the errno a caller would have seen on the
/// mirrored root itself.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Filesystem is read-only.
    #[error("filesystem is read-only")]
    ReadOnly,

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Path escapes the mirrored root.
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Malformed request (bad name, out-of-range size).
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// Handle id was never issued or has already been released.
    #[error("bad file handle: {0}")]
    BadHandle(u64),

    /// One or more requested attribute changes failed.
    #[error("{0}")]
    SetAttr(SetAttrError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Create an Invalid error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Classify a host I/O failure on `path`.
    ///
    /// Kinds without a dedicated variant stay wrapped in [`VfsError::Io`] so
    /// the raw OS error code survives to [`VfsError::errno`].
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        let path = path.display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            io::ErrorKind::ReadOnlyFilesystem => Self::ReadOnly,
            io::ErrorKind::NotADirectory => Self::NotADirectory(path),
            io::ErrorKind::IsADirectory => Self::IsADirectory(path),
            io::ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty(path),
            io::ErrorKind::InvalidInput => Self::Invalid(format!("{path}: {err}")),
            _ => Self::Io(err),
        }
    }

    /// The errno a kernel transport should reply with.
    pub fn errno(&self) -> rustix::io::Errno {
        use rustix::io::Errno;

        match self {
            VfsError::NotFound(_) => Errno::NOENT,
            VfsError::AlreadyExists(_) => Errno::EXIST,
            VfsError::PermissionDenied(_) => Errno::ACCESS,
            VfsError::ReadOnly => Errno::ROFS,
            VfsError::NotADirectory(_) => Errno::NOTDIR,
            VfsError::IsADirectory(_) => Errno::ISDIR,
            VfsError::DirectoryNotEmpty(_) => Errno::NOTEMPTY,
            VfsError::PathEscapesRoot(_) => Errno::ACCESS,
            VfsError::Invalid(_) => Errno::INVAL,
            VfsError::BadHandle(_) => Errno::BADF,
            VfsError::SetAttr(e) => e.first().1.errno(),
            VfsError::Config(_) => Errno::INVAL,
            VfsError::Io(e) => Errno::from_io_error(e).unwrap_or(Errno::IO),
            VfsError::Other(_) => Errno::IO,
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::ReadOnly => {
                io::Error::new(io::ErrorKind::ReadOnlyFilesystem, "filesystem is read-only")
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::PathEscapesRoot(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::Invalid(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::BadHandle(fh) => {
                io::Error::new(io::ErrorKind::InvalidInput, format!("bad file handle: {fh}"))
            }
            e @ VfsError::SetAttr(_) => io::Error::other(e.to_string()),
            VfsError::Config(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            VfsError::Io(e) => e,
            VfsError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// Failures collected while applying a change-set.
///
/// Holds every field that failed, in application order. Never empty.
#[derive(Debug)]
pub struct SetAttrError {
    failures: Vec<(SetAttrField, VfsError)>,
}

impl SetAttrError {
    /// Build from collected failures; `None` if nothing failed.
    pub(crate) fn from_failures(failures: Vec<(SetAttrField, VfsError)>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    /// The first field that failed and why.
    pub fn first(&self) -> &(SetAttrField, VfsError) {
        &self.failures[0]
    }

    /// Every field that failed.
    pub fn failed_fields(&self) -> impl Iterator<Item = SetAttrField> + '_ {
        self.failures.iter().map(|(field, _)| *field)
    }

    /// All failures in application order.
    pub fn failures(&self) -> &[(SetAttrField, VfsError)] {
        &self.failures
    }
}

impl fmt::Display for SetAttrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (field, err) = self.first();
        write!(f, "setattr {field} failed: {err}")?;
        if self.failures.len() > 1 {
            write!(f, " ({} fields failed)", self.failures.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for SetAttrError {}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_classifies_by_kind() {
        let path = Path::new("/mirror/a.txt");

        let err = VfsError::from_io(io::Error::from(io::ErrorKind::NotFound), path);
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "/mirror/a.txt"));

        let err = VfsError::from_io(io::Error::from(io::ErrorKind::AlreadyExists), path);
        assert!(matches!(err, VfsError::AlreadyExists(_)));

        let err = VfsError::from_io(io::Error::from(io::ErrorKind::DirectoryNotEmpty), path);
        assert!(matches!(err, VfsError::DirectoryNotEmpty(_)));

        let err = VfsError::from_io(io::Error::from(io::ErrorKind::InvalidInput), path);
        assert!(matches!(err, VfsError::Invalid(_)));

        let err = VfsError::from_io(io::Error::other("disk on fire"), path);
        assert!(matches!(err, VfsError::Io(_)));
    }

    #[test]
    fn test_errno_mapping() {
        use rustix::io::Errno;

        assert_eq!(VfsError::not_found("x").errno(), Errno::NOENT);
        assert_eq!(VfsError::directory_not_empty("x").errno(), Errno::NOTEMPTY);
        assert_eq!(VfsError::ReadOnly.errno(), Errno::ROFS);
        assert_eq!(VfsError::BadHandle(7).errno(), Errno::BADF);

        let raw = io::Error::from_raw_os_error(Errno::NOSPC.raw_os_error());
        assert_eq!(VfsError::Io(raw).errno(), Errno::NOSPC);
    }

    #[test]
    fn test_setattr_error_reports_first_failure() {
        let err = SetAttrError::from_failures(vec![
            (SetAttrField::Owner, VfsError::permission_denied("f")),
            (SetAttrField::Mode, VfsError::not_found("f")),
        ])
        .unwrap();

        assert_eq!(err.first().0, SetAttrField::Owner);
        let fields: Vec<_> = err.failed_fields().collect();
        assert_eq!(fields, vec![SetAttrField::Owner, SetAttrField::Mode]);
        assert_eq!(
            err.to_string(),
            "setattr owner failed: permission denied: f (2 fields failed)"
        );

        assert!(SetAttrError::from_failures(Vec::new()).is_none());
    }
}
