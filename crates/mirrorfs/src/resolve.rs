//! Name resolution.
//!
//! A lookup enumerates the parent and scans for an exact name match. The
//! cost is linear in the number of siblings and callers must not assume
//! otherwise. Whatever the enumeration observed is what the lookup reports;
//! concurrent changes to the parent are not guarded against.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::debug;

use crate::error::{VfsError, VfsResult};
use crate::node::Node;
use crate::types::FileType;

/// Reject names that could leave the parent directory.
///
/// Checked on the raw bytes; any other byte sequence the host accepts is a
/// valid name, UTF-8 or not.
pub fn validate_name(name: &OsStr) -> VfsResult<()> {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return Err(VfsError::invalid("empty name"));
    }
    if bytes == b"." || bytes == b".." {
        return Err(VfsError::invalid(format!("reserved name: {name:?}")));
    }
    if bytes.contains(&b'/') || bytes.contains(&0) {
        return Err(VfsError::invalid(format!("name contains a separator: {name:?}")));
    }
    Ok(())
}

/// Resolve `name` among the immediate children of `parent`.
///
/// Names match on exact host bytes. Symlinks never match: the bridge does
/// not expose them.
pub fn resolve(parent: &Path, name: impl AsRef<OsStr>) -> VfsResult<Node> {
    let name = name.as_ref();
    validate_name(name)?;

    let entries = std::fs::read_dir(parent).map_err(|e| VfsError::from_io(e, parent))?;
    for entry in entries {
        let entry = entry.map_err(|e| VfsError::from_io(e, parent))?;
        if entry.file_name() != name {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| VfsError::from_io(e, &path))?;
        if file_type.is_symlink() {
            debug!(path = %path.display(), "lookup matched a symlink, hiding it");
            break;
        }

        let kind = if file_type.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };
        return Ok(Node::from_kind(path, kind));
    }

    Err(VfsError::not_found(parent.join(name).display().to_string()))
}
