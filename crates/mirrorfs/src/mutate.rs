//! Structural changes: mkdir, remove, setattr.
//!
//! File creation lives with the handles ([`crate::handle::FileHandle::create_and_open`])
//! since it hands back an open descriptor.

use std::ffi::OsStr;
use std::fs::{self, DirBuilder, Metadata, OpenOptions, Permissions};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::time::SystemTime;

use filetime::FileTime;
use rustix::fs::{AtFlags, CWD, OFlags, Timespec, Timestamps, UTIME_OMIT};
use tracing::warn;

use crate::error::{SetAttrError, VfsError, VfsResult};
use crate::node::{DirNode, Node};
use crate::resolve;
use crate::types::{SetAttr, SetAttrField};

/// Create directory `parent/name` with `mode` (umask applies).
///
/// Only the final component is created. The node is returned only when the
/// host create succeeded.
pub fn mkdir(parent: &Path, name: impl AsRef<OsStr>, mode: u32) -> VfsResult<Node> {
    let name = name.as_ref();
    resolve::validate_name(name)?;
    let path = parent.join(name);

    DirBuilder::new()
        .mode(mode)
        .create(&path)
        .map_err(|e| VfsError::from_io(e, &path))?;

    Ok(Node::Dir(DirNode::new(path)))
}

/// Remove the file or empty directory `parent/name`.
///
/// Symlinks are invisible to the bridge, so they report `NotFound` here as
/// well. A non-empty directory fails with `DirectoryNotEmpty`.
pub fn remove(parent: &Path, name: impl AsRef<OsStr>) -> VfsResult<()> {
    let name = name.as_ref();
    resolve::validate_name(name)?;
    let path = parent.join(name);

    let meta = not_symlink(&path)?;
    let result = if meta.is_dir() {
        fs::remove_dir(&path)
    } else {
        fs::remove_file(&path)
    };
    result.map_err(|e| VfsError::from_io(e, &path))
}

/// Apply a change-set to `path`.
///
/// Requested parts are applied in order size, times, owner, mode. A failed
/// part does not stop the ones after it; every failure is collected and
/// reported together, first failure first.
///
/// None of the parts acts through a symlink in the final component.
pub fn setattr(path: &Path, changes: &SetAttr) -> VfsResult<()> {
    let mut failures = Vec::new();

    if let Some(size) = changes.size {
        record(&mut failures, path, SetAttrField::Size, truncate(path, size));
    }
    if changes.atime.is_some() || changes.mtime.is_some() {
        let result = set_times(path, changes.atime, changes.mtime);
        record(&mut failures, path, SetAttrField::Times, result);
    }
    if changes.uid.is_some() || changes.gid.is_some() {
        let result = std::os::unix::fs::lchown(path, changes.uid, changes.gid)
            .map_err(|e| VfsError::from_io(e, path));
        record(&mut failures, path, SetAttrField::Owner, result);
    }
    if let Some(mode) = changes.mode {
        let result = not_symlink(path).and_then(|_| {
            fs::set_permissions(path, Permissions::from_mode(mode & 0o7777))
                .map_err(|e| VfsError::from_io(e, path))
        });
        record(&mut failures, path, SetAttrField::Mode, result);
    }

    match SetAttrError::from_failures(failures) {
        None => Ok(()),
        Some(err) => Err(VfsError::SetAttr(err)),
    }
}

fn record(
    failures: &mut Vec<(SetAttrField, VfsError)>,
    path: &Path,
    field: SetAttrField,
    result: VfsResult<()>,
) {
    if let Err(err) = result {
        warn!(path = %path.display(), %field, error = %err, "setattr part failed");
        failures.push((field, err));
    }
}

/// Host status for `path`; a symlink there is reported as absent.
fn not_symlink(path: &Path) -> VfsResult<Metadata> {
    let meta = fs::symlink_metadata(path).map_err(|e| VfsError::from_io(e, path))?;
    if meta.file_type().is_symlink() {
        return Err(VfsError::not_found(path.display().to_string()));
    }
    Ok(meta)
}

// Only regular files have a size to change. Fifos and devices are refused
// before any open, and the open itself never blocks or follows a symlink.
fn truncate(path: &Path, size: u64) -> VfsResult<()> {
    if size > i64::MAX as u64 {
        return Err(VfsError::invalid(format!("truncate to {size} bytes")));
    }
    let meta = not_symlink(path)?;
    if !meta.is_file() && !meta.is_dir() {
        return Err(VfsError::invalid(format!("{}: not a regular file", path.display())));
    }

    let file = OpenOptions::new()
        .write(true)
        .custom_flags((OFlags::NONBLOCK | OFlags::NOFOLLOW).bits() as i32)
        .open(path)
        .map_err(|e| VfsError::from_io(e, path))?;
    let opened = file.metadata().map_err(|e| VfsError::from_io(e, path))?;
    if !opened.is_file() {
        return Err(VfsError::invalid(format!("{}: not a regular file", path.display())));
    }
    file.set_len(size).map_err(|e| VfsError::from_io(e, path))
}

fn set_times(path: &Path, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> VfsResult<()> {
    not_symlink(path)?;
    let times = Timestamps {
        last_access: timespec(atime),
        last_modification: timespec(mtime),
    };
    rustix::fs::utimensat(CWD, path, &times, AtFlags::SYMLINK_NOFOLLOW)
        .map_err(|e| VfsError::from_io(e.into(), path))
}

// An unrequested time is left alone by the host (UTIME_OMIT).
fn timespec(time: Option<SystemTime>) -> Timespec {
    match time {
        Some(time) => {
            let time = FileTime::from_system_time(time);
            Timespec {
                tv_sec: time.unix_seconds() as _,
                tv_nsec: time.nanoseconds() as _,
            }
        }
        None => Timespec {
            tv_sec: 0,
            tv_nsec: UTIME_OMIT,
        },
    }
}
