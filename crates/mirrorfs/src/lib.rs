//! # mirrorfs
//!
//! A passthrough filesystem bridge: a virtual tree whose structure,
//! metadata and content come, on demand, from a real directory on the host
//! (the mirrored root).
//!
//! Every request is translated synchronously into host operations and the
//! host's answer, value or error, comes back unchanged in meaning. There is
//! no cache: nodes carry only a path and every attribute or directory query
//! re-reads the host.
//!
//! - [`MirrorFs`] - entry point; one method per transport request
//! - [`Node`], [`DirNode`], [`FileNode`] - stateless, kind-tagged paths
//! - [`FileHandle`] - one open host descriptor, released exactly once
//! - [`VfsError`] - error taxonomy with errno mapping
//!
//! Unix only.

#![cfg(unix)]

pub mod attr;
mod config;
mod error;
mod fs;
mod handle;
pub mod mutate;
mod node;
pub mod readdir;
pub mod resolve;
mod types;

pub use config::MirrorConfig;
pub use error::{SetAttrError, VfsError, VfsResult};
pub use fs::{HandleId, MirrorFs};
pub use handle::{AccessMode, FileHandle};
pub use node::{DirNode, FileNode, Node, NodeOps};
pub use readdir::ReadDir;
pub use types::{DirEntry, FileAttr, FileType, OpenFlags, SetAttr, SetAttrField, StatFs};
