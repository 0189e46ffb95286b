//! mirrorfs command-line tool.
//!
//! Drives the bridge operation set against a host directory without a
//! kernel transport, one request per invocation.
//!
//! Usage:
//!   mirrorfs --root /srv/data ls docs
//!   mirrorfs --root /srv/data cat docs/a.txt --offset 2 --length 16
//!   mirrorfs --config mirror.ron --read-only stat docs/a.txt
//!   RUST_LOG=mirrorfs=debug mirrorfs --root /srv/data write notes.txt "hello"

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use mirrorfs::{DirNode, MirrorConfig, MirrorFs, Node, OpenFlags, SetAttr, VfsError};

/// Passthrough filesystem bridge over a host directory.
#[derive(Parser, Debug)]
#[command(name = "mirrorfs")]
#[command(about = "Inspect and modify a mirrored directory through the bridge")]
struct Args {
    /// Host directory to mirror
    #[arg(long, conflicts_with = "config", required_unless_present = "config")]
    root: Option<PathBuf>,

    /// RON config file (root, read_only, fs_name, subtype)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reject every mutating request
    #[arg(long)]
    read_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print attributes of a path
    Stat { path: String },

    /// List a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },

    /// Print file contents
    Cat {
        path: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Bytes to read (whole file when omitted)
        #[arg(long)]
        length: Option<u32>,
    },

    /// Write text to a file, creating it if absent
    Write {
        path: String,
        text: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Create a directory
    Mkdir {
        path: String,
        #[arg(long, default_value = "755", value_parser = parse_mode)]
        mode: u32,
    },

    /// Remove a file or empty directory
    Rm { path: String },

    /// Truncate or extend a file
    Truncate { path: String, size: u64 },

    /// Change permission bits (octal)
    Chmod {
        path: String,
        #[arg(value_parser = parse_mode)]
        mode: u32,
    },

    /// Host filesystem statistics
    Statfs,
}

fn parse_mode(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8)
        .map_err(|e| format!("bad octal mode {s:?}: {e}"))
}

/// Split `a/b/c` into (`a/b`, `c`). The name must be non-empty.
fn split_parent(path: &str) -> Result<(&str, &str)> {
    let path = path.trim_end_matches('/');
    let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
    if name.is_empty() {
        bail!("path {path:?} has no final component");
    }
    Ok((parent, name))
}

fn parent_dir(fs: &MirrorFs, path: &str) -> Result<(DirNode, String)> {
    let (parent, name) = split_parent(path)?;
    let dir = fs
        .walk(parent)
        .and_then(Node::into_dir)
        .with_context(|| format!("resolving parent of {path}"))?;
    Ok((dir, name.to_string()))
}

fn load_config(args: &Args) -> Result<MirrorConfig> {
    let config = match (&args.config, &args.root) {
        (Some(file), _) => MirrorConfig::load(file)
            .with_context(|| format!("loading config {}", file.display()))?,
        (None, Some(root)) => MirrorConfig::new(root),
        (None, None) => bail!("either --root or --config is required"),
    };
    Ok(if args.read_only {
        config.with_read_only(true)
    } else {
        config
    })
}

fn run(fs: &MirrorFs, command: Command) -> Result<()> {
    let mut out = std::io::stdout().lock();

    match command {
        Command::Stat { path } => {
            let node = fs.walk(&path)?;
            let attr = fs.getattr(&node)?;
            writeln!(out, "path:  {path}")?;
            writeln!(out, "kind:  {:?}", attr.kind)?;
            writeln!(out, "ino:   {}", attr.ino)?;
            writeln!(out, "size:  {}", attr.size)?;
            writeln!(out, "mode:  {:o}", attr.mode)?;
            writeln!(out, "nlink: {}", attr.nlink)?;
            writeln!(out, "owner: {}:{}", attr.uid, attr.gid)?;
            writeln!(out, "mtime: {:?}", attr.mtime)?;
        }
        Command::Ls { path } => {
            let dir = fs.walk(&path)?.into_dir()?;
            for entry in fs.readdir(&dir)? {
                let suffix = if entry.kind.is_dir() { "/" } else { "" };
                writeln!(out, "{:>10} {}{suffix}", entry.ino, entry.name.to_string_lossy())?;
            }
        }
        Command::Cat {
            path,
            offset,
            length,
        } => {
            let node = fs.walk(&path)?;
            let length = match length {
                Some(length) => length,
                None => {
                    let size = fs.getattr(&node)?.size;
                    u32::try_from(size.saturating_sub(offset)).unwrap_or(u32::MAX)
                }
            };
            let file = node.into_file()?;
            let fh = fs.open(&file, OpenFlags::read())?;
            let data = fs.read(fh, offset, length);
            fs.release(fh)?;
            out.write_all(&data?)?;
        }
        Command::Write { path, text, offset } => {
            let (dir, name) = parent_dir(fs, &path)?;
            let fh = match fs.lookup(&dir, &name) {
                Ok(node) => fs.open(&node.into_file()?, OpenFlags::write_only())?,
                Err(VfsError::NotFound(_)) => fs.create(&dir, &name, 0o644)?.1,
                Err(e) => return Err(e.into()),
            };
            let written = fs.write(fh, offset, text.as_bytes());
            let flushed = fs.flush(fh);
            fs.release(fh)?;
            let written = written?;
            flushed?;
            tracing::info!(path = %path, written, "wrote");
        }
        Command::Mkdir { path, mode } => {
            let (dir, name) = parent_dir(fs, &path)?;
            fs.mkdir(&dir, &name, mode)?;
        }
        Command::Rm { path } => {
            let (dir, name) = parent_dir(fs, &path)?;
            fs.remove(&dir, &name)?;
        }
        Command::Truncate { path, size } => {
            let node = fs.walk(&path)?;
            fs.setattr(&node, &SetAttr::new().with_size(size))?;
        }
        Command::Chmod { path, mode } => {
            let node = fs.walk(&path)?;
            fs.setattr(&node, &SetAttr::new().with_mode(mode))?;
        }
        Command::Statfs => {
            let stat = fs.statfs()?;
            writeln!(out, "bsize:   {}", stat.bsize)?;
            writeln!(
                out,
                "blocks:  {} ({} free, {} avail)",
                stat.blocks, stat.bfree, stat.bavail
            )?;
            writeln!(out, "files:   {} ({} free)", stat.files, stat.ffree)?;
            writeln!(out, "namelen: {}", stat.namelen)?;
        }
    }

    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    // stdout carries command output; logs go to stderr
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let fs = MirrorFs::new(config).context("opening mirrored root")?;

    run(&fs, args.command)
}
