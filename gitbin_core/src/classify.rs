//! Working-tree path classification.

use crate::binstore::Backend;
use crate::command::BACKUP_PREFIX;
use crate::detect;
use crate::error::Result;
use ignore::WalkBuilder;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What a working-tree path is, as far as the verbs care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    /// Nothing at the path.
    Missing,
    /// A symlink the store does not manage.
    RealSymlink,
    /// A link to an existing store entry.
    StoreLink,
    /// A regular file that sniffs as text.
    Text,
    Directory,
    /// A regular file that sniffs as binary.
    Binary,
    /// A fifo, socket or device.
    Special,
}

/// Classify `path` without following a final symlink.
///
/// Checked in order: symlinks (managed or not), text, directory, binary.
pub fn classify(path: &Path, store: &dyn Backend) -> Result<PathKind> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PathKind::Missing),
        Err(e) => return Err(e.into()),
    };

    let file_type = meta.file_type();
    if file_type.is_symlink() {
        return Ok(if store.is_link_into_store(path) {
            PathKind::StoreLink
        } else {
            PathKind::RealSymlink
        });
    }
    if !file_type.is_file() && !file_type.is_dir() {
        return Ok(PathKind::Special);
    }

    // Directories sniff as binary.
    if !detect::is_binary(path)? {
        return Ok(PathKind::Text);
    }
    if file_type.is_dir() {
        return Ok(PathKind::Directory);
    }
    Ok(PathKind::Binary)
}

/// Immediate children of a directory, split into (directories, files).
///
/// `.git` and ignored entries are left out. A `._tmp_.` backup is replaced
/// by its source path when the source is missing, and dropped otherwise.
/// Both lists are sorted by path.
pub fn children(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    let walker = WalkBuilder::new(dir)
        .max_depth(Some(1))
        .hidden(false)
        .git_ignore(true)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    for entry in walker {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(source) = name.strip_prefix(BACKUP_PREFIX) {
            // A backup whose source is gone marks an interrupted move.
            let source = dir.join(source);
            if fs::symlink_metadata(&source).is_err() {
                files.push(source);
            }
            continue;
        }

        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        let path = entry.into_path();
        if is_dir {
            dirs.push(path);
        } else {
            files.push(path);
        }
    }

    dirs.sort();
    files.sort();
    Ok((dirs, files))
}
