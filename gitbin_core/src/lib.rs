//! # gitbin core
//!
//! Keeps large binary files out of a git repository's object database.
//!
//! A binary file handed to `add` is moved into a content-addressed side
//! store (the *binstore*) and replaced by a symlink to its entry; the link
//! is what git tracks. Every filesystem mutation runs as a [`Transaction`]
//! of undoable [`Command`]s, so a failure half way leaves the working tree
//! as it was.
//!
//! ## Features
//!
//! - Content-addressed entries named by BLAKE3 (or SHA-256) digest
//! - Deduplication of identical content across paths
//! - Rollback of partially applied moves, links and mode changes
//! - `add`, `edit`, `reset` and `checkout --` verbs aware of git status
//!
//! ## Example
//!
//! ```no_run
//! use gitbin_core::{GitBin, Layout};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Open (or create) the binstore of the current repository
//! let gitbin = GitBin::init(Path::new("."), Layout::Direct)?;
//!
//! // Store a binary file and stage the link
//! for outcome in gitbin.add(&[PathBuf::from("assets/logo.png")])? {
//!     println!("{}: {:?}", outcome.path.display(), outcome.action);
//! }
//!
//! // Get a writable copy back for editing
//! gitbin.edit(&[PathBuf::from("assets/logo.png")])?;
//! # Ok(())
//! # }
//! ```

mod binstore;
mod classify;
mod command;
mod config;
mod detect;
mod error;
mod hash;
mod ops;
mod repo;
mod transaction;

#[cfg(test)]
mod testing;

pub use binstore::{Backend, FilesystemBinstore, LOCK_FILE, READ_ONLY, StoreLock};
pub use classify::{PathKind, children, classify};
pub use command::{
    BACKUP_PREFIX, ChangeMode, Command, CopyFile, MakeDirectory, MoveFile, RemoveFile, SafeMove,
    Symlink,
};
pub use config::{
    ALGORITHM_KEY, BASE_KEY, BASE_SECTION, BinstoreConfig, LOCAL_LINK_NAME, Layout, STORE_CONFIG_FILE,
    STORE_PATH_KEY, STORE_SECTION,
};
pub use detect::{is_binary, is_binary_content};
pub use error::{Error, Result};
pub use hash::{Algorithm, ContentHasher, DIGEST_SIZE, Digest};
pub use ops::{Action, GitBin, JUSTINCASE_SUFFIX, Outcome, justincase_path};
pub use repo::{
    ConfigStore, GitConfig, GitRepo, RepoStatus, Repository, find_repo_root, parse_porcelain,
    repo_name,
};
pub use transaction::{Transaction, TransactionState};
