//! Content-addressed store for binary file bodies.
//!
//! Each entry is a read-only file named by the digest of its content. A
//! working-tree path is bound to an entry by a symlink pointing into the
//! store; that link is what gets committed to git.

use crate::command::{
    ChangeMode, Command, CopyFile, MakeDirectory, MoveFile, RemoveFile, SafeMove, Symlink,
};
use crate::config::{
    self, BinstoreConfig, LOCAL_LINK_NAME, Layout, STORE_CONFIG_FILE, STORE_PATH_KEY,
    STORE_SECTION,
};
use crate::error::{Error, Result};
use crate::hash::{ContentHasher, Digest};
use crate::repo::{ConfigStore, Repository};
use crate::transaction::Transaction;
use file_guard::{FileGuard, Lock};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Permission bits of a store entry.
pub const READ_ONLY: u32 = 0o444;

/// Name of the advisory lock file in the store root.
pub const LOCK_FILE: &str = ".lock";

/// Exclusive hold on a store. Released when dropped.
pub struct StoreLock {
    _guard: FileGuard<Box<fs::File>>,
}

/// Operations every store backend provides.
///
/// The filesystem store is the only backend today; the trait is the seam a
/// remote store would plug into.
pub trait Backend {
    /// Directory holding the entries.
    fn root(&self) -> &Path;

    /// Physical store path for `path`.
    ///
    /// A symlink's target is authoritative; any other file is digested and
    /// the path its entry would have is returned, stored or not.
    fn resolve_store_name(&self, path: &Path) -> Result<PathBuf>;

    /// `path` is a symlink into the store whose entry exists.
    fn has(&self, path: &Path) -> bool;

    /// `path` is a link the store manages: it points into the store, names
    /// a digest, and the entry exists.
    fn is_link_into_store(&self, path: &Path) -> bool;

    /// `path` links into the store but its entry is gone.
    fn is_dangling_store_link(&self, path: &Path) -> bool;

    /// The digest of `path`'s current content has an entry.
    fn contains_content(&self, path: &Path) -> Result<bool>;

    /// Move `path` into the store, leave a link behind, and stage it.
    fn add(&self, path: &Path, repo: &dyn Repository) -> Result<Digest>;

    /// Replace the link at `path` with a writable copy of its entry.
    fn edit_file(&self, path: &Path) -> Result<()>;

    /// Take the store-wide lock, blocking until it is free.
    fn lock(&self) -> Result<StoreLock>;
}

/// Stages a path as one step of a transaction.
struct RepoAdd<'r> {
    repo: &'r dyn Repository,
    path: PathBuf,
    added: bool,
}

impl<'r> RepoAdd<'r> {
    fn new(repo: &'r dyn Repository, path: &Path) -> Self {
        Self {
            repo,
            path: path.to_path_buf(),
            added: false,
        }
    }
}

impl Command for RepoAdd<'_> {
    fn execute(&mut self) -> Result<()> {
        self.repo.add(&self.path)?;
        self.added = true;
        Ok(())
    }

    fn undo(&mut self) -> Result<()> {
        if self.added {
            self.repo.unstage(&self.path, true)?;
            self.added = false;
        }
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("git add {}", self.path.display())
    }
}

/// A store kept in a local directory.
pub struct FilesystemBinstore {
    config: BinstoreConfig,
    hasher: Arc<dyn ContentHasher>,
}

impl std::fmt::Debug for FilesystemBinstore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemBinstore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FilesystemBinstore {
    /// Open an existing store.
    ///
    /// In the compat layout the `.git/binstore` link is recreated when it
    /// has gone missing.
    pub fn open(config: BinstoreConfig) -> Result<Self> {
        if !config.root.is_dir() {
            return Err(Error::binstore_missing(&config.root));
        }

        if config.layout == Layout::Compat && fs::symlink_metadata(&config.link_root).is_err() {
            Symlink::new(&config.link_root, &config.root).execute()?;
        }

        debug!(root = %config.root.display(), layout = ?config.layout, "opened binstore");
        Ok(Self {
            hasher: Arc::new(config.algorithm),
            config,
        })
    }

    /// Create this repository's store under the configured base directory
    /// and record it in the repository config.
    pub fn init(
        repo: &dyn Repository,
        settings: &dyn ConfigStore,
        layout: Layout,
    ) -> Result<Self> {
        let root = config::planned_root(settings, &repo.name()?)?;
        let git_dir = repo.git_dir();
        let local_link = git_dir.join(LOCAL_LINK_NAME);

        let mut tx = Transaction::new().with(MakeDirectory::new(&root));
        if fs::symlink_metadata(&local_link).is_err() {
            tx.push(Symlink::new(&local_link, &root))?;
        }
        tx.execute()?;

        let config = BinstoreConfig::new(&root)
            .with_layout(layout, &git_dir)
            .with_algorithm(config::requested_algorithm(settings)?);
        let config_file = root.join(STORE_CONFIG_FILE);
        if config_file.exists() {
            // Another clone of the same repository created it already.
            return Self::finish_init(settings, config.load_algorithm()?);
        }
        fs::write(&config_file, config::render_store_config(config.algorithm))?;

        info!(root = %root.display(), "initialized binstore");
        Self::finish_init(settings, config)
    }

    fn finish_init(settings: &dyn ConfigStore, config: BinstoreConfig) -> Result<Self> {
        settings.set(
            STORE_SECTION,
            STORE_PATH_KEY,
            &config.root.to_string_lossy(),
        )?;
        Self::open(config)
    }

    /// Open the configured store, creating it on first use.
    pub fn open_or_init(
        repo: &dyn Repository,
        settings: &dyn ConfigStore,
        layout: Layout,
    ) -> Result<Self> {
        match config::configured_root(settings)? {
            Some(root) => {
                let config = BinstoreConfig::new(std::path::absolute(root)?)
                    .with_layout(layout, &repo.git_dir())
                    .load_algorithm()?;
                Self::open(config)
            }
            None => Self::init(repo, settings, layout),
        }
    }

    /// Replace the digest function.
    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn config(&self) -> &BinstoreConfig {
        &self.config
    }

    /// Physical path of the entry for `digest`.
    pub fn store_path(&self, digest: &Digest) -> PathBuf {
        self.config.root.join(digest.to_hex())
    }

    /// What a working link to `digest` points at.
    pub fn link_target(&self, digest: &Digest) -> PathBuf {
        self.config.link_root.join(digest.to_hex())
    }

    /// An entry exists for `digest`.
    pub fn contains(&self, digest: &Digest) -> bool {
        self.store_path(digest).is_file()
    }

    /// Absolute target of the symlink at `path`, if it is one.
    fn link_target_of(path: &Path) -> Option<PathBuf> {
        let target = fs::read_link(path).ok()?;
        if target.is_absolute() {
            Some(target)
        } else {
            Some(path.parent().unwrap_or(Path::new("")).join(target))
        }
    }

    /// Map a link target under either root to the physical entry path.
    fn physical(&self, target: &Path) -> Option<PathBuf> {
        [&self.config.link_root, &self.config.root]
            .into_iter()
            .find_map(|prefix| target.strip_prefix(prefix).ok())
            .map(|rel| self.config.root.join(rel))
    }

    fn add_new(&self, path: &Path, repo: &dyn Repository, digest: &Digest) -> Result<()> {
        let entry = self.store_path(digest);
        info!(path = %path.display(), digest = %digest, "storing");
        Transaction::new()
            .with(SafeMove::new(path, &entry))
            .with(Symlink::new(path, self.link_target(digest)))
            .with(ChangeMode::new(&entry, READ_ONLY))
            .with(RepoAdd::new(repo, path))
            .execute()
    }

    fn add_existing(&self, path: &Path, repo: &dyn Repository, digest: &Digest) -> Result<()> {
        // Content is already stored: park the original beside itself until
        // the link is staged, then drop it.
        let parked = SafeMove::backup_path(path);
        info!(path = %path.display(), digest = %digest, "already stored, linking");
        Transaction::new()
            .with(MoveFile::new(path, &parked))
            .with(Symlink::new(path, self.link_target(digest)))
            .with(RepoAdd::new(repo, path))
            .with(RemoveFile::new(&parked))
            .execute()
    }
}

impl Backend for FilesystemBinstore {
    fn root(&self) -> &Path {
        &self.config.root
    }

    fn resolve_store_name(&self, path: &Path) -> Result<PathBuf> {
        if let Some(target) = Self::link_target_of(path) {
            return Ok(self.physical(&target).unwrap_or(target));
        }
        let digest = self.hasher.digest_file(path)?;
        Ok(self.store_path(&digest))
    }

    fn has(&self, path: &Path) -> bool {
        Self::link_target_of(path)
            .and_then(|t| self.physical(&t))
            .is_some_and(|entry| entry.is_file())
    }

    fn is_link_into_store(&self, path: &Path) -> bool {
        let names_digest = Self::link_target_of(path)
            .and_then(|t| t.file_name().map(|n| n.to_string_lossy().into_owned()))
            .is_some_and(|name| Digest::from_hex(&name).is_ok());
        names_digest && self.has(path)
    }

    fn is_dangling_store_link(&self, path: &Path) -> bool {
        Self::link_target_of(path)
            .and_then(|t| self.physical(&t))
            .is_some_and(|entry| !entry.exists())
    }

    fn contains_content(&self, path: &Path) -> Result<bool> {
        let digest = self.hasher.digest_file(path)?;
        Ok(self.contains(&digest))
    }

    fn add(&self, path: &Path, repo: &dyn Repository) -> Result<Digest> {
        let meta = fs::symlink_metadata(path).map_err(|_| Error::not_a_file(path))?;
        if !meta.file_type().is_file() {
            return Err(Error::not_a_file(path));
        }

        let digest = self.hasher.digest_file(path)?;
        match fs::metadata(self.store_path(&digest)) {
            Ok(stored) if stored.len() != meta.len() => Err(Error::conflict(
                path,
                digest.to_hex(),
                stored.len(),
                meta.len(),
            )),
            Ok(_) => self.add_existing(path, repo, &digest).map(|()| digest),
            Err(_) => self.add_new(path, repo, &digest).map(|()| digest),
        }
    }

    fn edit_file(&self, path: &Path) -> Result<()> {
        if !self.is_link_into_store(path) {
            return Err(Error::not_in_store(path));
        }
        let entry = self.resolve_store_name(path)?;
        let dir = path.parent().unwrap_or(Path::new("."));

        // Writable for the owner, keeping any execute bits.
        let mode = (fs::metadata(&entry)?.permissions().mode() & 0o555) | 0o200;

        // Dropping the TempPath cleans up if the transaction never moved it.
        let scratch = tempfile::Builder::new()
            .prefix("._edit_.")
            .tempfile_in(dir)?
            .into_temp_path();
        let scratch_path = scratch.to_path_buf();

        info!(path = %path.display(), entry = %entry.display(), "checking out for edit");
        Transaction::new()
            .with(CopyFile::new(&entry, &scratch_path))
            .with(ChangeMode::new(&scratch_path, mode))
            .with(SafeMove::new(&scratch_path, path))
            .execute()
    }

    fn lock(&self) -> Result<StoreLock> {
        let path = self.config.root.join(LOCK_FILE);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        debug!(path = %path.display(), "acquiring store lock");
        let guard = file_guard::lock(Box::new(file), Lock::Exclusive, 0, 1)?;
        Ok(StoreLock { _guard: guard })
    }
}
