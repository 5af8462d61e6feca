//! Undoable filesystem commands.
//!
//! Every command performs one effect in [`Command::execute`]. Undoable
//! commands reverse that effect in [`Command::undo`], and commands with
//! more than one internal step clean up after themselves when a later step
//! fails, so a failed command never leaves partial state behind for the
//! enclosing [`Transaction`](crate::Transaction) to reason about.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name prefix for safe-move backups.
pub const BACKUP_PREFIX: &str = "._tmp_.";

/// A single filesystem operation that can take part in a transaction.
pub trait Command {
    /// Perform the effect, or fail without leaving partial state.
    fn execute(&mut self) -> Result<()>;

    /// Reverse a successful `execute`. Non-undoable commands do nothing.
    fn undo(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether `undo` reverses anything.
    fn is_undoable(&self) -> bool {
        false
    }

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Undo whatever `cmd` managed to do when `outcome` is a failure.
///
/// The original error is returned; an undo failure is attached to it rather
/// than replacing it.
fn self_cleaning<C: Command + ?Sized>(cmd: &mut C, outcome: Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(err) => match cmd.undo() {
            Ok(()) => Err(err),
            Err(undo_err) => Err(Error::with_rollback(err, vec![undo_err])),
        },
    }
}

/// Require `path` to be a regular file, following symlinks.
fn require_file(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(Error::not_a_file(path)),
    }
}

/// Require `path` itself (not a link target) to be a regular file.
fn require_plain_file(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_file() => Ok(()),
        _ => Err(Error::not_a_file(path)),
    }
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Rename, falling back to copy-and-delete across filesystems.
fn rename_or_copy(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            if let Err(e) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
        other => other,
    }
}

/// Copy a regular file. Copying leaves the source alone, so undo is a no-op.
#[derive(Debug)]
pub struct CopyFile {
    src: PathBuf,
    dest: PathBuf,
}

impl CopyFile {
    pub fn new(src: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
        }
    }
}

impl Command for CopyFile {
    fn execute(&mut self) -> Result<()> {
        require_file(&self.src)?;
        debug!(src = %self.src.display(), dest = %self.dest.display(), "copy");
        fs::copy(&self.src, &self.dest)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("copy {} -> {}", self.src.display(), self.dest.display())
    }
}

/// Rename a regular file. An existing `dest` is overwritten.
#[derive(Debug)]
pub struct MoveFile {
    src: PathBuf,
    dest: PathBuf,
    moved: bool,
}

impl MoveFile {
    pub fn new(src: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            moved: false,
        }
    }
}

impl Command for MoveFile {
    fn execute(&mut self) -> Result<()> {
        require_plain_file(&self.src)?;
        debug!(src = %self.src.display(), dest = %self.dest.display(), "move");
        rename_or_copy(&self.src, &self.dest)?;
        self.moved = true;
        Ok(())
    }

    fn undo(&mut self) -> Result<()> {
        if self.moved {
            debug!(src = %self.src.display(), dest = %self.dest.display(), "undo move");
            rename_or_copy(&self.dest, &self.src)?;
            self.moved = false;
        }
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("move {} -> {}", self.src.display(), self.dest.display())
    }
}

/// Move a file while keeping a backup copy beside the source until the
/// move has completed.
///
/// A leftover backup next to a missing source means an earlier run died
/// mid-move; see [`SafeMove::interrupted`].
#[derive(Debug)]
pub struct SafeMove {
    src: PathBuf,
    dest: PathBuf,
    backup: PathBuf,
    backed_up: bool,
    moved: bool,
}

impl SafeMove {
    /// Keep the backup in the source's own directory.
    pub fn new(src: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        let src = src.into();
        let backup = Self::backup_path(&src);
        Self {
            src,
            dest: dest.into(),
            backup,
            backed_up: false,
            moved: false,
        }
    }

    /// Where the backup of `src` lives while a safe-move is in flight.
    pub fn backup_path(src: &Path) -> PathBuf {
        let dir = src.parent().map(Path::to_path_buf).unwrap_or_default();
        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        dir.join(format!("{BACKUP_PREFIX}{name}"))
    }

    /// Backup left behind by a safe-move of `src` that never finished.
    ///
    /// Returns the backup path when it exists while `src` does not.
    pub fn interrupted(src: &Path) -> Option<PathBuf> {
        let backup = Self::backup_path(src);
        (backup.is_file() && !exists_no_follow(src)).then_some(backup)
    }

    fn apply(&mut self) -> Result<()> {
        self.backed_up = true;
        fs::copy(&self.src, &self.backup)?;
        rename_or_copy(&self.src, &self.dest)?;
        self.moved = true;
        fs::remove_file(&self.backup)?;
        self.backed_up = false;
        Ok(())
    }
}

impl Command for SafeMove {
    fn execute(&mut self) -> Result<()> {
        require_plain_file(&self.src)?;
        debug!(
            src = %self.src.display(),
            dest = %self.dest.display(),
            backup = %self.backup.display(),
            "safe move"
        );
        let outcome = self.apply();
        self_cleaning(self, outcome)
    }

    fn undo(&mut self) -> Result<()> {
        if self.moved {
            debug!(src = %self.src.display(), dest = %self.dest.display(), "undo safe move");
            if self.backed_up && self.backup.is_file() {
                fs::rename(&self.backup, &self.src)?;
                if exists_no_follow(&self.dest) {
                    fs::remove_file(&self.dest)?;
                }
            } else {
                rename_or_copy(&self.dest, &self.src)?;
            }
            self.moved = false;
            self.backed_up = false;
        } else if self.backed_up {
            match fs::remove_file(&self.backup) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
            self.backed_up = false;
        }
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("safe move {} -> {}", self.src.display(), self.dest.display())
    }
}

/// Create a symbolic link `link -> target`.
#[derive(Debug)]
pub struct Symlink {
    link: PathBuf,
    target: PathBuf,
    created: bool,
}

impl Symlink {
    pub fn new(link: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            link: link.into(),
            target: target.into(),
            created: false,
        }
    }
}

impl Command for Symlink {
    fn execute(&mut self) -> Result<()> {
        debug!(link = %self.link.display(), target = %self.target.display(), "symlink");
        std::os::unix::fs::symlink(&self.target, &self.link)?;
        self.created = true;
        Ok(())
    }

    fn undo(&mut self) -> Result<()> {
        // Only remove the link if it is still the one we made.
        if self.created && fs::read_link(&self.link).is_ok_and(|t| t == self.target) {
            debug!(link = %self.link.display(), "undo symlink");
            fs::remove_file(&self.link)?;
        }
        self.created = false;
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("symlink {} -> {}", self.link.display(), self.target.display())
    }
}

/// Set permission bits, remembering the previous ones.
#[derive(Debug)]
pub struct ChangeMode {
    path: PathBuf,
    mode: u32,
    previous: Option<u32>,
}

impl ChangeMode {
    pub fn new(path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            path: path.into(),
            mode,
            previous: None,
        }
    }
}

impl Command for ChangeMode {
    fn execute(&mut self) -> Result<()> {
        let previous = fs::metadata(&self.path)?.permissions().mode() & 0o7777;
        debug!(path = %self.path.display(), from = %format!("{previous:o}"), to = %format!("{:o}", self.mode), "chmod");
        fs::set_permissions(&self.path, fs::Permissions::from_mode(self.mode))?;
        self.previous = Some(previous);
        Ok(())
    }

    fn undo(&mut self) -> Result<()> {
        if let Some(previous) = self.previous.take() {
            debug!(path = %self.path.display(), mode = %format!("{previous:o}"), "undo chmod");
            fs::set_permissions(&self.path, fs::Permissions::from_mode(previous))?;
        }
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("chmod {:o} {}", self.mode, self.path.display())
    }
}

/// Create a directory and any missing parents.
#[derive(Debug)]
pub struct MakeDirectory {
    path: PathBuf,
    mode: Option<u32>,
    /// Directories this command created, deepest first.
    created: Vec<PathBuf>,
}

impl MakeDirectory {
    /// Directories get the default mode, subject to the umask.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: None,
            created: Vec::new(),
        }
    }

    /// Set `mode` on the leaf directory if it had to be created.
    pub fn with_mode(path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            mode: Some(mode),
            ..Self::new(path)
        }
    }

    fn apply(&mut self) -> Result<()> {
        let missing: Vec<PathBuf> = self
            .path
            .ancestors()
            .take_while(|p| !p.as_os_str().is_empty() && !exists_no_follow(p))
            .map(Path::to_path_buf)
            .collect();

        // Shallowest first, so each parent exists before its child.
        for dir in missing.iter().rev() {
            fs::create_dir(dir)?;
            self.created.insert(0, dir.clone());
        }
        if let (false, Some(mode)) = (missing.is_empty(), self.mode) {
            fs::set_permissions(&self.path, fs::Permissions::from_mode(mode))?;
        }
        Ok(())
    }
}

impl Command for MakeDirectory {
    fn execute(&mut self) -> Result<()> {
        debug!(path = %self.path.display(), "mkdir");
        let outcome = self.apply();
        self_cleaning(self, outcome)
    }

    fn undo(&mut self) -> Result<()> {
        // remove_dir refuses non-empty directories, which leaves anything
        // created there since untouched.
        for dir in std::mem::take(&mut self.created) {
            debug!(path = %dir.display(), "undo mkdir");
            fs::remove_dir(&dir)?;
        }
        Ok(())
    }

    fn is_undoable(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("mkdir {}", self.path.display())
    }
}

/// Delete a file. Not undoable, so it belongs at the end of a transaction.
#[derive(Debug)]
pub struct RemoveFile {
    path: PathBuf,
}

impl RemoveFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Command for RemoveFile {
    fn execute(&mut self) -> Result<()> {
        require_plain_file(&self.path)?;
        debug!(path = %self.path.display(), "remove");
        fs::remove_file(&self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("remove {}", self.path.display())
    }
}
