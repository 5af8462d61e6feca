//! The user-facing verbs: add, edit, reset and checkout.
//!
//! Each verb takes the store lock for its whole run, walks its operands
//! and reports one [`Outcome`] per path it looked at. Errors that only
//! concern one path are reported as [`Action::Failed`]; anything else
//! aborts the verb.

use crate::binstore::{Backend, FilesystemBinstore};
use crate::classify::{self, PathKind};
use crate::command::{ChangeMode, CopyFile, SafeMove};
use crate::config::Layout;
use crate::error::Result;
use crate::hash::Digest;
use crate::repo::{GitRepo, RepoStatus, Repository};
use crate::transaction::Transaction;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix of the copy kept when a restore would discard unstored content.
pub const JUSTINCASE_SUFFIX: &str = "justincase";

/// What a verb did with one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Moved into the store and replaced by a staged link.
    Stored { digest: Digest },
    /// Already a link into the store.
    AlreadyStored,
    /// Handed to `git add` as is.
    Staged,
    /// Nothing exists at the path.
    NoMatch,
    /// A backup from an unfinished move sits next to the missing path.
    Interrupted { backup: PathBuf },
    /// Replaced by a writable copy of its store entry.
    Edited,
    /// Not a link into the store, so there is nothing to edit.
    NotInStore,
    /// Removed from the index; `restored` when the real bytes were put
    /// back in place of the link.
    Unstaged { restored: bool },
    /// Reverted to HEAD, keeping a copy of unstored content in `backup`.
    Restored { backup: Option<PathBuf> },
    /// Left alone, with a hint for the user.
    Skipped { hint: String },
    /// A per-path error.
    Failed { reason: String },
}

/// One path and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub path: PathBuf,
    #[serde(flatten)]
    pub action: Action,
}

impl Outcome {
    fn new(path: &Path, action: Action) -> Self {
        debug!(path = %path.display(), ?action, "outcome");
        Self {
            path: path.to_path_buf(),
            action,
        }
    }
}

fn skipped(path: &Path, hint: impl Into<String>) -> Outcome {
    Outcome::new(path, Action::Skipped { hint: hint.into() })
}

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.is_dir())
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// First free `<path>.justincase[.N]`.
pub fn justincase_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{JUSTINCASE_SUFFIX}"));
    let base = PathBuf::from(name);

    let mut candidate = base.clone();
    let mut n = 1;
    while exists_no_follow(&candidate) {
        let mut name = base.as_os_str().to_os_string();
        name.push(format!(".{n}"));
        candidate = PathBuf::from(name);
        n += 1;
    }
    candidate
}

/// The verbs, bound to one repository and one store.
pub struct GitBin<R, B> {
    repo: R,
    store: B,
}

impl GitBin<GitRepo, FilesystemBinstore> {
    /// Open the binstore of the repository containing `path`, creating the
    /// store on first use.
    pub fn init(path: &Path, layout: Layout) -> Result<Self> {
        let repo = GitRepo::discover(path)?;
        let store = FilesystemBinstore::open_or_init(&repo, repo.config(), layout)?;
        Ok(Self::new(repo, store))
    }
}

impl<R: Repository, B: Backend> GitBin<R, B> {
    pub fn new(repo: R, store: B) -> Self {
        Self { repo, store }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn store(&self) -> &B {
        &self.store
    }

    /// Store binary files, stage everything else.
    pub fn add(&self, paths: &[PathBuf]) -> Result<Vec<Outcome>> {
        self.run("add", paths, Self::add_one)
    }

    /// Swap store links for writable copies.
    pub fn edit(&self, paths: &[PathBuf]) -> Result<Vec<Outcome>> {
        self.run("edit", paths, Self::edit_one)
    }

    /// Unstage paths, bringing back real files for links that are no
    /// longer tracked as they were.
    pub fn reset(&self, paths: &[PathBuf]) -> Result<Vec<Outcome>> {
        self.run("reset", paths, Self::reset_one)
    }

    /// Discard unstaged changes, quarantining content the store lacks.
    pub fn checkout_dashdash(&self, paths: &[PathBuf]) -> Result<Vec<Outcome>> {
        self.run("checkout --", paths, Self::checkout_one)
    }

    fn run(
        &self,
        verb: &str,
        paths: &[PathBuf],
        step: fn(&Self, &Path, &mut Vec<Outcome>) -> Result<()>,
    ) -> Result<Vec<Outcome>> {
        let _lock = self.store.lock()?;
        debug!(verb, count = paths.len(), "running");

        let mut outcomes = Vec::new();
        for path in paths {
            let path = std::path::absolute(path)?;
            self.guarded(&path, &mut outcomes, step)?;
        }
        Ok(outcomes)
    }

    /// Run `step`, turning per-path errors into outcomes.
    fn guarded(
        &self,
        path: &Path,
        outcomes: &mut Vec<Outcome>,
        step: fn(&Self, &Path, &mut Vec<Outcome>) -> Result<()>,
    ) -> Result<()> {
        match step(self, path, outcomes) {
            Err(e) if !e.is_fatal() => {
                warn!(path = %path.display(), error = %e, "skipping");
                outcomes.push(Outcome::new(
                    path,
                    Action::Failed {
                        reason: e.to_string(),
                    },
                ));
                Ok(())
            }
            other => other,
        }
    }

    fn recurse(
        &self,
        dir: &Path,
        outcomes: &mut Vec<Outcome>,
        step: fn(&Self, &Path, &mut Vec<Outcome>) -> Result<()>,
    ) -> Result<()> {
        let (dirs, files) = classify::children(dir)?;
        for path in dirs.iter().chain(files.iter()) {
            self.guarded(path, outcomes, step)?;
        }
        Ok(())
    }

    fn kind(&self, path: &Path) -> Result<PathKind> {
        let kind = classify::classify(path, &self.store)?;
        debug!(path = %path.display(), ?kind, "classified");
        Ok(kind)
    }

    fn add_one(&self, path: &Path, outcomes: &mut Vec<Outcome>) -> Result<()> {
        if let Some(backup) = SafeMove::interrupted(path) {
            warn!(
                path = %path.display(),
                backup = %backup.display(),
                "an earlier run was interrupted; move the backup back before adding"
            );
            outcomes.push(Outcome::new(path, Action::Interrupted { backup }));
            return Ok(());
        }

        let outcome = match self.kind(path)? {
            PathKind::Missing => Outcome::new(path, Action::NoMatch),
            PathKind::RealSymlink => {
                self.warn_if_dangling(path);
                self.repo.add(path)?;
                Outcome::new(path, Action::Staged)
            }
            PathKind::StoreLink => Outcome::new(path, Action::AlreadyStored),
            PathKind::Text => {
                self.repo.add(path)?;
                Outcome::new(path, Action::Staged)
            }
            PathKind::Directory => return self.recurse(path, outcomes, Self::add_one),
            PathKind::Binary => {
                let digest = self.store.add(path, &self.repo)?;
                Outcome::new(path, Action::Stored { digest })
            }
            PathKind::Special => skipped(path, "not a regular file"),
        };
        outcomes.push(outcome);
        Ok(())
    }

    fn edit_one(&self, path: &Path, outcomes: &mut Vec<Outcome>) -> Result<()> {
        let outcome = match self.kind(path)? {
            PathKind::Missing => Outcome::new(path, Action::NoMatch),
            PathKind::StoreLink => {
                self.store.edit_file(path)?;
                Outcome::new(path, Action::Edited)
            }
            PathKind::Directory => return self.recurse(path, outcomes, Self::edit_one),
            PathKind::RealSymlink => {
                self.warn_if_dangling(path);
                Outcome::new(path, Action::NotInStore)
            }
            _ => Outcome::new(path, Action::NotInStore),
        };
        outcomes.push(outcome);
        Ok(())
    }

    fn reset_one(&self, path: &Path, outcomes: &mut Vec<Outcome>) -> Result<()> {
        if is_real_dir(path) {
            return self.recurse(path, outcomes, Self::reset_one);
        }

        let status = self.repo.status(path)?;
        if status.is_unchanged() {
            outcomes.push(if exists_no_follow(path) {
                skipped(path, "no changes to unstage")
            } else {
                Outcome::new(path, Action::NoMatch)
            });
            return Ok(());
        }
        if status.is_untracked() {
            outcomes.push(skipped(path, "not tracked; nothing to unstage"));
            return Ok(());
        }
        if !status.contains(RepoStatus::STAGED) {
            outcomes.push(skipped(
                path,
                "changes are not staged; use `git bin checkout -- <path>` to discard them",
            ));
            return Ok(());
        }

        self.repo.unstage(path, true)?;
        let after = self.repo.status(path)?;
        let restored = self.store.is_link_into_store(path)
            && after.intersects(RepoStatus::UNTRACKED | RepoStatus::MODIFIED);
        if restored {
            info!(path = %path.display(), "restoring stored content");
            self.store.edit_file(path)?;
        }
        outcomes.push(Outcome::new(path, Action::Unstaged { restored }));
        Ok(())
    }

    fn checkout_one(&self, path: &Path, outcomes: &mut Vec<Outcome>) -> Result<()> {
        if is_real_dir(path) {
            return self.recurse(path, outcomes, Self::checkout_one);
        }

        let status = self.repo.status(path)?;
        if status.is_unchanged() {
            outcomes.push(if exists_no_follow(path) {
                skipped(path, "no changes to discard")
            } else {
                Outcome::new(path, Action::NoMatch)
            });
            return Ok(());
        }
        if status.is_untracked() {
            outcomes.push(skipped(path, "not tracked; nothing to check out"));
            return Ok(());
        }
        if status.is_staged() {
            outcomes.push(skipped(
                path,
                "changes are staged; use `git bin reset <path>` first",
            ));
            return Ok(());
        }
        if !status.is_changed() {
            outcomes.push(skipped(path, "no changes to discard"));
            return Ok(());
        }

        let backup = if self.needs_quarantine(path, status)? {
            Some(self.quarantine(path)?)
        } else {
            None
        };
        self.repo.restore(path)?;
        outcomes.push(Outcome::new(path, Action::Restored { backup }));
        Ok(())
    }

    /// Restoring would lose content the store does not hold.
    fn needs_quarantine(&self, path: &Path, status: RepoStatus) -> Result<bool> {
        if !status.intersects(RepoStatus::TYPECHANGED | RepoStatus::MODIFIED) {
            return Ok(false);
        }
        let candidate = match self.kind(path)? {
            PathKind::StoreLink | PathKind::Binary => true,
            PathKind::Text => status.contains(RepoStatus::TYPECHANGED),
            _ => false,
        };
        Ok(candidate && !self.store.contains_content(path)?)
    }

    fn quarantine(&self, path: &Path) -> Result<PathBuf> {
        let backup = justincase_path(path);
        warn!(
            path = %path.display(),
            backup = %backup.display(),
            "content is not in the binstore; keeping a copy"
        );
        Transaction::new()
            .with(CopyFile::new(path, &backup))
            .with(ChangeMode::new(&backup, 0o644))
            .execute()?;
        Ok(backup)
    }

    fn warn_if_dangling(&self, path: &Path) {
        if self.store.is_dangling_store_link(path) {
            warn!(path = %path.display(), "link points into the binstore but its entry is missing");
        }
    }
}
