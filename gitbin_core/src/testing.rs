//! In-memory stand-ins for git used by the unit tests.

use crate::error::{Error, Result};
use crate::repo::{ConfigStore, RepoStatus, Repository};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Git config kept in a map.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: RefCell<HashMap<String, String>>,
}

impl ConfigStore for MemoryConfig {
    fn get(&self, section: &str, key: &str) -> Result<Option<String>> {
        Ok(self.values.borrow().get(&format!("{section}.{key}")).cloned())
    }

    fn set(&self, section: &str, key: &str, value: &str) -> Result<()> {
        self.values
            .borrow_mut()
            .insert(format!("{section}.{key}"), value.to_string());
        Ok(())
    }
}

/// A repository whose status table is scripted by the test.
///
/// `add` marks a path staged-added, `unstage` applies the scripted
/// post-unstage status (untracked by default), and `restore` clears the
/// status and runs the scripted restore hook. Every call is recorded.
#[derive(Default)]
pub struct FakeRepository {
    root: PathBuf,
    statuses: RefCell<HashMap<PathBuf, RepoStatus>>,
    after_unstage: RefCell<HashMap<PathBuf, RepoStatus>>,
    on_restore: RefCell<HashMap<PathBuf, Vec<u8>>>,
    calls: RefCell<Vec<(String, PathBuf)>>,
    fail_add: Cell<bool>,
}

impl FakeRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn set_status(&self, path: &Path, status: RepoStatus) {
        self.statuses.borrow_mut().insert(path.to_path_buf(), status);
    }

    pub fn set_status_after_unstage(&self, path: &Path, status: RepoStatus) {
        self.after_unstage
            .borrow_mut()
            .insert(path.to_path_buf(), status);
    }

    /// Make `restore(path)` write `content` as a regular file.
    pub fn set_restore_content(&self, path: &Path, content: &[u8]) {
        self.on_restore
            .borrow_mut()
            .insert(path.to_path_buf(), content.to_vec());
    }

    pub fn fail_add(&self, fail: bool) {
        self.fail_add.set(fail);
    }

    /// Recorded `(operation, path)` pairs.
    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.borrow().clone()
    }

    /// Paths passed to `operation`, in call order.
    pub fn calls_to(&self, operation: &str) -> Vec<PathBuf> {
        self.calls
            .borrow()
            .iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn record(&self, operation: &str, path: &Path) {
        self.calls
            .borrow_mut()
            .push((operation.to_string(), path.to_path_buf()));
    }
}

impl Repository for FakeRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn name(&self) -> Result<String> {
        Ok("fake".to_string())
    }

    fn status(&self, path: &Path) -> Result<RepoStatus> {
        Ok(self
            .statuses
            .borrow()
            .get(path)
            .copied()
            .unwrap_or(RepoStatus::empty()))
    }

    fn add(&self, path: &Path) -> Result<()> {
        if self.fail_add.get() {
            return Err(Error::operation(
                format!("git add -- {}", path.display()),
                "exit status: 128",
                "fatal: index.lock exists",
            ));
        }
        self.record("add", path);
        self.set_status(path, RepoStatus::STAGED | RepoStatus::ADDED);
        Ok(())
    }

    fn unstage(&self, path: &Path, no_check: bool) -> Result<()> {
        if !no_check && !self.status(path)?.is_staged() {
            return Ok(());
        }
        self.record("unstage", path);
        let next = self
            .after_unstage
            .borrow()
            .get(path)
            .copied()
            .unwrap_or(RepoStatus::UNTRACKED);
        self.set_status(path, next);
        Ok(())
    }

    fn restore(&self, path: &Path) -> Result<()> {
        self.record("restore", path);
        if let Some(content) = self.on_restore.borrow().get(path) {
            if std::fs::symlink_metadata(path).is_ok() {
                std::fs::remove_file(path)?;
            }
            std::fs::write(path, content)?;
        }
        self.set_status(path, RepoStatus::empty());
        Ok(())
    }
}
