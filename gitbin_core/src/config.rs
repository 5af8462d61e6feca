//! Binstore configuration.
//!
//! Two layers: the repository's git config says *where* the store lives
//! (`binstore.path`, or `git-bin.binstorebase` to create one), and the store
//! root holds a small `config` file saying *how* entries are named.

use crate::error::{Error, Result};
use crate::hash::Algorithm;
use crate::repo::ConfigStore;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Git config section holding the store path.
pub const STORE_SECTION: &str = "binstore";
/// Key of the store path within [`STORE_SECTION`].
pub const STORE_PATH_KEY: &str = "path";
/// Git config section holding the store base directory.
pub const BASE_SECTION: &str = "git-bin";
/// Key of the base directory within [`BASE_SECTION`].
pub const BASE_KEY: &str = "binstorebase";
/// Key within [`BASE_SECTION`] naming the digest for newly created stores.
pub const ALGORITHM_KEY: &str = "algorithm";

/// Name of the store's own config file.
pub const STORE_CONFIG_FILE: &str = "config";
/// Name of the in-repository link to the store used by the compat layout.
pub const LOCAL_LINK_NAME: &str = "binstore";

/// How working links address store entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Links point at `<store root>/<digest>`.
    #[default]
    Direct,
    /// Links point at `<repo>/.git/binstore/<digest>`, where
    /// `.git/binstore` is itself a link to the store root.
    Compat,
}

/// Everything a binstore needs to know about its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinstoreConfig {
    /// Directory holding the store entries.
    pub root: PathBuf,
    /// Prefix written into working links.
    pub link_root: PathBuf,
    /// Digest used to name entries.
    pub algorithm: Algorithm,
    pub layout: Layout,
}

impl BinstoreConfig {
    /// Direct layout rooted at `root`, with the default algorithm.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            link_root: root.clone(),
            root,
            algorithm: Algorithm::default(),
            layout: Layout::Direct,
        }
    }

    /// Choose the link layout; `git_dir` anchors the compat link.
    pub fn with_layout(mut self, layout: Layout, git_dir: &Path) -> Self {
        self.layout = layout;
        self.link_root = match layout {
            Layout::Direct => self.root.clone(),
            Layout::Compat => git_dir.join(LOCAL_LINK_NAME),
        };
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Load the algorithm recorded in the store's config file.
    ///
    /// A store without a config file predates it and uses the default.
    pub fn load_algorithm(mut self) -> Result<Self> {
        let path = self.root.join(STORE_CONFIG_FILE);
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            self.algorithm = parse_store_config(&self.root, &content)?;
        }
        Ok(self)
    }
}

/// The configured store root, if any.
///
/// Fails with `BinstoreMissing` when a path is configured but gone.
pub fn configured_root(settings: &dyn ConfigStore) -> Result<Option<PathBuf>> {
    let Some(path) = settings.get(STORE_SECTION, STORE_PATH_KEY)? else {
        return Ok(None);
    };
    let path = PathBuf::from(path);
    if !path.is_dir() {
        return Err(Error::binstore_missing(path));
    }
    debug!(root = %path.display(), "configured binstore");
    Ok(Some(path))
}

/// Where a new store for `repo_name` would be created.
///
/// Fails with `BinstoreUnconfigured` when no base directory is set.
pub fn planned_root(settings: &dyn ConfigStore, repo_name: &str) -> Result<PathBuf> {
    let base = settings
        .get(BASE_SECTION, BASE_KEY)?
        .ok_or(Error::BinstoreUnconfigured)?;
    Ok(std::path::absolute(PathBuf::from(base).join(repo_name))?)
}

/// Digest algorithm a new store should use, from `git-bin.algorithm`.
///
/// Existing stores keep whatever their own config file records.
pub fn requested_algorithm(settings: &dyn ConfigStore) -> Result<Algorithm> {
    let name = settings.get_or(BASE_SECTION, ALGORITHM_KEY, Algorithm::default().as_str())?;
    Algorithm::parse(name.trim())
}

/// Render the store config file.
pub fn render_store_config(algorithm: Algorithm) -> String {
    format!("version=1\nalgo={}\n", algorithm.as_str())
}

/// Parse the store config file to extract the algorithm.
pub fn parse_store_config(root: &Path, content: &str) -> Result<Algorithm> {
    let mut version = None;
    let mut algo = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "version" => version = Some(value.trim()),
                "algo" => algo = Some(value.trim()),
                _ => {}
            }
        }
    }

    if version != Some("1") {
        return Err(Error::invalid_store(
            root,
            format!("unsupported config version: {:?}", version),
        ));
    }

    let algo_str = algo.ok_or_else(|| Error::invalid_store(root, "missing algo in config"))?;
    Algorithm::parse(algo_str)
}
