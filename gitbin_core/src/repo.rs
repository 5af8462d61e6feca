//! The git repository seen from the binstore: path status, staging, and
//! configuration.
//!
//! The binstore never inspects the index itself. Everything it needs from
//! git goes through [`Repository`] and [`ConfigStore`], implemented here
//! by shelling out to the `git` executable.

use crate::error::{Error, Result};
use bitflags::bitflags;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

bitflags! {
    /// A path's state relative to the index and HEAD.
    ///
    /// `STAGED`/`UNSTAGED` say which side changed, the remaining bits say
    /// how. An empty set means the path is unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RepoStatus: u32 {
        const UNTRACKED = 0x01;
        const STAGED = 0x02;
        const UNSTAGED = 0x04;
        const MODIFIED = 0x08;
        const DELETED = 0x10;
        const RENAMED = 0x20;
        const TYPECHANGED = 0x40;
        const ADDED = 0x80;
        const COPIED = 0x100;

        const STAGED_MASK = Self::STAGED.bits() | Self::UNSTAGED.bits();
        const CHANGED_MASK = Self::MODIFIED.bits()
            | Self::DELETED.bits()
            | Self::RENAMED.bits()
            | Self::TYPECHANGED.bits()
            | Self::ADDED.bits()
            | Self::COPIED.bits();
    }
}

impl RepoStatus {
    /// Changes exist in the index and nowhere else.
    pub fn is_staged(&self) -> bool {
        self.intersection(Self::STAGED_MASK) == Self::STAGED
    }

    /// Changes exist in the working tree and nowhere else.
    pub fn is_unstaged(&self) -> bool {
        self.intersection(Self::STAGED_MASK) == Self::UNSTAGED
    }

    /// Some kind of change relative to HEAD is recorded.
    pub fn is_changed(&self) -> bool {
        self.intersects(Self::CHANGED_MASK)
    }

    pub fn is_untracked(&self) -> bool {
        self.contains(Self::UNTRACKED)
    }

    /// Nothing to report for the path.
    pub fn is_unchanged(&self) -> bool {
        !self.is_changed() && !self.is_untracked()
    }

    fn from_kind(c: char) -> Option<Self> {
        match c {
            'M' => Some(Self::MODIFIED),
            'D' => Some(Self::DELETED),
            'R' => Some(Self::RENAMED),
            'T' => Some(Self::TYPECHANGED),
            'A' => Some(Self::ADDED),
            'C' => Some(Self::COPIED),
            _ => None,
        }
    }
}

/// Parse the first entry of `git status --porcelain` output for `path`.
///
/// Empty output means the path is unchanged. Index (`X`) and working tree
/// (`Y`) columns contribute `STAGED` and `UNSTAGED` respectively, each with
/// its change kind.
pub fn parse_porcelain(path: &Path, output: &str) -> Result<RepoStatus> {
    let Some(line) = output.lines().find(|l| !l.trim().is_empty()) else {
        return Ok(RepoStatus::empty());
    };

    let mut marker = line.chars();
    let (Some(x), Some(y)) = (marker.next(), marker.next()) else {
        return Err(Error::unknown_status(path, line));
    };

    if x == '?' && y == '?' {
        return Ok(RepoStatus::UNTRACKED);
    }

    let code: String = [x, y].iter().collect();
    let mut status = RepoStatus::empty();
    for (column, side) in [(x, RepoStatus::STAGED), (y, RepoStatus::UNSTAGED)] {
        if column == ' ' {
            continue;
        }
        let kind =
            RepoStatus::from_kind(column).ok_or_else(|| Error::unknown_status(path, code.as_str()))?;
        status |= side | kind;
    }

    if status.is_empty() {
        return Err(Error::unknown_status(path, code.as_str()));
    }
    Ok(status)
}

/// The version-control operations the binstore relies on.
pub trait Repository {
    /// Working tree root.
    fn root(&self) -> &Path;

    /// Name used for this repository's directory under the store base.
    fn name(&self) -> Result<String>;

    /// The `.git` directory.
    fn git_dir(&self) -> PathBuf {
        self.root().join(".git")
    }

    /// State of `path` relative to the index and HEAD.
    fn status(&self, path: &Path) -> Result<RepoStatus>;

    /// Stage `path`.
    fn add(&self, path: &Path) -> Result<()>;

    /// Unstage `path`. Does nothing unless the change is staged only,
    /// unless `no_check` forces it.
    fn unstage(&self, path: &Path, no_check: bool) -> Result<()>;

    /// Restore `path` to its content at HEAD.
    fn restore(&self, path: &Path) -> Result<()>;
}

/// Repository-scoped key/value configuration.
pub trait ConfigStore {
    /// Read `section.key`.
    fn get(&self, section: &str, key: &str) -> Result<Option<String>>;

    /// Write `section.key`.
    fn set(&self, section: &str, key: &str, value: &str) -> Result<()>;

    /// Read `section.key`, falling back to `default`.
    fn get_or(&self, section: &str, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get(section, key)?
            .unwrap_or_else(|| default.to_string()))
    }
}

/// Find the working tree containing `path`.
///
/// A submodule's parent is not considered: the nearest `.git` wins.
pub fn find_repo_root(path: &Path) -> Result<PathBuf> {
    let start = std::path::absolute(path)?;
    let root = start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf);
    root.ok_or(Error::NotARepository { path: start })
}

/// Repository name derived from the origin URL, or the directory name.
///
/// `git@host:team/project.git` yields `team/project.git`;
/// `https://host/team/project.git` yields `team/project.git`.
pub fn repo_name(root: &Path, origin_url: Option<&str>) -> String {
    let from_url = origin_url.map(str::trim).and_then(|url| {
        let rest = match url.split_once("://") {
            Some((_, after_scheme)) => after_scheme.split_once('/').map(|(_, p)| p),
            None => url.split_once(':').map(|(_, p)| p),
        }?;
        let rest = rest.trim_matches('/');
        (!rest.is_empty()).then(|| rest.to_string())
    });

    from_url.unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repo".to_string())
    })
}

/// Run git in `dir`, returning stdout on success.
fn run_git(dir: &Path, args: Vec<OsString>) -> Result<Option<String>> {
    let command_line = format!(
        "git {}",
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );
    debug!(command = %command_line, dir = %dir.display(), "run");

    let output = duct::cmd("git", args)
        .dir(dir)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()?;

    if output.status.success() {
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    } else if output.status.code() == Some(1) && output.stderr.is_empty() {
        // `git config --get` reports a missing key this way.
        Ok(None)
    } else {
        Err(Error::operation(
            command_line,
            output.status.to_string(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

fn run_git_checked(dir: &Path, args: Vec<OsString>) -> Result<String> {
    let command_line = args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    run_git(dir, args)?
        .ok_or_else(|| Error::operation(format!("git {command_line}"), "exit status: 1", ""))
}

fn args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    items.into_iter().map(Into::into).collect()
}

/// Configuration stored in the repository's git config.
#[derive(Debug, Clone)]
pub struct GitConfig {
    root: PathBuf,
}

impl GitConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ConfigStore for GitConfig {
    fn get(&self, section: &str, key: &str) -> Result<Option<String>> {
        let name = format!("{section}.{key}");
        let value = run_git(&self.root, args(["config", "--get", name.as_str()]))?;
        Ok(value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    fn set(&self, section: &str, key: &str, value: &str) -> Result<()> {
        let name = format!("{section}.{key}");
        run_git_checked(&self.root, args(["config", name.as_str(), value]))?;
        Ok(())
    }
}

/// A git working tree driven through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
    config: GitConfig,
}

impl GitRepo {
    /// Open the working tree containing `path`.
    pub fn discover(path: &Path) -> Result<Self> {
        let root = find_repo_root(path)?;
        Ok(Self {
            config: GitConfig::new(&root),
            root,
        })
    }

    /// The repository's git config.
    pub fn config(&self) -> &GitConfig {
        &self.config
    }

    fn path_args(&self, leading: &[&str], path: &Path) -> Vec<OsString> {
        let mut out = args(leading.iter().copied());
        out.push("--".into());
        out.push(path.as_os_str().to_os_string());
        out
    }
}

impl Repository for GitRepo {
    fn root(&self) -> &Path {
        &self.root
    }

    fn name(&self) -> Result<String> {
        let origin = self.config.get("remote.origin", "url")?;
        Ok(repo_name(&self.root, origin.as_deref()))
    }

    fn status(&self, path: &Path) -> Result<RepoStatus> {
        let output = run_git_checked(&self.root, self.path_args(&["status", "--porcelain"], path))?;
        let status = parse_porcelain(path, &output)?;
        debug!(path = %path.display(), status = ?status, "status");
        Ok(status)
    }

    fn add(&self, path: &Path) -> Result<()> {
        run_git_checked(&self.root, self.path_args(&["add"], path))?;
        Ok(())
    }

    fn unstage(&self, path: &Path, no_check: bool) -> Result<()> {
        if !no_check && !self.status(path)?.is_staged() {
            return Ok(());
        }
        run_git_checked(&self.root, self.path_args(&["reset", "-q"], path))?;
        Ok(())
    }

    fn restore(&self, path: &Path) -> Result<()> {
        let status = self.status(path)?;
        if !status.is_changed() {
            return Ok(());
        }
        if status.is_staged() {
            self.unstage(path, true)?;
        }
        run_git_checked(&self.root, self.path_args(&["checkout"], path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(output: &str) -> RepoStatus {
        parse_porcelain(Path::new("f"), output).unwrap()
    }

    #[test]
    fn test_parse_untracked() {
        assert_eq!(parse("?? f\n"), RepoStatus::UNTRACKED);
        assert!(parse("?? f\n").is_untracked());
    }

    #[test]
    fn test_parse_unchanged() {
        let status = parse("");
        assert!(status.is_empty());
        assert!(status.is_unchanged());
    }

    #[test]
    fn test_parse_unstaged_modified() {
        let status = parse(" M f\n");
        assert_eq!(status, RepoStatus::UNSTAGED | RepoStatus::MODIFIED);
        assert!(status.is_unstaged());
        assert!(!status.is_staged());
        assert!(status.is_changed());
    }

    #[test]
    fn test_parse_staged_added() {
        let status = parse("A  f\n");
        assert_eq!(status, RepoStatus::STAGED | RepoStatus::ADDED);
        assert!(status.is_staged());
    }

    #[test]
    fn test_parse_typechange() {
        assert_eq!(
            parse(" T f\n"),
            RepoStatus::UNSTAGED | RepoStatus::TYPECHANGED
        );
    }

    #[test]
    fn test_parse_both_columns() {
        let status = parse("AM f\n");
        assert!(status.contains(RepoStatus::STAGED | RepoStatus::UNSTAGED));
        assert!(status.contains(RepoStatus::ADDED | RepoStatus::MODIFIED));
        assert!(!status.is_staged());
        assert!(!status.is_unstaged());
    }

    #[test]
    fn test_parse_rename_uses_first_line() {
        let status = parse("R  old -> new\n M other\n");
        assert_eq!(status, RepoStatus::STAGED | RepoStatus::RENAMED);
    }

    #[test]
    fn test_parse_unknown_marker() {
        assert!(matches!(
            parse_porcelain(Path::new("f"), "UU f\n"),
            Err(Error::UnknownStatus { .. })
        ));
        assert!(parse_porcelain(Path::new("f"), "X").is_err());
    }

    #[test]
    fn test_mask_values_match_bits() {
        assert_eq!(RepoStatus::STAGED_MASK.bits(), 0x6);
        assert_eq!(RepoStatus::CHANGED_MASK.bits(), 0x1f8);
    }

    #[test]
    fn test_repo_name() {
        let root = Path::new("/work/photos");
        assert_eq!(repo_name(root, None), "photos");
        assert_eq!(
            repo_name(root, Some("git@github.com:team/photos.git")),
            "team/photos.git"
        );
        assert_eq!(
            repo_name(root, Some("https://github.com/team/photos.git\n")),
            "team/photos.git"
        );
        assert_eq!(repo_name(root, Some("/srv/git/photos")), "photos");
    }

    #[test]
    fn test_find_repo_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("repo");
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir(root.join(".git")).unwrap();

        assert_eq!(find_repo_root(&nested).unwrap(), root);
    }

    #[test]
    fn test_find_repo_root_outside_repo() {
        let temp_dir = TempDir::new().unwrap();
        // TempDir may itself live under a checkout; only assert the error type
        // when no ancestor is a repository.
        if temp_dir.path().ancestors().all(|d| !d.join(".git").exists()) {
            assert!(matches!(
                find_repo_root(temp_dir.path()),
                Err(Error::NotARepository { .. })
            ));
        }
    }

    #[test]
    fn test_failed_git_reports_command_line() {
        let temp_dir = TempDir::new().unwrap();
        match run_git(temp_dir.path(), args(["no-such-subcommand", "--flag"])) {
            Err(Error::Operation { command, stderr, .. }) => {
                assert_eq!(command, "git no-such-subcommand --flag");
                assert!(!stderr.is_empty());
            }
            // git is not installed
            Err(Error::Io { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
