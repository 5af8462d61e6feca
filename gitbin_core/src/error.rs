//! Error types for gitbin_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using gitbin_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing the binstore.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A regular file was required but the path is missing or is a directory.
    #[error("Not a file: {path}")]
    NotAFile { path: PathBuf },

    /// Two different files share a digest.
    #[error(
        "Conflict: {path} has digest {digest} but differs in size from the stored copy \
         ({stored_size} bytes stored, {incoming_size} bytes incoming)"
    )]
    Conflict {
        path: PathBuf,
        digest: String,
        stored_size: u64,
        incoming_size: u64,
    },

    /// Neither a store path nor a store base directory is configured.
    #[error(
        "No binstore is configured: set git-bin.binstorebase \
         (e.g. `git config --global git-bin.binstorebase ~/binstore`)"
    )]
    BinstoreUnconfigured,

    /// The configured store path no longer exists.
    #[error(
        "Binstore missing at {path}: restore the directory or clear binstore.path \
         (`git config --unset binstore.path`)"
    )]
    BinstoreMissing { path: PathBuf },

    /// Store directory is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// An external repository command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    Operation {
        command: String,
        status: String,
        stderr: String,
    },

    /// The repository reported a status marker we do not understand.
    #[error("Unknown repository status {marker:?} for {path}")]
    UnknownStatus { path: PathBuf, marker: String },

    /// No enclosing git working tree.
    #[error("Not a git repository (or any parent up to /): {path}")]
    NotARepository { path: PathBuf },

    /// Invalid digest format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// The path is not a link into the binstore.
    #[error("Not in binstore: {path}")]
    NotInStore { path: PathBuf },

    /// A transaction was extended or run after it already finished.
    #[error("Transaction already {state}")]
    TransactionClosed { state: String },

    /// A transaction failed and undoing its completed steps failed as well.
    #[error("{source} (rollback incomplete: {})", summarize(.failures))]
    RollbackFailed {
        source: Box<Error>,
        failures: Vec<Error>,
    },
}

fn summarize(failures: &[Error]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a NotAFile error.
    pub fn not_a_file(path: impl Into<PathBuf>) -> Self {
        Error::NotAFile { path: path.into() }
    }

    /// Create a Conflict error.
    pub fn conflict(
        path: impl Into<PathBuf>,
        digest: impl Into<String>,
        stored_size: u64,
        incoming_size: u64,
    ) -> Self {
        Error::Conflict {
            path: path.into(),
            digest: digest.into(),
            stored_size,
            incoming_size,
        }
    }

    /// Create a BinstoreMissing error.
    pub fn binstore_missing(path: impl Into<PathBuf>) -> Self {
        Error::BinstoreMissing { path: path.into() }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an Operation error.
    pub fn operation(
        command: impl Into<String>,
        status: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Error::Operation {
            command: command.into(),
            status: status.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an UnknownStatus error.
    pub fn unknown_status(path: impl Into<PathBuf>, marker: impl Into<String>) -> Self {
        Error::UnknownStatus {
            path: path.into(),
            marker: marker.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Create a NotInStore error.
    pub fn not_in_store(path: impl Into<PathBuf>) -> Self {
        Error::NotInStore { path: path.into() }
    }

    /// Pair an original failure with the errors raised while undoing it.
    ///
    /// Returns the original error unchanged when every undo succeeded.
    pub fn with_rollback(source: Error, failures: Vec<Error>) -> Self {
        if failures.is_empty() {
            source
        } else {
            Error::RollbackFailed {
                source: Box::new(source),
                failures,
            }
        }
    }

    /// Whether this error must abort the whole verb rather than a single path.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::NotAFile { .. } | Error::NotInStore { .. } => false,
            Error::RollbackFailed { source, .. } => source.is_fatal(),
            _ => true,
        }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_rollback_without_failures_keeps_original() {
        let err = Error::with_rollback(Error::not_a_file("/tmp/x"), Vec::new());
        assert!(matches!(err, Error::NotAFile { .. }));
    }

    #[test]
    fn test_with_rollback_carries_both() {
        let err = Error::with_rollback(
            Error::operation("git add x", "exit status: 1", "fatal"),
            vec![Error::not_a_file("/tmp/y")],
        );
        let msg = err.to_string();
        assert!(msg.contains("git add x"));
        assert!(msg.contains("rollback incomplete"));
        assert!(msg.contains("/tmp/y"));
    }

    #[test]
    fn test_fatality() {
        assert!(!Error::not_a_file("a").is_fatal());
        assert!(Error::conflict("a", "00", 1, 2).is_fatal());
        assert!(Error::BinstoreUnconfigured.is_fatal());
    }
}
