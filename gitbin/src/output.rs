//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use gitbin_core::{Action, Outcome};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(
        &self,
        data: &T,
        text_fn: impl FnOnce() -> String,
    ) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write the per-path outcomes of a verb.
    pub fn write_outcomes(&self, command: &str, outcomes: &[Outcome], cwd: &Path) -> Result<()> {
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o.action, Action::Failed { .. }))
            .count();
        let data = VerbOutput {
            success: failed == 0,
            result_code: if failed == 0 { 0 } else { 1 },
            command: command.to_string(),
            outcomes: outcomes.to_vec(),
        };
        self.write(&data, || {
            outcomes
                .iter()
                .map(|o| format!("{}\n", describe(o, cwd)))
                .collect()
        })
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    /// In text mode, writes the message, with its causes when `chain` is set.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8, chain: bool) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text if chain => {
                let _ = writeln!(io::stderr(), "error: {}", error);
                for cause in error.chain().skip(1) {
                    let _ = writeln!(io::stderr(), "  caused by: {}", cause);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "error: {:#}", error);
            }
        }
    }
}

/// `path` relative to `cwd` when it lies below it.
pub fn display_path(path: &Path, cwd: &Path) -> String {
    path.strip_prefix(cwd)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// One line of text output for an outcome.
pub fn describe(outcome: &Outcome, cwd: &Path) -> String {
    let path = display_path(&outcome.path, cwd);
    match &outcome.action {
        Action::Stored { digest } => format!("stored {path} ({})", &digest.to_hex()[..12]),
        Action::AlreadyStored => format!("{path}: already in binstore"),
        Action::Staged => format!("added {path}"),
        Action::NoMatch => format!("pathspec '{path}' did not match any files"),
        Action::Interrupted { backup } => format!(
            "{path}: an earlier run was interrupted; the content is in {}",
            display_path(backup, cwd)
        ),
        Action::Edited => format!("{path}: ready for editing"),
        Action::NotInStore => format!("{path}: not in binstore"),
        Action::Unstaged { restored: true } => format!("unstaged {path} (content restored)"),
        Action::Unstaged { restored: false } => format!("unstaged {path}"),
        Action::Restored { backup: Some(backup) } => format!(
            "restored {path} (previous content kept in {})",
            display_path(backup, cwd)
        ),
        Action::Restored { backup: None } => format!("restored {path}"),
        Action::Skipped { hint } => format!("{path}: {hint}"),
        Action::Failed { reason } => format!("{path}: {reason}"),
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub link_root: String,
    pub algorithm: String,
}

/// Output for the path verbs.
#[derive(Debug, Serialize)]
pub struct VerbOutput {
    pub success: bool,
    pub result_code: u8,
    pub command: String,
    pub outcomes: Vec<Outcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitbin_core::Digest;
    use std::path::PathBuf;

    fn outcome(path: &str, action: Action) -> Outcome {
        Outcome {
            path: PathBuf::from(path),
            action,
        }
    }

    #[test]
    fn test_display_path() {
        let cwd = Path::new("/work/repo");
        assert_eq!(display_path(Path::new("/work/repo/a/b.bin"), cwd), "a/b.bin");
        assert_eq!(display_path(Path::new("/elsewhere/c"), cwd), "/elsewhere/c");
    }

    #[test]
    fn test_describe() {
        let cwd = Path::new("/w");
        let digest = Digest::of_bytes(b"x");
        let line = describe(&outcome("/w/a.bin", Action::Stored { digest }), cwd);
        assert_eq!(line, format!("stored a.bin ({})", &digest.to_hex()[..12]));

        assert_eq!(
            describe(&outcome("/w/nope", Action::NoMatch), cwd),
            "pathspec 'nope' did not match any files"
        );
        assert_eq!(
            describe(
                &outcome(
                    "/w/a.bin",
                    Action::Restored {
                        backup: Some(PathBuf::from("/w/a.bin.justincase"))
                    }
                ),
                cwd
            ),
            "restored a.bin (previous content kept in a.bin.justincase)"
        );
    }

    #[test]
    fn test_verb_output_json() {
        let data = VerbOutput {
            success: true,
            result_code: 0,
            command: "reset".to_string(),
            outcomes: vec![outcome("/w/a.bin", Action::Unstaged { restored: true })],
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["command"], "reset");
        assert_eq!(json["outcomes"][0]["action"], "unstaged");
        assert_eq!(json["outcomes"][0]["path"], "/w/a.bin");
    }
}
