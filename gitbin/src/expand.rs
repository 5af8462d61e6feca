//! Operand expansion: `~`, `$VAR`/`${VAR}` and glob patterns.

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// `$NAME` or `${NAME}`.
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("VAR_REGEX compilation should never fail")
});

/// Replace environment references; unset variables are left as written.
pub fn expand_vars(input: &str) -> String {
    VAR_REGEX
        .replace_all(input, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if !path.as_os_str().as_encoded_bytes().starts_with(b"~") {
        return path.to_path_buf();
    }

    let Some(home) = dirs::home_dir() else {
        return path.to_path_buf();
    };

    match path.to_str() {
        Some("~") => home,
        Some(s) if s.starts_with("~/") => home.join(&s[2..]),
        _ => path.to_path_buf(),
    }
}

fn is_pattern(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Expand one operand into the paths it names.
///
/// A pattern matching nothing is passed through as is so the verb can
/// report it.
pub fn expand_operand(operand: &str) -> Result<Vec<PathBuf>> {
    let expanded = expand_tilde(Path::new(&expand_vars(operand)));
    let text = expanded.to_string_lossy().into_owned();
    if !is_pattern(&text) {
        return Ok(vec![expanded]);
    }

    let mut matches = glob::glob(&text)
        .with_context(|| format!("Invalid pattern: {text}"))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to expand {text}"))?;
    if matches.is_empty() {
        return Ok(vec![expanded]);
    }
    matches.sort();
    Ok(matches)
}

/// Expand every operand, keeping command-line order.
pub fn expand_all(operands: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for operand in operands {
        out.extend(expand_operand(operand)?);
    }
    Ok(out)
}
