//! Binary content detection.

use crate::error::Result;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Number of leading bytes inspected when sniffing for binary content.
const SNIFF_LEN: u64 = 8000;

/// Check whether a path holds binary content.
///
/// A file is binary when its first 8000 bytes contain a NUL byte. Symlinks
/// are followed. Directories report `true` since they are never text
/// that the repository could take as-is.
pub fn is_binary(path: &Path) -> Result<bool> {
    let metadata = fs::metadata(path)?;
    if metadata.is_dir() {
        return Ok(true);
    }

    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    fs::File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;
    Ok(is_binary_content(&head))
}

/// Check if content is binary.
pub fn is_binary_content(content: &[u8]) -> bool {
    content.iter().take(SNIFF_LEN as usize).any(|&b| b == 0)
}
