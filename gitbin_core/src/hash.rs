//! Content digests for binstore entries.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use sha2::Digest as _;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Digest size in bytes (both supported algorithms produce 256-bit digests).
pub const DIGEST_SIZE: usize = 32;

/// Read buffer size used when streaming file content into a hasher.
pub const CHUNK_SIZE: usize = 4096;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// BLAKE3 with 256-bit output.
    #[default]
    Blake3,
    /// SHA-256.
    Sha256,
}

impl Algorithm {
    /// Returns the string representation of the algorithm (for config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Blake3 => "blake3-256",
            Algorithm::Sha256 => "sha256",
        }
    }

    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blake3-256" | "blake3" => Ok(Algorithm::Blake3),
            "sha256" => Ok(Algorithm::Sha256),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }
}

/// Computes the digest identifying a file body in the store.
///
/// The store only relies on equal content producing equal digests; tests
/// plug in degenerate hashers to provoke collisions.
pub trait ContentHasher: Send + Sync {
    /// Digest everything readable from `reader`.
    fn digest_reader(&self, reader: &mut dyn Read) -> Result<Digest>;

    /// Digest a file's bytes, following symlinks.
    fn digest_file(&self, path: &Path) -> Result<Digest> {
        let mut file = std::fs::File::open(path)?;
        self.digest_reader(&mut file)
    }
}

impl ContentHasher for Algorithm {
    fn digest_reader(&self, reader: &mut dyn Read) -> Result<Digest> {
        let mut buf = [0u8; CHUNK_SIZE];
        match self {
            Algorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                loop {
                    let n = read_chunk(reader, &mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(Digest(*hasher.finalize().as_bytes()))
            }
            Algorithm::Sha256 => {
                let mut hasher = sha2::Sha256::new();
                loop {
                    let n = read_chunk(reader, &mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                let mut bytes = [0u8; DIGEST_SIZE];
                bytes.copy_from_slice(&hasher.finalize());
                Ok(Digest(bytes))
            }
        }
    }
}

fn read_chunk(reader: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// A 32-byte content digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Create a Digest from raw bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Digest(bytes)
    }

    /// Create a Digest from a hex string (64 hex characters).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != DIGEST_SIZE * 2 {
            return Err(Error::invalid_hash(format!(
                "Expected {} hex characters, got {}",
                DIGEST_SIZE * 2,
                hex_str.len()
            )));
        }

        let bytes =
            hex::decode(hex_str).map_err(|e| Error::invalid_hash(format!("Invalid hex: {}", e)))?;

        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&bytes);
        Ok(Digest(digest))
    }

    /// Convert to hex string (64 characters). This is the store file name.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Digest raw bytes with the default algorithm.
    pub fn of_bytes(data: &[u8]) -> Self {
        Digest(*blake3::hash(data).as_bytes())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_blake3_hello_world() {
        let digest = Algorithm::Blake3
            .digest_reader(&mut Cursor::new(b"hello world".to_vec()))
            .unwrap();

        // BLAKE3 of "hello world"
        assert_eq!(
            digest.to_hex(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
        assert_eq!(digest, Digest::of_bytes(b"hello world"));
    }

    #[test]
    fn test_sha256_empty() {
        let digest = Algorithm::Sha256
            .digest_reader(&mut Cursor::new(Vec::new()))
            .unwrap();
        assert_eq!(
            digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_spanning_many_chunks() {
        let data = vec![7u8; CHUNK_SIZE * 3 + 17];
        let streamed = Algorithm::Blake3
            .digest_reader(&mut Cursor::new(data.clone()))
            .unwrap();
        assert_eq!(streamed, Digest::of_bytes(&data));
    }

    #[test]
    fn test_digest_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"\0\x01\x02").unwrap();

        let digest = Algorithm::Blake3.digest_file(&path).unwrap();
        assert_eq!(digest, Digest::of_bytes(b"\0\x01\x02"));
    }

    #[test]
    fn test_from_hex_invalid() {
        assert!(Digest::from_hex("abcd").is_err());
        assert!(Digest::from_hex("").is_err());
        assert!(Digest::from_hex(&"z".repeat(64)).is_err());
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(Algorithm::parse("blake3-256").unwrap(), Algorithm::Blake3);
        assert_eq!(Algorithm::parse("sha256").unwrap(), Algorithm::Sha256);
        assert_eq!(Algorithm::parse(Algorithm::Sha256.as_str()).unwrap(), Algorithm::Sha256);
        assert!(Algorithm::parse("md5").is_err());
    }

    #[test]
    fn test_serializes_as_hex() {
        let digest = Digest::of_bytes(b"x");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Streaming in fixed chunks agrees with one-shot hashing
        #[test]
        fn prop_streaming_matches_one_shot(data: Vec<u8>) {
            let streamed = Algorithm::Blake3.digest_reader(&mut Cursor::new(data.clone()))?;
            prop_assert_eq!(streamed, Digest::of_bytes(&data));
        }

        /// Hex parsing accepts every rendered digest
        #[test]
        fn prop_hex_parse(bytes in prop::array::uniform32(any::<u8>())) {
            let digest = Digest::from_bytes(bytes);
            prop_assert_eq!(Digest::from_hex(&digest.to_hex())?, digest);
        }
    }
}
