//! Streaming SHA-256 digests of file content.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};

/// Size of the read buffer for streaming file hashing
const HASH_BUFFER_SIZE: usize = 8192;

/// Hex-encoded SHA-256 digest (64 lowercase hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_digest(bytes: &[u8]) -> Self {
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest a file in fixed-size chunks without buffering the whole file.
pub fn digest(path: &Path) -> Result<ContentHash> {
    let file = File::open(path).map_err(|e| Error::io("open", path, e))?;
    digest_reader(BufReader::with_capacity(HASH_BUFFER_SIZE, file))
        .map_err(|e| Error::io("read", path, e))
}

fn digest_reader<R: Read>(mut reader: R) -> io::Result<ContentHash> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(ContentHash::from_digest(&hasher.finalize()))
}

/// Digest in-memory content.
pub fn digest_bytes(content: &[u8]) -> ContentHash {
    ContentHash::from_digest(&Sha256::digest(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;

    #[test]
    fn known_vector() {
        // sha256("abc")
        assert_eq!(
            digest_bytes(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_digest_matches_in_memory_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("big.rc");
        // Spans several read buffers and ends mid-buffer
        let content: Vec<u8> = (0..(HASH_BUFFER_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        fs::write(&path, &content).unwrap();

        let from_file = digest(&path).unwrap();
        assert_eq!(from_file, digest_bytes(&content));
        assert_eq!(from_file.as_str().len(), 64);
    }

    #[test]
    fn digest_is_deterministic_and_content_sensitive() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::write(&a, "export X=1").unwrap();
        fs::write(&b, "export X=2").unwrap();

        assert_eq!(digest(&a).unwrap(), digest(&a).unwrap());
        assert_ne!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn empty_file_has_empty_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty");
        fs::write(&path, b"").unwrap();
        assert_eq!(digest(&path).unwrap(), digest_bytes(b""));
    }

    /// Yields `Interrupted` before every chunk it hands out.
    struct Interrupting<'a> {
        data: &'a [u8],
        interrupt_next: bool,
    }

    impl Read for Interrupting<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_next && !self.data.is_empty() {
                self.interrupt_next = false;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.interrupt_next = true;
            let n = buf.len().min(self.data.len()).min(1000);
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let content: Vec<u8> = (0..5000u32).map(|i| (i % 7) as u8).collect();
        let reader = Interrupting {
            data: &content,
            interrupt_next: true,
        };
        assert_eq!(digest_reader(reader).unwrap(), digest_bytes(&content));
    }

    #[test]
    fn missing_file_is_io_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let err = digest(&tmp.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }
}
