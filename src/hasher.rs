//! Content digests for change detection.
//!
//! Files are streamed through SHA-256 in fixed-size blocks so memory stays
//! bounded regardless of file size.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{IndexError, Result};

/// Read size per block.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 of everything `reader` yields.
pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; BLOCK_SIZE];
    loop {
        let n = match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&block[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of a file's full byte content.
///
/// An unreadable file is an error; callers must not treat it as unchanged.
pub fn digest_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| IndexError::io(path, e))?;
    digest_reader(file).map_err(|e| IndexError::io(path, e))
}

/// Digest of an in-memory string. Used for chunk text hashes.
pub fn digest_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            digest_text("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn reader_matches_text_across_block_boundaries() {
        let big = "x".repeat(BLOCK_SIZE * 2 + 17);
        let from_reader = digest_reader(big.as_bytes()).unwrap();
        assert_eq!(from_reader, digest_text(&big));
    }

    #[test]
    fn file_digest_is_stable_and_detects_change() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        let first = digest_file(&path).unwrap();
        assert_eq!(first, digest_file(&path).unwrap());
        assert_eq!(first.len(), 64);

        std::fs::write(&path, "hello!").unwrap();
        assert_ne!(first, digest_file(&path).unwrap());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = digest_file(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, IndexError::Io { .. }));
    }
}
