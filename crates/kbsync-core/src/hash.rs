//! SHA-256 content fingerprints.
//!
//! Hex-encoded lowercase digests for raw bytes, in-memory text and any
//! [`Read`] stream. Streams are consumed in 1 MiB blocks so large files are
//! never loaded whole.

use std::io::{self, Read};

use sha2::{Digest, Sha256};

const READ_BLOCK: usize = 1024 * 1024;

/// Hash an in-memory byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash text as its UTF-8 encoding.
pub fn hash_text(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

/// Hash everything readable from `reader`.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BLOCK];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            hash_text("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn reader_matches_bytes() {
        let data = vec![7u8; READ_BLOCK * 2 + 13];
        assert_eq!(hash_reader(&data[..]).unwrap(), hash_bytes(&data));
    }
}
