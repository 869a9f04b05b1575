use std::fs::File;
use std::io::{BufReader, Read};

use camino::Utf8Path;
use mergin_core::CHUNK_SIZE;
use sha2::{Digest, Sha256};

/// Compute the checksum of a file, streaming in fixed-size buffers so
/// arbitrarily large files never occupy more than one buffer of memory.
///
/// Returns lowercase hex SHA-256, the format the server stores.
pub fn file_checksum(path: &Utf8Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Checksum of an in-memory buffer (chunk acks, tests).
pub fn bytes_checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn file_and_bytes_checksums_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("data.bin")).unwrap();
        let content = b"some project bytes".repeat(10_000);
        std::fs::write(&path, &content).unwrap();

        assert_eq!(file_checksum(&path).unwrap(), bytes_checksum(&content));
    }

    #[test]
    fn checksum_is_lowercase_hex_sha256() {
        let sum = bytes_checksum(b"hello");
        assert_eq!(sum.len(), 64);
        assert_eq!(sum, sum.to_lowercase());
        assert_eq!(
            sum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn empty_file_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("empty")).unwrap();
        std::fs::write(&path, b"").unwrap();
        assert_eq!(file_checksum(&path).unwrap(), bytes_checksum(b""));
    }
}
