use crate::StorageError;
use sha2::{Digest, Sha256};
use std::io::Read;

/// Request header the backend verifies uploads against.
pub const CHECKSUM_HEADER: &str = "Checksum";

/// Lowercase hex SHA-256 of `data`.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Drain `reader` into memory while hashing it.
///
/// Returns the buffered payload and its hex digest. A read failure is reported
/// as [`StorageError::Integrity`]; nothing is sent in that case.
pub fn checksum_reader<R: Read>(mut reader: R) -> Result<(Vec<u8>, String), StorageError> {
    let mut hasher = Sha256::new();
    let mut data = Vec::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StorageError::Integrity(e)),
        };
        hasher.update(&buf[..n]);
        data.extend_from_slice(&buf[..n]);
    }
    Ok((data, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn reader_matches_slice_digest() {
        let data: Vec<u8> = (0..200_000).map(|i| (i % 251) as u8).collect();
        let (buffered, digest) = checksum_reader(data.as_slice()).unwrap();
        assert_eq!(buffered, data);
        assert_eq!(digest, checksum(&data));
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk gone"))
        }
    }

    #[test]
    fn reader_failure_is_integrity_error() {
        let err = checksum_reader(FailingReader).unwrap_err();
        assert!(matches!(err, StorageError::Integrity(_)), "got {err:?}");
        assert!(err.to_string().contains("disk gone"));
    }
}
