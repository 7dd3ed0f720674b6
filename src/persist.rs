// SPDX-License-Identifier: MIT
//! Whole-buffer file persistence with short-write handling.

use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;

use tracing::trace;

use crate::error::Result;

/// Writes `bytes` to `path`, creating or truncating the file. Short writes
/// are retried until the full length is on disk; a zero-length write and any
/// real I/O error are surfaced instead of retried.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    let mut written = 0;
    while written < bytes.len() {
        match file.write(&bytes[written..]) {
            Ok(0) => {
                return Err(io::Error::new(ErrorKind::WriteZero, "write returned zero bytes").into());
            }
            Ok(count) => {
                written += count;
                trace!(written, total = bytes.len(), "file write progress");
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    file.flush()?;
    Ok(())
}

/// Reads the whole of `path` into memory.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    // read_to_end already loops over short reads and EINTR.
    io::BufReader::new(file).read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");

        let payload: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        write_file(&path, &payload).unwrap();
        assert_eq!(read_file(&path).unwrap(), payload);
    }

    #[test]
    fn test_write_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");

        write_file(&path, &[1u8; 100]).unwrap();
        write_file(&path, &[2u8; 10]).unwrap();
        assert_eq!(read_file(&path).unwrap(), vec![2u8; 10]);
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.bin");
        assert!(matches!(
            read_file(&missing),
            Err(crate::error::Error::Io(_))
        ));
    }
}
