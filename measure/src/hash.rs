/*++

Licensed under the Apache-2.0 license.

File Name:

    hash.rs

Abstract:

    File contains the ranged hasher: streams a fixed byte range out of a
    backing image in block-size chunks and produces a digest. A short range
    is always a hard error, never silently tolerated.

--*/

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use crate::{HashAlgo, MeasureError};

/// Hash `length` bytes of `path` starting at `offset`
///
/// Reads in chunks no larger than the algorithm block size. Fails with
/// `TruncatedRead` if the image ends before the range does; a digest over
/// short bytes would falsely validate or invalidate an image.
pub fn hash_range(
    path: &Path,
    offset: u64,
    length: u64,
    algo: HashAlgo,
) -> Result<Vec<u8>, MeasureError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(offset))?;

    let mut hasher = algo.hasher();
    let mut chunk = vec![0u8; algo.block_size()];
    let mut remain = length;
    while remain > 0 {
        let want = remain.min(chunk.len() as u64) as usize;
        reader
            .read_exact(&mut chunk[..want])
            .map_err(|e| truncated(e, path, offset, length))?;
        hasher.update(&chunk[..want]);
        remain -= want as u64;
    }
    Ok(hasher.finalize())
}

/// Read exactly `length` bytes of `path` starting at `offset`
///
/// Shares the ranged hasher's truncation policy.
pub fn read_range(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>, MeasureError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; length as usize];
    file.read_exact(&mut buf)
        .map_err(|e| truncated(e, path, offset, length))?;
    Ok(buf)
}

fn truncated(err: std::io::Error, path: &Path, offset: u64, length: u64) -> MeasureError {
    if err.kind() == ErrorKind::UnexpectedEof {
        MeasureError::TruncatedRead {
            path: path.to_path_buf(),
            offset,
            length,
        }
    } else {
        MeasureError::Io(err)
    }
}
