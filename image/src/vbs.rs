/*++

Licensed under the Apache-2.0 license.

File Name:

    vbs.rs

Abstract:

    File contains access to the verified-boot status (VBS) structure the
    boot ROM leaves in SRAM. Measurement consumes the raw bytes.

--*/

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::ImageError;

/// SRAM address of the VBS structure
pub const VBS_LOCATION: u64 = 0x1E72_0000;

/// Size of the VBS structure in bytes
pub const VBS_SIZE: usize = 56;

/// Read the VBS structure from the platform default location (`/dev/mem`)
pub fn read_vbs() -> Result<Vec<u8>, ImageError> {
    read_vbs_at(Path::new("/dev/mem"), VBS_LOCATION)
}

/// Read the VBS structure from a device or file
///
/// # Arguments
///
/// * `path`   - Device or file holding the structure
/// * `offset` - Byte offset of the structure
pub fn read_vbs_at(path: &Path, offset: u64) -> Result<Vec<u8>, ImageError> {
    let unavailable = |reason: String| ImageError::VbsUnavailable(reason);

    let mut file =
        File::open(path).map_err(|e| unavailable(format!("{}: {e}", path.display())))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| unavailable(format!("seek {offset:#x}: {e}")))?;
    let mut vbs = vec![0u8; VBS_SIZE];
    file.read_exact(&mut vbs)
        .map_err(|e| unavailable(format!("read {VBS_SIZE} bytes at {offset:#x}: {e}")))?;
    Ok(vbs)
}
