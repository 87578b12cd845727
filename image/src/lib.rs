/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the flash image container library: image metadata and
    partition table access, flattened device tree (FIT) parsing, and
    verified-boot status (VBS) access.

--*/

pub mod fdt;
pub mod meta;
pub mod vbs;

pub use fdt::{Fdt, FdtError, FdtNode, FdtProp};
pub use meta::{ImageMeta, PartInfo, VersionInfos};

use std::path::PathBuf;

use thiserror::Error;

/// Image Container Error
#[derive(Debug, Error)]
pub enum ImageError {
    /// The partition table has no entry with the requested name
    #[error("unknown partition: {0}")]
    UnknownPartition(String),

    /// The image meta partition is absent or unparseable
    #[error("image meta not found in {path}: {reason}")]
    MetaNotFound { path: PathBuf, reason: String },

    /// The image meta failed its embedded checksum
    #[error("image meta checksum mismatch: expected [{expected}] computed [{computed}]")]
    MetaChecksumMismatch { expected: String, computed: String },

    /// The image meta version is newer than this library understands
    #[error("unsupported image meta version: {0}")]
    UnsupportedMetaVersion(u32),

    /// The verified-boot status structure could not be read
    #[error("verified-boot status unavailable: {0}")]
    VbsUnavailable(String),

    /// Device tree parse failure
    #[error(transparent)]
    Fdt(#[from] FdtError),

    /// Meta document serialization failure
    #[error("image meta encoding failed: {0}")]
    MetaEncode(#[from] serde_json::Error),

    /// I/O failure against the backing image
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
