/*++

Licensed under the Apache-2.0 license.

File Name:

    error.rs

Abstract:

    File contains the measurement error taxonomy. Every variant aborts the
    run; TPM cross-check failures live in mboot-tpm and are non-fatal.

--*/

use std::path::PathBuf;

use mboot_image::{FdtError, ImageError};
use thiserror::Error;

/// Measurement Error
#[derive(Debug, Error)]
pub enum MeasureError {
    /// Hash algorithm is not implemented
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The backing image ended before the requested range
    #[error("truncated read: wanted {length:#x} bytes at offset {offset:#x} of {path}")]
    TruncatedRead {
        path: PathBuf,
        offset: u64,
        length: u64,
    },

    /// An embedded signed hash does not match the on-disk bytes. This is a
    /// build, signing or bootloader defect, distinct from a TPM mismatch.
    #[error(
        "image integrity failure in {component}: size {size:#010x}, \
         hash expected [{expected}] measured [{measured}]"
    )]
    ImageIntegrity {
        component: String,
        size: u64,
        expected: String,
        measured: String,
    },

    /// Requested allow-list component is not in the registry
    #[error("unknown attestation component: {0}")]
    UnknownComponent(String),

    /// Container collaborator failure (partition table, meta, VBS)
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Embedded device tree failure
    #[error(transparent)]
    Fdt(#[from] FdtError),

    /// I/O failure against the backing image
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
