/*++

Licensed under the Apache-2.0 license.

File Name:

    algo.rs

Abstract:

    File contains the hash algorithm selector and the streaming hasher the
    measurement engine dispatches through.

--*/

use std::fmt;

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::MeasureError;

/// Hash Algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Sha1,
    Sha256,
}

impl HashAlgo {
    /// Parse an algorithm name as it appears in CLI input or FIT metadata
    pub fn from_name(name: &str) -> Result<Self, MeasureError> {
        match name {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            _ => Err(MeasureError::UnsupportedAlgorithm(name.to_string())),
        }
    }

    /// Canonical algorithm name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Digest size in bytes
    pub const fn digest_size(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Input block size in bytes, the chunking unit for ranged hashing
    pub const fn block_size(self) -> usize {
        match self {
            Self::Sha1 => 64,
            Self::Sha256 => 64,
        }
    }

    /// Start a streaming hasher
    pub fn hasher(self) -> Hasher {
        match self {
            Self::Sha1 => Hasher::Sha1(Sha1::new()),
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }

    /// One-shot digest
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Streaming Hasher
pub enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Hasher {
    /// Feed input bytes
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    /// Finalize and return the digest
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
        }
    }
}
