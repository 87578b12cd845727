/*++

Licensed under the Apache-2.0 license.

File Name:

    attest.rs

Abstract:

    File contains the attestation allow-list generator: every registered
    component measured raw under both required algorithms, assembled into
    immutable dual-digest records.

--*/

use serde::Serialize;

use crate::component::{
    ComponentDesc, MeasureEnv, Measurer, RawMeasurement, BLANK_UBOOT_ENV, KEY_STORE, OS,
    OS_SUB_COMPONENTS, REC_OS, REC_UBOOT, SPL, UBOOT,
};
use crate::{HashAlgo, MeasureConfig, MeasureError};

/// Flash bank a component is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    /// Recovery bank
    Flash0,

    /// Primary bank
    Flash1,
}

/// Attestation component registry: descriptor and source bank, in output
/// order
pub const ATTEST_COMPONENTS: [(&ComponentDesc, Bank); 7] = [
    (&SPL, Bank::Flash0),
    (&KEY_STORE, Bank::Flash1),
    (&UBOOT, Bank::Flash1),
    (&REC_UBOOT, Bank::Flash0),
    (&OS, Bank::Flash1),
    (&REC_OS, Bank::Flash0),
    (&BLANK_UBOOT_ENV, Bank::Flash1),
];

/// Registered component names, in output order
pub fn attest_component_names() -> Vec<&'static str> {
    ATTEST_COMPONENTS.iter().map(|(d, _)| d.name).collect()
}

/// Dual-algorithm digests of one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationHashes {
    /// SHA-1 hex digest
    pub sha1: String,

    /// SHA-256 hex digest
    pub sha256: String,
}

/// Component identity within the allow-list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationMetadata {
    /// Component (or `component.subcomponent`) name
    pub name: String,

    /// Firmware version string
    pub version: String,
}

/// Allow-list record, immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationEntry {
    pub hashes: AttestationHashes,
    pub metadata: AttestationMetadata,

    /// Reserved for future use
    pub command_lines: Vec<String>,
}

impl AttestationEntry {
    /// Record name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    fn new(name: String, sha1: &[u8], sha256: &[u8], fw_ver: &str) -> Self {
        Self {
            hashes: AttestationHashes {
                sha1: hex::encode(sha1),
                sha256: hex::encode(sha256),
            },
            metadata: AttestationMetadata {
                name,
                version: fw_ver.to_string(),
            },
            command_lines: Vec::new(),
        }
    }
}

/// Generate allow-list records for the requested components
///
/// # Arguments
///
/// * `flash0`     - Recovery bank environment
/// * `flash1`     - Primary bank environment
/// * `recalc`     - Recalculate embedded hashes before trusting them
/// * `fw_ver`     - Firmware version recorded in every entry
/// * `components` - Registered component names, in output order
pub fn generate_allowlist<Env: MeasureEnv>(
    flash0: &Env,
    flash1: &Env,
    recalc: bool,
    fw_ver: &str,
    components: &[&str],
) -> Result<Vec<AttestationEntry>, MeasureError> {
    let mut entries = Vec::new();
    for name in components {
        let (desc, bank) = *ATTEST_COMPONENTS
            .iter()
            .find(|(d, _)| d.name == *name)
            .ok_or_else(|| MeasureError::UnknownComponent(name.to_string()))?;
        let env = match bank {
            Bank::Flash0 => flash0,
            Bank::Flash1 => flash1,
        };

        let raw = |algo| {
            Measurer::new(env, MeasureConfig { algo, recalc }).measure_raw(desc)
        };
        match (raw(HashAlgo::Sha1)?, raw(HashAlgo::Sha256)?) {
            (RawMeasurement::Single(sha1), RawMeasurement::Single(sha256)) => {
                entries.push(AttestationEntry::new(
                    desc.name.to_string(),
                    &sha1,
                    &sha256,
                    fw_ver,
                ));
            }
            (
                RawMeasurement::OsChain {
                    kernel: k1,
                    ramdisk: r1,
                    fdt: f1,
                },
                RawMeasurement::OsChain {
                    kernel: k256,
                    ramdisk: r256,
                    fdt: f256,
                },
            ) => {
                // recovery sub-components carry the bank prefix too
                let sub_prefix = if desc.name.starts_with("rec-") { "rec-" } else { "" };
                for (sub, sha1, sha256) in [
                    (OS_SUB_COMPONENTS[0], k1, k256),
                    (OS_SUB_COMPONENTS[1], r1, r256),
                    (OS_SUB_COMPONENTS[2], f1, f256),
                ] {
                    entries.push(AttestationEntry::new(
                        format!("{}.{sub_prefix}{sub}", desc.name),
                        &sha1,
                        &sha256,
                        fw_ver,
                    ));
                }
            }
            _ => unreachable!("raw measurement shape depends only on the descriptor"),
        }
    }
    Ok(entries)
}
