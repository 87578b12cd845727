/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the measured-boot core: the PCR-extend register
    simulation, the ranged hasher, the per-component measurement engine
    with embedded-hash integrity verification, the attestation allow-list
    generator and the measurement report.

--*/

mod algo;
mod attest;
mod component;
mod error;
mod hash;
mod pcr;
mod report;

pub use algo::{HashAlgo, Hasher};
pub use attest::{
    attest_component_names, generate_allowlist, AttestationEntry, AttestationHashes,
    AttestationMetadata, Bank, ATTEST_COMPONENTS,
};
pub use component::{
    ComponentDesc, ComponentKind, MeasureEnv, Measurer, RawMeasurement, BLANK_UBOOT_ENV,
    BLANK_UBOOT_ENV_SIZE, KEY_STORE, OS, OS_SUB_COMPONENTS, REC_OS, REC_UBOOT, SPL, UBOOT,
    UBOOT_ENV, UBOOT_FIT_HEADER_SIZE, VBS,
};
pub use error::MeasureError;
pub use hash::{hash_range, read_range};
pub use pcr::Pcr;
pub use report::{build_report, MeasurementResult, NOT_AVAILABLE};

/// Measurement configuration, passed explicitly into every measurement call
#[derive(Debug, Clone, Copy)]
pub struct MeasureConfig {
    /// Report hash algorithm the simulated registers run
    pub algo: HashAlgo,

    /// Recalculate and assert embedded signed hashes against live bytes
    pub recalc: bool,
}
