/*++

Licensed under the Apache-2.0 license.

File Name:

    report.rs

Abstract:

    File contains measurement report assembly: the fixed-order list of
    expected register values for both flash banks, with the hardware
    reading column left for the TPM cross-checker to fill in.

--*/

use serde::Serialize;

use crate::component::{
    ComponentDesc, MeasureEnv, Measurer, BLANK_UBOOT_ENV, KEY_STORE, OS, REC_OS, REC_UBOOT,
    SPL, UBOOT, UBOOT_ENV, VBS,
};
use crate::{MeasureConfig, MeasureError};

/// Placeholder for a value that was not (or could not be) read
pub const NOT_AVAILABLE: &str = "NA";

/// One row of the measurement report
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementResult {
    /// Component name
    pub component: String,

    /// Register the component extends
    pub pcr_id: u8,

    /// Report hash algorithm
    pub algo: String,

    /// Expected (computed) hex register value
    pub expect: String,

    /// Hardware register reading, `"NA"` until the cross-checker fills it
    pub measure: String,
}

/// Build the measurement report for both flash banks
///
/// The VBS row is only computed when `with_vbs` is set (it reads live
/// system state); otherwise its expected value reports as `"NA"`.
/// Any measurement failure aborts the whole report: a single corrupted
/// component invalidates the entire chain.
pub fn build_report<Env: MeasureEnv>(
    flash0: &Env,
    flash1: &Env,
    cfg: MeasureConfig,
    with_vbs: bool,
) -> Result<Vec<MeasurementResult>, MeasureError> {
    let flash0 = Measurer::new(flash0, cfg);
    let flash1 = Measurer::new(flash1, cfg);

    let row = |component: &str, desc: &ComponentDesc, expect: String| MeasurementResult {
        component: component.to_string(),
        pcr_id: desc.pcr_id,
        algo: cfg.algo.name().to_string(),
        expect,
        measure: NOT_AVAILABLE.to_string(),
    };
    let measured = |component: &str,
                    desc: &ComponentDesc,
                    measurer: &Measurer<'_, Env>|
     -> Result<MeasurementResult, MeasureError> {
        Ok(row(component, desc, hex::encode(measurer.measure(desc)?)))
    };

    Ok(vec![
        measured("spl", &SPL, &flash0)?,
        measured("key-store", &KEY_STORE, &flash1)?,
        measured("u-boot", &UBOOT, &flash1)?,
        measured("rec-u-boot", &REC_UBOOT, &flash0)?,
        measured("u-boot-env", &UBOOT_ENV, &flash1)?,
        measured("blank-u-boot-env", &BLANK_UBOOT_ENV, &flash1)?,
        if with_vbs {
            measured("vbs", &VBS, &flash1)?
        } else {
            row("vbs", &VBS, NOT_AVAILABLE.to_string())
        },
        measured("os", &OS, &flash1)?,
        measured("recovery-os", &REC_OS, &flash0)?,
    ])
}
