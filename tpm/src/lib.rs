/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the TPM cross-checker: reads real PCR values through the
    external tpm2-tools binaries and parses the digest out of their text
    output. Every failure here is non-fatal to the caller; a missing TPM is
    an expected degraded condition.

--*/

use std::path::Path;
use std::process::Command;

use thiserror::Error;

/// Current tpm2-tools PCR read binary
pub const TPM2_PCRREAD: &str = "/usr/bin/tpm2_pcrread";

/// Legacy (tpm2-tools 3.x) PCR read binary
pub const TPM2_PCRLIST: &str = "/usr/bin/tpm2_pcrlist";

/// TPM Cross-Checker Error
///
/// None of these abort a run: the affected register degrades to "NA".
#[derive(Debug, Error)]
pub enum TpmError {
    /// Neither the current nor the legacy tool is installed
    #[error("tpm tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The tool ran but exited non-zero
    #[error("{tool} failed with {status}")]
    CommandFailed { tool: String, status: String },

    /// The tool output did not contain a digest where expected
    #[error("failed to parse tpm tool output: {0}")]
    ParseFailure(String),
}

/// Read one PCR through whichever tpm2-tools generation is installed
///
/// # Arguments
///
/// * `algo`   - PCR bank name, e.g. `sha256`
/// * `pcr_id` - Register index
pub fn read_pcr(algo: &str, pcr_id: u8) -> Result<Vec<u8>, TpmError> {
    let selection = format!("{algo}:{pcr_id}");
    if Path::new(TPM2_PCRREAD).exists() {
        let output = run_tool(TPM2_PCRREAD, &[&selection])?;
        parse_pcrread_output(&output)
    } else if Path::new(TPM2_PCRLIST).exists() {
        let output = run_tool(TPM2_PCRLIST, &["-L", &selection])?;
        parse_pcrlist_output(&output)
    } else {
        Err(TpmError::ToolUnavailable(format!(
            "{TPM2_PCRREAD} or {TPM2_PCRLIST}"
        )))
    }
}

fn run_tool(tool: &str, args: &[&str]) -> Result<String, TpmError> {
    log::debug!("running {tool} {}", args.join(" "));
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| TpmError::ToolUnavailable(format!("{tool}: {e}")))?;
    if !output.status.success() {
        return Err(TpmError::CommandFailed {
            tool: tool.to_string(),
            status: output.status.to_string(),
        });
    }
    String::from_utf8(output.stdout)
        .map_err(|e| TpmError::ParseFailure(format!("{tool}: {e}")))
}

/// Parse `tpm2_pcrread` output; the digest is whitespace token 3, with its
/// `0x` prefix stripped:
///
/// ```text
/// sha256:
///   9 : 0x2FCB...
/// ```
fn parse_pcrread_output(output: &str) -> Result<Vec<u8>, TpmError> {
    let token = output
        .split_whitespace()
        .nth(3)
        .ok_or_else(|| TpmError::ParseFailure(output.to_string()))?;
    let token = token.strip_prefix("0x").unwrap_or(token);
    hex::decode(token).map_err(|e| TpmError::ParseFailure(format!("{token}: {e}")))
}

/// Parse legacy `tpm2_pcrlist` output; the digest is whitespace token 4:
///
/// ```text
/// sha256 :
///   9 : 2FCB...
/// ```
fn parse_pcrlist_output(output: &str) -> Result<Vec<u8>, TpmError> {
    let token = output
        .split_whitespace()
        .nth(4)
        .ok_or_else(|| TpmError::ParseFailure(output.to_string()))?;
    hex::decode(token).map_err(|e| TpmError::ParseFailure(format!("{token}: {e}")))
}
