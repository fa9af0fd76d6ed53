//! Video codec capability table.
//!
//! The table is fixed and ordered; the `hevc` entry is present only when the
//! current CPU supports hardware HEVC encoding.

use crate::{RecorderError, Result};

use std::{panic::Location, sync::OnceLock};

use error_location::ErrorLocation;
use regex::Regex;

/// (accepted name, four-cc tag passed to the worker, vendor label).
const CODEC_TABLE: [(&str, &str, &str); 4] = [
    ("h264", "avc1", "H264"),
    ("hevc", "hvc1", "HEVC"),
    ("proRes422", "apcn", "Apple ProRes 422"),
    ("proRes4444", "ap4h", "Apple ProRes 4444"),
];

/// Ordered codec-name → vendor-label mapping supported on this machine.
pub fn video_codecs() -> Vec<(&'static str, &'static str)> {
    codec_table(supports_hevc_hardware_encoding())
}

pub(crate) fn codec_table(hevc_supported: bool) -> Vec<(&'static str, &'static str)> {
    CODEC_TABLE
        .iter()
        .filter(|(name, _, _)| *name != "hevc" || hevc_supported)
        .map(|(name, _, label)| (*name, *label))
        .collect()
}

/// Resolve a codec name to its four-cc tag, honouring the hardware gate.
#[track_caller]
pub(crate) fn resolve(name: &str) -> Result<&'static str> {
    resolve_for(name, supports_hevc_hardware_encoding())
}

#[track_caller]
pub(crate) fn resolve_for(name: &str, hevc_supported: bool) -> Result<&'static str> {
    CODEC_TABLE
        .iter()
        .find(|(candidate, _, _)| *candidate == name && (name != "hevc" || hevc_supported))
        .map(|(_, tag, _)| *tag)
        .ok_or_else(|| RecorderError::Validation {
            reason: format!("Unsupported video codec specified: {name}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

/// Whether the current CPU supports hardware HEVC encoding.
pub fn supports_hevc_hardware_encoding() -> bool {
    hevc_supported_by(&cpu_model())
}

/// All Apple silicon models qualify; Intel Core qualifies from generation 6,
/// the `4` in `Intel(R) Core(TM) i7-4850HQ CPU @ 2.30GHz`.
pub(crate) fn hevc_supported_by(cpu_model: &str) -> bool {
    if cpu_model.starts_with("Apple ") {
        return true;
    }

    static INTEL_GENERATION: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(pattern) = INTEL_GENERATION
        .get_or_init(|| Regex::new(r"Intel.*Core.*i\d+-(\d)").ok())
        .as_ref()
    else {
        return false;
    };

    pattern
        .captures(cpu_model)
        .and_then(|captures| captures.get(1))
        .and_then(|generation| generation.as_str().parse::<u32>().ok())
        .is_some_and(|generation| generation >= 6)
}

#[cfg(target_os = "linux")]
fn cpu_model() -> String {
    std::fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|cpuinfo| {
            cpuinfo
                .lines()
                .find(|line| line.starts_with("model name"))
                .and_then(|line| line.split_once(':'))
                .map(|(_, model)| model.trim().to_owned())
        })
        .unwrap_or_default()
}

#[cfg(target_os = "macos")]
fn cpu_model() -> String {
    std::process::Command::new("sysctl")
        .args(["-n", "machdep.cpu.brand_string"])
        .output()
        .ok()
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_owned())
        .unwrap_or_default()
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn cpu_model() -> String {
    String::new()
}
