//! NVIDIA dGPU driver knowledge
//!
//! Covers both the proprietary stack and nouveau. NVIDIA never drives the
//! panel through the integrated path, so every module here is safe to blacklist.

use crate::gpu_const::{class, NVIDIA_VENDOR_ID};

/// Kernel modules that can bind an NVIDIA GPU, dependents first
pub const DRIVER_MODULES: &[&str] = &[
    "nvidia_drm",
    "nvidia_modeset",
    "nvidia_uvm",
    "nvidia",
    "nouveau",
];

/// Modprobe directives that keep every NVIDIA driver from loading
pub fn blacklist_lines() -> Vec<String> {
    let mut lines: Vec<String> = DRIVER_MODULES
        .iter()
        .map(|m| format!("blacklist {}", m))
        .collect();
    lines.push("options nouveau modeset=0".to_string());
    lines
}

/// Udev rules that drop NVIDIA display and audio functions from the bus as they appear
pub fn removal_rules() -> Vec<String> {
    [class::VGA, class::THREE_D, class::DISPLAY_OTHER, class::HD_AUDIO]
        .iter()
        .map(|c| {
            format!(
                "ACTION==\"add\", SUBSYSTEM==\"pci\", ATTR{{vendor}}==\"{}\", ATTR{{class}}==\"{}\", ATTR{{remove}}=\"1\"",
                NVIDIA_VENDOR_ID, c
            )
        })
        .collect()
}

/// NVIDIA modules present in a list of loaded module names
pub fn loaded_modules<'a>(loaded: &'a [String]) -> Vec<&'a str> {
    loaded
        .iter()
        .map(String::as_str)
        .filter(|m| DRIVER_MODULES.contains(m))
        .collect()
}
