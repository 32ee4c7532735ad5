//! AMD dGPU driver knowledge
//!
//! `amdgpu` also drives AMD integrated graphics, so the module may only be
//! blacklisted when the boot display is not AMD. The removal rule is keyed to
//! the dGPU's bus address instead of the vendor for the same reason.

use crate::{GpuVendor, PciGpu};

/// Kernel modules that can bind an AMD GPU
pub const DRIVER_MODULES: &[&str] = &["amdgpu", "radeon"];

/// Modprobe directives for AMD, empty when the integrated GPU needs `amdgpu`
pub fn blacklist_lines(integrated: Option<&PciGpu>) -> Vec<String> {
    match integrated {
        Some(igpu) if igpu.vendor == GpuVendor::Amd => Vec::new(),
        // Unknown iGPU: refusing to blacklist is the option that keeps a display
        None => Vec::new(),
        Some(_) => DRIVER_MODULES
            .iter()
            .map(|m| format!("blacklist {}", m))
            .collect(),
    }
}

/// Udev rule that drops the AMD dGPU at `address` from the bus as it appears
pub fn removal_rules(address: &str) -> Vec<String> {
    vec![format!(
        "ACTION==\"add\", SUBSYSTEM==\"pci\", KERNEL==\"{}\", ATTR{{remove}}=\"1\"",
        address
    )]
}
