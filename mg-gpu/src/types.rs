//! GPU data types

use serde::{Deserialize, Serialize};

/// GPU vendor type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Other,
}

impl GpuVendor {
    /// Map a sysfs `vendor` value (e.g. "0x10de") to a vendor
    pub fn from_pci_id(id: &str) -> Self {
        match id.trim().to_ascii_lowercase().as_str() {
            crate::gpu_const::NVIDIA_VENDOR_ID => GpuVendor::Nvidia,
            crate::gpu_const::AMD_VENDOR_ID => GpuVendor::Amd,
            crate::gpu_const::INTEL_VENDOR_ID => GpuVendor::Intel,
            _ => GpuVendor::Other,
        }
    }
}

impl std::fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuVendor::Nvidia => write!(f, "NVIDIA"),
            GpuVendor::Amd => write!(f, "AMD"),
            GpuVendor::Intel => write!(f, "Intel"),
            GpuVendor::Other => write!(f, "other"),
        }
    }
}

/// A display-class PCI function found under the PCI devices directory
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PciGpu {
    /// PCI bus address (e.g., "0000:01:00.0")
    pub address: String,
    /// Vendor (NVIDIA, AMD, Intel)
    pub vendor: GpuVendor,
    /// Raw PCI class (e.g., "0x030200")
    pub class: String,
    /// Whether firmware used this device to drive the boot console
    pub boot_vga: bool,
    /// Name of the bound kernel driver, if any
    pub driver: Option<String>,
}

/// Which GPUs the machine has, captured once at startup
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct GpuInventory {
    /// GPU that drove the boot console (iGPU on hybrid laptops)
    pub integrated: Option<PciGpu>,
    /// First non-boot display device
    pub discrete: Option<PciGpu>,
}

/// Discrete GPU capability, selected once by probing and never re-probed
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum GpuBackend {
    Nvidia { device: PciGpu },
    Amd { device: PciGpu },
    /// No dGPU visible (absent, powered off, or unknown vendor)
    Unavailable,
}

impl std::fmt::Display for GpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuBackend::Nvidia { device } => write!(f, "NVIDIA dGPU at {}", device.address),
            GpuBackend::Amd { device } => write!(f, "AMD dGPU at {}", device.address),
            GpuBackend::Unavailable => write!(f, "no dGPU visible"),
        }
    }
}
