//! GPU-related constants

/// PCI vendor ID for AMD GPUs
pub const AMD_VENDOR_ID: &str = "0x1002";

/// PCI vendor ID for NVIDIA GPUs
pub const NVIDIA_VENDOR_ID: &str = "0x10de";

/// PCI vendor ID for Intel GPUs
pub const INTEL_VENDOR_ID: &str = "0x8086";

/// Directory of PCI devices, one entry per bus address
pub const PCI_DEVICES_PATH: &str = "/sys/bus/pci/devices";

/// Writing "1" here makes the kernel re-enumerate the PCI bus
pub const PCI_RESCAN_PATH: &str = "/sys/bus/pci/rescan";

/// Loaded kernel modules, one per line, name first
pub const PROC_MODULES_PATH: &str = "/proc/modules";

/// PCI base class for display controllers (`0x03xxxx`)
pub const PCI_CLASS_DISPLAY_PREFIX: &str = "0x03";

/// PCI classes a discrete GPU shows up as
pub mod class {
    /// VGA compatible controller
    pub const VGA: &str = "0x030000";
    /// 3D controller (most NVIDIA Optimus parts)
    pub const THREE_D: &str = "0x030200";
    /// Display controller, other
    pub const DISPLAY_OTHER: &str = "0x038000";
    /// HD audio function that rides along with the dGPU
    pub const HD_AUDIO: &str = "0x040300";
}
