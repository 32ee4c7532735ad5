//! Discrete GPU probing for muxguard
//!
//! Provides vendor-specific knowledge needed to switch a dGPU on and off safely:
//! - which display devices sit on the PCI bus and which one drove the boot console
//! - which driver modules are loaded or bound to the dGPU
//! - blacklist directives and removal rules that keep a dGPU driver from attaching
//! - PCI bus rescans so a re-enabled dGPU reappears without a reboot

pub mod amd;
pub mod nvidia;

pub mod constants;
mod types;

pub use constants as gpu_const;
pub use types::*;

use mg_error::MuxguardError;
use std::fs;
use std::path::Path;
use tracing::{debug, info, trace, warn};

pub type Result<T> = std::result::Result<T, MuxguardError>;

/// Enumerate display-class PCI functions under `pci_devices`
pub fn enumerate_display_devices(pci_devices: &Path) -> Result<Vec<PciGpu>> {
    if !pci_devices.exists() {
        return Err(MuxguardError::Unsupported(format!(
            "PCI device path {} not found",
            pci_devices.display()
        )));
    }

    let mut devices = Vec::new();
    for entry in fs::read_dir(pci_devices)? {
        let entry = entry?;
        let device_path = entry.path();

        let class = match read_trimmed(&device_path.join("class")) {
            Some(c) => c.to_ascii_lowercase(),
            None => continue,
        };
        if !class.starts_with(gpu_const::PCI_CLASS_DISPLAY_PREFIX) {
            continue;
        }

        let vendor = read_trimmed(&device_path.join("vendor"))
            .map(|v| GpuVendor::from_pci_id(&v))
            .unwrap_or(GpuVendor::Other);
        let boot_vga = read_trimmed(&device_path.join("boot_vga")).as_deref() == Some("1");
        let driver = read_driver_link(&device_path);

        let gpu = PciGpu {
            address: entry.file_name().to_string_lossy().into_owned(),
            vendor,
            class,
            boot_vga,
            driver,
        };
        trace!("Display device: {:?}", gpu);
        devices.push(gpu);
    }

    devices.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(devices)
}

/// Driver currently bound to the PCI function at `address`, if any
pub fn bound_driver(pci_devices: &Path, address: &str) -> Option<String> {
    read_driver_link(&pci_devices.join(address))
}

/// Split the display devices into the boot (integrated) GPU and the first discrete one
pub fn probe_inventory(pci_devices: &Path) -> GpuInventory {
    let devices = match enumerate_display_devices(pci_devices) {
        Ok(d) => d,
        Err(e) => {
            debug!("No display devices enumerated: {}", e);
            return GpuInventory::default();
        }
    };

    let integrated = devices.iter().find(|d| d.boot_vga).cloned();
    let discrete = devices
        .iter()
        .find(|d| !d.boot_vga && matches!(d.vendor, GpuVendor::Nvidia | GpuVendor::Amd))
        .cloned();

    GpuInventory { integrated, discrete }
}

/// Select the dGPU backend once from an inventory
pub fn select_backend(inventory: &GpuInventory) -> GpuBackend {
    let backend = match &inventory.discrete {
        Some(device) if device.vendor == GpuVendor::Nvidia => GpuBackend::Nvidia {
            device: device.clone(),
        },
        Some(device) if device.vendor == GpuVendor::Amd => GpuBackend::Amd {
            device: device.clone(),
        },
        _ => GpuBackend::Unavailable,
    };
    info!("dGPU backend: {}", backend);
    backend
}

/// Names of all loaded kernel modules, read from a /proc/modules style file
pub fn loaded_modules(proc_modules: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(proc_modules).map_err(|e| MuxguardError::FileRead {
        path: proc_modules.to_path_buf(),
        source: e,
    })?;

    Ok(content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect())
}

/// dGPU driver modules that are currently attached for this backend
///
/// With no visible dGPU every known family is checked, since a powered-down
/// device tells us nothing about which driver would bind it.
pub fn active_dgpu_drivers(backend: &GpuBackend, loaded: &[String]) -> Vec<String> {
    let mut active: Vec<String> = match backend {
        GpuBackend::Nvidia { .. } | GpuBackend::Unavailable => nvidia::loaded_modules(loaded)
            .into_iter()
            .map(str::to_string)
            .collect(),
        // amdgpu is shared with AMD iGPUs, only the device binding counts
        GpuBackend::Amd { .. } => Vec::new(),
    };

    if let GpuBackend::Nvidia { device } | GpuBackend::Amd { device } = backend {
        if let Some(driver) = &device.driver {
            if !active.contains(driver) {
                active.push(driver.clone());
            }
        }
    }

    active
}

/// Modprobe blacklist directive covering every dGPU family this machine may carry
pub fn render_blacklist(inventory: &GpuInventory) -> String {
    let mut lines = vec!["# Installed by muxguard; removed on the next boot".to_string()];
    lines.extend(nvidia::blacklist_lines());
    lines.extend(amd::blacklist_lines(inventory.integrated.as_ref()));
    lines.join("\n") + "\n"
}

/// Udev rules removing the dGPU from the bus before its driver can attach
pub fn render_removal_rules(inventory: &GpuInventory) -> String {
    let mut lines = vec!["# Installed by muxguard; removed on the next boot".to_string()];
    lines.extend(nvidia::removal_rules());
    if let Some(dgpu) = &inventory.discrete {
        if dgpu.vendor == GpuVendor::Amd {
            lines.extend(amd::removal_rules(&dgpu.address));
        }
    }
    lines.join("\n") + "\n"
}

/// Ask the kernel to re-enumerate the PCI bus
pub fn rescan_pci_bus(rescan_path: &Path) -> Result<()> {
    fs::write(rescan_path, "1").map_err(|e| {
        warn!("PCI rescan via {} failed: {}", rescan_path.display(), e);
        MuxguardError::FileWrite {
            path: rescan_path.to_path_buf(),
            source: e,
        }
    })?;
    info!("PCI bus rescan requested");
    Ok(())
}

fn read_driver_link(device_path: &Path) -> Option<String> {
    fs::read_link(device_path.join("driver"))
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn add_device(root: &Path, addr: &str, vendor: &str, class: &str, boot_vga: bool, driver: Option<&str>) {
        let dev = root.join("devices").join(addr);
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("vendor"), format!("{}\n", vendor)).unwrap();
        fs::write(dev.join("class"), format!("{}\n", class)).unwrap();
        fs::write(dev.join("boot_vga"), if boot_vga { "1\n" } else { "0\n" }).unwrap();
        if let Some(drv) = driver {
            let drv_dir = root.join("drivers").join(drv);
            fs::create_dir_all(&drv_dir).unwrap();
            symlink(&drv_dir, dev.join("driver")).unwrap();
        }
    }

    #[test]
    fn test_probe_hybrid_intel_nvidia() {
        let tmp = TempDir::new().unwrap();
        add_device(tmp.path(), "0000:00:02.0", "0x8086", "0x030000", true, Some("i915"));
        add_device(tmp.path(), "0000:01:00.0", "0x10de", "0x030200", false, Some("nvidia"));
        add_device(tmp.path(), "0000:00:1f.3", "0x8086", "0x040300", false, None);

        let inv = probe_inventory(&tmp.path().join("devices"));
        assert_eq!(inv.integrated.as_ref().unwrap().vendor, GpuVendor::Intel);
        let dgpu = inv.discrete.as_ref().unwrap();
        assert_eq!(dgpu.address, "0000:01:00.0");
        assert_eq!(dgpu.driver.as_deref(), Some("nvidia"));

        let backend = select_backend(&inv);
        assert!(matches!(&backend, GpuBackend::Nvidia { device } if device.address == "0000:01:00.0"));
    }

    #[test]
    fn test_bound_driver_follows_link() {
        let tmp = TempDir::new().unwrap();
        add_device(tmp.path(), "0000:01:00.0", "0x10de", "0x030000", false, Some("nouveau"));
        add_device(tmp.path(), "0000:02:00.0", "0x10de", "0x030000", false, None);

        let devices = tmp.path().join("devices");
        assert_eq!(bound_driver(&devices, "0000:01:00.0").as_deref(), Some("nouveau"));
        assert_eq!(bound_driver(&devices, "0000:02:00.0"), None);
    }

    #[test]
    fn test_probe_missing_bus_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let inv = probe_inventory(&tmp.path().join("nope"));
        assert_eq!(select_backend(&inv), GpuBackend::Unavailable);
    }

    #[test]
    fn test_loaded_modules_parses_first_column() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("modules");
        fs::write(
            &path,
            "nvidia_drm 73728 2 - Live 0x0000000000000000\nnvidia 56344576 1 nvidia_drm, Live 0x0\n",
        )
        .unwrap();
        assert_eq!(loaded_modules(&path).unwrap(), vec!["nvidia_drm", "nvidia"]);
    }

    #[test]
    fn test_active_drivers_unavailable_checks_nvidia_family() {
        let loaded = vec!["nouveau".to_string(), "i915".to_string()];
        assert_eq!(active_dgpu_drivers(&GpuBackend::Unavailable, &loaded), vec!["nouveau"]);
    }

    #[test]
    fn test_active_drivers_amd_ignores_shared_amdgpu_module() {
        let device = PciGpu {
            address: "0000:03:00.0".to_string(),
            vendor: GpuVendor::Amd,
            class: "0x030000".to_string(),
            boot_vga: false,
            driver: None,
        };
        let loaded = vec!["amdgpu".to_string()];
        assert!(active_dgpu_drivers(&GpuBackend::Amd { device: device.clone() }, &loaded).is_empty());

        let bound = PciGpu { driver: Some("amdgpu".to_string()), ..device };
        assert_eq!(active_dgpu_drivers(&GpuBackend::Amd { device: bound }, &loaded), vec!["amdgpu"]);
    }

    #[test]
    fn test_render_blacklist_amd_apu_keeps_amdgpu() {
        let tmp = TempDir::new().unwrap();
        add_device(tmp.path(), "0000:05:00.0", "0x1002", "0x030000", true, Some("amdgpu"));
        add_device(tmp.path(), "0000:01:00.0", "0x10de", "0x030000", false, None);
        let inv = probe_inventory(&tmp.path().join("devices"));

        let blacklist = render_blacklist(&inv);
        assert!(blacklist.contains("blacklist nvidia\n"));
        assert!(blacklist.contains("blacklist nouveau\n"));
        assert!(!blacklist.contains("blacklist amdgpu"));
    }

    #[test]
    fn test_render_rules_include_amd_dgpu_address() {
        let tmp = TempDir::new().unwrap();
        add_device(tmp.path(), "0000:00:02.0", "0x8086", "0x030000", true, None);
        add_device(tmp.path(), "0000:03:00.0", "0x1002", "0x038000", false, None);
        let inv = probe_inventory(&tmp.path().join("devices"));

        let rules = render_removal_rules(&inv);
        assert!(rules.contains("KERNEL==\"0000:03:00.0\""));
        assert!(rules.contains("0x10de"));
        assert!(render_blacklist(&inv).contains("blacklist amdgpu"));
    }

    #[test]
    fn test_rescan_writes_one() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rescan");
        rescan_pci_bus(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1");
    }
}
