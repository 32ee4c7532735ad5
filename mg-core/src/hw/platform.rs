//! Platform seam
//!
//! Everything the planner and the boot controller do to the machine goes
//! through [`Platform`], so both can be exercised against a fake.

use std::path::{Path, PathBuf};
use std::process::Command;

use mg_gpu::GpuBackend;
use tracing::{debug, info, warn};

use super::attributes::{read_int, write_int, AttributeResolver, ResolvedAttribute};
use crate::constants::paths;
use crate::error::Result;
use crate::settings::SystemPaths;
use crate::MuxguardError;

/// Hardware and OS operations needed for mode transitions
#[cfg_attr(test, mockall::automock)]
pub trait Platform: Send + Sync {
    /// Resolve a logical attribute, None when unsupported
    fn resolve(&self, name: &str) -> Option<ResolvedAttribute>;

    fn read_attribute(&self, attr: &ResolvedAttribute) -> Result<i64>;

    fn write_attribute(&self, attr: &ResolvedAttribute, value: i64) -> Result<()>;

    /// dGPU driver modules attached right now
    fn active_dgpu_drivers(&self) -> Vec<String>;

    fn rescan_pci_bus(&self) -> Result<()>;

    /// Tell udev to re-read its rule files
    fn reload_device_rules(&self) -> Result<()>;
}

/// The real machine: sysfs attributes, /proc/modules, udevadm
pub struct SysfsPlatform {
    resolver: AttributeResolver,
    backend: GpuBackend,
    system: SystemPaths,
}

impl SysfsPlatform {
    pub fn new(resolver: AttributeResolver, backend: GpuBackend, system: SystemPaths) -> Self {
        Self {
            resolver,
            backend,
            system,
        }
    }

    pub fn resolver(&self) -> &AttributeResolver {
        &self.resolver
    }

    /// Backend as probed, with the bound driver refreshed from sysfs
    pub fn current_backend(&self) -> GpuBackend {
        let mut backend = self.backend.clone();
        if let GpuBackend::Nvidia { device } | GpuBackend::Amd { device } = &mut backend {
            device.driver = mg_gpu::bound_driver(&self.system.pci_devices, &device.address);
        }
        backend
    }
}

impl Platform for SysfsPlatform {
    fn resolve(&self, name: &str) -> Option<ResolvedAttribute> {
        self.resolver.resolve(name)
    }

    fn read_attribute(&self, attr: &ResolvedAttribute) -> Result<i64> {
        read_int(&attr.path)
    }

    fn write_attribute(&self, attr: &ResolvedAttribute, value: i64) -> Result<()> {
        debug!("Writing {} = {} via {:?}", attr.logical_name, value, attr.backend);
        write_int(&attr.path, value)
    }

    fn active_dgpu_drivers(&self) -> Vec<String> {
        let loaded = match mg_gpu::loaded_modules(&self.system.proc_modules) {
            Ok(m) => m,
            Err(e) => {
                warn!("Cannot list loaded modules: {}", e);
                Vec::new()
            }
        };
        mg_gpu::active_dgpu_drivers(&self.current_backend(), &loaded)
    }

    fn rescan_pci_bus(&self) -> Result<()> {
        mg_gpu::rescan_pci_bus(&self.system.pci_rescan)
    }

    fn reload_device_rules(&self) -> Result<()> {
        reload_udev_rules()
    }
}

/// Run `udevadm control --reload-rules`
pub fn reload_udev_rules() -> Result<()> {
    let udevadm = find_binary(paths::UDEVADM_BINARIES)
        .ok_or_else(|| MuxguardError::Unsupported("udevadm not found".to_string()))?;

    let output = Command::new(&udevadm)
        .args(["control", "--reload-rules"])
        .output()
        .map_err(|e| MuxguardError::generic(format!("Failed to run {}: {}", udevadm.display(), e)))?;

    if output.status.success() {
        info!("udev rules reloaded");
        Ok(())
    } else {
        Err(MuxguardError::generic(format!(
            "udevadm control --reload-rules failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// First candidate that exists on disk
pub fn find_binary(candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}
