//! System context
//!
//! Facts that do not change while a process runs (model name, GPU inventory,
//! selected backend, settings) are gathered once at startup and passed down
//! explicitly. Hardware *state* is never cached here.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use mg_gpu::{GpuBackend, GpuInventory};
use tracing::{debug, info};

use crate::artifacts::BlockArtifactManager;
use crate::boot::BootController;
use crate::data::HandoffStore;
use crate::helper_client::{PkexecHelper, PrivilegedHelper};
use crate::hw::{AttributeResolver, SysfsPlatform};
use crate::planner::TransitionPlanner;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct SystemContext {
    /// DMI product name, when readable
    pub model: Option<String>,
    pub inventory: GpuInventory,
    pub backend: GpuBackend,
    pub settings: Settings,
}

impl SystemContext {
    /// Probe the machine once
    pub fn detect(settings: Settings) -> Self {
        let model = read_model(&settings.system.product_name);
        let inventory = mg_gpu::probe_inventory(&settings.system.pci_devices);
        let backend = mg_gpu::select_backend(&inventory);
        info!(
            "System: model={} backend={}",
            model.as_deref().unwrap_or("unknown"),
            backend
        );

        Self {
            model,
            inventory,
            backend,
            settings,
        }
    }

    pub fn resolver(&self) -> AttributeResolver {
        AttributeResolver::from_settings(&self.settings.attributes)
    }

    pub fn platform(&self) -> SysfsPlatform {
        SysfsPlatform::new(self.resolver(), self.backend.clone(), self.settings.system.clone())
    }

    pub fn handoff(&self) -> HandoffStore {
        HandoffStore::new(self.settings.handoff.clone())
    }

    pub fn helper(&self) -> PkexecHelper {
        PkexecHelper::new(self.settings.helper.path.clone())
    }

    pub fn artifact_manager(&self, helper: Arc<dyn PrivilegedHelper>) -> BlockArtifactManager {
        BlockArtifactManager::new(self.inventory.clone(), helper, self.handoff())
    }

    pub fn planner(&self, helper: Arc<dyn PrivilegedHelper>) -> TransitionPlanner {
        TransitionPlanner::new(Arc::new(self.platform()), Arc::new(self.artifact_manager(helper)))
            .with_lock_file(&self.settings.system.planner_lock)
    }

    pub fn boot_controller(&self) -> BootController {
        BootController::new(Arc::new(self.platform()), self.handoff())
    }
}

/// Read the DMI product name
pub fn read_model(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let name = s.trim();
            (!name.is_empty()).then(|| name.to_string())
        }
        Err(e) => {
            debug!("No product name at {:?}: {}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SystemPaths;
    use tempfile::TempDir;

    #[test]
    fn test_detect_on_empty_machine() {
        let tmp = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.system = SystemPaths {
            pci_devices: tmp.path().join("devices"),
            pci_rescan: tmp.path().join("rescan"),
            proc_modules: tmp.path().join("modules"),
            product_name: tmp.path().join("product_name"),
            planner_lock: tmp.path().join("planner.lock"),
        };
        fs::write(tmp.path().join("product_name"), "ROG Zephyrus G14 GA402RJ\n").unwrap();

        let ctx = SystemContext::detect(settings);
        assert_eq!(ctx.model.as_deref(), Some("ROG Zephyrus G14 GA402RJ"));
        assert_eq!(ctx.backend, GpuBackend::Unavailable);
        assert!(ctx.inventory.discrete.is_none());
    }

    #[test]
    fn test_blank_model_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("product_name");
        fs::write(&path, "  \n").unwrap();
        assert_eq!(read_model(&path), None);
        assert_eq!(read_model(&tmp.path().join("missing")), None);
    }
}
