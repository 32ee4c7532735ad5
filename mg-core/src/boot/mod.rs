//! Boot safety controller
//!
//! Runs once per boot before any display session. It gathers facts, asks the
//! pure [`plan`] what to do, then performs each action best-effort. A failed
//! action is logged and the run continues; [`BootController::run`] cannot fail.

mod machine;

pub use machine::{plan, BootAction, BootFacts, BootPlan, BootState, Deferral};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::constants::attributes;
use crate::data::{HandoffStore, PendingMode, RecoveryMarker};
use crate::error::Result;
use crate::hw::{read_snapshot, Platform};
use crate::MuxguardError;

/// What one boot run decided and what went wrong while doing it
#[derive(Debug, Clone)]
pub struct BootReport {
    pub plan: BootPlan,
    /// One entry per action that failed
    pub failures: Vec<String>,
}

pub struct BootController {
    platform: Arc<dyn Platform>,
    handoff: HandoffStore,
}

impl BootController {
    pub fn new(platform: Arc<dyn Platform>, handoff: HandoffStore) -> Self {
        Self { platform, handoff }
    }

    /// Observe hardware and handoff state
    pub fn gather(&self) -> BootFacts {
        let snapshot = read_snapshot(&*self.platform);
        let pending = match self.handoff.read_pending() {
            Ok(p) => p.map(|t| t.mode),
            Err(e) => {
                warn!("Pending record unreadable: {}", e);
                Some(PendingMode::Unknown("<unreadable>".to_string()))
            }
        };

        BootFacts {
            snapshot,
            artifacts_present: self.handoff.artifacts_present(),
            pending,
            active_drivers: self.platform.active_dgpu_drivers(),
        }
    }

    pub fn run(&self) -> BootReport {
        let facts = self.gather();
        info!(
            "Boot facts: dgpu_disabled={} mux={} artifacts={} pending={}",
            facts.snapshot.dgpu_disabled,
            facts.snapshot.mux_mode,
            facts.artifacts_present,
            facts
                .pending
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "none".to_string())
        );

        let plan = plan(&facts);
        self.execute(plan)
    }

    /// Perform a plan; every step is attempted regardless of earlier failures
    pub fn execute(&self, plan: BootPlan) -> BootReport {
        let mut failures = Vec::new();

        for action in &plan.actions {
            debug!("Boot action: {:?}", action);
            if let Err(e) = self.perform(*action) {
                warn!("Boot action {:?} failed: {}", action, e);
                failures.push(format!("{:?}: {}", action, e));
            }
        }

        if let Some(reason) = &plan.recovery {
            if let Err(e) = self.handoff.write_recovery_marker(&RecoveryMarker::now(reason.clone())) {
                warn!("Could not write recovery marker: {}", e);
                failures.push(format!("recovery marker: {}", e));
            }
        }

        match plan.deferred {
            Some(Deferral::DriverActive) => info!("Handoff kept: dGPU driver attached"),
            Some(Deferral::AttributeMissing) => info!("Handoff kept: dgpu_disable not available"),
            None => {}
        }

        BootReport { plan, failures }
    }

    fn perform(&self, action: BootAction) -> Result<()> {
        match action {
            BootAction::EnableDgpu { rescan } => {
                self.write(attributes::DGPU_DISABLE, 0)?;
                info!("dGPU powered on");
                if rescan {
                    self.platform.rescan_pci_bus()?;
                }
                Ok(())
            }
            BootAction::DisableDgpu => {
                let attr = self.write(attributes::DGPU_DISABLE, 1)?;
                match self.platform.read_attribute(&attr) {
                    Ok(1) => info!("dGPU powered off"),
                    Ok(v) => warn!("dGPU disable did not stick, reads {}", v),
                    Err(e) => warn!("dGPU disable readback failed: {}", e),
                }
                Ok(())
            }
            BootAction::SetMuxHybrid => {
                self.write(attributes::GPU_MUX_MODE, attributes::MUX_HYBRID)?;
                info!("MUX forced to hybrid");
                Ok(())
            }
            BootAction::RemoveArtifacts => {
                if self.handoff.remove_artifacts()? {
                    self.platform.reload_device_rules()?;
                }
                Ok(())
            }
            BootAction::DiscardPending => {
                self.handoff.remove_pending()?;
                Ok(())
            }
            BootAction::Cleanup => {
                // Rules only change when block files go; the pending record alone needs no reload
                let removed = self.handoff.remove_artifacts();
                let pending = self.handoff.remove_pending();
                if matches!(removed, Ok(true)) {
                    self.platform.reload_device_rules()?;
                }
                removed?;
                pending?;
                Ok(())
            }
        }
    }

    fn write(&self, name: &str, value: i64) -> Result<crate::hw::ResolvedAttribute> {
        let attr = self
            .platform
            .resolve(name)
            .ok_or_else(|| MuxguardError::Unsupported(name.to_string()))?;
        self.platform.write_attribute(&attr, value)?;
        Ok(attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GpuMode;
    use crate::hw::{AttributeBackend, MockPlatform, ResolvedAttribute};
    use crate::test_utils::{handoff_store, FakePlatform};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const DIRECT: i64 = attributes::MUX_DGPU_DIRECT;
    const HYBRID: i64 = attributes::MUX_HYBRID;

    fn install_eco(store: &HandoffStore) {
        store
            .install("blacklist nvidia\n", "# rule\n", GpuMode::Eco)
            .unwrap();
    }

    fn controller(platform: &Arc<FakePlatform>, store: &HandoffStore) -> BootController {
        BootController::new(platform.clone(), store.clone())
    }

    #[test]
    fn test_impossible_state_is_repaired_and_reported() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        install_eco(&store);
        let platform = Arc::new(FakePlatform::machine(true, DIRECT));

        let report = controller(&platform, &store).run();

        assert!(report.failures.is_empty());
        assert_eq!(platform.value("dgpu_disable"), Some(0));
        assert_eq!(platform.value("gpu_mux_mode"), Some(HYBRID));
        assert_eq!(platform.rescans(), 1);
        assert!(!store.artifacts_present());
        assert!(!store.pending_exists());
        assert!(store.read_recovery_marker().unwrap().is_some());
    }

    #[test]
    fn test_repair_reloads_rules_once() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        install_eco(&store);
        let platform = Arc::new(FakePlatform::machine(true, DIRECT));

        let report = controller(&platform, &store).run();

        assert!(report.plan.actions.contains(&BootAction::RemoveArtifacts));
        assert!(report.plan.actions.contains(&BootAction::Cleanup));
        assert_eq!(platform.reloads(), 1);
    }

    #[test]
    fn test_pending_only_cleanup_skips_reload() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        fs::write(&store.paths().pending_file, "turbo\n").unwrap();
        let platform = Arc::new(FakePlatform::machine(false, HYBRID));

        controller(&platform, &store).run();

        assert!(!store.pending_exists());
        assert_eq!(platform.reloads(), 0);
    }

    #[test]
    fn test_legacy_pending_applies_eco() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        install_eco(&store);
        fs::write(&store.paths().pending_file, "1\n").unwrap();
        let platform = Arc::new(FakePlatform::machine(false, HYBRID));

        controller(&platform, &store).run();

        assert_eq!(platform.value("dgpu_disable"), Some(1));
        assert!(!store.pending_exists());
        assert!(!store.artifacts_present());
        assert_eq!(platform.reloads(), 1);
        assert!(store.read_recovery_marker().unwrap().is_none());
    }

    #[test]
    fn test_driver_active_keeps_handoff_untouched() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        install_eco(&store);
        let platform = Arc::new(FakePlatform::machine(false, HYBRID).with_drivers(&["nvidia"]));

        let report = controller(&platform, &store).run();

        assert!(report.plan.keep_handoff());
        assert!(platform.writes().is_empty());
        assert!(store.pending_exists());
        assert!(store.artifacts_present());
    }

    #[test]
    fn test_unknown_mode_is_cleaned_without_writes() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        fs::write(&store.paths().pending_file, "turbo\n").unwrap();
        let platform = Arc::new(FakePlatform::machine(false, HYBRID));

        controller(&platform, &store).run();

        assert!(platform.writes().is_empty());
        assert!(!store.pending_exists());
    }

    #[test]
    fn test_oversized_record_is_treated_as_unknown() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        fs::write(&store.paths().pending_file, "eco".repeat(200)).unwrap();
        let platform = Arc::new(FakePlatform::machine(false, HYBRID));

        controller(&platform, &store).run();

        assert!(platform.writes().is_empty());
        assert!(!store.pending_exists());
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        install_eco(&store);
        let platform = Arc::new(FakePlatform::machine(false, HYBRID));
        let boot = controller(&platform, &store);

        boot.run();
        let writes = platform.writes();
        let reloads = platform.reloads();
        let report = boot.run();

        assert_eq!(platform.writes(), writes);
        assert_eq!(platform.reloads(), reloads);
        assert_eq!(report.plan.actions, vec![BootAction::Cleanup]);
    }

    #[test]
    fn test_failures_do_not_stop_the_run() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        install_eco(&store);
        let platform = Arc::new(FakePlatform::machine(true, DIRECT).failing());

        let report = controller(&platform, &store).run();

        assert!(!report.failures.is_empty());
        assert!(!store.pending_exists());
        assert!(!store.artifacts_present());
        assert!(store.read_recovery_marker().unwrap().is_some());
    }

    #[test]
    fn test_disable_mismatch_is_only_a_warning() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        install_eco(&store);
        let platform = Arc::new(FakePlatform::machine(false, HYBRID).ignoring_writes_to("dgpu_disable"));

        let report = controller(&platform, &store).run();

        assert!(report.failures.is_empty());
        assert!(!store.pending_exists());
    }

    #[test]
    fn test_cleanup_reloads_rules_even_when_udevadm_fails() {
        let tmp = TempDir::new().unwrap();
        let store = handoff_store(&tmp);
        install_eco(&store);

        let mut platform = MockPlatform::new();
        platform.expect_resolve().returning(|name| {
            Some(ResolvedAttribute {
                logical_name: name.to_string(),
                backend: AttributeBackend::FirmwareAttribute,
                path: PathBuf::from("/fake").join(name),
            })
        });
        platform
            .expect_read_attribute()
            .returning(|a| Ok(if a.logical_name == "dgpu_disable" { 1 } else { HYBRID }));
        platform.expect_write_attribute().never();
        platform.expect_active_dgpu_drivers().returning(Vec::new);
        platform
            .expect_reload_device_rules()
            .times(1)
            .returning(|| Err(MuxguardError::Unsupported("udevadm not found".to_string())));

        let report = BootController::new(Arc::new(platform), store.clone()).run();

        assert_eq!(report.failures.len(), 1);
        assert!(!store.pending_exists());
    }
}
