//! Transition planner
//!
//! Decides whether a requested mode is legal for the current hardware state,
//! applies what can be applied live and stages what needs a reboot.
//!
//! Ordering rules:
//! - `dgpu_disable` takes effect immediately; re-enabling is followed by a
//!   PCI rescan so the device reappears
//! - `gpu_mux_mode` is latched by firmware and only takes effect after reboot
//! - when both change, the dGPU is powered on before the MUX points at it
//!
//! One lock covers read, decide and write: a mutex inside the process and,
//! when a lock file is configured, an exclusive `flock` shared with every
//! other muxguard process. Nothing is retried.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::artifacts::BlockArtifactManager;
use crate::constants::{attributes, planner::LOCK_POLL_INTERVAL};
use crate::data::GpuMode;
use crate::error::Result;
use crate::hw::{read_snapshot, HardwareSnapshot, MuxMode, Platform};
use crate::lock::FileLock;
use crate::MuxguardError;

/// Result of a successful request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Hardware already matched the target; nothing was written
    Unchanged,
    /// The change is live
    Applied,
    /// The change is staged and completes on the next boot
    RebootRequired,
}

/// Lets a caller abandon a request that is still waiting for the lock
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct TransitionPlanner {
    platform: Arc<dyn Platform>,
    artifacts: Arc<BlockArtifactManager>,
    lock: Mutex<()>,
    lock_file: Option<PathBuf>,
}

impl TransitionPlanner {
    pub fn new(platform: Arc<dyn Platform>, artifacts: Arc<BlockArtifactManager>) -> Self {
        Self {
            platform,
            artifacts,
            lock: Mutex::new(()),
            lock_file: None,
        }
    }

    /// Also serialize against other processes through `path`
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// Move the machine toward `target`
    pub fn request(&self, target: GpuMode) -> Result<TransitionOutcome> {
        let _guard = self.lock.lock();
        let _file = self.lock_other_processes(None)?;
        self.transition(target)
    }

    /// Like [`request`](Self::request), but gives up if `cancel` is set
    /// before the lock is acquired. Once the lock is held the request runs
    /// to completion.
    pub fn request_cancellable(&self, target: GpuMode, cancel: &CancelFlag) -> Result<TransitionOutcome> {
        loop {
            if cancel.is_cancelled() {
                debug!("Request for {} cancelled while waiting", target);
                return Err(MuxguardError::Cancelled);
            }
            if let Some(_guard) = self.lock.try_lock_for(LOCK_POLL_INTERVAL) {
                let _file = self.lock_other_processes(Some(cancel))?;
                return self.transition(target);
            }
        }
    }

    /// Stage `target` for the next boot instead of applying it live
    ///
    /// This is the follow-up to `DriverActive`: the boot controller applies
    /// the mode before any dGPU driver loads. Only Eco needs staging; other
    /// targets are plain requests.
    pub fn schedule(&self, target: GpuMode) -> Result<TransitionOutcome> {
        if target != GpuMode::Eco {
            return self.request(target);
        }

        let _guard = self.lock.lock();
        let _file = self.lock_other_processes(None)?;
        let snapshot = read_snapshot(&*self.platform);
        check_eco_allowed(&snapshot)?;
        if !snapshot.supports_dgpu_disable {
            return Err(MuxguardError::Unsupported(attributes::DGPU_DISABLE.to_string()));
        }
        if snapshot.dgpu_disabled {
            return Ok(TransitionOutcome::Unchanged);
        }

        self.artifacts.install(target)?;
        info!("Eco staged for next boot");
        Ok(TransitionOutcome::RebootRequired)
    }

    /// Take the shared lock file, polling so a cancel can still land
    fn lock_other_processes(&self, cancel: Option<&CancelFlag>) -> Result<Option<FileLock>> {
        let Some(path) = &self.lock_file else {
            return Ok(None);
        };
        let Some(cancel) = cancel else {
            return FileLock::acquire(path).map(Some);
        };
        loop {
            if cancel.is_cancelled() {
                return Err(MuxguardError::Cancelled);
            }
            if let Some(lock) = FileLock::try_acquire(path)? {
                return Ok(Some(lock));
            }
            thread::sleep(LOCK_POLL_INTERVAL);
        }
    }

    fn transition(&self, target: GpuMode) -> Result<TransitionOutcome> {
        let snapshot = read_snapshot(&*self.platform);
        info!(
            "Request {}: dgpu_disabled={} mux={}",
            target, snapshot.dgpu_disabled, snapshot.mux_mode
        );

        let want_disabled = target.dgpu_disabled();
        let want_mux = target.mux_mode();

        if target == GpuMode::Eco {
            check_eco_allowed(&snapshot)?;
        }
        if want_disabled && !snapshot.supports_dgpu_disable {
            return Err(MuxguardError::Unsupported(attributes::DGPU_DISABLE.to_string()));
        }
        if want_mux == MuxMode::DgpuDirect && !snapshot.supports_mux {
            return Err(MuxguardError::Unsupported(attributes::GPU_MUX_MODE.to_string()));
        }

        let dgpu_change = snapshot.dgpu_disabled != want_disabled;
        let mux_change = snapshot.supports_mux && snapshot.mux_mode != want_mux;

        if want_disabled && dgpu_change {
            let drivers = self.platform.active_dgpu_drivers();
            if !drivers.is_empty() {
                warn!("Refusing to power off dGPU, drivers attached: {:?}", drivers);
                return Err(MuxguardError::DriverActive { modules: drivers });
            }
        }

        // A newer non-Eco request supersedes an Eco staged for next boot
        if target != GpuMode::Eco && self.artifacts.is_staged() {
            info!("Discarding staged handoff superseded by {}", target);
            self.artifacts.clean()?;
        }

        if !dgpu_change && !mux_change {
            debug!("Hardware already in {}", target);
            return Ok(TransitionOutcome::Unchanged);
        }

        if dgpu_change {
            self.write_dgpu(want_disabled)?;
        }

        if mux_change {
            self.write_mux(want_mux)?;
            info!("{} staged, reboot required", target);
            return Ok(TransitionOutcome::RebootRequired);
        }

        info!("{} applied", target);
        Ok(TransitionOutcome::Applied)
    }

    fn write_dgpu(&self, disabled: bool) -> Result<()> {
        let attr = self
            .platform
            .resolve(attributes::DGPU_DISABLE)
            .ok_or_else(|| MuxguardError::Unsupported(attributes::DGPU_DISABLE.to_string()))?;
        let value = i64::from(disabled);

        self.platform.write_attribute(&attr, value)?;
        match self.platform.read_attribute(&attr) {
            Ok(v) if v == value => {}
            Ok(v) => {
                return Err(MuxguardError::write_rejected(
                    &attr.path,
                    format!("wrote {} but read back {}", value, v),
                ))
            }
            Err(e) => {
                return Err(MuxguardError::write_rejected(
                    &attr.path,
                    format!("readback failed: {}", e),
                ))
            }
        }
        info!("dGPU {}", if disabled { "powered off" } else { "powered on" });

        if !disabled {
            if let Err(e) = self.platform.rescan_pci_bus() {
                warn!("dGPU enabled but PCI rescan failed: {}", e);
            }
        }
        Ok(())
    }

    // Firmware latches the MUX for next boot, a readback proves nothing yet
    fn write_mux(&self, mode: MuxMode) -> Result<()> {
        let attr = self
            .platform
            .resolve(attributes::GPU_MUX_MODE)
            .ok_or_else(|| MuxguardError::Unsupported(attributes::GPU_MUX_MODE.to_string()))?;
        let raw = mode
            .raw()
            .ok_or_else(|| MuxguardError::generic("cannot write an unknown MUX mode"))?;
        self.platform.write_attribute(&attr, raw)?;
        info!("MUX set to {} for next boot", mode);
        Ok(())
    }
}

/// Eco is illegal while the panel may be wired to the dGPU
fn check_eco_allowed(snapshot: &HardwareSnapshot) -> Result<()> {
    match snapshot.mux_mode {
        MuxMode::DgpuDirect => Err(MuxguardError::safety(
            "eco would power off the GPU driving the panel",
        )),
        MuxMode::Unknown if snapshot.supports_mux => Err(MuxguardError::safety(
            "MUX state is unreadable, refusing to power off the dGPU",
        )),
        _ => Ok(()),
    }
}
