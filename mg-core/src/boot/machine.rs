//! Boot state machine
//!
//! Pure: takes the facts gathered at boot and returns the actions to take.
//! No file or sysfs access happens here.

use std::fmt;

use tracing::{debug, info, warn};

use crate::data::{GpuMode, PendingMode};
use crate::hw::{HardwareSnapshot, MuxMode};

/// Everything the controller observed before deciding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootFacts {
    pub snapshot: HardwareSnapshot,
    pub artifacts_present: bool,
    /// None when no pending record exists
    pub pending: Option<PendingMode>,
    pub active_drivers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootState {
    InvariantCheck,
    CheckPending,
    Normalize,
    Apply(GpuMode),
    Cleanup,
    Done,
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootState::InvariantCheck => write!(f, "invariant-check"),
            BootState::CheckPending => write!(f, "check-pending"),
            BootState::Normalize => write!(f, "normalize"),
            BootState::Apply(mode) => write!(f, "apply({})", mode),
            BootState::Cleanup => write!(f, "cleanup"),
            BootState::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootAction {
    /// Power the dGPU on, optionally rescanning the PCI bus afterwards
    EnableDgpu { rescan: bool },
    /// Power the dGPU off and verify by readback
    DisableDgpu,
    SetMuxHybrid,
    /// Remove both block artifacts and reload udev rules
    RemoveArtifacts,
    DiscardPending,
    /// Remove artifacts and pending record; reload udev if anything went
    Cleanup,
}

/// Why the handoff survives this boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferral {
    /// A dGPU driver was attached when Eco was due
    DriverActive,
    /// `dgpu_disable` was not exposed yet
    AttributeMissing,
}

/// The controller's decision for this boot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootPlan {
    pub actions: Vec<BootAction>,
    /// Set when an impossible state was repaired
    pub recovery: Option<String>,
    /// Set when the handoff is left for the session layer
    pub deferred: Option<Deferral>,
    /// States visited, in order
    pub trace: Vec<BootState>,
}

impl BootPlan {
    pub fn keep_handoff(&self) -> bool {
        self.deferred.is_some()
    }
}

struct Machine<'a> {
    facts: &'a BootFacts,
    pending: Option<PendingMode>,
    artifacts_removed: bool,
    dgpu_enabled: bool,
    plan: BootPlan,
}

/// Decide what this boot must do
pub fn plan(facts: &BootFacts) -> BootPlan {
    let mut machine = Machine {
        facts,
        pending: facts.pending.clone(),
        artifacts_removed: false,
        dgpu_enabled: false,
        plan: BootPlan::default(),
    };

    let mut state = BootState::InvariantCheck;
    loop {
        debug!("Boot state: {}", state);
        machine.plan.trace.push(state.clone());
        state = match state {
            BootState::InvariantCheck => machine.invariant_check(),
            BootState::CheckPending => machine.check_pending(),
            BootState::Normalize => machine.normalize(),
            BootState::Apply(mode) => machine.apply(mode),
            BootState::Cleanup => {
                machine.plan.actions.push(BootAction::Cleanup);
                BootState::Done
            }
            BootState::Done => break,
        };
    }

    machine.plan
}

impl Machine<'_> {
    fn snapshot(&self) -> &HardwareSnapshot {
        &self.facts.snapshot
    }

    fn remove_artifacts_once(&mut self) {
        if self.facts.artifacts_present && !self.artifacts_removed {
            self.plan.actions.push(BootAction::RemoveArtifacts);
            self.artifacts_removed = true;
        }
    }

    /// With the panel wired to the dGPU, the dGPU must be on and nothing may block it
    fn invariant_check(&mut self) -> BootState {
        if self.snapshot().mux_mode != MuxMode::DgpuDirect {
            return BootState::CheckPending;
        }

        let mut repairs = Vec::new();
        if self.facts.artifacts_present {
            self.remove_artifacts_once();
            repairs.push("block artifacts were installed");
        }
        if self.snapshot().dgpu_disabled {
            self.enable_dgpu_once();
            repairs.push("the dGPU was powered off");
        }
        if self.pending.as_ref().is_some_and(PendingMode::is_eco) {
            self.plan.actions.push(BootAction::DiscardPending);
            self.pending = None;
            repairs.push("eco was pending");
        }

        if !repairs.is_empty() {
            self.plan.actions.push(BootAction::SetMuxHybrid);
            let reason = format!("MUX routed the panel to the dGPU while {}; switched to hybrid", repairs.join(" and "));
            warn!("Repaired impossible state: {}", reason);
            self.plan.recovery = Some(reason);
        }

        BootState::CheckPending
    }

    fn check_pending(&mut self) -> BootState {
        if self.pending.is_none() {
            debug!("Nothing pending");
            BootState::Cleanup
        } else {
            BootState::Normalize
        }
    }

    fn normalize(&mut self) -> BootState {
        match &self.pending {
            Some(PendingMode::Mode(mode)) => BootState::Apply(*mode),
            Some(PendingMode::Empty) | None => {
                info!("Pending record is empty, discarding");
                BootState::Cleanup
            }
            Some(PendingMode::Unknown(token)) => {
                warn!("Unknown pending mode {:?}, discarding", token);
                BootState::Cleanup
            }
        }
    }

    fn apply(&mut self, mode: GpuMode) -> BootState {
        match mode {
            GpuMode::Eco => self.apply_eco(),
            GpuMode::Standard | GpuMode::Optimized => {
                self.ensure_dgpu_enabled();
                BootState::Cleanup
            }
            GpuMode::Ultimate => {
                self.ensure_dgpu_enabled();
                let mux = self.snapshot().mux_mode;
                if mux == MuxMode::DgpuDirect {
                    info!("Ultimate active, MUX reads {}", mux);
                } else {
                    warn!("Ultimate was pending but MUX reads {}", mux);
                }
                BootState::Cleanup
            }
        }
    }

    fn apply_eco(&mut self) -> BootState {
        let snapshot = *self.snapshot();

        if !snapshot.supports_dgpu_disable {
            info!("dgpu_disable not exposed yet, leaving eco for the session to apply");
            self.plan.deferred = Some(Deferral::AttributeMissing);
            return BootState::Done;
        }
        if snapshot.mux_mode == MuxMode::DgpuDirect
            || (snapshot.mux_mode == MuxMode::Unknown && snapshot.supports_mux)
        {
            warn!("Eco pending while MUX reads {}, discarding", snapshot.mux_mode);
            return BootState::Cleanup;
        }
        if snapshot.dgpu_disabled {
            debug!("dGPU already off");
            return BootState::Cleanup;
        }
        if !self.facts.active_drivers.is_empty() {
            warn!(
                "dGPU drivers attached ({:?}), leaving eco for the session to apply",
                self.facts.active_drivers
            );
            self.plan.deferred = Some(Deferral::DriverActive);
            return BootState::Done;
        }

        self.plan.actions.push(BootAction::DisableDgpu);
        BootState::Cleanup
    }

    fn ensure_dgpu_enabled(&mut self) {
        if self.snapshot().dgpu_disabled {
            // The removal rule would drop the device again on rescan
            self.remove_artifacts_once();
            self.enable_dgpu_once();
        }
    }

    fn enable_dgpu_once(&mut self) {
        if !self.dgpu_enabled {
            self.plan.actions.push(BootAction::EnableDgpu { rescan: true });
            self.dgpu_enabled = true;
        }
    }
}
