//! muxguard Core Library
//!
//! Safe GPU mode transitions for laptops with a switchable dGPU and a
//! display MUX.
//!
//! # Features
//!
//! - **Attribute Resolution**: Finds `dgpu_disable`, `gpu_mux_mode` and friends
//!   across the legacy platform interface and the firmware-attribute tree
//! - **Transition Planning**: Refuses illegal combinations, orders writes, and
//!   stages anything that needs a reboot
//! - **Deferred Apply**: Block artifacts plus a pending record, consumed once at boot
//! - **Boot Safety**: A pure boot plan and a best-effort executor that repairs
//!   impossible states and never fails
//!
//! # Module Structure
//!
//! - `hw/` - Attribute resolution, state reading, the `Platform` seam
//! - `data/` - Mode types and the handoff file store
//! - `boot/` - Boot state machine and controller
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mg_core::{load_settings_or_default, GpuMode, SystemContext};
//!
//! let settings = load_settings_or_default(std::path::Path::new("/etc/muxguard/config.json"));
//! let ctx = SystemContext::detect(settings);
//! let planner = ctx.planner(Arc::new(ctx.helper()));
//! let outcome = planner.request(GpuMode::Standard).unwrap();
//! ```

// Grouped modules
pub mod boot;
pub mod data;
pub mod hw;

// Standalone modules
pub mod artifacts;
pub mod constants;
pub mod context;
pub mod helper_client;
pub mod lock;
pub mod logging;
pub mod planner;
pub mod settings;

#[cfg(test)]
mod test_utils;

pub use mg_error as error;

// Re-export error types
pub use error::{MuxguardError, Result};

// Re-export data types
pub use data::{write_atomic, GpuMode, HandoffStore, PendingMode, PendingTransition, RecoveryMarker};

// Re-export hardware types
pub use hw::{
    read_snapshot, AttributeBackend, AttributeResolver, HardwareSnapshot, MuxMode, Platform,
    ResolvedAttribute, SysfsPlatform,
};

pub use artifacts::{read_artifact_source, validate_artifact, ArtifactKind, BlockArtifactManager, BlockArtifacts};
pub use boot::{BootController, BootPlan, BootReport};
pub use context::SystemContext;
pub use helper_client::{is_root, PkexecHelper, PrivilegedHelper};
pub use lock::FileLock;
pub use planner::{CancelFlag, TransitionOutcome, TransitionPlanner};

// Re-export settings functions
pub use settings::{
    get_user_state_path, load_settings, load_settings_or_default, load_user_state, save_user_state,
    Settings, UserState,
};
