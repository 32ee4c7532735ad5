//! Data types and the boot-time handoff
//!
//! Contains the mode enumeration, the pending-transition record, the recovery
//! marker, and the file store that moves them across the privilege boundary.

mod handoff;
mod types;

pub use handoff::{write_atomic, HandoffStore};
pub use types::{GpuMode, PendingMode, PendingTransition, RecoveryMarker};
