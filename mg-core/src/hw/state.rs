//! Mode state reader

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::platform::Platform;
use crate::constants::attributes;

/// Where the MUX routes the internal panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MuxMode {
    /// iGPU drives the panel, dGPU renders offloaded work
    Hybrid,
    /// Panel wired straight to the dGPU
    DgpuDirect,
    /// Attribute absent or holding a value we do not understand
    Unknown,
}

impl MuxMode {
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            attributes::MUX_DGPU_DIRECT => MuxMode::DgpuDirect,
            attributes::MUX_HYBRID => MuxMode::Hybrid,
            _ => MuxMode::Unknown,
        }
    }

    /// Value to write to `gpu_mux_mode`, None for Unknown
    pub fn raw(self) -> Option<i64> {
        match self {
            MuxMode::DgpuDirect => Some(attributes::MUX_DGPU_DIRECT),
            MuxMode::Hybrid => Some(attributes::MUX_HYBRID),
            MuxMode::Unknown => None,
        }
    }
}

impl fmt::Display for MuxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxMode::Hybrid => write!(f, "hybrid"),
            MuxMode::DgpuDirect => write!(f, "dgpu-direct"),
            MuxMode::Unknown => write!(f, "unknown"),
        }
    }
}

/// Hardware state at one instant. Read fresh for every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub dgpu_disabled: bool,
    pub mux_mode: MuxMode,
    pub supports_dgpu_disable: bool,
    pub supports_mux: bool,
}

impl Default for HardwareSnapshot {
    fn default() -> Self {
        Self {
            dgpu_disabled: false,
            mux_mode: MuxMode::Unknown,
            supports_dgpu_disable: false,
            supports_mux: false,
        }
    }
}

/// Read the dGPU and MUX attributes
///
/// Absent or unreadable values fall back to "dGPU on, routing unknown".
pub fn read_snapshot(platform: &dyn Platform) -> HardwareSnapshot {
    let mut snapshot = HardwareSnapshot::default();

    if let Some(attr) = platform.resolve(attributes::DGPU_DISABLE) {
        snapshot.supports_dgpu_disable = true;
        snapshot.dgpu_disabled = match platform.read_attribute(&attr) {
            Ok(1) => true,
            Ok(0) => false,
            Ok(other) => {
                warn!("{} holds unexpected value {}, assuming enabled", attr.logical_name, other);
                false
            }
            Err(e) => {
                warn!("Cannot read {}: {}, assuming enabled", attr.logical_name, e);
                false
            }
        };
    }

    if let Some(attr) = platform.resolve(attributes::GPU_MUX_MODE) {
        snapshot.supports_mux = true;
        snapshot.mux_mode = match platform.read_attribute(&attr) {
            Ok(raw) => MuxMode::from_raw(raw),
            Err(e) => {
                warn!("Cannot read {}: {}", attr.logical_name, e);
                MuxMode::Unknown
            }
        };
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::platform::MockPlatform;
    use crate::hw::{AttributeBackend, ResolvedAttribute};
    use crate::MuxguardError;
    use std::path::PathBuf;

    fn attr(name: &str) -> ResolvedAttribute {
        ResolvedAttribute {
            logical_name: name.to_string(),
            backend: AttributeBackend::Legacy,
            path: PathBuf::from("/sys/devices/platform/asus-nb-wmi").join(name),
        }
    }

    #[test]
    fn test_mux_encoding() {
        assert_eq!(MuxMode::from_raw(0), MuxMode::DgpuDirect);
        assert_eq!(MuxMode::from_raw(1), MuxMode::Hybrid);
        assert_eq!(MuxMode::from_raw(2), MuxMode::Unknown);
        assert_eq!(MuxMode::Hybrid.raw(), Some(1));
        assert_eq!(MuxMode::Unknown.raw(), None);
    }

    #[test]
    fn test_unsupported_machine_reads_conservatively() {
        let mut platform = MockPlatform::new();
        platform.expect_resolve().returning(|_| None);

        let snap = read_snapshot(&platform);
        assert_eq!(snap, HardwareSnapshot::default());
        assert!(!snap.dgpu_disabled);
    }

    #[test]
    fn test_read_errors_fall_back() {
        let mut platform = MockPlatform::new();
        platform.expect_resolve().returning(|name| Some(attr(name)));
        platform
            .expect_read_attribute()
            .returning(|a| Err(MuxguardError::generic(format!("EIO on {}", a.logical_name))));

        let snap = read_snapshot(&platform);
        assert!(snap.supports_dgpu_disable);
        assert!(snap.supports_mux);
        assert!(!snap.dgpu_disabled);
        assert_eq!(snap.mux_mode, MuxMode::Unknown);
    }

    #[test]
    fn test_reads_values() {
        let mut platform = MockPlatform::new();
        platform.expect_resolve().returning(|name| Some(attr(name)));
        platform
            .expect_read_attribute()
            .returning(|a| Ok(if a.logical_name == "dgpu_disable" { 1 } else { 0 }));

        let snap = read_snapshot(&platform);
        assert!(snap.dgpu_disabled);
        assert_eq!(snap.mux_mode, MuxMode::DgpuDirect);
    }

    #[test]
    fn test_garbage_dgpu_value_means_enabled() {
        let mut platform = MockPlatform::new();
        platform
            .expect_resolve()
            .returning(|name| (name == "dgpu_disable").then(|| attr(name)));
        platform.expect_read_attribute().returning(|_| Ok(7));

        let snap = read_snapshot(&platform);
        assert!(!snap.dgpu_disabled);
        assert!(!snap.supports_mux);
    }
}
