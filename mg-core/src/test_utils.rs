//! Shared fixtures for unit tests

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::constants::attributes;
use crate::data::HandoffStore;
use crate::error::Result;
use crate::hw::{AttributeBackend, Platform, ResolvedAttribute};
use crate::settings::HandoffPaths;
use crate::MuxguardError;

/// Handoff store rooted in a temp dir
pub fn handoff_store(tmp: &TempDir) -> HandoffStore {
    HandoffStore::new(HandoffPaths {
        pending_file: tmp.path().join("pending_mode"),
        blacklist_file: tmp.path().join("muxguard-dgpu-block.conf"),
        rule_file: tmp.path().join("50-muxguard-dgpu-remove.rules"),
        recovery_marker: tmp.path().join("lib").join("recovery_marker"),
    })
}

/// In-memory machine that records every write
#[derive(Default)]
pub struct FakePlatform {
    values: Mutex<HashMap<String, i64>>,
    drivers: Mutex<Vec<String>>,
    writes: Mutex<Vec<(String, i64)>>,
    ignored: Mutex<HashSet<String>>,
    fail_writes: AtomicBool,
    fail_commands: AtomicBool,
    rescans: AtomicUsize,
    reloads: AtomicUsize,
}

impl FakePlatform {
    /// Machine exposing both safety-critical attributes
    pub fn machine(dgpu_disabled: bool, mux: i64) -> Self {
        Self::default()
            .with(attributes::DGPU_DISABLE, i64::from(dgpu_disabled))
            .with(attributes::GPU_MUX_MODE, mux)
    }

    pub fn with(self, name: &str, value: i64) -> Self {
        self.values.lock().insert(name.to_string(), value);
        self
    }

    pub fn with_drivers(self, drivers: &[&str]) -> Self {
        *self.drivers.lock() = drivers.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Accept writes to `name` without changing its value
    pub fn ignoring_writes_to(self, name: &str) -> Self {
        self.ignored.lock().insert(name.to_string());
        self
    }

    /// Every attribute write and rescan fails
    pub fn failing(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self.fail_commands.store(true, Ordering::SeqCst);
        self
    }

    pub fn value(&self, name: &str) -> Option<i64> {
        self.values.lock().get(name).copied()
    }

    pub fn writes(&self) -> Vec<(String, i64)> {
        self.writes.lock().clone()
    }

    pub fn rescans(&self) -> usize {
        self.rescans.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Platform for FakePlatform {
    fn resolve(&self, name: &str) -> Option<ResolvedAttribute> {
        self.values.lock().contains_key(name).then(|| ResolvedAttribute {
            logical_name: name.to_string(),
            backend: AttributeBackend::Legacy,
            path: PathBuf::from("/fake").join(name),
        })
    }

    fn read_attribute(&self, attr: &ResolvedAttribute) -> Result<i64> {
        self.value(&attr.logical_name)
            .ok_or_else(|| MuxguardError::Unsupported(attr.logical_name.clone()))
    }

    fn write_attribute(&self, attr: &ResolvedAttribute, value: i64) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MuxguardError::write_rejected(&attr.path, "simulated EIO"));
        }
        self.writes.lock().push((attr.logical_name.clone(), value));
        if !self.ignored.lock().contains(&attr.logical_name) {
            self.values.lock().insert(attr.logical_name.clone(), value);
        }
        Ok(())
    }

    fn active_dgpu_drivers(&self) -> Vec<String> {
        self.drivers.lock().clone()
    }

    fn rescan_pci_bus(&self) -> Result<()> {
        self.rescans.fetch_add(1, Ordering::SeqCst);
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(MuxguardError::generic("simulated rescan failure"));
        }
        Ok(())
    }

    fn reload_device_rules(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(MuxguardError::Unsupported("udevadm not found".to_string()));
        }
        Ok(())
    }
}
