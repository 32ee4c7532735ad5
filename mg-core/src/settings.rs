//! Settings
//!
//! System settings live in `/etc/muxguard/config.json` and only relocate the
//! files muxguard touches. Per-user state (last requested mode, last recovery
//! notice shown) lives in `~/.config/muxguard/state.json`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::{logging, paths};
use crate::data::GpuMode;
use crate::error::Result;
use crate::MuxguardError;

/// System settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub attributes: AttributeSettings,

    #[serde(default)]
    pub handoff: HandoffPaths,

    #[serde(default)]
    pub system: SystemPaths,

    #[serde(default)]
    pub helper: HelperSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where hardware attributes are looked up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSettings {
    /// Legacy flat attribute directories, first match wins
    #[serde(default = "default_legacy_dirs")]
    pub legacy_dirs: Vec<PathBuf>,

    /// Firmware-attribute tree root
    #[serde(default = "default_firmware_dir")]
    pub firmware_dir: PathBuf,
}

/// Files making up the boot-time handoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffPaths {
    #[serde(default = "default_pending_file")]
    pub pending_file: PathBuf,

    #[serde(default = "default_blacklist_file")]
    pub blacklist_file: PathBuf,

    #[serde(default = "default_rule_file")]
    pub rule_file: PathBuf,

    #[serde(default = "default_recovery_marker")]
    pub recovery_marker: PathBuf,
}

/// Kernel interfaces outside the attribute trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPaths {
    #[serde(default = "default_pci_devices")]
    pub pci_devices: PathBuf,

    #[serde(default = "default_pci_rescan")]
    pub pci_rescan: PathBuf,

    #[serde(default = "default_proc_modules")]
    pub proc_modules: PathBuf,

    #[serde(default = "default_product_name")]
    pub product_name: PathBuf,

    /// Shared by every process that changes GPU mode
    #[serde(default = "default_planner_lock")]
    pub planner_lock: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperSettings {
    /// Absolute path of the privileged helper
    #[serde(default = "default_helper_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// tracing filter used when MUXGUARD_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_legacy_dirs() -> Vec<PathBuf> {
    paths::LEGACY_ATTRIBUTE_DIRS.iter().map(PathBuf::from).collect()
}

fn default_firmware_dir() -> PathBuf {
    PathBuf::from(paths::FIRMWARE_ATTRIBUTE_DIR)
}

fn default_pending_file() -> PathBuf {
    PathBuf::from(paths::PENDING_FILE)
}

fn default_blacklist_file() -> PathBuf {
    PathBuf::from(paths::BLACKLIST_FILE)
}

fn default_rule_file() -> PathBuf {
    PathBuf::from(paths::REMOVAL_RULE_FILE)
}

fn default_recovery_marker() -> PathBuf {
    PathBuf::from(paths::RECOVERY_MARKER_FILE)
}

fn default_pci_devices() -> PathBuf {
    PathBuf::from(mg_gpu::gpu_const::PCI_DEVICES_PATH)
}

fn default_pci_rescan() -> PathBuf {
    PathBuf::from(mg_gpu::gpu_const::PCI_RESCAN_PATH)
}

fn default_proc_modules() -> PathBuf {
    PathBuf::from(mg_gpu::gpu_const::PROC_MODULES_PATH)
}

fn default_product_name() -> PathBuf {
    PathBuf::from(paths::DMI_PRODUCT_NAME)
}

fn default_planner_lock() -> PathBuf {
    PathBuf::from(paths::PLANNER_LOCK)
}

fn default_helper_path() -> PathBuf {
    PathBuf::from(paths::HELPER_BINARY)
}

fn default_log_level() -> String {
    logging::DEFAULT_LEVEL.to_string()
}

impl Default for AttributeSettings {
    fn default() -> Self {
        Self {
            legacy_dirs: default_legacy_dirs(),
            firmware_dir: default_firmware_dir(),
        }
    }
}

impl Default for HandoffPaths {
    fn default() -> Self {
        Self {
            pending_file: default_pending_file(),
            blacklist_file: default_blacklist_file(),
            rule_file: default_rule_file(),
            recovery_marker: default_recovery_marker(),
        }
    }
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            pci_devices: default_pci_devices(),
            pci_rescan: default_pci_rescan(),
            proc_modules: default_proc_modules(),
            product_name: default_product_name(),
            planner_lock: default_planner_lock(),
        }
    }
}

impl Default for HelperSettings {
    fn default() -> Self {
        Self { path: default_helper_path() }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// Load system settings; a missing file yields defaults
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        debug!("No settings file at {:?}, using defaults", path);
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path).map_err(|e| MuxguardError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content)
        .map_err(|e| MuxguardError::config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load system settings, falling back to defaults on any error
///
/// Used by the boot controller, which must never stop on a broken config.
pub fn load_settings_or_default(path: &Path) -> Settings {
    load_settings(path).unwrap_or_else(|e| {
        warn!("{}; continuing with default settings", e);
        Settings::default()
    })
}

// ============================================================================
// Per-user state
// ============================================================================

/// State the user-facing layer keeps between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    /// Mode most recently requested by this user
    #[serde(default)]
    pub last_requested_mode: Option<GpuMode>,

    /// Timestamp of the last recovery marker already shown
    #[serde(default)]
    pub last_seen_recovery: Option<String>,
}

/// Path of the per-user state file
pub fn get_user_state_path() -> Result<PathBuf> {
    let dir = paths::user_config_dir()
        .ok_or_else(|| MuxguardError::config("Could not determine config directory"))?;
    Ok(dir.join(paths::USER_STATE_FILE))
}

/// Load per-user state from `path`; a missing file yields defaults
pub fn load_user_state(path: &Path) -> Result<UserState> {
    if !path.exists() {
        return Ok(UserState::default());
    }

    let content = fs::read_to_string(path).map_err(|e| MuxguardError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Save per-user state to `path`
/// Uses atomic write (temp file + rename) to prevent corruption on crash
pub fn save_user_state(path: &Path, state: &UserState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(state)?;
    crate::data::write_atomic(path, json.as_bytes(), 0o644)
}
