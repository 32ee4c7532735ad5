//! Attribute resolution
//!
//! The same logical control (for example `dgpu_disable`) is exposed by two
//! generations of the platform driver:
//!
//! - legacy: a flat file `<platform-device>/<name>`
//! - firmware attributes: `<tree>/<name>/current_value`
//!
//! Legacy wins when both exist.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::constants::{attributes, limits};
use crate::error::Result;
use crate::settings::AttributeSettings;
use crate::MuxguardError;

/// Which interface generation backs an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeBackend {
    Legacy,
    FirmwareAttribute,
}

/// A logical attribute bound to its control file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttribute {
    pub logical_name: String,
    pub backend: AttributeBackend,
    pub path: PathBuf,
}

/// Maps logical attribute names onto control files
#[derive(Debug, Clone)]
pub struct AttributeResolver {
    legacy_dirs: Vec<PathBuf>,
    firmware_dir: PathBuf,
}

impl AttributeResolver {
    pub fn new(legacy_dirs: Vec<PathBuf>, firmware_dir: PathBuf) -> Self {
        Self {
            legacy_dirs,
            firmware_dir,
        }
    }

    pub fn from_settings(settings: &AttributeSettings) -> Self {
        Self::new(settings.legacy_dirs.clone(), settings.firmware_dir.clone())
    }

    /// Resolve `name`, or None when this machine does not expose it
    pub fn resolve(&self, name: &str) -> Option<ResolvedAttribute> {
        if !is_valid_name(name) {
            debug!("Refusing to resolve malformed attribute name {:?}", name);
            return None;
        }

        for dir in &self.legacy_dirs {
            let candidate = dir.join(name);
            if candidate.is_file() {
                trace!("{} -> {:?} (legacy)", name, candidate);
                return Some(ResolvedAttribute {
                    logical_name: name.to_string(),
                    backend: AttributeBackend::Legacy,
                    path: candidate,
                });
            }
        }

        let candidate = self
            .firmware_dir
            .join(name)
            .join(attributes::FIRMWARE_VALUE_FILE);
        if candidate.is_file() {
            trace!("{} -> {:?} (firmware attribute)", name, candidate);
            return Some(ResolvedAttribute {
                logical_name: name.to_string(),
                backend: AttributeBackend::FirmwareAttribute,
                path: candidate,
            });
        }

        None
    }

    /// Resolve a safety-critical attribute; absence is `Unsupported`
    pub fn resolve_required(&self, name: &str) -> Result<ResolvedAttribute> {
        self.resolve(name)
            .ok_or_else(|| MuxguardError::Unsupported(name.to_string()))
    }

    /// Read an optional attribute; None when unsupported or unreadable
    pub fn read_optional(&self, name: &str) -> Option<i64> {
        let attr = self.resolve(name)?;
        match read_int(&attr.path) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("Optional attribute {} unreadable: {}", name, e);
                None
            }
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= limits::MAX_ATTRIBUTE_NAME_LEN
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Read a plain-text integer control file
pub fn read_int(path: &Path) -> Result<i64> {
    let content = fs::read_to_string(path).map_err(|e| MuxguardError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    content
        .trim()
        .parse::<i64>()
        .map_err(|_| MuxguardError::InvalidValue {
            path: path.to_path_buf(),
            value: content.trim().to_string(),
        })
}

/// Write a plain-text integer to a control file
///
/// Any OS-level failure is reported as `WriteRejected`; the caller must not
/// assume the state changed.
pub fn write_int(path: &Path, value: i64) -> Result<()> {
    fs::write(path, value.to_string())
        .map_err(|e| MuxguardError::write_rejected(path, format!("Failed to write {}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Tree {
        _tmp: TempDir,
        legacy: PathBuf,
        alt_legacy: PathBuf,
        firmware: PathBuf,
    }

    impl Tree {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let legacy = tmp.path().join("asus-nb-wmi");
            let alt_legacy = tmp.path().join("bus-asus-nb-wmi");
            let firmware = tmp.path().join("attributes");
            fs::create_dir_all(&legacy).unwrap();
            fs::create_dir_all(&alt_legacy).unwrap();
            fs::create_dir_all(&firmware).unwrap();
            Self {
                _tmp: tmp,
                legacy,
                alt_legacy,
                firmware,
            }
        }

        fn resolver(&self) -> AttributeResolver {
            AttributeResolver::new(vec![self.legacy.clone(), self.alt_legacy.clone()], self.firmware.clone())
        }

        fn add_firmware(&self, name: &str, value: &str) -> PathBuf {
            let dir = self.firmware.join(name);
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join("current_value");
            fs::write(&path, value).unwrap();
            path
        }
    }

    #[test]
    fn test_legacy_wins_over_firmware() {
        let tree = Tree::new();
        fs::write(tree.legacy.join("dgpu_disable"), "0\n").unwrap();
        tree.add_firmware("dgpu_disable", "1\n");

        let attr = tree.resolver().resolve("dgpu_disable").unwrap();
        assert_eq!(attr.backend, AttributeBackend::Legacy);
        assert_eq!(attr.path, tree.legacy.join("dgpu_disable"));
    }

    #[test]
    fn test_second_legacy_dir_is_searched() {
        let tree = Tree::new();
        fs::write(tree.alt_legacy.join("gpu_mux_mode"), "1\n").unwrap();

        let attr = tree.resolver().resolve("gpu_mux_mode").unwrap();
        assert_eq!(attr.path, tree.alt_legacy.join("gpu_mux_mode"));
    }

    #[test]
    fn test_firmware_fallback() {
        let tree = Tree::new();
        let path = tree.add_firmware("gpu_mux_mode", "0\n");

        let attr = tree.resolver().resolve("gpu_mux_mode").unwrap();
        assert_eq!(attr.backend, AttributeBackend::FirmwareAttribute);
        assert_eq!(attr.path, path);
    }

    #[test]
    fn test_directory_does_not_count_as_legacy_file() {
        let tree = Tree::new();
        fs::create_dir_all(tree.legacy.join("dgpu_disable")).unwrap();
        let path = tree.add_firmware("dgpu_disable", "0\n");

        assert_eq!(tree.resolver().resolve("dgpu_disable").unwrap().path, path);
    }

    #[test]
    fn test_unsupported_attribute() {
        let tree = Tree::new();
        let resolver = tree.resolver();
        assert!(resolver.resolve("mini_led_mode").is_none());
        assert!(resolver.read_optional("mini_led_mode").is_none());
        assert!(resolver.resolve_required("dgpu_disable").unwrap_err().is_unsupported());
    }

    #[test]
    fn test_malformed_names_rejected() {
        let tree = Tree::new();
        fs::write(tree.legacy.join("x"), "1").unwrap();
        let resolver = tree.resolver();
        assert!(resolver.resolve("../asus-nb-wmi/x").is_none());
        assert!(resolver.resolve("..").is_none());
        assert!(resolver.resolve("").is_none());
    }

    #[test]
    fn test_read_and_write_int() {
        let tree = Tree::new();
        let path = tree.legacy.join("dgpu_disable");
        fs::write(&path, " 1\n").unwrap();
        assert_eq!(read_int(&path).unwrap(), 1);

        write_int(&path, 0).unwrap();
        assert_eq!(read_int(&path).unwrap(), 0);

        fs::write(&path, "on").unwrap();
        assert!(matches!(read_int(&path), Err(MuxguardError::InvalidValue { .. })));
    }

    #[test]
    fn test_write_to_missing_dir_is_rejected() {
        let tree = Tree::new();
        let path = tree.legacy.join("missing").join("dgpu_disable");
        assert!(matches!(write_int(&path, 1), Err(MuxguardError::WriteRejected { .. })));
    }
}
