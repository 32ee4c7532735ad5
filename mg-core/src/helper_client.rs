//! Privileged helper client
//!
//! The handoff files live under /etc, so unprivileged callers reach them
//! through `muxguard-helper` via pkexec. Arguments are positional and passed
//! straight to exec, never through a shell.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::constants::paths;
use crate::data::GpuMode;
use crate::error::Result;
use crate::MuxguardError;

/// Operations the privileged helper performs on our behalf
#[cfg_attr(test, mockall::automock)]
pub trait PrivilegedHelper: Send + Sync {
    /// Validate and install both block artifacts plus the pending record
    fn write(&self, blacklist_src: &Path, rule_src: &Path, mode: GpuMode) -> Result<()>;

    /// Remove the artifacts and the pending record, then reload udev rules
    fn clean(&self) -> Result<()>;
}

/// Runs the helper binary, through pkexec unless already root
#[derive(Debug, Clone)]
pub struct PkexecHelper {
    helper_path: PathBuf,
}

impl PkexecHelper {
    pub fn new(helper_path: impl Into<PathBuf>) -> Self {
        Self {
            helper_path: helper_path.into(),
        }
    }

    fn run(&self, args: &[&OsStr]) -> Result<()> {
        if !self.helper_path.is_absolute() {
            return Err(MuxguardError::invalid_path(&self.helper_path, "helper path must be absolute"));
        }

        let mut cmd = if is_root() {
            Command::new(&self.helper_path)
        } else {
            let mut c = Command::new(paths::PKEXEC_BINARY);
            c.arg(&self.helper_path);
            c
        };
        cmd.args(args);
        debug!("Running privileged helper: {:?}", cmd);

        let output = cmd
            .output()
            .map_err(|e| MuxguardError::PrivilegeEscalation(format!("Failed to run helper: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MuxguardError::PrivilegeEscalation(format!(
                "Helper exited with {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }
}

impl PrivilegedHelper for PkexecHelper {
    fn write(&self, blacklist_src: &Path, rule_src: &Path, mode: GpuMode) -> Result<()> {
        self.run(&[
            OsStr::new("write"),
            blacklist_src.as_os_str(),
            rule_src.as_os_str(),
            OsStr::new(mode.as_str()),
        ])?;
        info!("Helper installed handoff for {}", mode);
        Ok(())
    }

    fn clean(&self) -> Result<()> {
        self.run(&[OsStr::new("clean")])?;
        info!("Helper cleaned handoff");
        Ok(())
    }
}

pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}
