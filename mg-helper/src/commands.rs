//! Helper commands
//!
//! Both commands operate on a [`HandoffStore`] so they can run against a
//! temp dir in tests.

use std::fs;
use std::path::Path;

use mg_core::{read_artifact_source, ArtifactKind, GpuMode, HandoffStore};
use mg_error::{MuxguardError, Result};
use tracing::{info, warn};

/// `write <blacklist-src> <rule-src> [mode]`
pub fn write(store: &HandoffStore, blacklist_src: &Path, rule_src: &Path, mode: &str) -> Result<()> {
    let mode: GpuMode = mode.parse()?;
    if mode != GpuMode::Eco {
        return Err(MuxguardError::InvalidMode(format!(
            "{} does not use block artifacts",
            mode
        )));
    }

    let blacklist = read_artifact_source(ArtifactKind::Blacklist, blacklist_src)?;
    let rules = read_artifact_source(ArtifactKind::RemovalRule, rule_src)?;

    if let Some(parent) = store.paths().pending_file.parent() {
        fs::create_dir_all(parent)?;
    }
    store.install(&blacklist, &rules, mode)?;
    info!("Installed handoff for {}", mode);
    Ok(())
}

/// `clean`: remove every handoff file, reloading udev if anything went
///
/// A failed reload is logged; the files are gone either way.
pub fn clean(store: &HandoffStore, reload: impl FnOnce() -> Result<()>) -> Result<bool> {
    let removed = store.clean()?;
    if removed {
        if let Err(e) = reload() {
            warn!("Handoff removed but udev reload failed: {}", e);
        }
    }
    info!("Handoff clean ({})", if removed { "removed files" } else { "nothing to do" });
    Ok(removed)
}
