//! Block artifacts
//!
//! A modprobe blacklist and a udev removal rule that together keep the dGPU
//! driver from attaching on the next boot. They are installed and removed as
//! a pair, always together with the pending record.
//!
//! Content is rendered here, staged in private temp files and handed to the
//! privileged helper, which re-validates it with [`validate_artifact`] before
//! anything lands under /etc.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;

use mg_gpu::GpuInventory;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::constants::limits;
use crate::data::{GpuMode, HandoffStore, PendingTransition};
use crate::error::Result;
use crate::helper_client::PrivilegedHelper;
use crate::MuxguardError;

/// Which of the two artifacts a piece of content is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Blacklist,
    RemovalRule,
}

impl ArtifactKind {
    fn label(self) -> &'static str {
        match self {
            ArtifactKind::Blacklist => "blacklist",
            ArtifactKind::RemovalRule => "removal rule",
        }
    }
}

/// Rendered artifact pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockArtifacts {
    pub blacklist: String,
    pub rules: String,
}

impl BlockArtifacts {
    pub fn render(inventory: &GpuInventory) -> Self {
        Self {
            blacklist: mg_gpu::render_blacklist(inventory),
            rules: mg_gpu::render_removal_rules(inventory),
        }
    }
}

const RULE_PREFIX: &str = "ACTION==\"add\", SUBSYSTEM==\"pci\", ";
const RULE_SUFFIX: &str = "ATTR{remove}=\"1\"";
const RULE_FORBIDDEN: &[&str] = &["RUN", "PROGRAM", "IMPORT", "GOTO", "LABEL", "$", "`", "%"];

fn known_module(name: &str) -> bool {
    mg_gpu::nvidia::DRIVER_MODULES.contains(&name) || mg_gpu::amd::DRIVER_MODULES.contains(&name)
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_blacklist_line(line: &str) -> std::result::Result<(), String> {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some("blacklist"), Some(module)) if known_module(module) => {
            if words.next().is_some() {
                return Err("trailing words after blacklist".to_string());
            }
            Ok(())
        }
        (Some("options"), Some(module)) if known_module(module) => {
            let mut any = false;
            for opt in words {
                let (key, value) = opt.split_once('=').ok_or("malformed option")?;
                if !is_word(key) || !is_word(value) {
                    return Err("malformed option".to_string());
                }
                any = true;
            }
            if any {
                Ok(())
            } else {
                Err("options line without options".to_string())
            }
        }
        _ => Err("unexpected directive".to_string()),
    }
}

fn validate_rule_line(line: &str) -> std::result::Result<(), String> {
    if !line.starts_with(RULE_PREFIX) || !line.ends_with(RULE_SUFFIX) {
        return Err("rule does not match the removal shape".to_string());
    }
    if let Some(bad) = RULE_FORBIDDEN.iter().find(|f| line.contains(*f)) {
        return Err(format!("rule contains forbidden token {:?}", bad));
    }
    Ok(())
}

/// Check artifact content against the only line shapes muxguard ever renders
pub fn validate_artifact(kind: ArtifactKind, content: &str) -> std::result::Result<(), String> {
    if content.len() as u64 > limits::MAX_ARTIFACT_SIZE {
        return Err(format!("content exceeds {} bytes", limits::MAX_ARTIFACT_SIZE));
    }
    if content.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return Err("content contains control characters".to_string());
    }

    let mut directives = 0;
    for (n, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let checked = match kind {
            ArtifactKind::Blacklist => validate_blacklist_line(line),
            ArtifactKind::RemovalRule => validate_rule_line(line),
        };
        checked.map_err(|e| format!("line {}: {}", n + 1, e))?;
        directives += 1;
    }

    if directives == 0 {
        return Err(format!("{} has no directives", kind.label()));
    }
    Ok(())
}

/// Read and validate an artifact source file
///
/// The path is opened once without following symlinks and every check runs
/// on that handle. Rejections carry line numbers only, never file content,
/// since the caller may be less privileged than the reader.
pub fn read_artifact_source(kind: ArtifactKind, path: &Path) -> Result<String> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
        .map_err(|e| match e.raw_os_error() {
            Some(libc::ELOOP) => MuxguardError::invalid_path(path, "source is a symlink"),
            _ => MuxguardError::FileRead {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(MuxguardError::invalid_path(path, "source is not a regular file"));
    }
    if meta.len() > limits::MAX_ARTIFACT_SIZE {
        return Err(MuxguardError::FileTooLarge {
            path: path.to_path_buf(),
            size: meta.len(),
            max_size: limits::MAX_ARTIFACT_SIZE,
        });
    }

    let mut bytes = Vec::new();
    file.take(limits::MAX_ARTIFACT_SIZE + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| MuxguardError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
    if bytes.len() as u64 > limits::MAX_ARTIFACT_SIZE {
        return Err(MuxguardError::FileTooLarge {
            path: path.to_path_buf(),
            size: bytes.len() as u64,
            max_size: limits::MAX_ARTIFACT_SIZE,
        });
    }

    let content = String::from_utf8(bytes).map_err(|_| MuxguardError::InvalidArtifact {
        path: path.to_path_buf(),
        reason: "content is not UTF-8".to_string(),
    })?;
    validate_artifact(kind, &content).map_err(|reason| MuxguardError::InvalidArtifact {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(content)
}

/// Stages block artifacts through the privileged helper
///
/// Writes go through the helper; the local [`HandoffStore`] is only read.
pub struct BlockArtifactManager {
    inventory: GpuInventory,
    helper: Arc<dyn PrivilegedHelper>,
    handoff: HandoffStore,
}

impl BlockArtifactManager {
    pub fn new(inventory: GpuInventory, helper: Arc<dyn PrivilegedHelper>, handoff: HandoffStore) -> Self {
        Self {
            inventory,
            helper,
            handoff,
        }
    }

    /// True when a pending record or either artifact is on disk
    pub fn is_staged(&self) -> bool {
        self.handoff.pending_exists() || self.handoff.artifacts_present()
    }

    pub fn pending(&self) -> Result<Option<PendingTransition>> {
        self.handoff.read_pending()
    }

    pub fn render(&self) -> BlockArtifacts {
        BlockArtifacts::render(&self.inventory)
    }

    /// Install the artifact pair and the pending record for `mode`
    ///
    /// Only Eco powers the dGPU off, so only Eco gets block artifacts.
    pub fn install(&self, mode: GpuMode) -> Result<()> {
        if mode != GpuMode::Eco {
            return Err(MuxguardError::InvalidMode(format!(
                "block artifacts only apply to eco, not {}",
                mode
            )));
        }

        let artifacts = self.render();
        let blacklist = stage(&artifacts.blacklist)?;
        let rules = stage(&artifacts.rules)?;
        debug!("Staged artifacts at {:?} and {:?}", blacklist.path(), rules.path());

        self.helper.write(blacklist.path(), rules.path(), mode)?;
        info!("Block artifacts installed for {}", mode);
        Ok(())
    }

    /// Remove the artifacts and the pending record. Idempotent
    pub fn clean(&self) -> Result<()> {
        self.helper.clean()
    }
}

fn stage(content: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix("muxguard-").tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}
