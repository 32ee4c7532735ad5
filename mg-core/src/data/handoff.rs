//! Handoff file store
//!
//! The pending record and the two block artifacts are the only state shared
//! between the user-facing process and the boot controller. One writer (the
//! privileged helper) and one reader (the boot controller) use this store.
//! Writes are create-then-rename so a reader never sees a half-written file.

use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::types::{GpuMode, PendingMode, PendingTransition, RecoveryMarker};
use crate::constants::limits;
use crate::error::Result;
use crate::settings::HandoffPaths;
use crate::MuxguardError;

/// Filesystem view of the boot-time handoff
#[derive(Debug, Clone)]
pub struct HandoffStore {
    paths: HandoffPaths,
}

impl HandoffStore {
    pub fn new(paths: HandoffPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &HandoffPaths {
        &self.paths
    }

    /// True when a pending record exists, whatever it holds
    pub fn pending_exists(&self) -> bool {
        self.paths.pending_file.exists()
    }

    /// Read and normalize the pending record
    pub fn read_pending(&self) -> Result<Option<PendingTransition>> {
        let path = &self.paths.pending_file;
        let meta = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MuxguardError::FileRead {
                    path: path.clone(),
                    source: e,
                })
            }
        };

        if meta.len() > limits::MAX_PENDING_SIZE {
            return Err(MuxguardError::FileTooLarge {
                path: path.clone(),
                size: meta.len(),
                max_size: limits::MAX_PENDING_SIZE,
            });
        }

        let raw = fs::read_to_string(path).map_err(|e| MuxguardError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let created_at = meta.modified().ok().map(DateTime::<Utc>::from);

        Ok(Some(PendingTransition {
            mode: PendingMode::parse(&raw),
            created_at,
        }))
    }

    /// True when either block artifact is on disk
    pub fn artifacts_present(&self) -> bool {
        self.paths.blacklist_file.exists() || self.paths.rule_file.exists()
    }

    /// Install both block artifacts, then the pending record
    ///
    /// The record goes last: its existence is what tells the boot controller
    /// work is owed. If any step fails, whatever was written is rolled back so
    /// the artifacts never exist without each other.
    pub fn install(&self, blacklist: &str, rules: &str, mode: GpuMode) -> Result<()> {
        let steps: [(&Path, &[u8]); 3] = [
            (&self.paths.blacklist_file, blacklist.as_bytes()),
            (&self.paths.rule_file, rules.as_bytes()),
            (&self.paths.pending_file, mode.as_str().as_bytes()),
        ];

        for (i, (path, content)) in steps.iter().enumerate() {
            if let Err(e) = write_atomic(path, content, 0o644) {
                warn!("Handoff install failed at {:?}: {}; rolling back", path, e);
                for (written, _) in &steps[..i] {
                    if let Err(re) = remove_if_exists(written) {
                        warn!("Rollback of {:?} failed: {}", written, re);
                    }
                }
                return Err(e);
            }
        }

        info!("Handoff installed for mode {}", mode);
        Ok(())
    }

    /// Write only the pending record, without block artifacts
    pub fn write_pending(&self, mode: GpuMode) -> Result<()> {
        write_atomic(&self.paths.pending_file, mode.as_str().as_bytes(), 0o644)
    }

    /// Remove both block artifacts; Ok(true) if anything was removed
    pub fn remove_artifacts(&self) -> Result<bool> {
        let blacklist = remove_if_exists(&self.paths.blacklist_file);
        let rule = remove_if_exists(&self.paths.rule_file);
        Ok(blacklist? | rule?)
    }

    /// Remove the pending record; Ok(true) if it existed
    pub fn remove_pending(&self) -> Result<bool> {
        remove_if_exists(&self.paths.pending_file)
    }

    /// Remove all three files. Idempotent: absent files count as success
    pub fn clean(&self) -> Result<bool> {
        let artifacts = self.remove_artifacts();
        let pending = self.remove_pending();
        let removed = artifacts? | pending?;
        debug!("Handoff clean, removed anything: {}", removed);
        Ok(removed)
    }

    pub fn write_recovery_marker(&self, marker: &RecoveryMarker) -> Result<()> {
        let path = &self.paths.recovery_marker;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(path, marker.to_line().as_bytes(), 0o644)?;
        info!("Recovery marker written: {}", marker.reason);
        Ok(())
    }

    pub fn read_recovery_marker(&self) -> Result<Option<RecoveryMarker>> {
        let path = &self.paths.recovery_marker;
        match fs::read_to_string(path) {
            Ok(content) => Ok(RecoveryMarker::parse(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MuxguardError::FileRead {
                path: path.clone(),
                source: e,
            }),
        }
    }
}

/// Write `content` to `path` through a sibling temp file and a rename
///
/// Refuses to replace a symlink.
pub fn write_atomic(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    if path
        .symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
    {
        return Err(MuxguardError::invalid_path(path, "refusing to replace a symlink"));
    }

    let temp_path = temp_sibling(path);
    let write = || -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        MuxguardError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".muxguard-tmp");
    path.with_file_name(name)
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {:?}", path);
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(MuxguardError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
