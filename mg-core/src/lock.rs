//! Mode-change lock shared between processes
//!
//! Every `muxguard` invocation builds its own planner, so the in-process
//! mutex alone does not serialize two commands run side by side. An
//! exclusive `flock` on one well-known file does. The lock belongs to the
//! open file description and is released when [`FileLock`] drops, including
//! when the process dies.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::MuxguardError;

/// Held exclusive lock on a lock file
#[derive(Debug)]
pub struct FileLock {
    _file: File,
}

impl FileLock {
    /// Block until the lock on `path` is held
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        flock(&file, libc::LOCK_EX).map_err(|e| lock_error(path, e))?;
        debug!("Holding {}", path.display());
        Ok(Self { _file: file })
    }

    /// Take the lock if it is free; `None` while another holder has it
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match flock(&file, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => {
                debug!("Holding {}", path.display());
                Ok(Some(Self { _file: file }))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(lock_error(path, e)),
        }
    }
}

/// Open (creating if needed) without following symlinks
///
/// `flock` works on read-only descriptors, so a lock file created by another
/// user is still usable when it cannot be opened for writing.
fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            debug!("Cannot create {}: {}", parent.display(), e);
        }
    }

    let flags = libc::O_NOFOLLOW | libc::O_CLOEXEC;
    match OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(0o666)
        .custom_flags(flags)
        .open(path)
    {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => OpenOptions::new()
            .read(true)
            .custom_flags(flags)
            .open(path)
            .map_err(|e| MuxguardError::FileRead {
                path: path.to_path_buf(),
                source: e,
            }),
        Err(e) => Err(MuxguardError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    loop {
        // SAFETY: the descriptor is owned by `file` and stays open for the call
        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn lock_error(path: &Path, source: io::Error) -> MuxguardError {
    MuxguardError::FileWrite {
        path: path.to_path_buf(),
        source,
    }
}
