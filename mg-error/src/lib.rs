//! Unified error handling for muxguard
//!
//! This crate provides a single error type used across all muxguard components.
//! The transition taxonomy (`Unsupported`, `SafetyViolation`, `DriverActive`,
//! `WriteRejected`) lives here next to the plumbing errors so callers can match
//! on one enum.

use std::io;
use std::path::PathBuf;

/// Result type alias using MuxguardError
pub type Result<T> = std::result::Result<T, MuxguardError>;

/// Unified error type for all muxguard operations
#[derive(thiserror::Error, Debug)]
pub enum MuxguardError {
    // ============================================================================
    // Filesystem Errors
    // ============================================================================
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Cannot write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("{path} is {size} bytes, limit is {max_size}")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    #[error("Refusing path {path}: {reason}")]
    InvalidPath {
        path: PathBuf,
        reason: String,
    },

    // ============================================================================
    // Mode Transition Errors
    // ============================================================================
    /// The attribute is not exposed on this model
    #[error("Attribute not supported on this machine: {0}")]
    Unsupported(String),

    /// The requested transition would break a routing invariant; nothing was written
    #[error("Safety violation: {0}")]
    SafetyViolation(String),

    /// A dGPU driver is attached, powering the GPU off now is unsafe
    #[error("dGPU driver is active: {modules:?}")]
    DriverActive {
        modules: Vec<String>,
    },

    /// The kernel refused the write, or the readback did not match
    #[error("Write to {path} rejected: {reason}")]
    WriteRejected {
        path: PathBuf,
        reason: String,
    },

    #[error("Invalid GPU mode: {0}")]
    InvalidMode(String),

    #[error("Unexpected value {value:?} in {path}")]
    InvalidValue {
        path: PathBuf,
        value: String,
    },

    #[error("Operation cancelled before it started")]
    Cancelled,

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Bad configuration: {0}")]
    Config(String),

    #[error("Malformed JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Privileged Helper Errors
    // ============================================================================
    #[error("Privileged helper failed: {0}")]
    PrivilegeEscalation(String),

    #[error("Rejected artifact content in {path}: {reason}")]
    InvalidArtifact {
        path: PathBuf,
        reason: String,
    },

    // ============================================================================
    // Everything Else
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl MuxguardError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Path refused before any I/O
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a write rejection for `path`
    pub fn write_rejected(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::WriteRejected {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a safety violation error
    pub fn safety(msg: impl Into<String>) -> Self {
        Self::SafetyViolation(msg.into())
    }

    /// True for the errors that mean "feature absent" rather than failure
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}
