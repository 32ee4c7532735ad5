//! Core data types for muxguard

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::hw::MuxMode;
use crate::MuxguardError;

/// GPU power/routing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuMode {
    /// Hybrid routing, dGPU powered
    Standard,
    /// Hybrid routing, dGPU powered off
    Eco,
    /// Same hardware state as Standard
    Optimized,
    /// MUX routes the panel directly to the dGPU
    Ultimate,
}

impl GpuMode {
    pub const ALL: [GpuMode; 4] = [GpuMode::Standard, GpuMode::Eco, GpuMode::Optimized, GpuMode::Ultimate];

    pub fn as_str(self) -> &'static str {
        match self {
            GpuMode::Standard => "standard",
            GpuMode::Eco => "eco",
            GpuMode::Optimized => "optimized",
            GpuMode::Ultimate => "ultimate",
        }
    }

    /// Whether this mode wants the dGPU powered off
    pub fn dgpu_disabled(self) -> bool {
        self == GpuMode::Eco
    }

    /// MUX routing this mode wants
    pub fn mux_mode(self) -> MuxMode {
        match self {
            GpuMode::Ultimate => MuxMode::DgpuDirect,
            GpuMode::Standard | GpuMode::Eco | GpuMode::Optimized => MuxMode::Hybrid,
        }
    }
}

impl fmt::Display for GpuMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GpuMode {
    type Err = MuxguardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(GpuMode::Standard),
            "eco" => Ok(GpuMode::Eco),
            "optimized" => Ok(GpuMode::Optimized),
            "ultimate" => Ok(GpuMode::Ultimate),
            other => Err(MuxguardError::InvalidMode(other.to_string())),
        }
    }
}

/// Normalized content of the pending-transition file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMode {
    /// File present but blank
    Empty,
    Mode(GpuMode),
    /// Token we do not recognise, kept for logging
    Unknown(String),
}

impl PendingMode {
    /// Legacy token: releases that only knew Eco wrote "1"
    pub const LEGACY_ECO_TOKEN: &'static str = "1";

    pub fn parse(raw: &str) -> Self {
        let token = raw.trim();
        if token.is_empty() {
            return PendingMode::Empty;
        }
        if token == Self::LEGACY_ECO_TOKEN {
            return PendingMode::Mode(GpuMode::Eco);
        }
        match token.parse::<GpuMode>() {
            Ok(mode) => PendingMode::Mode(mode),
            Err(_) => PendingMode::Unknown(token.to_string()),
        }
    }

    pub fn mode(&self) -> Option<GpuMode> {
        match self {
            PendingMode::Mode(m) => Some(*m),
            _ => None,
        }
    }

    pub fn is_eco(&self) -> bool {
        self.mode() == Some(GpuMode::Eco)
    }
}

impl fmt::Display for PendingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingMode::Empty => f.write_str("<empty>"),
            PendingMode::Mode(m) => write!(f, "{}", m),
            PendingMode::Unknown(t) => write!(f, "unknown token {:?}", t),
        }
    }
}

/// The handoff record: a mode owed at next boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransition {
    pub mode: PendingMode,
    /// Modification time of the record, when the filesystem reports one
    pub created_at: Option<DateTime<Utc>>,
}

/// Note left by the boot controller after it repaired an impossible state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMarker {
    /// ISO-8601 timestamp
    pub timestamp: String,
    pub reason: String,
}

impl RecoveryMarker {
    pub fn now(reason: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            reason: reason.into(),
        }
    }

    /// Single line: timestamp, one space, free-text reason
    pub fn to_line(&self) -> String {
        format!("{} {}\n", self.timestamp, self.reason.replace('\n', " "))
    }

    pub fn parse(content: &str) -> Option<Self> {
        let line = content.lines().next()?.trim();
        if line.is_empty() {
            return None;
        }
        let (timestamp, reason) = line.split_once(' ').unwrap_or((line, ""));
        Some(Self {
            timestamp: timestamp.to_string(),
            reason: reason.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_is_case_insensitive() {
        assert_eq!("Ultimate".parse::<GpuMode>().unwrap(), GpuMode::Ultimate);
        assert_eq!(" eco\n".parse::<GpuMode>().unwrap(), GpuMode::Eco);
        assert!(matches!("turbo".parse::<GpuMode>(), Err(MuxguardError::InvalidMode(_))));
    }

    #[test]
    fn test_mode_targets() {
        assert!(GpuMode::Eco.dgpu_disabled());
        assert!(!GpuMode::Ultimate.dgpu_disabled());
        assert_eq!(GpuMode::Ultimate.mux_mode(), MuxMode::DgpuDirect);
        assert_eq!(GpuMode::Optimized.mux_mode(), MuxMode::Hybrid);
    }

    #[test]
    fn test_pending_legacy_token_is_eco() {
        assert_eq!(PendingMode::parse("1\n"), PendingMode::Mode(GpuMode::Eco));
        assert_eq!(PendingMode::parse("1"), PendingMode::parse("eco"));
    }

    #[test]
    fn test_pending_empty_and_unknown() {
        assert_eq!(PendingMode::parse("  \n"), PendingMode::Empty);
        assert_eq!(PendingMode::parse("turbo"), PendingMode::Unknown("turbo".to_string()));
        assert!(!PendingMode::parse("0").is_eco());
    }

    #[test]
    fn test_recovery_marker_line() {
        let marker = RecoveryMarker {
            timestamp: "2026-10-16T08:00:00Z".to_string(),
            reason: "dGPU was disabled\nwhile MUX routed to it".to_string(),
        };
        let line = marker.to_line();
        assert_eq!(line, "2026-10-16T08:00:00Z dGPU was disabled while MUX routed to it\n");

        let parsed = RecoveryMarker::parse(&line).unwrap();
        assert_eq!(parsed.timestamp, "2026-10-16T08:00:00Z");
        assert_eq!(parsed.reason, "dGPU was disabled while MUX routed to it");
        assert!(RecoveryMarker::parse("").is_none());
    }
}
