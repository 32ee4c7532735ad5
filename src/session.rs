/*
 * This file is part of muxguard.
 *
 * Copyright (C) 2025 muxguard contributors
 *
 * muxguard is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * muxguard is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with muxguard. If not, see <https://www.gnu.org/licenses/>.
 */

//! Session-side handling of the boot handoff
//!
//! The boot controller leaves a pending record in place when it could not
//! apply Eco safely. This module is the fallback that picks it up once the
//! session is running, and the once-only reader for recovery notices.

use mg_core::{
    BlockArtifactManager, HandoffStore, MuxguardError, PendingMode, RecoveryMarker,
    TransitionOutcome, TransitionPlanner, UserState,
};
use serde::Serialize;
use tracing::{info, warn};

/// Pending record as `status` shows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSummary {
    pub mode: String,
    /// When the record was written, RFC 3339
    pub since: Option<String>,
}

/// Summarize the pending record; a record that cannot be read is still reported
pub fn pending_summary(handoff: &HandoffStore) -> Option<PendingSummary> {
    match handoff.read_pending() {
        Ok(Some(pending)) => Some(PendingSummary {
            mode: pending.mode.to_string(),
            since: pending.created_at.map(|t| t.to_rfc3339()),
        }),
        Ok(None) => None,
        Err(e) => {
            warn!("Cannot read pending record: {}", e);
            Some(PendingSummary {
                mode: "unreadable record".to_string(),
                since: None,
            })
        }
    }
}

/// What `apply-pending` did with the record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingResolution {
    /// No record on disk
    Nothing,
    /// Mode applied (or already in place) and the handoff cleared
    Applied(TransitionOutcome),
    /// Record left for a later attempt
    Kept(String),
    /// Record could never succeed and was cleared
    Discarded(String),
}

/// Apply a record the boot controller deferred, then clear the handoff
pub fn apply_pending(
    planner: &TransitionPlanner,
    artifacts: &BlockArtifactManager,
) -> mg_core::Result<PendingResolution> {
    let Some(pending) = artifacts.pending()? else {
        return Ok(PendingResolution::Nothing);
    };

    let mode = match pending.mode {
        PendingMode::Mode(mode) => mode,
        other => {
            warn!("Discarding pending record: {}", other);
            artifacts.clean()?;
            return Ok(PendingResolution::Discarded(format!("unusable record ({})", other)));
        }
    };

    match planner.request(mode) {
        Ok(outcome) => {
            if artifacts.is_staged() {
                artifacts.clean()?;
            }
            info!("Pending {} resolved: {:?}", mode, outcome);
            Ok(PendingResolution::Applied(outcome))
        }
        Err(MuxguardError::DriverActive { modules }) => Ok(PendingResolution::Kept(format!(
            "dGPU driver still attached ({})",
            modules.join(", ")
        ))),
        Err(e @ (MuxguardError::Unsupported(_) | MuxguardError::SafetyViolation(_))) => {
            warn!("Pending {} can never apply here: {}", mode, e);
            artifacts.clean()?;
            Ok(PendingResolution::Discarded(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Return the recovery marker if this user has not seen it yet, and mark it seen
pub fn take_unseen_recovery(marker: Option<RecoveryMarker>, state: &mut UserState) -> Option<RecoveryMarker> {
    let marker = marker?;
    if state.last_seen_recovery.as_deref() == Some(marker.timestamp.as_str()) {
        return None;
    }
    state.last_seen_recovery = Some(marker.timestamp.clone());
    Some(marker)
}

/// One-line advice for errors a user can act on
pub fn error_hint(err: &MuxguardError) -> Option<&'static str> {
    match err {
        MuxguardError::DriverActive { .. } => Some(
            "close programs using the dGPU, or run `muxguard schedule eco` to switch at next boot",
        ),
        MuxguardError::SafetyViolation(_) => {
            Some("switch to hybrid first (`muxguard set standard`) and reboot")
        }
        MuxguardError::Unsupported(_) => Some("this machine does not expose that control"),
        MuxguardError::WriteRejected { .. } => Some("live changes need root; try again with sudo"),
        MuxguardError::PrivilegeEscalation(_) => Some("authorization was refused or the helper is missing"),
        _ => None,
    }
}

pub fn describe_outcome(outcome: TransitionOutcome) -> &'static str {
    match outcome {
        TransitionOutcome::Unchanged => "already active, nothing changed",
        TransitionOutcome::Applied => "applied",
        TransitionOutcome::RebootRequired => "staged, reboot to finish",
    }
}
