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

//! Command Line Interface

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mg_core::constants::{attributes, paths};
use mg_core::{
    get_user_state_path, load_user_state, read_snapshot, save_user_state, GpuMode, HardwareSnapshot,
    PrivilegedHelper, RecoveryMarker, SystemContext, TransitionPlanner, UserState,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::session::{
    apply_pending, describe_outcome, pending_summary, take_unseen_recovery, PendingResolution, PendingSummary,
};

#[derive(Parser)]
#[command(name = "muxguard")]
#[command(version)]
#[command(about = "muxguard - safe dGPU and display MUX switching")]
#[command(long_about = "muxguard - safe dGPU and display MUX switching

Switches between GPU modes on laptops with a switchable dGPU and a display
MUX, refusing combinations that would leave the panel dark.

MODES:
    standard     Hybrid routing, dGPU powered
    optimized    Same hardware state as standard
    eco          Hybrid routing, dGPU powered off
    ultimate     Panel wired to the dGPU (reboot required)

EXAMPLES:
    muxguard status                 Show current GPU state
    sudo muxguard set standard      Power the dGPU on
    sudo muxguard set eco           Power the dGPU off now
    muxguard schedule eco           Power the dGPU off at next boot
    muxguard apply-pending          Apply a mode the boot step deferred
    muxguard recovery               Show what the boot step repaired

ENVIRONMENT VARIABLES:
    MUXGUARD_LOG=debug     Override the log filter

FILES:
    /etc/muxguard/config.json              System settings
    /etc/muxguard/pending_mode             Mode owed at next boot
    /var/lib/muxguard/recovery_marker      Last boot-time repair
    ~/.config/muxguard/state.json          Per-user state")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file to use instead of /etc/muxguard/config.json
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show hardware state, pending mode and recovery notices
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Switch mode now (reboot-bound changes are staged)
    Set {
        #[arg(value_parser = parse_mode)]
        mode: GpuMode,
    },

    /// Stage a mode for the next boot
    Schedule {
        #[arg(value_parser = parse_mode)]
        mode: GpuMode,
    },

    /// Apply a pending mode the boot step left for the session
    ApplyPending,

    /// Show the last boot-time repair, once
    Recovery {
        /// Show it even if already seen
        #[arg(long)]
        all: bool,
    },
}

fn parse_mode(s: &str) -> Result<GpuMode, String> {
    s.parse::<GpuMode>().map_err(|_| {
        let names: Vec<&str> = GpuMode::ALL.iter().map(|m| m.as_str()).collect();
        format!("unknown mode {:?} (expected one of: {})", s, names.join(", "))
    })
}

pub fn run_cli(cli: &Cli, ctx: &SystemContext) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Status { json } => cmd_status(ctx, *json),
        Commands::Set { mode } => cmd_set(ctx, *mode),
        Commands::Schedule { mode } => cmd_schedule(ctx, *mode),
        Commands::ApplyPending => cmd_apply_pending(ctx),
        Commands::Recovery { all } => cmd_recovery(ctx, *all),
    }
}

pub fn settings_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(|| PathBuf::from(paths::CONFIG_FILE))
}

fn helper(ctx: &SystemContext) -> Arc<dyn PrivilegedHelper> {
    Arc::new(ctx.helper())
}

// ============================================================================
// Status Command
// ============================================================================

#[derive(Debug, Serialize)]
struct StatusReport {
    model: Option<String>,
    backend: String,
    snapshot: HardwareSnapshot,
    mini_led_mode: Option<i64>,
    pending: Option<PendingSummary>,
    artifacts_present: bool,
    recovery: Option<RecoveryMarker>,
    last_requested: Option<GpuMode>,
}

fn cmd_status(ctx: &SystemContext, json: bool) -> anyhow::Result<()> {
    let platform = ctx.platform();
    let handoff = ctx.handoff();

    let report = StatusReport {
        model: ctx.model.clone(),
        backend: platform.current_backend().to_string(),
        snapshot: read_snapshot(&platform),
        mini_led_mode: ctx.resolver().read_optional(attributes::MINI_LED_MODE),
        pending: pending_summary(&handoff),
        artifacts_present: handoff.artifacts_present(),
        recovery: handoff.read_recovery_marker().unwrap_or_else(|e| {
            warn!("Cannot read recovery marker: {}", e);
            None
        }),
        last_requested: last_requested_mode(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("muxguard Status");
    println!("===============");
    println!();
    println!("Model:   {}", report.model.as_deref().unwrap_or("unknown"));
    println!("Backend: {}", report.backend);
    println!();

    let snap = &report.snapshot;
    println!("Hardware:");
    if snap.supports_dgpu_disable {
        println!("  dGPU:     {}", if snap.dgpu_disabled { "disabled" } else { "enabled" });
    } else {
        println!("  dGPU:     (no control)");
    }
    if snap.supports_mux {
        println!("  MUX:      {}", snap.mux_mode);
    } else {
        println!("  MUX:      (no control)");
    }
    if let Some(value) = report.mini_led_mode {
        println!("  Mini-LED: {}", value);
    }
    println!();

    match &report.pending {
        Some(PendingSummary { mode, since: Some(since) }) => {
            println!("Pending: {} (since {}, applies at next boot)", mode, since)
        }
        Some(PendingSummary { mode, since: None }) => println!("Pending: {} (applies at next boot)", mode),
        None if report.artifacts_present => println!("Pending: none, but block files are present"),
        None => println!("Pending: none"),
    }
    if let Some(mode) = report.last_requested {
        println!("Last requested: {}", mode);
    }
    if let Some(marker) = &report.recovery {
        println!("Last recovery: {} {}", marker.timestamp, marker.reason);
    }

    Ok(())
}

// ============================================================================
// Mode Commands
// ============================================================================

fn cmd_set(ctx: &SystemContext, mode: GpuMode) -> anyhow::Result<()> {
    let planner = ctx.planner(helper(ctx));
    let outcome = planner.request(mode)?;
    remember_mode(mode);
    println!("{}: {}", mode, describe_outcome(outcome));
    Ok(())
}

fn cmd_schedule(ctx: &SystemContext, mode: GpuMode) -> anyhow::Result<()> {
    let planner = ctx.planner(helper(ctx));
    let outcome = planner.schedule(mode)?;
    remember_mode(mode);
    println!("{}: {}", mode, describe_outcome(outcome));
    Ok(())
}

fn cmd_apply_pending(ctx: &SystemContext) -> anyhow::Result<()> {
    let artifacts = Arc::new(ctx.artifact_manager(helper(ctx)));
    let planner = TransitionPlanner::new(Arc::new(ctx.platform()), artifacts.clone())
        .with_lock_file(&ctx.settings.system.planner_lock);

    match apply_pending(&planner, &artifacts)? {
        PendingResolution::Nothing => println!("No pending mode"),
        PendingResolution::Applied(outcome) => println!("Pending mode {}", describe_outcome(outcome)),
        PendingResolution::Kept(reason) => println!("Pending mode kept: {}", reason),
        PendingResolution::Discarded(reason) => println!("Pending mode discarded: {}", reason),
    }
    Ok(())
}

// ============================================================================
// Recovery Command
// ============================================================================

fn cmd_recovery(ctx: &SystemContext, all: bool) -> anyhow::Result<()> {
    let marker = ctx.handoff().read_recovery_marker()?;

    let shown = if all {
        marker
    } else {
        let path = get_user_state_path()?;
        let mut state = load_user_state(&path).unwrap_or_else(|e| {
            warn!("Ignoring unreadable user state: {}", e);
            UserState::default()
        });
        let unseen = take_unseen_recovery(marker, &mut state);
        if unseen.is_some() {
            save_user_state(&path, &state).context("could not record recovery notice as seen")?;
        }
        unseen
    };

    match shown {
        Some(marker) => {
            println!("The boot step repaired an unsafe GPU state at {}:", marker.timestamp);
            println!("  {}", marker.reason);
        }
        None => println!("No new recovery notices"),
    }
    Ok(())
}

fn last_requested_mode() -> Option<GpuMode> {
    let path = get_user_state_path().ok()?;
    match load_user_state(&path) {
        Ok(state) => state.last_requested_mode,
        Err(e) => {
            debug!("Could not load user state: {}", e);
            None
        }
    }
}

/// Record the last requested mode; failures only cost the hint
fn remember_mode(mode: GpuMode) {
    let result = get_user_state_path().and_then(|path| {
        let mut state = load_user_state(&path).unwrap_or_default();
        state.last_requested_mode = Some(mode);
        save_user_state(&path, &state)
    });
    if let Err(e) = result {
        debug!("Could not save user state: {}", e);
    }
}
