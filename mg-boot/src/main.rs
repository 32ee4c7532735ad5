//! muxguard boot safety controller (muxguard-boot)
//!
//! Runs once per boot, before the display manager, as a oneshot unit. It
//! repairs impossible GPU states, applies a pending mode and clears the
//! handoff. It must never hold up the boot: every failure is logged and the
//! process always exits 0.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use mg_core::constants::paths;
use mg_core::logging::init_system_logging;
use mg_core::{load_settings_or_default, SystemContext};
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn run() {
    let settings = load_settings_or_default(Path::new(paths::CONFIG_FILE));
    let sink = init_system_logging(&settings.logging.level);
    info!("muxguard-boot {} starting, logging to {:?}", VERSION, sink);

    let ctx = SystemContext::detect(settings);
    let report = ctx.boot_controller().run();

    if let Some(reason) = &report.plan.recovery {
        warn!("Recovered: {}", reason);
    }
    if report.plan.keep_handoff() {
        info!("Pending mode left for the session");
    }
    for failure in &report.failures {
        warn!("Step failed: {}", failure);
    }
    info!(
        "muxguard-boot finished: {} actions, {} failures",
        report.plan.actions.len(),
        report.failures.len()
    );
}

fn main() {
    panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        eprintln!("muxguard-boot: panic at {}: {}", location, panic_info);
    }));

    if panic::catch_unwind(AssertUnwindSafe(run)).is_err() {
        error!("muxguard-boot aborted by a panic; boot continues");
    }
    std::process::exit(0);
}
