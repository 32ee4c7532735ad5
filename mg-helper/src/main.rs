//! muxguard privileged helper (muxguard-helper)
//!
//! The only process that writes the boot-time handoff under /etc. Invoked by
//! the CLI through pkexec with positional arguments:
//!
//! ```text
//! muxguard-helper write <blacklist-src> <rule-src> [mode]
//! muxguard-helper clean
//! ```
//!
//! # Hardening Measures
//! - Environment sanitization (clear dangerous env vars)
//! - Fixed umask, working directory set to /
//! - Root check before touching anything
//! - Source files must be regular files under a size cap whose every line
//!   matches a shape muxguard itself renders

mod commands;

use std::path::Path;

use anyhow::{bail, Context};
use mg_core::constants::paths;
use mg_core::logging::init_system_logging;
use mg_core::{load_settings_or_default, HandoffStore};
use tracing::{debug, error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sanitize the process environment by removing dangerous variables
fn sanitize_environment() {
    const DANGEROUS_VARS: &[&str] = &[
        "LD_PRELOAD",
        "LD_LIBRARY_PATH",
        "LD_AUDIT",
        "LD_DEBUG",
        "LD_PROFILE",
        "MALLOC_CHECK_",
        "TMPDIR",
        "IFS",
        "PATH",
    ];

    for var in DANGEROUS_VARS {
        std::env::remove_var(var);
    }

    std::env::set_var("PATH", "/usr/sbin:/usr/bin:/sbin:/bin");
    std::env::set_var("LC_ALL", "C");
    std::env::set_var("LANG", "C");
}

/// Handoff files must stay world-readable so `muxguard status` can see them
fn set_umask() {
    // SAFETY: umask only sets the file creation mask of this process
    unsafe { libc::umask(0o022) };
}

fn secure_working_directory() {
    if std::env::set_current_dir("/").is_err() {
        warn!("Could not chdir to /");
    }
}

fn verify_privileges() -> Result<(), &'static str> {
    // SAFETY: geteuid and getuid just return the process's user IDs
    let euid = unsafe { libc::geteuid() };
    let uid = unsafe { libc::getuid() };

    if euid != 0 {
        return Err("muxguard-helper must run as root");
    }
    if uid != 0 {
        warn!("Running as setuid root - this is not recommended");
    }
    debug!("Running as root (uid={}, euid={})", uid, euid);
    Ok(())
}

fn print_help() {
    println!("muxguard-helper {}", VERSION);
    println!();
    println!("USAGE:");
    println!("    muxguard-helper write <blacklist-src> <rule-src> [mode]");
    println!("    muxguard-helper clean");
    println!();
    println!("Installs or removes the muxguard boot handoff. Must run as root.");
}

fn run(args: &[String]) -> anyhow::Result<()> {
    let settings = load_settings_or_default(Path::new(paths::CONFIG_FILE));
    init_system_logging(&settings.logging.level);
    let store = HandoffStore::new(settings.handoff.clone());

    match args.first().map(String::as_str) {
        Some("write") => {
            let (blacklist, rule, mode) = match &args[1..] {
                [b, r] => (b, r, "eco"),
                [b, r, m] => (b, r, m.as_str()),
                _ => bail!("write takes <blacklist-src> <rule-src> [mode]"),
            };
            verify_privileges().map_err(anyhow::Error::msg)?;
            commands::write(&store, Path::new(blacklist), Path::new(rule), mode)
                .context("write failed")?;
        }
        Some("clean") if args.len() == 1 => {
            verify_privileges().map_err(anyhow::Error::msg)?;
            commands::clean(&store, mg_core::hw::reload_udev_rules).context("clean failed")?;
        }
        _ => {
            print_help();
            bail!("unrecognised arguments: {:?}", args);
        }
    }
    Ok(())
}

fn main() {
    sanitize_environment();
    set_umask();
    secure_working_directory();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("-h") | Some("--help") => {
            print_help();
            return;
        }
        Some("-v") | Some("--version") => {
            println!("muxguard-helper {}", VERSION);
            return;
        }
        _ => {}
    }

    match run(&args) {
        Ok(()) => info!("Done"),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("muxguard-helper: {:#}", e);
            std::process::exit(1);
        }
    }
}
