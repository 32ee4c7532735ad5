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

use std::process::ExitCode;

use clap::Parser;
use mg_core::logging::init_cli_logging;
use mg_core::{load_settings, MuxguardError, SystemContext};

use muxguard::cli::{run_cli, settings_path, Cli};
use muxguard::session::error_hint;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(&settings_path(&cli)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_cli_logging(&settings.logging.level);

    let ctx = SystemContext::detect(settings);
    match run_cli(&cli, &ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            if let Some(hint) = e.downcast_ref::<MuxguardError>().and_then(error_hint) {
                eprintln!("hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
