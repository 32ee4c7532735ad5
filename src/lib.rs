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

//! muxguard - safe dGPU and display MUX switching for Linux laptops
//!
//! The command-line front end. Hardware logic lives in `mg-core`; this crate
//! parses commands and handles the session side of the boot handoff.

pub mod cli;
pub mod session;
