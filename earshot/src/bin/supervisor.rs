// SPDX-License-Identifier: GPL-3.0-or-later

//! The supervisor executable.
//!
//! The preload agent substitutes this program for every intercepted exec
//! call. It reports the execution to the collector and runs the real
//! program in its place; its exit code mirrors the real program.

use earshot::intercept::supervisor;
use std::process::ExitCode;

fn main() -> ExitCode {
    let arguments = match supervisor::Arguments::parse(std::env::args().skip(1)) {
        Ok(arguments) => arguments,
        Err(error) => {
            eprintln!("earshot-supervisor: {error}");
            return ExitCode::FAILURE;
        }
    };

    if arguments.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    log::debug!("{arguments:?}");

    match supervisor::run(arguments) {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            log::error!("earshot-supervisor: {error:#}");
            eprintln!("earshot-supervisor: {error:#}");
            ExitCode::FAILURE
        }
    }
}
