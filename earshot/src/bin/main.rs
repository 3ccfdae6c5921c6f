// SPDX-License-Identifier: GPL-3.0-or-later

use earshot::{args, config, modes};
use std::process::ExitCode;

/// Driver function of the application.
fn main() -> anyhow::Result<ExitCode> {
    // Initialize the logging system.
    env_logger::init();
    let pkg_name = env!("CARGO_PKG_NAME");
    let pkg_version = env!("CARGO_PKG_VERSION");
    log::info!("{pkg_name} v{pkg_version}");

    // Parse the command line arguments.
    let matches = args::cli().get_matches();
    let arguments = args::Arguments::try_from(matches)?;
    log::debug!("{arguments:?}");
    // Load the configuration.
    let configuration = config::Loader::load(&arguments.config)?;
    log::debug!("{configuration:?}");

    // Run the application.
    let application = modes::Mode::configure(arguments, configuration)?;
    log::debug!("Configuration complete, running the mode now...");
    Ok(application.run())
}
