// SPDX-License-Identifier: GPL-3.0-or-later

//! Represent the modes the application can run in.
//!
//! To the user the modes are:
//! - intercept only: run the build and write the execution report.
//! - citnames only: read the execution report and write the compilation
//!   database.
//! - combined: both of the above, back to back.

use crate::intercept::collector::{CollectorService, EventCollector};
use crate::intercept::report::{Context, Report};
use crate::intercept::supervise::{exit_code, supervise, FORWARDED_SIGNALS};
use crate::intercept::wire::CollectorOnTcp;
use crate::intercept::SessionConfig;
use crate::output::filter::ContentFilter;
use crate::output::DatabaseWriter;
use crate::semantic::tools::ToolChain;
use crate::{args, config, context, environment};
use anyhow::Context as AnyhowContext;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;

pub enum Mode {
    Intercept(InterceptMode),
    Citnames(CitnamesMode),
    Combined(InterceptMode, CitnamesMode),
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("The build command cannot be empty")]
    EmptyBuildCommand,
}

impl Mode {
    /// Checks the command line arguments against the configuration and
    /// creates the mode instance the application will run.
    pub fn configure(
        arguments: args::Arguments,
        config: config::Main,
    ) -> Result<Self, ConfigurationError> {
        match arguments.mode {
            args::Mode::Intercept { input, output } => {
                log::debug!("Mode: intercept the build and write the execution report");
                let intercept =
                    InterceptMode::new(input, output, &config, arguments.verbose)?;
                Ok(Mode::Intercept(intercept))
            }
            args::Mode::Citnames { input, output } => {
                log::debug!("Mode: read the execution report and write the compilation database");
                let citnames = CitnamesMode::new(input, output, config);
                Ok(Mode::Citnames(citnames))
            }
            args::Mode::Combined {
                input,
                report,
                output,
            } => {
                log::debug!("Mode: intercept the build and write the compilation database");
                let intercept =
                    InterceptMode::new(input, report.clone(), &config, arguments.verbose)?;
                let citnames = CitnamesMode::new(report, output, config);
                Ok(Mode::Combined(intercept, citnames))
            }
        }
    }

    /// Runs the application mode.
    ///
    /// The exit code of the intercepting modes is the exit code of the
    /// build command; run-time failures are logged and reported as a
    /// plain failure.
    pub fn run(self) -> ExitCode {
        let result = match self {
            Mode::Intercept(intercept) => intercept.run(),
            Mode::Citnames(citnames) => citnames.run(),
            Mode::Combined(intercept, citnames) => intercept.run().and_then(|build_exit| {
                let _ = citnames.run()?;
                Ok(build_exit)
            }),
        };
        result.unwrap_or_else(|error| {
            log::error!("earshot: {error:#}");
            eprintln!("earshot: {error:#}");
            ExitCode::FAILURE
        })
    }
}

/// Runs the build command under interception and writes the report.
pub struct InterceptMode {
    command: Vec<String>,
    report_path: PathBuf,
    library: PathBuf,
    reporter: PathBuf,
    verbose: bool,
}

impl InterceptMode {
    fn new(
        input: args::BuildCommand,
        output: String,
        config: &config::Main,
        verbose: bool,
    ) -> Result<Self, ConfigurationError> {
        if input.arguments.is_empty() {
            return Err(ConfigurationError::EmptyBuildCommand);
        }
        Ok(Self {
            command: input.arguments,
            report_path: PathBuf::from(output),
            library: config.intercept.library.clone(),
            reporter: config.intercept.reporter.clone(),
            verbose,
        })
    }

    fn run(&self) -> anyhow::Result<ExitCode> {
        // Bind the collector endpoint first, its address is part of the
        // session configuration.
        let (socket, address) = CollectorOnTcp::new()
            .with_context(|| "Failed to bind the collector endpoint")?;
        let session = SessionConfig {
            library: self.library.clone(),
            reporter: self.reporter.clone(),
            address: address.to_string(),
            verbose: self.verbose,
        };
        log::debug!("Collector listens at {address}");

        let context = Context {
            intercept: context::SESSION_TYPE_PRELOAD.to_string(),
            host_info: context::host_info(),
        };
        let collector = Arc::new(EventCollector::new(
            session.clone(),
            context,
            &self.report_path,
        ));
        // The report is opened with its context before any execution lands.
        collector
            .flush()
            .with_context(|| format!("Failed to write the report: {:?}", self.report_path))?;
        let mut service = CollectorService::start(socket, Arc::clone(&collector));

        let current: HashMap<String, String> = std::env::vars().collect();
        let overlay = environment::update(&session, &current);
        let environment = environment::apply(current, overlay);

        let mut command = std::process::Command::new(&self.command[0]);
        command
            .args(&self.command[1..])
            .env_clear()
            .envs(&environment);

        log::debug!("Running the build command: {:?}", self.command);
        let status = supervise(&mut command, FORWARDED_SIGNALS, Arc::new(|_| ()))
            .with_context(|| format!("Failed to run the build command: {:?}", self.command))?;
        log::debug!("Build command finished: {status:?}");

        service
            .shutdown()
            .with_context(|| "Failed to flush the execution report")?;

        Ok(ExitCode::from(exit_code(status)))
    }
}

/// Reads the report and writes the compilation database.
pub struct CitnamesMode {
    input: PathBuf,
    output: PathBuf,
    append: bool,
    config: config::Main,
}

impl CitnamesMode {
    fn new(input: String, output: args::BuildSemantic, config: config::Main) -> Self {
        Self {
            input: PathBuf::from(input),
            output: PathBuf::from(output.file_name),
            append: output.append,
            config,
        }
    }

    fn run(&self) -> anyhow::Result<ExitCode> {
        let report = Report::read_from(&self.input)
            .with_context(|| format!("Failed to read the report: {:?}", self.input))?;
        log::debug!("Report loaded with {} executions", report.executions.len());

        let tools = ToolChain::from(&self.config);
        let filter = ContentFilter::from(&self.config.sources);

        let mut entries = Vec::new();
        for execution in &report.executions {
            match tools.recognize(&execution.command) {
                Ok(recognized) => {
                    entries.extend(recognized.into_iter().filter(|entry| filter.accept(entry)))
                }
                Err(error) => log::debug!("Execution dropped: {error}"),
            }
        }
        log::debug!("Compilation database has {} entries", entries.len());

        DatabaseWriter::new(&self.output, self.append, self.config.format.clone())
            .write(entries)
            .with_context(|| format!("Failed to write the database: {:?}", self.output))?;

        Ok(ExitCode::SUCCESS)
    }
}
