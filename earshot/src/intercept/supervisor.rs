// SPDX-License-Identifier: GPL-3.0-or-later

//! The supervisor: the small executable substituted for the real program.
//!
//! Its command line is machine generated (by the preload agent or by the
//! tests), so the flag protocol is fixed:
//!
//! ```text
//! earshot-supervisor --destination <addr> [--verbose]
//!                    (--execute <path> | --file <name> [--search-path <list>])
//!                    -- <argv0> [<argv1> ...]
//! ```
//!
//! The supervisor connects to the collector, asks for the environment
//! overlay that continues the interception in children, runs the real
//! program with the merged environment, and reports the `started`,
//! `signalled` and `stopped` events around it. Reporting failures never
//! fail the supervised execution.

use super::supervise::{exit_code, supervise, ProcessEvent, SUPERVISED_SIGNALS};
use super::wire::ReporterOnTcp;
use super::{report, Event, Reporter};
use crate::environment;
use nix::unistd::AccessFlags;
use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// The parsed command line of the supervisor.
#[derive(Debug, PartialEq)]
pub struct Arguments {
    pub destination: String,
    pub verbose: bool,
    pub program: Program,
    /// The original argv of the intercepted call, including argv[0].
    pub arguments: Vec<String>,
}

/// How the program to execute was named by the caller.
#[derive(Debug, PartialEq)]
pub enum Program {
    /// An already resolved path (`--execute` or `--path`).
    Path(PathBuf),
    /// A bare name whose path search is deferred to the supervisor
    /// (`--file`, optionally with `--search-path`).
    File {
        name: String,
        search_path: Option<String>,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum UsageError {
    #[error("Missing value for flag: {0}")]
    MissingValue(String),
    #[error("Unknown flag: {0}")]
    UnknownFlag(String),
    #[error("Missing flag: --destination")]
    MissingDestination,
    #[error("Either --execute or --file has to be given")]
    MissingProgram,
    #[error("The command after the -- separator cannot be empty")]
    MissingCommand,
}

impl Arguments {
    /// Parses the supervisor command line (without the executable name).
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, UsageError> {
        let mut destination = None;
        let mut verbose = false;
        let mut path = None;
        let mut file = None;
        let mut search_path = None;
        let mut command = Vec::new();

        let mut it = args.into_iter();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--destination" => {
                    destination = Some(it.next().ok_or(UsageError::MissingValue(arg))?);
                }
                "--verbose" => {
                    verbose = true;
                }
                "--execute" | "--path" => {
                    path = Some(it.next().ok_or(UsageError::MissingValue(arg))?);
                }
                "--file" => {
                    file = Some(it.next().ok_or(UsageError::MissingValue(arg))?);
                }
                "--search-path" => {
                    search_path = Some(it.next().ok_or(UsageError::MissingValue(arg))?);
                }
                "--" => {
                    command = it.collect();
                    break;
                }
                _ => return Err(UsageError::UnknownFlag(arg)),
            }
        }

        let program = match (path, file) {
            (Some(path), _) => Program::Path(PathBuf::from(path)),
            (None, Some(name)) => Program::File { name, search_path },
            (None, None) => return Err(UsageError::MissingProgram),
        };
        if command.is_empty() {
            return Err(UsageError::MissingCommand);
        }

        Ok(Arguments {
            destination: destination.ok_or(UsageError::MissingDestination)?,
            verbose,
            program,
            arguments: command,
        })
    }
}

/// Runs the supervised program and returns its exit code.
pub fn run(arguments: Arguments) -> anyhow::Result<u8> {
    let reporter = Arc::new(ReporterOnTcp::new(arguments.destination.clone()));

    // The environment overlay continues the interception in grandchildren.
    // The collector not answering must not break the build.
    let current: HashMap<String, String> = std::env::vars().collect();
    let environment = match reporter.environment_update(&current) {
        Ok(overlay) => environment::apply(current, overlay),
        Err(error) => {
            log::warn!("Failed to receive the environment update: {error}");
            std::env::vars().collect()
        }
    };

    let program = match &arguments.program {
        Program::Path(path) => path.clone(),
        Program::File { name, search_path } => {
            resolve(name, search_path.as_deref(), &environment)?
        }
    };
    let working_dir = std::env::current_dir()?;

    let execution = report::Command {
        program: program.clone(),
        arguments: arguments.arguments.clone(),
        working_dir: working_dir.clone(),
        environment: environment.clone(),
    };

    let mut command = std::process::Command::new(&program);
    command
        .arg0(&arguments.arguments[0])
        .args(&arguments.arguments[1..])
        .env_clear()
        .envs(&environment)
        .current_dir(&working_dir);

    let observer = {
        let reporter = Arc::clone(&reporter);
        Arc::new(move |event: ProcessEvent| {
            let result = match event {
                ProcessEvent::Spawned { pid } => {
                    reporter.report(Event::started(pid, std::process::id(), execution.clone()))
                }
                ProcessEvent::Signalled { signal } => reporter.report(Event::signalled(signal)),
            };
            if let Err(error) = result {
                log::warn!("Failed to report the execution: {error}");
            }
        })
    };

    let status = supervise(&mut command, SUPERVISED_SIGNALS, observer)?;
    let code = exit_code(status);

    if let Err(error) = reporter.report(Event::stopped(i64::from(code))) {
        log::warn!("Failed to report the execution: {error}");
    }

    Ok(code)
}

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("Executable not found: {0}")]
    NotFound(String),
    #[error("Executable is not permitted to run: {0}")]
    NotExecutable(String),
}

/// Finds the executable for a deferred path search.
///
/// The search list is the explicit `--search-path` value when given, the
/// `PATH` of the environment otherwise, with the `confstr(_CS_PATH)` value
/// as the final fallback. A name containing a directory separator is
/// treated as a path.
pub fn resolve(
    file: &str,
    search_path: Option<&str>,
    environment: &HashMap<String, String>,
) -> Result<PathBuf, ResolveError> {
    if file.contains('/') {
        return from_current_directory(Path::new(file));
    }

    let fallback;
    let search = match search_path {
        Some(list) => list,
        None => match environment.get(environment::KEY_OS_PATH) {
            Some(list) => list.as_str(),
            None => {
                fallback = crate::context::default_search_path()
                    .ok_or_else(|| ResolveError::NotFound(file.to_string()))?;
                fallback.as_str()
            }
        },
    };

    let mut inaccessible = false;
    for entry in search.split(':') {
        // ignore empty entries
        if entry.is_empty() {
            continue;
        }
        let candidate = Path::new(entry).join(file);
        match from_current_directory(&candidate) {
            Ok(found) => return Ok(found),
            Err(ResolveError::NotExecutable(_)) => inaccessible = true,
            Err(ResolveError::NotFound(_)) => continue,
        }
    }
    if inaccessible {
        Err(ResolveError::NotExecutable(file.to_string()))
    } else {
        Err(ResolveError::NotFound(file.to_string()))
    }
}

fn from_current_directory(path: &Path) -> Result<PathBuf, ResolveError> {
    let real = path
        .canonicalize()
        .map_err(|_| ResolveError::NotFound(path.to_string_lossy().to_string()))?;
    if nix::unistd::access(&real, AccessFlags::X_OK).is_ok() {
        Ok(real)
    } else if nix::unistd::access(&real, AccessFlags::F_OK).is_ok() {
        Err(ResolveError::NotExecutable(
            path.to_string_lossy().to_string(),
        ))
    } else {
        Err(ResolveError::NotFound(path.to_string_lossy().to_string()))
    }
}
