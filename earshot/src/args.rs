// SPDX-License-Identifier: GPL-3.0-or-later

//! This module contains the command line interface of the application.
//!
//! The command line parsing is implemented using the `clap` library. The
//! module defines types to represent a structured form of the program
//! invocation.

use anyhow::anyhow;
use clap::{arg, command, ArgAction, ArgMatches, Command};

const MODE_INTERCEPT_SUBCOMMAND: &str = "intercept";
const MODE_CITNAMES_SUBCOMMAND: &str = "citnames";
const DEFAULT_OUTPUT_FILE: &str = "compile_commands.json";
const DEFAULT_REPORT_FILE: &str = "report.json";

/// Represents the command line arguments of the application.
#[derive(Debug, PartialEq)]
pub struct Arguments {
    pub config: Option<String>,
    pub verbose: bool,
    pub mode: Mode,
}

/// Represents the mode of the application.
#[derive(Debug, PartialEq)]
pub enum Mode {
    /// Run the build command and write the execution report.
    Intercept { input: BuildCommand, output: String },
    /// Read the execution report and write the compilation database.
    Citnames {
        input: String,
        output: BuildSemantic,
    },
    /// Run the build command and write the compilation database.
    Combined {
        input: BuildCommand,
        report: String,
        output: BuildSemantic,
    },
}

/// Represents the execution of a command.
#[derive(Debug, PartialEq)]
pub struct BuildCommand {
    pub arguments: Vec<String>,
}

#[derive(Debug, PartialEq)]
pub struct BuildSemantic {
    pub file_name: String,
    pub append: bool,
}

impl TryFrom<ArgMatches> for Arguments {
    type Error = anyhow::Error;

    fn try_from(matches: ArgMatches) -> Result<Self, Self::Error> {
        let config = matches.get_one::<String>("config").map(String::to_string);
        let verbose = matches.get_count("verbose") > 0;

        match matches.subcommand() {
            Some((MODE_INTERCEPT_SUBCOMMAND, intercept_matches)) => {
                let input = BuildCommand::try_from(intercept_matches)?;
                let output = intercept_matches
                    .get_one::<String>("output")
                    .map(String::to_string)
                    .expect("output is defaulted");

                let mode = Mode::Intercept { input, output };
                Ok(Arguments {
                    config,
                    verbose,
                    mode,
                })
            }
            Some((MODE_CITNAMES_SUBCOMMAND, citnames_matches)) => {
                let input = citnames_matches
                    .get_one::<String>("input")
                    .map(String::to_string)
                    .expect("input is defaulted");
                let output = BuildSemantic::try_from(citnames_matches)?;

                let mode = Mode::Citnames { input, output };
                Ok(Arguments {
                    config,
                    verbose,
                    mode,
                })
            }
            None => {
                let input = BuildCommand::try_from(&matches)?;
                let report = matches
                    .get_one::<String>("report")
                    .map(String::to_string)
                    .expect("report is defaulted");
                let output = BuildSemantic::try_from(&matches)?;

                let mode = Mode::Combined {
                    input,
                    report,
                    output,
                };
                Ok(Arguments {
                    config,
                    verbose,
                    mode,
                })
            }
            _ => Err(anyhow!("unrecognized subcommand")),
        }
    }
}

impl TryFrom<&ArgMatches> for BuildCommand {
    type Error = anyhow::Error;

    fn try_from(matches: &ArgMatches) -> Result<Self, Self::Error> {
        let arguments = matches
            .get_many("COMMAND")
            .expect("missing build command")
            .cloned()
            .collect();
        Ok(BuildCommand { arguments })
    }
}

impl TryFrom<&ArgMatches> for BuildSemantic {
    type Error = anyhow::Error;

    fn try_from(matches: &ArgMatches) -> Result<Self, Self::Error> {
        let file_name = matches
            .get_one::<String>("output")
            .map(String::to_string)
            .expect("output is defaulted");
        let append = *matches.get_one::<bool>("append").unwrap_or(&false);
        Ok(BuildSemantic { file_name, append })
    }
}

/// Represents the command line interface of the application.
///
/// The two phases of the work are available as subcommands; without a
/// subcommand both phases run back to back.
pub fn cli() -> Command {
    command!()
        .subcommand_required(false)
        .subcommand_negates_reqs(true)
        .subcommand_precedence_over_arg(true)
        .arg_required_else_help(true)
        .args(&[
            arg!(-v --verbose ... "Sets the level of verbosity").action(ArgAction::Count),
            arg!(-c --config <FILE> "Path of the config file"),
        ])
        .subcommand(
            Command::new(MODE_INTERCEPT_SUBCOMMAND)
                .about("intercepts the command executions of the build")
                .args(&[
                    arg!(<COMMAND> "Build command")
                        .action(ArgAction::Append)
                        .value_terminator("--")
                        .num_args(1..)
                        .last(true)
                        .required(true),
                    arg!(-o --output <FILE> "Path of the execution report")
                        .default_value(DEFAULT_REPORT_FILE)
                        .hide_default_value(false),
                ])
                .arg_required_else_help(true),
        )
        .subcommand(
            Command::new(MODE_CITNAMES_SUBCOMMAND)
                .about("deduces the semantics of the command executions")
                .args(&[
                    arg!(-i --input <FILE> "Path of the execution report")
                        .default_value(DEFAULT_REPORT_FILE)
                        .hide_default_value(false),
                    arg!(-o --output <FILE> "Path of the result file")
                        .default_value(DEFAULT_OUTPUT_FILE)
                        .hide_default_value(false),
                    arg!(-a --append "Append result to an existing output file")
                        .action(ArgAction::SetTrue),
                ])
                .arg_required_else_help(false),
        )
        .args(&[
            arg!(<COMMAND> "Build command")
                .action(ArgAction::Append)
                .value_terminator("--")
                .num_args(1..)
                .last(true)
                .required(true),
            arg!(--report <FILE> "Path of the execution report")
                .default_value(DEFAULT_REPORT_FILE)
                .hide_default_value(false),
            arg!(-o --output <FILE> "Path of the result file")
                .default_value(DEFAULT_OUTPUT_FILE)
                .hide_default_value(false),
            arg!(-a --append "Append result to an existing output file").action(ArgAction::SetTrue),
        ])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_intercept_call() {
        let execution = vec![
            "earshot",
            "-c",
            "~/earshot.yml",
            "intercept",
            "-o",
            "custom.json",
            "--",
            "make",
            "all",
        ];

        let matches = cli().get_matches_from(execution);
        let arguments = Arguments::try_from(matches).unwrap();

        assert_eq!(
            arguments,
            Arguments {
                config: Some("~/earshot.yml".into()),
                verbose: false,
                mode: Mode::Intercept {
                    input: BuildCommand {
                        arguments: vec!["make", "all"].into_iter().map(String::from).collect()
                    },
                    output: "custom.json".into(),
                },
            }
        );
    }

    #[test]
    fn test_intercept_defaults() {
        let execution = vec!["earshot", "intercept", "--", "make", "all"];

        let matches = cli().get_matches_from(execution);
        let arguments = Arguments::try_from(matches).unwrap();

        assert_eq!(
            arguments,
            Arguments {
                config: None,
                verbose: false,
                mode: Mode::Intercept {
                    input: BuildCommand {
                        arguments: vec!["make", "all"].into_iter().map(String::from).collect()
                    },
                    output: "report.json".into(),
                },
            }
        );
    }

    #[test]
    fn test_citnames_call() {
        let execution = vec![
            "earshot",
            "-v",
            "citnames",
            "-i",
            "custom.json",
            "-o",
            "result.json",
            "-a",
        ];

        let matches = cli().get_matches_from(execution);
        let arguments = Arguments::try_from(matches).unwrap();

        assert_eq!(
            arguments,
            Arguments {
                config: None,
                verbose: true,
                mode: Mode::Citnames {
                    input: "custom.json".into(),
                    output: BuildSemantic {
                        file_name: "result.json".into(),
                        append: true
                    },
                },
            }
        );
    }

    #[test]
    fn test_citnames_defaults() {
        let execution = vec!["earshot", "citnames"];

        let matches = cli().get_matches_from(execution);
        let arguments = Arguments::try_from(matches).unwrap();

        assert_eq!(
            arguments,
            Arguments {
                config: None,
                verbose: false,
                mode: Mode::Citnames {
                    input: "report.json".into(),
                    output: BuildSemantic {
                        file_name: "compile_commands.json".into(),
                        append: false
                    },
                },
            }
        );
    }

    #[test]
    fn test_combined_call() {
        let execution = vec![
            "earshot",
            "-c",
            "~/earshot.yml",
            "-o",
            "result.json",
            "-a",
            "--",
            "make",
            "all",
        ];

        let matches = cli().get_matches_from(execution);
        let arguments = Arguments::try_from(matches).unwrap();

        assert_eq!(
            arguments,
            Arguments {
                config: Some("~/earshot.yml".to_string()),
                verbose: false,
                mode: Mode::Combined {
                    input: BuildCommand {
                        arguments: vec!["make", "all"].into_iter().map(String::from).collect()
                    },
                    report: "report.json".into(),
                    output: BuildSemantic {
                        file_name: "result.json".into(),
                        append: true
                    },
                },
            }
        );
    }

    #[test]
    fn test_combined_defaults() {
        let execution = vec!["earshot", "--", "make", "all"];

        let matches = cli().get_matches_from(execution);
        let arguments = Arguments::try_from(matches).unwrap();

        assert_eq!(
            arguments,
            Arguments {
                config: None,
                verbose: false,
                mode: Mode::Combined {
                    input: BuildCommand {
                        arguments: vec!["make", "all"].into_iter().map(String::from).collect(),
                    },
                    report: "report.json".into(),
                    output: BuildSemantic {
                        file_name: "compile_commands.json".into(),
                        append: false
                    },
                },
            }
        );
    }
}
