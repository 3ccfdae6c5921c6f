// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end scenarios of the semantic recognition: an execution report
//! goes in, a compilation database comes out.

use earshot::config;
use earshot::intercept::report::{
    Command, Context, EventKind, Execution, Report, Run, RunEvent,
};
use earshot::output;
use earshot::output::DatabaseWriter;
use earshot::semantic::tools::ToolChain;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

fn command(program: &str, arguments: Vec<&str>, working_dir: &str) -> Command {
    command_with_env(program, arguments, working_dir, HashMap::new())
}

fn command_with_env(
    program: &str,
    arguments: Vec<&str>,
    working_dir: &str,
    environment: HashMap<&str, &str>,
) -> Command {
    Command {
        program: PathBuf::from(program),
        arguments: arguments.into_iter().map(String::from).collect(),
        working_dir: PathBuf::from(working_dir),
        environment: environment
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn execution(command: Command) -> Execution {
    Execution {
        run: Run {
            pid: Some(1234),
            ppid: Some(1230),
            events: vec![
                RunEvent {
                    kind: EventKind::Start,
                    at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 1).unwrap(),
                    status: None,
                    signal: None,
                },
                RunEvent {
                    kind: EventKind::Stop,
                    at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 2).unwrap(),
                    status: Some(0),
                    signal: None,
                },
            ],
        },
        command,
    }
}

fn recognize_all(report: &Report) -> Vec<output::Entry> {
    let tools = ToolChain::from(&config::Main::default());
    report
        .executions
        .iter()
        .flat_map(|execution| tools.recognize(&execution.command).unwrap_or_default())
        .collect()
}

#[test]
fn compile_one_file() {
    let report = Report {
        context: Context::default(),
        executions: vec![execution(command(
            "gcc",
            vec!["gcc", "-c", "-o", "foo.o", "foo.c"],
            "/w",
        ))],
    };

    let entries = recognize_all(&report);

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file, PathBuf::from("/w/foo.c"));
    assert_eq!(entries[0].directory, PathBuf::from("/w"));
    assert_eq!(entries[0].output, Some(PathBuf::from("/w/foo.o")));
    assert_eq!(
        entries[0].arguments,
        vec!["gcc", "-c", "-o", "foo.o", "foo.c"]
    );
}

#[test]
fn dependency_only_call_produces_nothing() {
    let report = Report {
        context: Context::default(),
        executions: vec![execution(command(
            "gcc",
            vec!["gcc", "-MM", "-Iinc", "foo.c"],
            "/w",
        ))],
    };

    let entries = recognize_all(&report);

    assert!(entries.is_empty());
}

#[test]
fn two_sources_linked_in_one_call() {
    let report = Report {
        context: Context::default(),
        executions: vec![execution(command(
            "g++",
            vec!["g++", "-O2", "a.cc", "b.cc", "-lfoo", "-o", "prog"],
            "/w",
        ))],
    };

    let entries = recognize_all(&report);

    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[0].arguments,
        vec!["g++", "-c", "-O2", "a.cc", "-o", "prog"]
    );
    assert_eq!(
        entries[1].arguments,
        vec!["g++", "-c", "-O2", "b.cc", "-o", "prog"]
    );
}

#[test]
fn environment_include_paths_are_appended() {
    let report = Report {
        context: Context::default(),
        executions: vec![execution(command_with_env(
            "cc",
            vec!["cc", "-c", "k.c"],
            "/w",
            HashMap::from([("CPATH", "/x::/y")]),
        ))],
    };

    let entries = recognize_all(&report);

    assert_eq!(
        entries[0].arguments,
        vec!["cc", "-c", "k.c", "-I", "/x", "-I", ".", "-I", "/y"]
    );
}

#[test]
fn non_compiler_executions_are_dropped() {
    let report = Report {
        context: Context::default(),
        executions: vec![
            execution(command("/usr/bin/make", vec!["make", "all"], "/w")),
            execution(command("gcc", vec!["gcc", "-c", "main.c"], "/w")),
            execution(command("/usr/bin/ld", vec!["ld", "-o", "prog"], "/w")),
        ],
    };

    let entries = recognize_all(&report);

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file, PathBuf::from("/w/main.c"));
}

// The full citnames flow: a report on disk in, a compilation database out.
#[test]
fn report_to_compilation_database() {
    let dir = tempfile::tempdir().unwrap();
    let database_path = dir.path().join("compile_commands.json");

    let report = Report {
        context: Context::default(),
        executions: vec![
            execution(command("gcc", vec!["gcc", "-c", "-o", "foo.o", "foo.c"], "/w")),
            execution(command("gcc", vec!["gcc", "--version"], "/w")),
        ],
    };

    let entries = recognize_all(&report);
    DatabaseWriter::new(&database_path, false, config::Format::default())
        .write(entries)
        .unwrap();

    let read_back = output::read(&database_path).unwrap();
    assert_eq!(read_back.len(), 1);
    assert_eq!(read_back[0].file, PathBuf::from("/w/foo.c"));
}
