// SPDX-License-Identifier: GPL-3.0-or-later

//! The execution report: the single JSON document the intercept phase
//! produces and the semantic phase consumes.
//!
//! The JSON shape is normative, downstream tools depend on it bit-for-bit:
//!
//! ```json
//! { "context": { "intercept": "library preload", "host_info": { ... } },
//!   "executions": [
//!     { "command": { "program": "...", "arguments": [...],
//!                    "working_dir": "...", "environment": {...} },
//!       "run": { "pid": 1, "ppid": 2,
//!                "events": [ { "type": "start", "at": "..." }, ... ] } }
//!   ] }
//! ```
//!
//! `pid` and `ppid` are omitted when unknown; `status` appears only on
//! `stop` events and `signal` only on `signal` events. The file is pretty
//! printed with 4-space indentation and replaced atomically.

use super::{rfc3339_micros, Event};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The process image an execution was started with.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Command {
    pub program: PathBuf,
    pub arguments: Vec<String>,
    pub working_dir: PathBuf,
    pub environment: HashMap<String, String>,
}

/// The observed lifetime of one process.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct Run {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ppid: Option<u32>,
    pub events: Vec<RunEvent>,
}

/// One entry of a run's event timeline.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct RunEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(with = "rfc3339_micros")]
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum EventKind {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "signal")]
    Signal,
    #[serde(rename = "stop")]
    Stop,
}

/// One observed process: what was executed and how its run went.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Execution {
    pub command: Command,
    pub run: Run,
}

/// Facts about the session the report was taken in.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct Context {
    pub intercept: String,
    pub host_info: BTreeMap<String, String>,
}

/// The whole execution report.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct Report {
    pub context: Context,
    pub executions: Vec<Execution>,
}

/// Errors of reading or writing the report file.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Generic IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Format syntax error: {0}")]
    Syntax(#[from] serde_json::Error),
}

impl Report {
    pub fn new(context: Context) -> Self {
        Report {
            context,
            executions: Vec::new(),
        }
    }

    /// Reads a report from a file.
    ///
    /// A malformed file fails as a whole; no partially read report is
    /// returned.
    pub fn read_from(path: &Path) -> Result<Self, ReportError> {
        let file = std::fs::File::open(path)?;
        let report = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(report)
    }
}

/// Persists the report with a full-file rewrite.
///
/// The content is written to a temporary sibling and renamed over the
/// target, so readers observe either the previous or the new valid JSON
/// and never a torn file.
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn write(&self, report: &Report) -> Result<(), ReportError> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staging = tempfile::NamedTempFile::new_in(directory)?;

        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut staging, formatter);
        report.serialize(&mut serializer)?;
        staging.write_all(b"\n")?;
        staging.as_file().sync_all()?;

        staging.persist(&self.path).map_err(|error| error.error)?;
        Ok(())
    }
}

/// Reconstructs executions from the event stream of one supervisor.
///
/// ```text
///                  started               stopped
///  ∅  ─────────────────────►  OPEN  ──────────────────►  CLOSED
///                              │
///                              │  signalled (0..n)
///                              ▼
///                            OPEN (events appended)
/// ```
///
/// Events that do not fit the state machine are rejected; the caller logs
/// and drops them.
#[derive(Default)]
pub struct ExecutionBuilder {
    execution: Option<Execution>,
}

/// What happened to the event handed to the builder.
pub enum AddOutcome {
    /// The event was merged, the execution is still open.
    Accepted,
    /// A `stopped` event closed the execution.
    Completed(Execution),
    /// The event does not fit the builder's state.
    Rejected,
}

impl ExecutionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: Event) -> AddOutcome {
        match event {
            Event::Started {
                at,
                pid,
                ppid,
                execution,
            } => {
                if self.execution.is_some() {
                    return AddOutcome::Rejected;
                }
                self.execution = Some(Execution {
                    command: execution,
                    run: Run {
                        pid: nonzero(pid),
                        ppid: nonzero(ppid),
                        events: vec![RunEvent {
                            kind: EventKind::Start,
                            at,
                            status: None,
                            signal: None,
                        }],
                    },
                });
                AddOutcome::Accepted
            }
            Event::Signalled { at, signal } => match self.execution.as_mut() {
                Some(open) => {
                    open.run.events.push(RunEvent {
                        kind: EventKind::Signal,
                        at,
                        status: None,
                        signal: Some(signal),
                    });
                    AddOutcome::Accepted
                }
                None => AddOutcome::Rejected,
            },
            Event::Stopped { at, status } => match self.execution.take() {
                Some(mut open) => {
                    open.run.events.push(RunEvent {
                        kind: EventKind::Stop,
                        at,
                        status: Some(status),
                        signal: None,
                    });
                    AddOutcome::Completed(open)
                }
                None => AddOutcome::Rejected,
            },
        }
    }

    /// The timestamp of the `started` event, when the builder is open.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.execution
            .as_ref()
            .and_then(|execution| execution.run.events.first())
            .map(|event| event.at)
    }

    /// Gives up the accumulated execution, whatever state it is in.
    pub fn build(self) -> Option<Execution> {
        self.execution
    }
}

fn nonzero(value: u32) -> Option<u32> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod test {
    use super::super::fixtures;
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn timestamp(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, second).unwrap()
    }

    fn example_report() -> Report {
        Report {
            context: Context {
                intercept: "library preload".to_string(),
                host_info: BTreeMap::from([("sysname".to_string(), "Linux".to_string())]),
            },
            executions: vec![Execution {
                command: fixtures::command(
                    "/usr/bin/cc",
                    vec!["cc", "-c", "main.c"],
                    "/home/user",
                    std::collections::HashMap::from([("PATH", "/usr/bin")]),
                ),
                run: Run {
                    pid: Some(1234),
                    ppid: Some(1230),
                    events: vec![
                        RunEvent {
                            kind: EventKind::Start,
                            at: timestamp(1),
                            status: None,
                            signal: None,
                        },
                        RunEvent {
                            kind: EventKind::Stop,
                            at: timestamp(2),
                            status: Some(0),
                            signal: None,
                        },
                    ],
                },
            }],
        }
    }

    #[test]
    fn test_report_round_trip() {
        let report = example_report();

        let serialized = serde_json::to_string(&report).unwrap();
        let deserialized: Report = serde_json::from_str(&serialized).unwrap();

        assert_eq!(report, deserialized);
    }

    #[test]
    fn test_report_json_shape() {
        let report = example_report();

        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(
            value["context"],
            json!({
                "intercept": "library preload",
                "host_info": { "sysname": "Linux" }
            })
        );
        let execution = &value["executions"][0];
        assert_eq!(execution["command"]["program"], json!("/usr/bin/cc"));
        assert_eq!(
            execution["command"]["arguments"],
            json!(["cc", "-c", "main.c"])
        );
        assert_eq!(execution["run"]["pid"], json!(1234));
        assert_eq!(
            execution["run"]["events"][0],
            json!({ "type": "start", "at": "2024-03-01T12:00:01.000000Z" })
        );
        assert_eq!(
            execution["run"]["events"][1],
            json!({ "type": "stop", "at": "2024-03-01T12:00:02.000000Z", "status": 0 })
        );
    }

    #[test]
    fn test_pid_omitted_when_unknown() {
        let run = Run {
            pid: None,
            ppid: None,
            events: vec![],
        };

        let value = serde_json::to_value(&run).unwrap();

        assert!(value.get("pid").is_none());
        assert!(value.get("ppid").is_none());
    }

    #[test]
    fn test_malformed_report_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let result = Report::read_from(&path);

        assert!(matches!(result, Err(ReportError::Syntax(_))));
    }

    #[test]
    fn test_writer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = example_report();

        ReportWriter::new(&path).write(&report).unwrap();
        let read_back = Report::read_from(&path).unwrap();

        assert_eq!(report, read_back);
    }

    #[test]
    fn test_writer_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let writer = ReportWriter::new(&path);

        writer.write(&Report::default()).unwrap();
        writer.write(&example_report()).unwrap();

        let read_back = Report::read_from(&path).unwrap();
        assert_eq!(read_back.executions.len(), 1);
    }

    #[test]
    fn test_builder_happy_path() {
        let mut builder = ExecutionBuilder::new();
        let command =
            fixtures::command("/bin/true", vec!["true"], "/", std::collections::HashMap::new());

        assert!(matches!(
            builder.add(Event::started(10, 9, command)),
            AddOutcome::Accepted
        ));
        assert!(matches!(
            builder.add(Event::signalled(2)),
            AddOutcome::Accepted
        ));
        let outcome = builder.add(Event::stopped(130));

        match outcome {
            AddOutcome::Completed(execution) => {
                assert_eq!(execution.run.pid, Some(10));
                assert_eq!(execution.run.ppid, Some(9));
                let kinds: Vec<_> = execution.run.events.iter().map(|e| e.kind).collect();
                assert_eq!(
                    kinds,
                    vec![EventKind::Start, EventKind::Signal, EventKind::Stop]
                );
                assert_eq!(execution.run.events[2].status, Some(130));
                assert_eq!(execution.run.events[1].signal, Some(2));
            }
            _ => panic!("expected a completed execution"),
        }
    }

    #[test]
    fn test_builder_rejects_events_without_start() {
        let mut builder = ExecutionBuilder::new();

        assert!(matches!(builder.add(Event::stopped(0)), AddOutcome::Rejected));
        assert!(matches!(
            builder.add(Event::signalled(9)),
            AddOutcome::Rejected
        ));
    }

    #[test]
    fn test_builder_rejects_second_start() {
        let mut builder = ExecutionBuilder::new();
        let command =
            fixtures::command("/bin/true", vec!["true"], "/", std::collections::HashMap::new());

        assert!(matches!(
            builder.add(Event::started(10, 9, command.clone())),
            AddOutcome::Accepted
        ));
        assert!(matches!(
            builder.add(Event::started(11, 9, command)),
            AddOutcome::Rejected
        ));
    }

    #[test]
    fn test_builder_zero_pids_are_omitted() {
        let mut builder = ExecutionBuilder::new();
        let command =
            fixtures::command("/bin/true", vec!["true"], "/", std::collections::HashMap::new());

        builder.add(Event::started(0, 0, command));
        let execution = builder.build().unwrap();

        assert_eq!(execution.run.pid, None);
        assert_eq!(execution.run.ppid, None);
    }
}
