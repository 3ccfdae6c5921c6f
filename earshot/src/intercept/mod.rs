// SPDX-License-Identifier: GPL-3.0-or-later

//! The module contains the intercept reporting and collecting functionality.
//!
//! When a command execution is intercepted, the supervisor sends lifecycle
//! events to the collector. This happens in two different processes,
//! requiring a communication channel between these processes.
//!
//! The module defines the wire data structures exchanged between the
//! supervisor and the collector, the execution report that the collector
//! accumulates, and the abstractions over both endpoints.

pub mod collector;
pub mod report;
pub mod supervise;
pub mod supervisor;
pub mod wire;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration of one interception session.
///
/// The environment overlay handed to the supervisors is a pure function of
/// this value (see the `environment` module).
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Path to the preload library.
    pub library: PathBuf,
    /// Path to the supervisor executable.
    pub reporter: PathBuf,
    /// Address of the collector service.
    pub address: String,
    /// Request verbose supervisor logging.
    pub verbose: bool,
}

/// Wrapper around an event, identifying the reporting supervisor.
///
/// Events of one execution arrive over separate connections; the collector
/// merges them by the reporter id, which is the supervisor's process id.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Envelope {
    pub rid: u32,
    pub event: Event,
}

/// A lifecycle event of a supervised process.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Started {
        #[serde(with = "rfc3339_micros")]
        at: DateTime<Utc>,
        pid: u32,
        ppid: u32,
        execution: report::Command,
    },
    Signalled {
        #[serde(with = "rfc3339_micros")]
        at: DateTime<Utc>,
        signal: i32,
    },
    Stopped {
        #[serde(with = "rfc3339_micros")]
        at: DateTime<Utc>,
        status: i64,
    },
}

impl Event {
    pub fn started(pid: u32, ppid: u32, execution: report::Command) -> Self {
        Event::Started {
            at: Utc::now(),
            pid,
            ppid,
            execution,
        }
    }

    pub fn signalled(signal: i32) -> Self {
        Event::Signalled {
            at: Utc::now(),
            signal,
        }
    }

    pub fn stopped(status: i64) -> Self {
        Event::Stopped {
            at: Utc::now(),
            status,
        }
    }
}

/// A request sent by a supervisor to the collector.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Request {
    /// Ask for the environment overlay that continues the interception
    /// in child processes.
    EnvironmentUpdate { environment: HashMap<String, String> },
    /// Deliver a lifecycle event of a supervised process.
    Report(Envelope),
}

/// The collector's answer to a request.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Response {
    Environment { overlay: HashMap<String, String> },
    Acknowledged,
    Failure { message: String },
}

/// Represents the remote sink of supervised process events.
pub trait Reporter {
    /// Requests the environment overlay for further interception.
    fn environment_update(
        &self,
        environment: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, wire::WireError>;

    /// Sends an event to the remote collector.
    fn report(&self, event: Event) -> Result<(), wire::WireError>;
}

/// RFC3339 timestamps in UTC with microsecond precision.
///
/// The report format (and therefore the wire format too) pins the timestamp
/// rendering; the default chrono serialization varies its precision.
pub(crate) mod rfc3339_micros {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|value| value.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn command(
        program: &str,
        arguments: Vec<&str>,
        working_dir: &str,
        environment: HashMap<&str, &str>,
    ) -> report::Command {
        report::Command {
            program: PathBuf::from(program),
            arguments: arguments.iter().map(|s| s.to_string()).collect(),
            working_dir: PathBuf::from(working_dir),
            environment: environment
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}
