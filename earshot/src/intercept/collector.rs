// SPDX-License-Identifier: GPL-3.0-or-later

//! The collector service: merges the event streams of all supervisors into
//! the execution report and persists it.
//!
//! All shared mutable state lives behind a single mutex. Event application
//! is a pure step on that state (see [`ExecutionBuilder`]), which keeps the
//! critical section short. Completed executions are persisted before the
//! event is acknowledged, so the on-disk report never runs ahead of the
//! acknowledgements.

use super::report::{AddOutcome, Context, ExecutionBuilder, Report, ReportError, ReportWriter};
use super::wire::{CollectorOnTcp, Service};
use super::{Envelope, Request, Response, SessionConfig};
use crate::environment;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

/// The collector's mutable state: the open builders and the report.
struct State {
    builders: HashMap<u32, ExecutionBuilder>,
    report: Report,
}

/// The request handler of the collector.
pub struct EventCollector {
    session: SessionConfig,
    state: Mutex<State>,
    writer: ReportWriter,
}

impl EventCollector {
    pub fn new(session: SessionConfig, context: Context, output: &Path) -> Self {
        Self {
            session,
            state: Mutex::new(State {
                builders: HashMap::new(),
                report: Report::new(context),
            }),
            writer: ReportWriter::new(output),
        }
    }

    /// Merges one envelope into the state.
    ///
    /// A `started` event with no open builder opens one; `signalled` and
    /// `stopped` append to the open builder. Anything else is logged and
    /// dropped. When an execution completes, it is appended to the report
    /// and the report is persisted before returning.
    fn consume(&self, envelope: Envelope) -> Result<(), ReportError> {
        let mut state = self.state.lock().expect("collector state lock");

        let builder = state.builders.entry(envelope.rid).or_default();
        match builder.add(envelope.event) {
            AddOutcome::Accepted => Ok(()),
            AddOutcome::Completed(execution) => {
                state.builders.remove(&envelope.rid);
                state.report.executions.push(execution);
                self.writer.write(&state.report)
            }
            AddOutcome::Rejected => {
                log::info!(
                    "Received event could not be merged into execution report. Ignored. [rid={}]",
                    envelope.rid
                );
                Ok(())
            }
        }
    }

    /// Appends the still-open executions to the report and persists it.
    ///
    /// Executions whose supervisor died between `started` and `stopped`
    /// are written with whatever events they accumulated, ordered by their
    /// first event's timestamp.
    pub fn flush(&self) -> Result<(), ReportError> {
        let mut state = self.state.lock().expect("collector state lock");

        let mut open: Vec<_> = state
            .builders
            .drain()
            .map(|(_, builder)| (builder.started_at(), builder.build()))
            .filter_map(|(at, execution)| execution.map(|execution| (at, execution)))
            .collect();
        open.sort_by_key(|(at, _)| *at);
        state
            .report
            .executions
            .extend(open.into_iter().map(|(_, execution)| execution));

        self.writer.write(&state.report)
    }

    /// Returns a copy of the accumulated report.
    pub fn report(&self) -> Report {
        let state = self.state.lock().expect("collector state lock");
        state.report.clone()
    }
}

impl Service for EventCollector {
    fn handle(&self, request: Request) -> Response {
        match request {
            Request::EnvironmentUpdate { environment: env } => Response::Environment {
                overlay: environment::update(&self.session, &env),
            },
            Request::Report(envelope) => {
                log::debug!("Received event: {envelope:?}");
                match self.consume(envelope) {
                    Ok(()) => Response::Acknowledged,
                    Err(error) => {
                        log::error!("Failed to persist the report: {error}");
                        Response::Failure {
                            message: error.to_string(),
                        }
                    }
                }
            }
        }
    }
}

/// The running collector: the TCP endpoint plus its accept-loop thread.
///
/// Dropping the service shuts the endpoint down, joins the thread and
/// attempts a final report flush unconditionally.
pub struct CollectorService {
    collector: Arc<EventCollector>,
    socket: Arc<CollectorOnTcp>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CollectorService {
    /// Starts the accept loop of an already bound endpoint.
    ///
    /// The endpoint is created by the caller, because its address is part
    /// of the session configuration the collector is constructed with.
    pub fn start(socket: CollectorOnTcp, collector: Arc<EventCollector>) -> Self {
        let socket = Arc::new(socket);
        let thread = {
            let socket = Arc::clone(&socket);
            let service: Arc<dyn Service> = collector.clone();
            thread::spawn(move || {
                if let Err(error) = socket.serve(service) {
                    log::error!("Failed to serve the collector endpoint: {error}");
                }
            })
        };

        Self {
            collector,
            socket,
            thread: Some(thread),
        }
    }

    /// Stops accepting events and flushes the report.
    pub fn shutdown(&mut self) -> Result<(), ReportError> {
        if let Err(error) = self.socket.shutdown() {
            log::warn!("Failed to stop the collector endpoint: {error}");
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Failed to join the collector thread");
            }
        }
        self.collector.flush()
    }
}

impl Drop for CollectorService {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(error) = self.shutdown() {
                log::error!("Failed to flush the report: {error}");
            }
        }
    }
}
