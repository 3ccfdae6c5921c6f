// SPDX-License-Identifier: GPL-3.0-or-later

//! Spawns a command, forwards signals to it and waits for its completion.
//!
//! Used by the collector process for the top-level build command and by the
//! supervisor executable for the real program. The signal handling is kept
//! async-signal-safe: the handler side only stores the signal number, the
//! forwarding is a direct `kill` on the stored child pid.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use signal_hook::consts::signal::{
    SIGALRM, SIGCHLD, SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2,
};
use signal_hook::iterator::Signals;
use std::os::raw::c_int;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

/// The signals the collector process forwards to the top-level child.
///
/// Uncatchable signals (`SIGKILL`, `SIGSTOP`) cannot be in the list.
pub const FORWARDED_SIGNALS: &[c_int] = &[
    SIGINT, SIGTERM, SIGHUP, SIGQUIT, SIGUSR1, SIGUSR2, SIGALRM, SIGCHLD,
];

/// The signals the supervisor forwards to the program it runs.
///
/// `SIGCHLD` is excluded: the supervisor receives one from its own child
/// exiting, which is not an observation worth reporting.
pub const SUPERVISED_SIGNALS: &[c_int] = &[
    SIGINT, SIGTERM, SIGHUP, SIGQUIT, SIGUSR1, SIGUSR2, SIGALRM,
];

/// Errors that can occur during process supervision.
#[derive(Error, Debug)]
pub enum SuperviseError {
    #[error("Failed to register signal handler: {0}")]
    SignalRegistration(#[source] std::io::Error),
    #[error("Failed to spawn child process: {0}")]
    ProcessSpawn(#[source] std::io::Error),
    #[error("Failed to wait for child process: {0}")]
    ProcessWait(#[source] std::io::Error),
}

/// Lifecycle observations made while supervising a process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessEvent {
    /// The child process has been spawned.
    Spawned { pid: u32 },
    /// A signal was received and forwarded to the child.
    Signalled { signal: i32 },
}

/// Runs the command to completion, forwarding the listed signals.
///
/// The observer is invoked for the spawn and for every forwarded signal;
/// the spawn observation happens on the calling thread, the signal ones on
/// the forwarding thread. The method blocks until the child exits and
/// returns its exit status.
pub fn supervise(
    command: &mut Command,
    signals: &[c_int],
    observer: Arc<dyn Fn(ProcessEvent) + Send + Sync>,
) -> Result<ExitStatus, SuperviseError> {
    let mut registered =
        Signals::new(signals.iter().copied()).map_err(SuperviseError::SignalRegistration)?;
    let handle = registered.handle();

    let mut child = command.spawn().map_err(SuperviseError::ProcessSpawn)?;
    let child_pid = child.id();
    observer(ProcessEvent::Spawned { pid: child_pid });

    let forwarder = {
        let observer = Arc::clone(&observer);
        thread::spawn(move || {
            for signal in registered.forever() {
                log::debug!("Received signal {signal}, forwarding to child {child_pid}");
                match kill(Pid::from_raw(child_pid as i32), Signal::try_from(signal).ok()) {
                    Ok(()) => observer(ProcessEvent::Signalled { signal }),
                    Err(error) => log::debug!("Failed to forward signal {signal}: {error}"),
                }
            }
        })
    };

    let status = child.wait().map_err(SuperviseError::ProcessWait);

    handle.close();
    if forwarder.join().is_err() {
        log::warn!("Failed to join the signal forwarding thread");
    }

    status
}

/// Maps an exit status to the exit code contract: the child's code clamped
/// to 0..255, or `128 + signal` when the child was terminated by a signal.
pub fn exit_code(status: ExitStatus) -> u8 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code as u8,
        (None, Some(signal)) => 128u8.wrapping_add(signal as u8),
        (None, None) => 1,
    }
}
