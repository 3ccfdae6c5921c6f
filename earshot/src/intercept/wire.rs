// SPDX-License-Identifier: GPL-3.0-or-later

//! The module contains the wire protocol between supervisors and the
//! collector.
//!
//! Frames are a 4-byte big-endian length followed by the JSON rendering of
//! the value. Every connection carries a single request/response exchange;
//! the supervisor opens a new connection for each request.

use super::{Envelope, Event, Reporter, Request, Response};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

/// Errors that can occur on the wire.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Unexpected response")]
    Protocol,
}

/// Write a value as a length-prefixed JSON frame.
pub(crate) fn write_frame<T, W>(writer: &mut W, value: &T) -> Result<(), WireError>
where
    T: serde::Serialize,
    W: Write,
{
    let payload = serde_json::to_vec(value)?;
    let length = payload.len() as u32;

    writer.write_all(&length.to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;

    Ok(())
}

/// Read a value from a length-prefixed JSON frame.
pub(crate) fn read_frame<T, R>(reader: &mut R) -> Result<T, WireError>
where
    T: serde::de::DeserializeOwned,
    R: Read,
{
    let mut length_bytes = [0; 4];
    reader.read_exact(&mut length_bytes)?;
    let length = u32::from_be_bytes(length_bytes) as usize;

    let mut buffer = vec![0; length];
    reader.read_exact(&mut buffer)?;
    let value = serde_json::from_slice(buffer.as_ref())?;

    Ok(value)
}

/// The request handler the collector plugs into the accept loop.
pub trait Service: Send + Sync {
    fn handle(&self, request: Request) -> Response;
}

/// The collector endpoint of the wire protocol.
///
/// Listens on a random port of the loopback interface. Each accepted
/// connection is served by its own worker thread; the service implementation
/// is responsible for its own locking.
pub struct CollectorOnTcp {
    shutdown: Arc<AtomicBool>,
    listener: TcpListener,
    address: SocketAddr,
}

impl CollectorOnTcp {
    /// Creates a new TCP collector endpoint.
    ///
    /// The address of the endpoint can be obtained from the second element
    /// of the returned tuple.
    pub fn new() -> Result<(Self, SocketAddr), std::io::Error> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?;

        Ok((
            Self {
                shutdown,
                listener,
                address,
            },
            address,
        ))
    }

    /// Runs the accept loop until the endpoint is shut down.
    ///
    /// Every accepted connection is handed to a worker thread, which reads
    /// one request, lets the service answer it and writes the response back.
    pub fn serve(&self, service: Arc<dyn Service>) -> Result<(), WireError> {
        let mut workers = Vec::new();
        for stream in self.listener.incoming() {
            // This has to be the first thing to do, in order to implement the stop method!
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match stream {
                Ok(connection) => {
                    let service = Arc::clone(&service);
                    workers.push(thread::spawn(move || {
                        if let Err(error) = Self::dispatch(connection, service.as_ref()) {
                            log::warn!("Failed to serve connection: {error}");
                        }
                    }));
                }
                Err(error) => {
                    log::error!("Failed to accept connection: {error}");
                    break;
                }
            }
        }
        for worker in workers {
            let _ = worker.join();
        }
        Ok(())
    }

    fn dispatch(mut connection: TcpStream, service: &dyn Service) -> Result<(), WireError> {
        let request = read_frame::<Request, _>(&mut connection)?;
        let response = service.handle(request);
        write_frame(&mut connection, &response)?;
        let _ = connection.shutdown(std::net::Shutdown::Both);
        Ok(())
    }

    /// Stops the endpoint by flipping the shutdown flag and connecting to
    /// the listener.
    ///
    /// The accept loop checks the flag before serving a connection; the
    /// self-connect unblocks the `accept` call so the flag is seen.
    pub fn shutdown(&self) -> Result<(), WireError> {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = TcpStream::connect(self.address).map_err(WireError::Network)?;
        Ok(())
    }
}

/// The supervisor endpoint of the wire protocol.
///
/// It does not hold an open connection; a new one is opened for each
/// request. The reporter id identifies this process in the event stream.
pub struct ReporterOnTcp {
    destination: String,
    rid: u32,
}

impl ReporterOnTcp {
    pub fn new(destination: String) -> Self {
        let rid = std::process::id();
        Self { destination, rid }
    }

    fn round_trip(&self, request: &Request) -> Result<Response, WireError> {
        let mut socket = TcpStream::connect(&self.destination)?;
        write_frame(&mut socket, request)?;
        read_frame::<Response, _>(&mut socket)
    }
}

impl Reporter for ReporterOnTcp {
    fn environment_update(
        &self,
        environment: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, WireError> {
        let request = Request::EnvironmentUpdate {
            environment: environment.clone(),
        };
        match self.round_trip(&request)? {
            Response::Environment { overlay } => Ok(overlay),
            Response::Failure { message } => Err(WireError::Rejected(message)),
            Response::Acknowledged => Err(WireError::Protocol),
        }
    }

    fn report(&self, event: Event) -> Result<(), WireError> {
        let request = Request::Report(Envelope {
            rid: self.rid,
            event,
        });
        match self.round_trip(&request)? {
            Response::Acknowledged => Ok(()),
            Response::Failure { message } => Err(WireError::Rejected(message)),
            Response::Environment { .. } => Err(WireError::Protocol),
        }
    }
}
