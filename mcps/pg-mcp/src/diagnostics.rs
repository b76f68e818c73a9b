//! Structured diagnostic events
//!
//! The dispatcher and the tunnel engine report everything that is not a
//! protocol response through a [`Diagnostics`] sink handed to them at
//! construction. Production uses [`TracingDiagnostics`]; tests use
//! [`RecordingDiagnostics`] and assert on the captured events.

use std::net::SocketAddr;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::tunnel::Direction;

/// Something worth reporting that is not a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// An input line could not be decoded into a request; it was skipped
    DecodeFailed { error: String },

    /// A request named a method this server does not implement
    UnknownMethod { id: i64, method: String },

    /// A handler answered with an error response
    RequestFailed {
        id: i64,
        method: String,
        message: String,
    },

    /// Writing a response failed
    SendFailed { id: i64, error: String },

    /// The tunnel is accepting local connections
    TunnelListening {
        addr: SocketAddr,
        destination: String,
    },

    /// Accepting a local connection failed; the accept loop keeps going
    AcceptFailed { error: String },

    /// The remote channel for an accepted connection could not be opened
    ChannelOpenFailed {
        conn_id: u64,
        peer: SocketAddr,
        error: String,
    },

    /// Both ends of a connection pair are established
    ConnectionOpened { conn_id: u64, peer: SocketAddr },

    /// A connection pair was torn down
    ConnectionClosed {
        conn_id: u64,
        peer: SocketAddr,
        finished: Direction,
        bytes: u64,
        error: Option<String>,
    },
}

/// Sink for diagnostic events
pub trait Diagnostics: Send + Sync {
    fn emit(&self, event: DiagnosticEvent);
}

/// Forwards events to `tracing` with structured fields
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn emit(&self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::DecodeFailed { error } => {
                warn!(%error, "Failed to decode request, skipping");
            }
            DiagnosticEvent::UnknownMethod { id, method } => {
                warn!(id, %method, "Unsupported request method");
            }
            DiagnosticEvent::RequestFailed {
                id,
                method,
                message,
            } => {
                warn!(id, %method, %message, "Request failed");
            }
            DiagnosticEvent::SendFailed { id, error } => {
                warn!(id, %error, "Failed to write response");
            }
            DiagnosticEvent::TunnelListening { addr, destination } => {
                info!(%addr, %destination, "SSH tunnel listening");
            }
            DiagnosticEvent::AcceptFailed { error } => {
                warn!(%error, "Local accept error");
            }
            DiagnosticEvent::ChannelOpenFailed {
                conn_id,
                peer,
                error,
            } => {
                warn!(
                    conn_id,
                    %peer,
                    %error,
                    "Remote channel open failed, closing local connection"
                );
            }
            DiagnosticEvent::ConnectionOpened { conn_id, peer } => {
                debug!(conn_id, %peer, "Connection pair established");
            }
            DiagnosticEvent::ConnectionClosed {
                conn_id,
                peer,
                finished,
                bytes,
                error,
            } => match error {
                Some(error) => warn!(
                    conn_id,
                    %peer,
                    %finished,
                    bytes,
                    %error,
                    "Connection pair closed with error"
                ),
                None => debug!(conn_id, %peer, %finished, bytes, "Connection pair closed"),
            },
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&DiagnosticEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn emit(&self, event: DiagnosticEvent) {
        self.events.lock().push(event);
    }
}
