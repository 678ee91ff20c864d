// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! TCP session to one AMT device.
//!
//! A [`SocketSession`] owns a single connection and allows one request in
//! flight. Responses are framed incrementally off the socket; the caller of
//! [`SocketSession::write`] gets exactly one complete [`HttpResponse`] or a
//! [`TransportError`]. Lifecycle changes that are not tied to a request
//! (connect, idle timeout, peer close) are published as [`SessionEvent`]s.
//!
//! [`HttpResponse`]: wsman_core::HttpResponse

mod config;
mod session;

pub use config::{
    SessionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
pub use session::SocketSession;

/// Connection state of a [`SocketSession`].
///
/// `Idle` and `AwaitingResponse` are the connected states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Idle,
    AwaitingResponse,
    Closed,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::AwaitingResponse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Idle => "idle",
            SessionState::AwaitingResponse => "awaiting-response",
            SessionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle notifications, delivered to every [`SocketSession::subscribe`]r.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Closed { reason: String },
    /// Closed after the inactivity timeout.
    TimedOut,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The TCP connection could not be established.
    Connect { endpoint: String, reason: String },
    NotConnected,
    /// A request is already awaiting its response.
    Busy,
    Io(String),
    /// The session was closed by the inactivity timeout.
    TimedOut,
    /// No complete response arrived before the request deadline.
    RequestTimeout,
    /// The connection closed before a complete response arrived.
    ConnectionClosed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { endpoint, reason } => {
                write!(f, "failed to connect to {}: {}", endpoint, reason)
            }
            Self::NotConnected => write!(f, "session is not connected"),
            Self::Busy => write!(f, "a request is already in flight"),
            Self::Io(msg) => write!(f, "socket error: {}", msg),
            Self::TimedOut => write!(f, "session closed after inactivity timeout"),
            Self::RequestTimeout => write!(f, "no response before request deadline"),
            Self::ConnectionClosed => write!(f, "connection closed before response completed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
