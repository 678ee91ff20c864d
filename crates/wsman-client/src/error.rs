// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use serde::{Deserialize, Serialize};
use wsman_auth::AuthError;
use wsman_transport::TransportError;

/// Coarse error category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Connection,
    AuthFailed,
    Status,
    Protocol,
    Unsupported,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::AuthFailed => "auth-failed",
            ErrorKind::Status => "status",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    Transport(TransportError),
    /// A 401 arrived without a usable `WWW-Authenticate: Digest` challenge.
    InvalidChallenge,
    /// The device rejected the digest response.
    AuthFailed { status: u16 },
    /// Any final status other than 200 or 401.
    Status {
        code: u16,
        reason: String,
        body: String,
    },
    /// Unknown class, unknown method, or a method the class does not allow.
    Unsupported(String),
    /// The body builder failed.
    Build(String),
    Message(AuthError),
    /// An enumerate response carried no enumeration context.
    MissingEnumerationContext,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_) => ErrorKind::Connection,
            ClientError::AuthFailed { .. } => ErrorKind::AuthFailed,
            ClientError::Status { .. } => ErrorKind::Status,
            ClientError::Unsupported(_) => ErrorKind::Unsupported,
            ClientError::InvalidChallenge
            | ClientError::Build(_)
            | ClientError::Message(_)
            | ClientError::MissingEnumerationContext => ErrorKind::Protocol,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "{}", err),
            Self::InvalidChallenge => write!(f, "401 without a usable digest challenge"),
            Self::AuthFailed { status } => {
                write!(f, "authentication failed (status {})", status)
            }
            Self::Status { code, reason, .. } => {
                write!(f, "unexpected response: {} {}", code, reason)
            }
            Self::Unsupported(msg) => write!(f, "unsupported call: {}", msg),
            Self::Build(msg) => write!(f, "failed to build request body: {}", msg),
            Self::Message(err) => write!(f, "{}", err),
            Self::MissingEnumerationContext => {
                write!(f, "enumerate response has no EnumerationContext")
            }
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Message(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<AuthError> for ClientError {
    fn from(err: AuthError) -> Self {
        Self::Message(err)
    }
}
