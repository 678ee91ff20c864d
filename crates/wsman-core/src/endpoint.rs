// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// AMT's plain-HTTP WSMAN port.
pub const DEFAULT_AMT_PORT: u16 = 16992;

/// The single device a session talks to.
///
/// Immutable once a session is created; targeting another device means
/// creating another session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionEndpoint {
    host: SmolStr,
    port: u16,
}

impl SessionEndpoint {
    pub fn new(host: impl Into<SmolStr>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, used both for dialing and as the `Host` header value.
    pub fn authority(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SessionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Operator credentials for digest authentication.
///
/// Held in memory for the life of a session only.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: SmolStr,
    pub password: SmolStr,
}

impl Credentials {
    pub fn new(username: impl Into<SmolStr>, password: impl Into<SmolStr>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_formats_host_and_port() {
        let ep = SessionEndpoint::new("192.168.1.20", DEFAULT_AMT_PORT);
        assert_eq!(ep.authority(), "192.168.1.20:16992");
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let ep = SessionEndpoint::new("fe80::1", 16992);
        assert_eq!(ep.to_string(), "[fe80::1]:16992");
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials::new("admin", "P@ssw0rd");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("P@ssw0rd"));
    }
}
