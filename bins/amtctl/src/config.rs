// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Settings file for amtctl.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use wsman_client::ClientConfig;
use wsman_core::DEFAULT_AMT_PORT;

/// JSON settings file. Every field is optional; command-line flags win.
///
/// ```json
/// { "host": "10.0.0.5", "username": "admin", "framing": "chunked",
///   "request_timeout_ms": 10000, "templates": "/etc/amtctl/templates" }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub templates: Option<PathBuf>,
    #[serde(flatten)]
    pub client: ClientConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Connection settings after merging flags over the file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub templates: Option<PathBuf>,
    pub client: ClientConfig,
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub templates: Option<PathBuf>,
    pub chunked: bool,
    pub request_timeout_ms: Option<u64>,
}

pub fn merge(file: FileConfig, flags: Overrides, env_password: Option<String>) -> Result<Settings> {
    let host = flags
        .host
        .or(file.host)
        .context("no device host given (--host or \"host\" in the config file)")?;
    let password = flags
        .password
        .or(file.password)
        .or(env_password)
        .context("no password given (--password, config file or AMT_PASSWORD)")?;

    let mut client = file.client;
    if flags.chunked {
        client.framing = wsman_core::BodyFraming::Chunked;
    }
    if let Some(ms) = flags.request_timeout_ms {
        client.session.request_timeout = std::time::Duration::from_millis(ms);
    }

    Ok(Settings {
        host,
        port: flags.port.or(file.port).unwrap_or(DEFAULT_AMT_PORT),
        username: flags
            .username
            .or(file.username)
            .unwrap_or_else(|| "admin".to_string()),
        password,
        templates: flags.templates.or(file.templates),
        client,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wsman_core::BodyFraming;

    use super::*;

    #[test]
    fn flags_override_file() {
        let file: FileConfig = serde_json::from_str(
            r#"{"host":"10.0.0.5","port":16993,"username":"ops","password":"file-secret","framing":"chunked","idle_timeout_ms":3000}"#,
        )
        .unwrap();
        let flags = Overrides {
            host: Some("10.0.0.9".into()),
            request_timeout_ms: Some(1500),
            ..Overrides::default()
        };
        let settings = merge(file, flags, None).unwrap();
        assert_eq!(settings.host, "10.0.0.9");
        assert_eq!(settings.port, 16993);
        assert_eq!(settings.username, "ops");
        assert_eq!(settings.password, "file-secret");
        assert_eq!(settings.client.framing, BodyFraming::Chunked);
        assert_eq!(settings.client.session.idle_timeout, Duration::from_millis(3000));
        assert_eq!(settings.client.session.request_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn defaults_fill_gaps() {
        let flags = Overrides {
            host: Some("amt.lab".into()),
            ..Overrides::default()
        };
        let settings = merge(FileConfig::default(), flags, Some("env-secret".into())).unwrap();
        assert_eq!(settings.port, DEFAULT_AMT_PORT);
        assert_eq!(settings.username, "admin");
        assert_eq!(settings.password, "env-secret");
        assert_eq!(settings.client.framing, BodyFraming::ContentLength);
    }

    #[test]
    fn missing_host_or_password_is_an_error() {
        assert!(merge(FileConfig::default(), Overrides::default(), Some("x".into())).is_err());
        let flags = Overrides {
            host: Some("amt.lab".into()),
            ..Overrides::default()
        };
        assert!(merge(FileConfig::default(), flags, None).is_err());
    }
}
