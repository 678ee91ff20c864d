// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Digest-authenticated WSMAN calls against one AMT device.
//!
//! [`WsmanClient`] wraps an [`HttpExchange`] (normally a
//! [`SocketSession`](wsman_transport::SocketSession)) and an
//! [`Authenticator`](wsman_auth::Authenticator). Each call is built, sent,
//! and, on a `401`, answered once with a digest computed from the new
//! challenge. Response bodies decode into a JSON tree with [`decode_xml`], and
//! results can be flattened into an [`Outcome`] for callers that speak JSON.
//!
//! # Example
//!
//! ```no_run
//! use wsman_client::{resolve_call, BuildError, ClientConfig, Outcome, WsmanClient};
//! use wsman_core::{ApiCall, Credentials, SessionEndpoint, WsmanMethod};
//!
//! # async fn run() -> Result<(), wsman_client::ClientError> {
//! let client = WsmanClient::connect(
//!     SessionEndpoint::new("10.0.0.5", 16992),
//!     Credentials::new("admin", "P@ssw0rd"),
//!     ClientConfig::default(),
//! )
//! .await?;
//!
//! let builder = |call: &ApiCall, method: WsmanMethod, _: Option<&str>| {
//!     Ok::<_, BuildError>(format!("<!-- {} {} envelope -->", call, method))
//! };
//! let call = resolve_call("AMT_GeneralSettings")?;
//! let outcome = Outcome::from(client.submit(&builder, &call, WsmanMethod::Get, None).await);
//! println!("{}", serde_json::to_string(&outcome).unwrap_or_default());
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod body;
mod client;
mod config;
mod decode;
mod error;
mod exchange;
mod outcome;

pub use body::{extract_enumeration_context, BodyBuilder, BuildError};
pub use client::{resolve_call, resolve_method, WsmanClient, WsmanResponse, CREDENTIAL_CHECK_CLASS};
pub use config::ClientConfig;
pub use decode::{decode_xml, DecodeError, TEXT_KEY};
pub use error::{ClientError, ErrorKind};
pub use exchange::HttpExchange;
pub use outcome::Outcome;
