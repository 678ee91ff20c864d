// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types for the AMT WS-Management gateway.
//!
//! - **Messages**: [`HttpRequest`], [`HttpResponse`], [`StatusLine`]
//! - **Headers**: order-preserving [`Headers`] container
//! - **Session identity**: [`SessionEndpoint`], [`Credentials`]
//! - **Catalogue**: [`ApiCall`], [`WsmanMethod`] and the class metadata table
//!
//! Strings use [`SmolStr`](smol_str::SmolStr) and payloads use
//! [`Bytes`](bytes::Bytes) so framed responses can be handed around without
//! copying.
//!
//! # Examples
//!
//! ```
//! # use wsman_core::*;
//! let endpoint = SessionEndpoint::new("10.0.0.5", DEFAULT_AMT_PORT);
//! assert_eq!(endpoint.authority(), "10.0.0.5:16992");
//!
//! let call = ApiCall::parse("CIM_Processor").unwrap();
//! assert!(call.supports(WsmanMethod::Enumerate));
//! ```

pub mod endpoint;
pub mod headers;
pub mod metadata;
pub mod msg;

pub use endpoint::{Credentials, SessionEndpoint, DEFAULT_AMT_PORT};
pub use headers::{Header, Headers};
pub use metadata::{ApiCall, ClassPrefix, WsmanMethod, CLASS_METADATA};
pub use msg::{
    BodyFraming, HttpRequest, HttpResponse, HttpVersion, MessageError, StatusLine, MAX_BODY_SIZE,
    WSMAN_PATH,
};
