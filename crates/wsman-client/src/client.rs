// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn, Instrument};
use wsman_auth::{parse_challenge, Authenticator, DigestChallenge};
use wsman_core::{ApiCall, BodyFraming, Credentials, HttpResponse, SessionEndpoint, WsmanMethod};
use wsman_observe::{span_with_endpoint, transport_metrics};
use wsman_transport::SocketSession;

use crate::{
    decode_xml, extract_enumeration_context, BodyBuilder, ClientConfig, ClientError, DecodeError,
    HttpExchange,
};

/// Class queried by [`WsmanClient::authenticate`].
pub const CREDENTIAL_CHECK_CLASS: &str = "AMT_GeneralSettings";

/// A successful (`200`) answer with its de-chunked body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsmanResponse {
    pub status: u16,
    pub body: String,
}

impl WsmanResponse {
    /// The body as a JSON tree, see [`decode_xml`].
    pub fn decode(&self) -> Result<serde_json::Value, DecodeError> {
        decode_xml(&self.body)
    }
}

/// Sends WSMAN requests over one exchange, answering digest challenges.
///
/// The authenticator lock is held for the whole build, send and retry
/// sequence, so concurrent callers are serialized and the nonce count only
/// ever moves forward.
pub struct WsmanClient<E = SocketSession> {
    exchange: E,
    auth: Mutex<Authenticator>,
}

impl WsmanClient<SocketSession> {
    /// Opens a session to `endpoint`.
    pub async fn connect(
        endpoint: SessionEndpoint,
        credentials: Credentials,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let session = SocketSession::new(endpoint.clone(), config.session);
        session.connect().await?;
        Ok(Self::with_exchange(
            session,
            endpoint,
            credentials,
            config.framing,
        ))
    }

    pub fn session(&self) -> &SocketSession {
        &self.exchange
    }

    pub async fn disconnect(&self) {
        self.exchange.close().await;
    }
}

impl<E: HttpExchange> WsmanClient<E> {
    pub fn with_exchange(
        exchange: E,
        endpoint: SessionEndpoint,
        credentials: Credentials,
        framing: BodyFraming,
    ) -> Self {
        Self {
            exchange,
            auth: Mutex::new(Authenticator::new(endpoint, credentials, framing)),
        }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    /// Sends one SOAP envelope and returns the device's `200` answer.
    ///
    /// A `401` is answered once with a fresh digest; a second `401` is
    /// [`ClientError::AuthFailed`]. Other statuses are returned as
    /// [`ClientError::Status`] without retrying.
    pub async fn send(&self, body: &str) -> Result<WsmanResponse, ClientError> {
        let mut auth = self.auth.lock().await;
        let span = span_with_endpoint("wsman", &auth.endpoint().to_string());
        let started = Instant::now();

        let result = async {
            let message = auth.build_message(body)?;
            let response = self.round_trip(message).await?;
            if response.code() != 401 {
                return finish(response);
            }

            let challenge = usable_challenge(&response)?;
            debug!(realm = %challenge.realm, "answering digest challenge");
            transport_metrics().on_auth_retry();
            auth.install_challenge(challenge);

            let message = auth.build_message(body)?;
            let retry = self.round_trip(message).await?;
            if retry.code() == 401 {
                warn!("digest credentials rejected");
                return Err(ClientError::AuthFailed { status: 401 });
            }
            finish(retry)
        }
        .instrument(span)
        .await;

        transport_metrics().on_latency("request", started.elapsed().as_nanos() as u64);
        result
    }

    /// Builds the body for `method` on `call` and sends it.
    ///
    /// Calls the class does not allow fail with [`ClientError::Unsupported`]
    /// before any I/O.
    pub async fn submit<B: BodyBuilder + ?Sized>(
        &self,
        builder: &B,
        call: &ApiCall,
        method: WsmanMethod,
        extra: Option<&str>,
    ) -> Result<WsmanResponse, ClientError> {
        check_supported(call, method)?;
        let body = builder
            .build_body(call, method, extra)
            .map_err(|e| ClientError::Build(e.to_string()))?;
        self.send(&body).await
    }

    /// Enumerates `call` and pulls the results with the returned context.
    pub async fn pull<B: BodyBuilder + ?Sized>(
        &self,
        builder: &B,
        call: &ApiCall,
    ) -> Result<WsmanResponse, ClientError> {
        check_supported(call, WsmanMethod::Enumerate)?;
        check_supported(call, WsmanMethod::Pull)?;

        let enumerated = self
            .submit(builder, call, WsmanMethod::Enumerate, None)
            .await?;
        let context = extract_enumeration_context(&enumerated.body)
            .ok_or(ClientError::MissingEnumerationContext)?;
        debug!(class = %call, %context, "pulling enumeration");
        self.submit(builder, call, WsmanMethod::Pull, Some(&context))
            .await
    }

    /// Reads the general settings to confirm the credentials are accepted.
    pub async fn authenticate<B: BodyBuilder + ?Sized>(
        &self,
        builder: &B,
    ) -> Result<WsmanResponse, ClientError> {
        let call = resolve_call(CREDENTIAL_CHECK_CLASS)?;
        let response = self.submit(builder, &call, WsmanMethod::Get, None).await?;
        info!("device accepted credentials");
        Ok(response)
    }

    async fn round_trip(&self, message: Bytes) -> Result<HttpResponse, ClientError> {
        self.exchange.ensure_connected().await?;
        Ok(self.exchange.exchange(message).await?)
    }
}

/// Parses a class name such as `AMT_GeneralSettings`.
pub fn resolve_call(class_name: &str) -> Result<ApiCall, ClientError> {
    let call = ApiCall::parse(class_name)
        .ok_or_else(|| ClientError::Unsupported(format!("unknown class {}", class_name)))?;
    if call.allowed_methods().is_none() {
        return Err(ClientError::Unsupported(format!("unknown class {}", class_name)));
    }
    Ok(call)
}

/// Parses a method name such as `Get` or `Enumerate`.
pub fn resolve_method(name: &str) -> Result<WsmanMethod, ClientError> {
    WsmanMethod::parse(name)
        .ok_or_else(|| ClientError::Unsupported(format!("unknown method {}", name)))
}

fn check_supported(call: &ApiCall, method: WsmanMethod) -> Result<(), ClientError> {
    match call.allowed_methods() {
        None => Err(ClientError::Unsupported(format!("unknown class {}", call))),
        Some(methods) if !methods.contains(&method) => Err(ClientError::Unsupported(format!(
            "{} does not allow {}",
            call, method
        ))),
        Some(_) => Ok(()),
    }
}

fn usable_challenge(response: &HttpResponse) -> Result<DigestChallenge, ClientError> {
    let challenge = response
        .www_authenticate()
        .map(|value| parse_challenge(value))
        .ok_or(ClientError::InvalidChallenge)?;
    if !challenge.is_usable() {
        warn!("401 carried an unusable digest challenge");
        return Err(ClientError::InvalidChallenge);
    }
    Ok(challenge)
}

fn finish(response: HttpResponse) -> Result<WsmanResponse, ClientError> {
    match response.code() {
        200 => Ok(WsmanResponse {
            status: 200,
            body: response.body_text(),
        }),
        code => Err(ClientError::Status {
            code,
            reason: response.reason().to_string(),
            body: response.body_text(),
        }),
    }
}
