// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use async_trait::async_trait;
use bytes::Bytes;
use wsman_core::HttpResponse;
use wsman_transport::{SocketSession, TransportError};

/// One request/response round trip with the device.
#[async_trait]
pub trait HttpExchange: Send + Sync {
    /// Makes sure a connection exists before a request is sent.
    async fn ensure_connected(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn exchange(&self, message: Bytes) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl HttpExchange for SocketSession {
    async fn ensure_connected(&self) -> Result<(), TransportError> {
        self.connect().await.map(|_| ())
    }

    async fn exchange(&self, message: Bytes) -> Result<HttpResponse, TransportError> {
        self.write(message).await
    }
}
