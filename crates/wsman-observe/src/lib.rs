// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Observability hooks for WSMAN sessions.
//!
//! Transports and the client report connects, request/response traffic,
//! digest retries, failures and latency through a process-wide
//! [`TransportMetrics`] sink. Nothing is reported until a sink is installed.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use wsman_observe::{set_transport_metrics, TracingTransportMetrics};
//! set_transport_metrics(Arc::new(TracingTransportMetrics));
//! // Metrics are now emitted as tracing events
//! ```

use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::Level;

/// Metrics sink for session traffic.
///
/// `stage` and `op` are low-cardinality identifiers such as `"connect"`,
/// `"read"` or `"exchange"`. Endpoint addresses are never passed here; they
/// belong on spans.
pub trait TransportMetrics: Send + Sync + 'static {
    fn on_connect(&self);
    fn on_request_sent(&self, bytes: usize);
    fn on_response_received(&self, status: u16, bytes: usize);
    fn on_error(&self, stage: &str);
    fn on_auth_retry(&self);
    fn on_latency(&self, op: &str, nanos: u64);
}

#[derive(Debug, Default)]
struct NoopTransportMetrics;

impl TransportMetrics for NoopTransportMetrics {
    fn on_connect(&self) {}
    fn on_request_sent(&self, _bytes: usize) {}
    fn on_response_received(&self, _status: u16, _bytes: usize) {}
    fn on_error(&self, _stage: &str) {}
    fn on_auth_retry(&self) {}
    fn on_latency(&self, _op: &str, _nanos: u64) {}
}

static TRANSPORT_METRICS: OnceCell<Arc<dyn TransportMetrics>> = OnceCell::new();
static NOOP_TRANSPORT_METRICS: NoopTransportMetrics = NoopTransportMetrics;

/// Installs the global metrics sink.
///
/// Returns `false` if a sink was already installed.
pub fn set_transport_metrics(metrics: Arc<dyn TransportMetrics>) -> bool {
    TRANSPORT_METRICS.set(metrics).is_ok()
}

/// Returns the installed sink, or a no-op sink.
pub fn transport_metrics() -> &'static dyn TransportMetrics {
    TRANSPORT_METRICS
        .get()
        .map(|arc| arc.as_ref())
        .unwrap_or(&NOOP_TRANSPORT_METRICS)
}

/// Span for one session operation against `peer`.
pub fn span_with_endpoint(op: &'static str, peer: &str) -> tracing::Span {
    tracing::span!(Level::INFO, "wsman", op = op, peer = peer)
}

/// Logs every metric as a `tracing` event.
#[derive(Debug, Default)]
pub struct TracingTransportMetrics;

impl TransportMetrics for TracingTransportMetrics {
    fn on_connect(&self) {
        tracing::debug!("connect");
    }

    fn on_request_sent(&self, bytes: usize) {
        tracing::debug!(bytes, "request sent");
    }

    fn on_response_received(&self, status: u16, bytes: usize) {
        tracing::debug!(status, bytes, "response received");
    }

    fn on_error(&self, stage: &str) {
        tracing::warn!(stage, "transport error");
    }

    fn on_auth_retry(&self) {
        tracing::debug!("digest challenge retry");
    }

    fn on_latency(&self, op: &str, nanos: u64) {
        tracing::debug!(op, nanos, "latency");
    }
}

/// In-process counters, for tests and simple status reporting.
#[derive(Debug, Default)]
pub struct CountingTransportMetrics {
    pub connects: AtomicU64,
    pub requests: AtomicU64,
    pub responses: AtomicU64,
    pub errors: AtomicU64,
    pub auth_retries: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
}

impl CountingTransportMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            auth_retries: self.auth_retries.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

impl TransportMetrics for CountingTransportMetrics {
    fn on_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    fn on_request_sent(&self, bytes: usize) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn on_response_received(&self, _status: u16, bytes: usize) {
        self.responses.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn on_error(&self, _stage: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn on_auth_retry(&self) {
        self.auth_retries.fetch_add(1, Ordering::Relaxed);
    }

    fn on_latency(&self, _op: &str, _nanos: u64) {}
}

/// Point-in-time copy of [`CountingTransportMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connects: u64,
    pub requests: u64,
    pub responses: u64,
    pub errors: u64,
    pub auth_retries: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}
