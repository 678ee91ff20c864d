// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};
use wsman_core::{HttpResponse, SessionEndpoint};
use wsman_observe::{span_with_endpoint, transport_metrics};
use wsman_parse::ResponseFramer;

use crate::{SessionConfig, SessionEvent, SessionState, TransportError};

const EVENT_CAPACITY: usize = 16;
const READ_CHUNK: usize = 8 * 1024;

type ResponseSlot = oneshot::Sender<Result<HttpResponse, TransportError>>;

/// A persistent TCP connection to one AMT device.
///
/// At most one request may be in flight. The session never reconnects on its
/// own: after an idle timeout, peer close or I/O error it is `Closed` until
/// [`connect`](Self::connect) is called again.
pub struct SocketSession {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: SessionEndpoint,
    config: SessionConfig,
    state: Mutex<SessionState>,
    pending: Mutex<Option<ResponseSlot>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    /// Held for the whole of a dial so concurrent `connect` calls wait for
    /// its result instead of reporting `Connecting`.
    dialing: tokio::sync::Mutex<()>,
    /// Identifies the live connection; bumped whenever one is torn down so a
    /// stale reader cannot close its successor.
    generation: AtomicU64,
    activity: Notify,
    events: broadcast::Sender<SessionEvent>,
}

impl SocketSession {
    pub fn new(endpoint: SessionEndpoint, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                endpoint,
                config,
                state: Mutex::new(SessionState::Disconnected),
                pending: Mutex::new(None),
                writer: tokio::sync::Mutex::new(None),
                reader: Mutex::new(None),
                dialing: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                activity: Notify::new(),
                events,
            }),
        }
    }

    pub fn endpoint(&self) -> &SessionEndpoint {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Lifecycle events for this session.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Opens the connection.
    ///
    /// Returns the current state without dialing when already connected. A
    /// call made while another is dialing waits for that dial to finish.
    /// Dropping the returned future before it completes leaves the session
    /// `Disconnected`.
    pub async fn connect(&self) -> Result<SessionState, TransportError> {
        let _dialing = self.inner.dialing.lock().await;
        {
            let mut state = self.inner.state.lock();
            match *state {
                SessionState::Disconnected | SessionState::Closed => {
                    *state = SessionState::Connecting;
                }
                current => return Ok(current),
            }
        }
        let mut dial_guard = DialGuard {
            state: &self.inner.state,
            armed: true,
        };

        let endpoint = &self.inner.endpoint;
        let started = Instant::now();
        let dial = TcpStream::connect((endpoint.host(), endpoint.port()));
        let stream = match tokio::time::timeout(self.inner.config.connect_timeout, dial).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.connect_failed(e.to_string())),
            Err(_) => return Err(self.connect_failed("connect timed out".to_string())),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %endpoint, error = %e, "set_nodelay failed");
        }

        let (read_half, write_half) = stream.into_split();
        *self.inner.writer.lock().await = Some(write_half);

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let span = span_with_endpoint("session", &endpoint.to_string());
        let handle = tokio::spawn(
            read_loop(Arc::clone(&self.inner), read_half, generation).instrument(span),
        );
        *self.inner.reader.lock() = Some(handle);

        dial_guard.armed = false;
        *self.inner.state.lock() = SessionState::Idle;
        transport_metrics().on_connect();
        transport_metrics().on_latency("connect", started.elapsed().as_nanos() as u64);
        info!(peer = %endpoint, "connected");
        let _ = self.inner.events.send(SessionEvent::Connected);
        Ok(SessionState::Idle)
    }

    fn connect_failed(&self, reason: String) -> TransportError {
        *self.inner.state.lock() = SessionState::Disconnected;
        transport_metrics().on_error("connect");
        warn!(peer = %self.inner.endpoint, %reason, "connect failed");
        let _ = self.inner.events.send(SessionEvent::Error(reason.clone()));
        TransportError::Connect {
            endpoint: self.inner.endpoint.to_string(),
            reason,
        }
    }

    /// Sends one complete request and waits for one complete response.
    pub async fn write(&self, message: Bytes) -> Result<HttpResponse, TransportError> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                SessionState::Idle => *state = SessionState::AwaitingResponse,
                SessionState::AwaitingResponse => return Err(TransportError::Busy),
                _ => return Err(TransportError::NotConnected),
            }
        }

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        *self.inner.pending.lock() = Some(tx);
        let mut in_flight = InFlight {
            inner: &self.inner,
            generation,
            phase: Phase::Queued,
        };

        let sent = {
            let mut writer = self.inner.writer.lock().await;
            match writer.as_mut() {
                Some(w) => {
                    in_flight.phase = Phase::OnWire;
                    match w.write_all(&message).await {
                        Ok(()) => w.flush().await,
                        Err(e) => Err(e),
                    }
                }
                None => return Err(TransportError::NotConnected),
            }
        };
        if let Err(e) = sent {
            in_flight.phase = Phase::Settled;
            warn!(peer = %self.inner.endpoint, error = %e, "write failed");
            transport_metrics().on_error("write");
            let err = TransportError::from(e);
            self.inner
                .shut_down(
                    generation,
                    SessionState::Closed,
                    err.clone(),
                    SessionEvent::Error(err.to_string()),
                )
                .await;
            self.abort_reader();
            return Err(err);
        }

        self.inner.activity.notify_one();
        transport_metrics().on_request_sent(message.len());
        debug!(peer = %self.inner.endpoint, bytes = message.len(), "request sent");

        let started = Instant::now();
        let answer = tokio::time::timeout(self.inner.config.request_timeout, rx).await;
        in_flight.phase = Phase::Settled;
        match answer {
            Ok(Ok(result)) => {
                transport_metrics().on_latency("exchange", started.elapsed().as_nanos() as u64);
                result
            }
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => {
                warn!(peer = %self.inner.endpoint, "request deadline exceeded, closing socket");
                transport_metrics().on_error("deadline");
                self.inner
                    .shut_down(
                        generation,
                        SessionState::Closed,
                        TransportError::RequestTimeout,
                        SessionEvent::Closed {
                            reason: "request deadline exceeded".to_string(),
                        },
                    )
                    .await;
                self.abort_reader();
                Err(TransportError::RequestTimeout)
            }
        }
    }

    /// Closes the connection and fails any pending request with
    /// [`TransportError::ConnectionClosed`]. The session can be reconnected.
    pub async fn close(&self) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner
            .shut_down(
                generation,
                SessionState::Disconnected,
                TransportError::ConnectionClosed,
                SessionEvent::Closed {
                    reason: "closed by caller".to_string(),
                },
            )
            .await;
        self.abort_reader();
        *self.inner.state.lock() = SessionState::Disconnected;
        debug!(peer = %self.inner.endpoint, "session closed");
    }

    fn abort_reader(&self) {
        self.inner.abort_reader();
    }
}

/// Returns a dial that did not finish to `Disconnected`.
struct DialGuard<'a> {
    state: &'a Mutex<SessionState>,
    armed: bool,
}

impl Drop for DialGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        if *state == SessionState::Connecting {
            *state = SessionState::Disconnected;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the write half; nothing has been sent.
    Queued,
    /// Bytes may be on the wire and a response may follow.
    OnWire,
    /// The request has its answer or was already torn down.
    Settled,
}

/// Undoes a `write` whose future was dropped before it finished.
///
/// A request that never reached the socket frees the session again. One that
/// may have been sent closes the connection: its response, or the rest of a
/// partial write, would otherwise be taken for the next request's.
struct InFlight<'a> {
    inner: &'a Arc<Inner>,
    generation: u64,
    phase: Phase,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        match self.phase {
            Phase::Settled => {}
            Phase::Queued => {
                if self.inner.generation.load(Ordering::SeqCst) != self.generation {
                    return;
                }
                self.inner.pending.lock().take();
                let mut state = self.inner.state.lock();
                if *state == SessionState::AwaitingResponse {
                    *state = SessionState::Idle;
                }
            }
            Phase::OnWire => self.inner.abandon(self.generation),
        }
    }
}

impl Drop for SocketSession {
    fn drop(&mut self) {
        self.abort_reader();
        if let Some(tx) = self.inner.pending.lock().take() {
            let _ = tx.send(Err(TransportError::ConnectionClosed));
        }
    }
}

impl Inner {
    /// Tears down connection `generation`. Returns `false` if that connection
    /// was already gone.
    async fn shut_down(
        &self,
        generation: u64,
        next: SessionState,
        error: TransportError,
        event: SessionEvent,
    ) -> bool {
        if self
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        // The writer and pending slot are released before the state changes so
        // a reconnect cannot have its new ones taken here.
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        let pending = self.pending.lock().take();
        *self.state.lock() = next;
        if let Some(tx) = pending {
            let _ = tx.send(Err(error));
        }
        let _ = self.events.send(event);
        true
    }

    /// Synchronous teardown for a request cancelled mid-flight.
    fn abandon(&self, generation: u64) {
        if self
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.abort_reader();
        // Dropping the write half shuts down its direction of the socket.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        self.pending.lock().take();
        *self.state.lock() = SessionState::Closed;
        transport_metrics().on_error("cancelled");
        debug!(peer = %self.endpoint, "request cancelled, connection dropped");
        let _ = self.events.send(SessionEvent::Closed {
            reason: "request cancelled".to_string(),
        });
    }

    fn abort_reader(&self) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
    }

    fn deliver(&self, response: HttpResponse) {
        transport_metrics().on_response_received(response.code(), response.body().len());
        let slot = self.pending.lock().take();
        match slot {
            Some(tx) => {
                {
                    let mut state = self.state.lock();
                    if *state == SessionState::AwaitingResponse {
                        *state = SessionState::Idle;
                    }
                }
                debug!(
                    peer = %self.endpoint,
                    status = response.code(),
                    bytes = response.body().len(),
                    "response received"
                );
                let _ = tx.send(Ok(response));
            }
            None => {
                warn!(
                    peer = %self.endpoint,
                    status = response.code(),
                    "discarding unsolicited response"
                );
            }
        }
    }
}

async fn read_loop(inner: Arc<Inner>, mut reader: OwnedReadHalf, generation: u64) {
    let mut framer = ResponseFramer::new();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let idle = inner.config.idle_timeout;

    loop {
        buf.clear();
        tokio::select! {
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    if let Some(response) = framer.finish() {
                        inner.deliver(response);
                    }
                    debug!(peer = %inner.endpoint, "connection closed by peer");
                    inner
                        .shut_down(
                            generation,
                            SessionState::Closed,
                            TransportError::ConnectionClosed,
                            SessionEvent::Closed { reason: "closed by peer".to_string() },
                        )
                        .await;
                    return;
                }
                Ok(n) => {
                    framer.push(&buf[..n]);
                    while let Some(response) = framer.next_response() {
                        inner.deliver(response);
                    }
                    let dropped = framer.take_discarded();
                    if dropped > 0 {
                        debug!(peer = %inner.endpoint, bytes = dropped, "discarded unframeable bytes");
                    }
                }
                Err(e) => {
                    warn!(peer = %inner.endpoint, error = %e, "read failed");
                    transport_metrics().on_error("read");
                    let err = TransportError::from(e);
                    inner
                        .shut_down(
                            generation,
                            SessionState::Closed,
                            err.clone(),
                            SessionEvent::Error(err.to_string()),
                        )
                        .await;
                    return;
                }
            },
            _ = inner.activity.notified() => {}
            _ = tokio::time::sleep(idle) => {
                info!(peer = %inner.endpoint, idle_ms = idle.as_millis() as u64, "inactivity timeout");
                transport_metrics().on_error("idle");
                inner
                    .shut_down(
                        generation,
                        SessionState::Closed,
                        TransportError::TimedOut,
                        SessionEvent::TimedOut,
                    )
                    .await;
                return;
            }
        }
    }
}
