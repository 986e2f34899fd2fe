//! Virtual client: one connection issuing one request at a time until the deadline.

use super::deadline::{Expired, RunClock};
use super::sample::LatencySample;
use crate::utils::error::{BenchError, Result};
use crate::workload::{ResponseFrame, Workload};
use bytes::{Bytes, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Exponentially distributed think time with an upper bound.
#[derive(Debug, Clone, Copy)]
pub struct ThinkTime {
    exp: Exp<f64>,
    max: Duration,
}

impl ThinkTime {
    pub fn new(mean: Duration, max: Duration) -> Result<Self> {
        if mean.is_zero() {
            return Err(BenchError::Config(
                "think time mean must be greater than 0".to_string(),
            ));
        }
        let exp = Exp::new(1.0 / mean.as_secs_f64())
            .map_err(|e| BenchError::Config(format!("Invalid think time mean: {}", e)))?;
        Ok(Self { exp, max })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = self.exp.sample(rng).min(self.max.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Everything a client needs from its group; shared by reference.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub host: Arc<str>,
    pub port: u16,
    pub workload: Arc<dyn Workload>,
    pub clock: RunClock,
    pub think: ThinkTime,
    pub reconnect_backoff: Duration,
    pub response_buffer: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Sending,
    AwaitingResponse,
    Thinking,
    Reconnecting,
    Terminated,
}

/// How a client reacts to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Connection-level failure; raises `error_reconnect`
    Reconnect,
    /// Anything else; raises `error_abort`. The client still reconnects.
    Abort,
}

impl FaultKind {
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::AddrNotAvailable => FaultKind::Reconnect,
            _ => FaultKind::Abort,
        }
    }
}

#[derive(Debug)]
struct Fault {
    kind: FaultKind,
    reason: String,
}

impl Fault {
    fn abort(reason: impl fmt::Display) -> Self {
        Self {
            kind: FaultKind::Abort,
            reason: reason.to_string(),
        }
    }
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        Self {
            kind: FaultKind::classify(&err),
            reason: err.to_string(),
        }
    }
}

/// Why a connected session stopped.
enum SessionEnd {
    Deadline,
    Fault(Fault),
}

impl From<Expired> for SessionEnd {
    fn from(_: Expired) -> Self {
        SessionEnd::Deadline
    }
}

/// Result of one client's run, handed back to its group.
#[derive(Debug, Clone, Default)]
pub struct ClientReport {
    pub id: u64,
    pub samples: Vec<LatencySample>,
    pub error_abort: bool,
    pub error_reconnect: bool,
    pub connections: u64,
}

#[derive(Debug)]
pub struct VirtualClient {
    id: u64,
    state: ClientState,
    samples: Vec<LatencySample>,
    error_abort: bool,
    error_reconnect: bool,
    /// Set by a fault; the next attempt keeps timing the same logical request
    recovering: bool,
    request_start: Option<Instant>,
    seq: u64,
    connections: u64,
    rng: StdRng,
}

impl VirtualClient {
    pub fn new(id: u64) -> Self {
        Self::with_rng(id, StdRng::from_entropy())
    }

    /// Client with a reproducible think-time and payload sequence
    pub fn with_seed(id: u64, seed: u64) -> Self {
        Self::with_rng(id, StdRng::seed_from_u64(seed))
    }

    fn with_rng(id: u64, rng: StdRng) -> Self {
        Self {
            id,
            state: ClientState::Connecting,
            samples: Vec::new(),
            error_abort: false,
            error_reconnect: false,
            recovering: false,
            request_start: None,
            seq: 0,
            connections: 0,
            rng,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Move to `next`, returning the state left behind
    fn transition(&mut self, next: ClientState) -> ClientState {
        let previous = std::mem::replace(&mut self.state, next);
        if previous != next {
            trace!(client = self.id, from = ?previous, to = ?next, "Client state");
        }
        previous
    }

    /// Run until the deadline and report everything this client measured.
    pub async fn run(mut self, ctx: &ClientContext) -> ClientReport {
        let deadline = ctx.clock.deadline();

        while !deadline.has_passed() {
            self.transition(if self.recovering {
                ClientState::Reconnecting
            } else {
                ClientState::Connecting
            });

            let connect = TcpStream::connect((&*ctx.host, ctx.port));
            let mut stream = match deadline.bound(connect).await {
                Err(Expired) => break,
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    if self.on_fault(Fault::from(e), ctx).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            self.connections += 1;
            if let Err(e) = stream.set_nodelay(true) {
                trace!(client = self.id, error = %e, "Failed to set TCP_NODELAY");
            }

            let end = self.session(&mut stream, ctx).await;

            // Graceful shutdown to avoid CLOSE-WAIT; dropping the stream closes it
            // on every other path, cancellation included.
            let _ = stream.shutdown().await;
            drop(stream);

            match end {
                SessionEnd::Deadline => break,
                SessionEnd::Fault(fault) => {
                    if self.on_fault(fault, ctx).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.transition(ClientState::Terminated);
        trace!(
            client = self.id,
            samples = self.samples.len(),
            connections = self.connections,
            "Client terminated"
        );

        ClientReport {
            id: self.id,
            samples: self.samples,
            error_abort: self.error_abort,
            error_reconnect: self.error_reconnect,
            connections: self.connections,
        }
    }

    /// Request loop on one live connection.
    async fn session(&mut self, stream: &mut TcpStream, ctx: &ClientContext) -> SessionEnd {
        let deadline = ctx.clock.deadline();

        loop {
            if deadline.has_passed() {
                return SessionEnd::Deadline;
            }

            self.transition(ClientState::Sending);
            let request = ctx.workload.next_request(self.id, self.seq, &mut self.rng);

            let start = match (self.recovering, self.request_start) {
                (true, Some(start)) => start,
                _ => Instant::now(),
            };
            self.request_start = Some(start);

            match deadline.bound(stream.write_all(&request)).await {
                Err(expired) => return expired.into(),
                Ok(Err(e)) => return SessionEnd::Fault(e.into()),
                Ok(Ok(())) => {}
            }

            self.transition(ClientState::AwaitingResponse);
            let frame = ctx.workload.response_frame(&request);
            let response = match deadline
                .bound(read_response(stream, frame, ctx.response_buffer))
                .await
            {
                Err(expired) => return expired.into(),
                Ok(Err(e)) => return SessionEnd::Fault(e.into()),
                Ok(Ok(response)) => response,
            };
            let duration = start.elapsed();

            if let Err(e) = ctx.workload.check_response(&request, &response) {
                return SessionEnd::Fault(Fault::abort(e));
            }

            if ctx.clock.in_measurement(start) {
                self.samples
                    .push(LatencySample::new(ctx.clock.offset(start), duration));
            }
            trace!(client = self.id, seq = self.seq, ?duration, "Response received");

            self.seq += 1;
            self.recovering = false;
            self.request_start = None;

            self.transition(ClientState::Thinking);
            let think = ctx.think.sample(&mut self.rng);
            if let Err(expired) = deadline.sleep(think).await {
                return expired.into();
            }
        }
    }

    /// Record a fault and pause before the next connection attempt.
    async fn on_fault(&mut self, fault: Fault, ctx: &ClientContext) -> std::result::Result<(), Expired> {
        match fault.kind {
            FaultKind::Reconnect => {
                if !self.error_reconnect {
                    warn!(client = self.id, reason = %fault.reason, "Connection fault, reconnecting");
                }
                self.error_reconnect = true;
            }
            FaultKind::Abort => {
                if !self.error_abort {
                    warn!(client = self.id, reason = %fault.reason, "Unexpected fault, reconnecting");
                }
                self.error_abort = true;
            }
        }
        debug!(client = self.id, kind = ?fault.kind, reason = %fault.reason, "Client fault");

        self.recovering = true;
        self.transition(ClientState::Reconnecting);

        if ctx.reconnect_backoff.is_zero() {
            tokio::task::yield_now().await;
            Ok(())
        } else {
            ctx.clock.deadline().sleep(ctx.reconnect_backoff).await
        }
    }
}

async fn read_response(
    stream: &mut TcpStream,
    frame: ResponseFrame,
    buffer: usize,
) -> io::Result<Bytes> {
    match frame {
        ResponseFrame::Exact(len) => {
            let mut buf = BytesMut::zeroed(len);
            stream.read_exact(&mut buf).await?;
            Ok(buf.freeze())
        }
        ResponseFrame::Any => {
            let mut buf = BytesMut::with_capacity(buffer);
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the connection",
                ));
            }
            Ok(buf.freeze())
        }
    }
}
