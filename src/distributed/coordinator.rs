//! Distributed coordinator
//!
//! This module implements the coordinator side of a run. The coordinator:
//! - Accepts connections until the expected peer population is reached
//! - Collects one HELLO (capacity) per peer
//! - Splits the global interval proportionally to capacity and sends one TASK per peer
//! - Collects one RESULT or ERROR per peer (an ERROR contributes 0)
//! - Sums the contributions once every peer has reported
//!
//! # Structure
//!
//! All run state lives in [`Session`], a plain state machine with no sockets.
//! [`Coordinator::run`] owns the listener and drives the session from a single
//! task: accepts and frame events from every connection are funneled through
//! one channel, so session state is never touched concurrently. Each
//! connection gets a reader task (frames in) and a writer task (frames out,
//! fed by an unbounded queue).
//!
//! Nothing blocks inside the session. Dispatch and finalization are
//! guard-and-return checks re-evaluated on every relevant event.
//!
//! # Phases
//!
//! ```text
//! Listening -> AwaitingPeers -> Dispatched -> Finalizing -> Done
//! ```

use crate::config::{CoordinatorConfig, TaskSpec};
use crate::distributed::framing::{FrameError, FrameReader, FrameWriter};
use crate::distributed::partition::{split_weighted, Span};
use crate::distributed::protocol::{decode, encode, Message, TaskMessage};
use crate::engine::Method;
use crate::util::time::{as_millis_f64, format_duration};
use anyhow::{Context, Result};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Index of a peer in accept order
pub type PeerId = usize;

/// How long an aborting coordinator waits for ERROR notices to go out
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// Pause after a failed `accept()` so a persistent error (e.g. EMFILE) does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Fewer than the expected number of peers have connected
    Listening,
    /// Population complete, waiting for HELLO from everyone
    AwaitingPeers,
    /// Tasks sent, no report yet
    Dispatched,
    /// At least one report in, waiting for the rest
    Finalizing,
    /// Final value computed
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Phase::Listening => "listening",
            Phase::AwaitingPeers => "awaiting peers",
            Phase::Dispatched => "dispatched",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a peer reported for its task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PeerOutcome {
    Result { value: f64 },
    Error { message: String },
}

impl PeerOutcome {
    /// Value added to the final sum
    pub fn contribution(&self) -> f64 {
        match self {
            PeerOutcome::Result { value } => *value,
            PeerOutcome::Error { .. } => 0.0,
        }
    }
}

/// Coordinator-side view of one peer
#[derive(Debug)]
pub struct PeerState {
    pub address: SocketAddr,
    /// Capacity from HELLO, 0 until then
    pub capacity: u32,
    pub hello_received: bool,
    /// Assigned sub-interval, set at dispatch
    pub span: Option<Span>,
    /// First report received (first write wins)
    pub outcome: Option<PeerOutcome>,
    /// Queue to the connection's writer task, `None` once the connection is gone
    outbox: Option<mpsc::UnboundedSender<Bytes>>,
}

impl PeerState {
    fn new(address: SocketAddr, outbox: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            address,
            capacity: 0,
            hello_received: false,
            span: None,
            outcome: None,
            outbox: Some(outbox),
        }
    }

    pub fn result_received(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.outbox.is_some()
    }

    /// Queue a message; returns false if the connection is gone.
    fn send(&self, message: &Message) -> bool {
        match &self.outbox {
            Some(outbox) => outbox.send(encode(message)).is_ok(),
            None => false,
        }
    }
}

/// Per-peer line of the final report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerReport {
    pub index: usize,
    pub address: SocketAddr,
    pub capacity: u32,
    pub span: Span,
    pub outcome: PeerOutcome,
}

/// Final result of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub value: f64,
    pub a: f64,
    pub b: f64,
    pub h: f64,
    pub method: Method,
    /// Wall-clock time from dispatch to the last report
    pub elapsed_ms: f64,
    /// Coordinator host name
    pub coordinator: String,
    pub peers: Vec<PeerReport>,
}

impl RunReport {
    /// Number of peers that reported an error instead of a value
    pub fn failed_peers(&self) -> usize {
        self.peers
            .iter()
            .filter(|p| matches!(p.outcome, PeerOutcome::Error { .. }))
            .count()
    }
}

/// Coordinator state machine
///
/// Driven by [`Session::admit`], [`Session::on_frame`] and
/// [`Session::on_closed`]. Outgoing frames are pushed to each peer's outbox.
pub struct Session {
    task: TaskSpec,
    expected: usize,
    phase: Phase,
    peers: Vec<PeerState>,
    dispatched_at: Option<Instant>,
    report: Option<RunReport>,
}

impl Session {
    pub fn new(task: TaskSpec, expected: usize) -> Self {
        Self {
            task,
            expected,
            phase: Phase::Listening,
            peers: Vec::with_capacity(expected),
            dispatched_at: None,
            report: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn peers(&self) -> &[PeerState] {
        &self.peers
    }

    /// True once the expected population has connected.
    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.expected
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched_at.is_some()
    }

    /// Take the final report once the session is done.
    pub fn take_report(&mut self) -> Option<RunReport> {
        self.report.take()
    }

    /// Register a new connection. Returns `None` when the population is
    /// already complete; the caller must close such a connection.
    pub fn admit(&mut self, address: SocketAddr, outbox: mpsc::UnboundedSender<Bytes>) -> Option<PeerId> {
        if self.is_full() {
            return None;
        }

        let peer = self.peers.len();
        self.peers.push(PeerState::new(address, outbox));
        tracing::info!(
            peer,
            address = %address,
            connected = self.peers.len(),
            expected = self.expected,
            "peer connected"
        );

        if self.is_full() {
            self.phase = Phase::AwaitingPeers;
        }
        Some(peer)
    }

    /// Handle one frame payload from `peer`.
    ///
    /// Malformed frames are logged and dropped; the connection stays up.
    pub fn on_frame(&mut self, peer: PeerId, payload: &[u8]) {
        let Some(address) = self.peers.get(peer).map(|p| p.address) else {
            tracing::warn!(peer, "frame from unknown peer");
            return;
        };

        if self.phase == Phase::Done {
            tracing::debug!(peer, "ignoring frame received after completion");
            return;
        }

        let message = match decode(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(peer, address = %address, error = %e, "rejected frame");
                return;
            }
        };

        match message {
            Message::Hello(hello) => self.on_hello(peer, hello.cores),
            Message::Result(result) => self.on_report(peer, PeerOutcome::Result { value: result.value }),
            Message::Error(error) => self.on_report(peer, PeerOutcome::Error { message: error.text }),
            Message::Task(_) => {
                tracing::warn!(peer, address = %address, "ignoring TASK sent by a peer");
            }
        }
    }

    /// The connection to `peer` is gone.
    pub fn on_closed(&mut self, peer: PeerId, error: Option<FrameError>) {
        let done = self.phase == Phase::Done;
        let Some(state) = self.peers.get_mut(peer) else {
            return;
        };
        state.outbox = None;

        match error {
            Some(e) => {
                tracing::warn!(peer, address = %state.address, error = %e, "connection failed");
            }
            None if !done && !state.result_received() => {
                tracing::warn!(peer, address = %state.address, "peer disconnected before reporting");
            }
            None => {
                tracing::debug!(peer, address = %state.address, "peer disconnected");
            }
        }
    }

    /// Tell every connected peer the run is over and drop all connections.
    pub fn abort(&mut self, reason: &str) {
        for state in &mut self.peers {
            if state.is_connected() && !state.result_received() {
                state.send(&Message::error(reason));
            }
            state.outbox = None;
        }
    }

    /// Describe who the session is still waiting on.
    pub fn pending_description(&self) -> String {
        let list = |ids: Vec<String>| if ids.is_empty() { "none".to_string() } else { ids.join(", ") };

        if !self.is_dispatched() {
            let silent: Vec<String> = self
                .peers
                .iter()
                .filter(|p| !p.hello_received)
                .map(|p| p.address.to_string())
                .collect();
            format!(
                "{}/{} peers connected, waiting for HELLO from: {}",
                self.peers.len(),
                self.expected,
                list(silent)
            )
        } else {
            let missing: Vec<String> = self
                .peers
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.result_received())
                .map(|(i, p)| format!("#{} ({})", i, p.address))
                .collect();
            format!("waiting for results from: {}", list(missing))
        }
    }

    fn on_hello(&mut self, peer: PeerId, cores: u32) {
        let state = &mut self.peers[peer];
        if state.hello_received {
            tracing::warn!(peer, address = %state.address, cores, "duplicate HELLO ignored");
            return;
        }
        if self.dispatched_at.is_some() {
            tracing::warn!(peer, address = %state.address, "HELLO after dispatch ignored");
            return;
        }

        state.hello_received = true;
        state.capacity = cores;
        tracing::info!(peer, address = %state.address, cores, "peer said hello");

        self.maybe_dispatch();
    }

    fn maybe_dispatch(&mut self) {
        if self.dispatched_at.is_some() {
            return;
        }
        if !self.is_full() {
            return;
        }
        if !self.peers.iter().all(|p| p.hello_received) {
            return;
        }

        let capacities: Vec<u32> = self.peers.iter().map(|p| p.capacity).collect();
        let spans = split_weighted(self.task.a, self.task.b, &capacities);
        let peer_count = u32::try_from(self.peers.len()).unwrap_or(u32::MAX);

        tracing::info!(
            peers = self.peers.len(),
            total_capacity = capacities.iter().map(|&c| u64::from(c.max(1))).sum::<u64>(),
            a = self.task.a,
            b = self.task.b,
            h = self.task.h,
            method = %self.task.method,
            "dispatching tasks"
        );

        for (index, (state, span)) in self.peers.iter_mut().zip(spans).enumerate() {
            state.span = Some(span);
            let task = TaskMessage {
                a: span.a,
                b: span.b,
                h: self.task.h,
                method: self.task.method,
                peer_index: u32::try_from(index).unwrap_or(u32::MAX),
                peer_count,
            };

            if state.send(&Message::Task(task)) {
                tracing::info!(peer = index, address = %state.address, a = span.a, b = span.b, "task sent");
            } else {
                tracing::warn!(peer = index, address = %state.address, "peer gone, task not delivered");
            }
        }

        self.dispatched_at = Some(Instant::now());
        self.phase = Phase::Dispatched;
    }

    fn on_report(&mut self, peer: PeerId, outcome: PeerOutcome) {
        let state = &mut self.peers[peer];
        if self.dispatched_at.is_none() {
            tracing::warn!(peer, address = %state.address, "report before dispatch ignored");
            return;
        }
        if state.result_received() {
            tracing::warn!(peer, address = %state.address, "duplicate report ignored");
            return;
        }

        match &outcome {
            PeerOutcome::Result { value } => {
                tracing::info!(peer, address = %state.address, value, "peer reported");
            }
            PeerOutcome::Error { message } => {
                tracing::warn!(
                    peer,
                    address = %state.address,
                    message = %message,
                    "peer reported an error, contributing 0"
                );
            }
        }
        state.outcome = Some(outcome);
        self.phase = Phase::Finalizing;

        self.maybe_finalize();
    }

    fn maybe_finalize(&mut self) {
        if self.phase == Phase::Done {
            return;
        }
        let Some(dispatched_at) = self.dispatched_at else {
            return;
        };

        let mut reports = Vec::with_capacity(self.peers.len());
        for (index, state) in self.peers.iter().enumerate() {
            let (Some(span), Some(outcome)) = (state.span, state.outcome.clone()) else {
                return;
            };
            reports.push(PeerReport {
                index,
                address: state.address,
                capacity: state.capacity,
                span,
                outcome,
            });
        }

        let value: f64 = reports.iter().map(|r| r.outcome.contribution()).sum();
        let elapsed = dispatched_at.elapsed();

        tracing::info!(
            value,
            elapsed = %format_duration(elapsed),
            failed_peers = reports.iter().filter(|r| matches!(r.outcome, PeerOutcome::Error { .. })).count(),
            "FINAL RESULT"
        );

        self.report = Some(RunReport {
            value,
            a: self.task.a,
            b: self.task.b,
            h: self.task.h,
            method: self.task.method,
            elapsed_ms: as_millis_f64(elapsed),
            coordinator: crate::util::node_id(),
            peers: reports,
        });
        self.phase = Phase::Done;

        // Writers flush what is queued and close
        for state in &mut self.peers {
            state.outbox = None;
        }
    }
}

/// Events from connection tasks to the control loop
enum PeerEvent {
    Frame { peer: PeerId, payload: Bytes },
    Closed { peer: PeerId, error: Option<FrameError> },
}

/// Distributed coordinator
///
/// Binds the listener at construction so the actual port is known before
/// [`Coordinator::run`] starts accepting.
pub struct Coordinator {
    config: CoordinatorConfig,
    listener: TcpListener,
}

impl Coordinator {
    pub async fn bind(config: CoordinatorConfig) -> Result<Self> {
        let addr = SocketAddr::new(config.bind_addr, config.port);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind coordinator to {}", addr))?;

        Ok(Self { config, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read coordinator listen address")
    }

    /// Run until every peer has reported, returning the final report.
    ///
    /// Fails only on a listener error or when the optional phase timeout
    /// expires; peer-level failures are logged and absorbed.
    pub async fn run(self) -> Result<RunReport> {
        let local_addr = self.local_addr()?;
        let Self { config, listener } = self;

        let mut session = Session::new(config.task, config.expected_peers);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut connections = JoinSet::new();

        let phase_timeout = config.phase_timeout_secs.map(Duration::from_secs);
        let mut phase_started = tokio::time::Instant::now();
        let mut waiting_for_results = false;

        tracing::info!(
            address = %local_addr,
            expected_peers = config.expected_peers,
            node_id = %crate::util::node_id(),
            "listening for peers"
        );

        loop {
            if let Some(report) = session.take_report() {
                return Ok(report);
            }

            if session.is_dispatched() && !waiting_for_results {
                waiting_for_results = true;
                phase_started = tokio::time::Instant::now();
            }
            let deadline = phase_timeout.map(|t| phase_started + t);

            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        accept_connection(&mut session, &mut connections, &events_tx, stream, addr);
                    }
                    Err(e) => back_off_after_accept_error(&e).await,
                },
                Some(event) = events_rx.recv() => match event {
                    PeerEvent::Frame { peer, payload } => session.on_frame(peer, &payload),
                    PeerEvent::Closed { peer, error } => session.on_closed(peer, error),
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)),
                    if deadline.is_some() =>
                {
                    let reason = format!(
                        "timed out in phase '{}': {}",
                        session.phase(),
                        session.pending_description()
                    );
                    tracing::error!(reason = %reason, "aborting run");
                    session.abort(&reason);
                    drop(session);

                    // Let writers deliver the ERROR notices
                    let _ = tokio::time::timeout(ABORT_GRACE, async {
                        while connections.join_next().await.is_some() {}
                    })
                    .await;

                    anyhow::bail!("run aborted: {}", reason);
                }
            }
        }
    }
}

async fn back_off_after_accept_error(error: &std::io::Error) {
    tracing::warn!(error = %error, backoff = ?ACCEPT_BACKOFF, "failed to accept connection");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

fn accept_connection(
    session: &mut Session,
    connections: &mut JoinSet<()>,
    events: &mpsc::UnboundedSender<PeerEvent>,
    stream: TcpStream,
    addr: SocketAddr,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(address = %addr, error = %e, "failed to set TCP_NODELAY");
    }

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let Some(peer) = session.admit(addr, outbox_tx) else {
        tracing::warn!(address = %addr, "population complete, closing surplus connection");
        return;
    };

    let (read_half, write_half) = stream.into_split();
    connections.spawn(read_loop(peer, read_half, events.clone()));
    connections.spawn(write_loop(peer, write_half, outbox_rx));
}

async fn read_loop(peer: PeerId, read_half: OwnedReadHalf, events: mpsc::UnboundedSender<PeerEvent>) {
    let mut reader = FrameReader::new(read_half);
    let error = loop {
        match reader.next_frame().await {
            Ok(Some(payload)) => {
                if events.send(PeerEvent::Frame { peer, payload }).is_err() {
                    return;
                }
            }
            Ok(None) => break None,
            Err(e) => break Some(e),
        }
    };
    let _ = events.send(PeerEvent::Closed { peer, error });
}

async fn write_loop(peer: PeerId, write_half: OwnedWriteHalf, mut outbox: mpsc::UnboundedReceiver<Bytes>) {
    let mut writer = FrameWriter::new(write_half);
    while let Some(payload) = outbox.recv().await {
        if let Err(e) = writer.send_frame(&payload).await {
            tracing::warn!(peer, error = %e, "failed to send frame");
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(peer, error = %e, "failed to close connection");
    }
}
