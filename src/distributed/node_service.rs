//! Node service (worker peer)
//!
//! This module implements the peer side of a run. The node service:
//! - Connects to the coordinator and announces its capacity with HELLO
//! - Waits for exactly one TASK
//! - Integrates the assigned sub-interval on its execution unit
//! - Sends RESULT, or ERROR if the computation failed, then disconnects
//!
//! Malformed frames from the coordinator are logged and dropped; the
//! connection stays up. An ERROR from the coordinator ends the service.

use crate::config::WorkerConfig;
use crate::distributed::framing::{FrameReader, FrameWriter};
use crate::distributed::protocol::{decode, encode, Message, TaskMessage};
use crate::util::time::format_duration;
use crate::worker::ExecutionUnit;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// How a node service run ended
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// The task was computed and the value reported
    Completed { value: f64 },
    /// The task failed locally and an ERROR was reported instead
    Failed { message: String },
    /// The coordinator sent an ERROR
    Rejected { message: String },
    /// The coordinator closed the connection before sending a task
    Disconnected,
}

/// Node service
///
/// Runs on each peer machine, computing one sub-interval for the coordinator.
pub struct NodeService {
    config: WorkerConfig,

    /// Node identifier (hostname)
    node_id: String,

    unit: Arc<ExecutionUnit>,
}

impl NodeService {
    /// Create a new node service and its execution unit
    pub fn new(config: WorkerConfig) -> Result<Self> {
        let capacity = config.effective_capacity();
        let unit = ExecutionUnit::new(capacity).context("Failed to create execution unit")?;

        Ok(Self {
            config,
            node_id: crate::util::node_id(),
            unit: Arc::new(unit),
        })
    }

    /// Capacity advertised in HELLO
    pub fn capacity(&self) -> u32 {
        u32::try_from(self.unit.capacity()).unwrap_or(u32::MAX)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Run the node service
    ///
    /// Returns once the task has been reported, the coordinator gave up on us,
    /// or the connection closed.
    pub async fn run(self) -> Result<NodeOutcome> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("Failed to connect to coordinator at {}", addr))?;
        stream.set_nodelay(true).context("Failed to set TCP_NODELAY")?;

        tracing::info!(
            node_id = %self.node_id,
            coordinator = %addr,
            capacity = self.capacity(),
            "connected to coordinator"
        );

        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        let mut writer = FrameWriter::new(write_half);

        writer
            .send_frame(&encode(&Message::hello(self.capacity())))
            .await
            .context("Failed to send HELLO")?;

        self.serve(&mut reader, &mut writer).await
    }

    /// Handle coordinator messages after HELLO has been sent.
    async fn serve<R, W>(
        &self,
        reader: &mut FrameReader<R>,
        writer: &mut FrameWriter<W>,
    ) -> Result<NodeOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let Some(payload) = reader
                .next_frame()
                .await
                .context("Failed to read from coordinator")?
            else {
                tracing::warn!("coordinator closed the connection before sending a task");
                return Ok(NodeOutcome::Disconnected);
            };

            let message = match decode(&payload) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, len = payload.len(), "dropping malformed frame");
                    continue;
                }
            };

            match message {
                Message::Task(task) => return self.execute(task, writer).await,
                Message::Error(err) => {
                    tracing::error!(message = %err.text, "coordinator reported an error, giving up");
                    return Ok(NodeOutcome::Rejected { message: err.text });
                }
                other => {
                    tracing::warn!(kind = ?other.message_type(), "ignoring unexpected message");
                }
            }
        }
    }

    async fn execute<W>(&self, task: TaskMessage, writer: &mut FrameWriter<W>) -> Result<NodeOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        tracing::info!(
            index = task.peer_index,
            peers = task.peer_count,
            a = task.a,
            b = task.b,
            h = task.h,
            method = %task.method,
            "task received"
        );

        let unit = Arc::clone(&self.unit);
        let start = Instant::now();
        let joined = tokio::task::spawn_blocking(move || {
            unit.integrate(task.a, task.b, task.h, task.method)
        })
        .await;
        let elapsed = start.elapsed();

        let (reply, outcome) = match joined {
            Ok(Ok(value)) => {
                tracing::info!(value, elapsed = %format_duration(elapsed), "sub-interval computed");
                (Message::result(value), NodeOutcome::Completed { value })
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "task failed");
                let message = e.to_string();
                (Message::error(message.clone()), NodeOutcome::Failed { message })
            }
            Err(e) => {
                tracing::error!(error = %e, "computation aborted");
                let message = format!("computation aborted: {}", e);
                (Message::error(message.clone()), NodeOutcome::Failed { message })
            }
        };

        writer
            .send_frame(&encode(&reply))
            .await
            .context("Failed to send reply to coordinator")?;

        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "shutdown after reply failed");
        }

        Ok(outcome)
    }
}
