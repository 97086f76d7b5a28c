//! Distributed mode implementation
//!
//! This module implements a run across multiple networked nodes.
//!
//! # Architecture
//!
//! distquad uses a coordinator-peer architecture:
//!
//! - **Coordinator**: Listens for a fixed number of peers, splits the interval, sums the results
//! - **Node Service**: Runs on each peer, integrates its sub-interval, reports back
//! - **Execution Unit**: Thread pool inside a peer, one equal span per thread
//!
//! # Modules
//!
//! - `protocol`: Message definitions and binary encoding
//! - `framing`: Length-prefixed frames over a byte stream
//! - `partition`: Interval splitting policies
//! - `node_service`: Peer implementation
//! - `coordinator`: Coordinator state machine and event loop

pub mod protocol;
pub mod framing;
pub mod partition;
pub mod node_service;
pub mod coordinator;

// Re-export key types
pub use protocol::{
    Message,
    HelloMessage,
    TaskMessage,
    ResultMessage,
    ErrorMessage,
    ProtocolError,
    PROTOCOL_MAGIC,
    PROTOCOL_VERSION,
};

pub use framing::{FrameError, FrameReader, FrameWriter};
pub use partition::Span;
pub use node_service::{NodeOutcome, NodeService};
pub use coordinator::{Coordinator, PeerOutcome, PeerReport, Phase, RunReport, Session};
