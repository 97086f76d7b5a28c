//! distquad - distributed numerical integration
//!
//! distquad computes the definite integral of `1/ln(x)` by splitting the
//! interval across a fixed set of networked peers, each of which splits its
//! share again across local threads, and summing the partial results.
//!
//! # Architecture
//!
//! - **Quadrature engine**: midpoint, trapezoid and Simpson rules with a singularity guard
//! - **Wire protocol**: versioned big-endian messages in length-prefixed frames
//! - **Coordinator**: waits for N peers, splits by capacity, reduces exactly once
//! - **Node service**: one task per connection, computed on a fixed thread pool

pub mod config;
pub mod distributed;
pub mod engine;
pub mod output;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use engine::{integrate, IntegrationError, Method};

/// Result type used throughout distquad
pub type Result<T> = anyhow::Result<T>;
