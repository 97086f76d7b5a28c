//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//!
//! A run is configured from three layers, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`)
//! 3. command-line flags

pub mod cli;
pub mod toml;
pub mod validator;

use crate::engine::Method;
use serde::{Deserialize, Deserializer, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 9999;

/// Complete configuration for either role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// The global integration task
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Lower bound
    #[serde(default = "default_a")]
    pub a: f64,
    /// Upper bound
    #[serde(default = "default_b")]
    pub b: f64,
    /// Step size, strictly positive
    #[serde(default = "default_h")]
    pub h: f64,
    /// Integration rule, by name or by number (1, 2, 3)
    #[serde(default, deserialize_with = "deserialize_method")]
    pub method: Method,
}

fn default_a() -> f64 {
    2.0
}

fn default_b() -> f64 {
    10.0
}

fn default_h() -> f64 {
    1e-4
}

impl Default for TaskSpec {
    fn default() -> Self {
        Self {
            a: default_a(),
            b: default_b(),
            h: default_h(),
            method: Method::default(),
        }
    }
}

fn deserialize_method<'de, D>(deserializer: D) -> Result<Method, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Code(u8),
        Name(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Code(code) => Method::from_code(code).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown integration method {}", code))
        }),
        Repr::Name(name) => name.parse().map_err(serde::de::Error::custom),
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Address to listen on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,
    /// Port to listen on (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of peers to wait for before dispatching
    #[serde(default = "default_expected_peers")]
    pub expected_peers: usize,
    #[serde(default)]
    pub task: TaskSpec,
    /// Abort when a phase (gathering peers, gathering results) takes longer
    pub phase_timeout_secs: Option<u64>,
    /// Write the final report as JSON here
    pub json_output: Option<PathBuf>,
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_expected_peers() -> usize {
    1
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            expected_peers: default_expected_peers(),
            task: TaskSpec::default(),
            phase_timeout_secs: None,
            json_output: None,
        }
    }
}

/// Worker (peer) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Coordinator host name or address
    #[serde(default = "default_host")]
    pub host: String,
    /// Coordinator port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Parallel execution units to advertise and use (defaults to CPU count)
    pub capacity: Option<u32>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            capacity: None,
        }
    }
}

impl WorkerConfig {
    /// Capacity actually used: the configured value or the CPU count, at least 1.
    pub fn effective_capacity(&self) -> u32 {
        self.capacity
            .unwrap_or_else(crate::worker::default_capacity)
            .max(1)
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl RuntimeConfig {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.coordinator.port, DEFAULT_PORT);
        assert_eq!(config.coordinator.expected_peers, 1);
        assert_eq!(config.coordinator.task.a, 2.0);
        assert_eq!(config.coordinator.task.b, 10.0);
        assert_eq!(config.coordinator.task.method, Method::Simpson);
        assert_eq!(config.worker.host, "127.0.0.1");
        assert!(config.coordinator.phase_timeout_secs.is_none());
    }

    #[test]
    fn test_default_log_filter() {
        let mut runtime = RuntimeConfig::default();
        assert_eq!(runtime.default_log_filter(), "info");

        runtime.debug = true;
        assert_eq!(runtime.default_log_filter(), "debug");
    }

    #[test]
    fn test_effective_capacity() {
        let mut worker = WorkerConfig::default();
        assert!(worker.effective_capacity() >= 1);

        worker.capacity = Some(6);
        assert_eq!(worker.effective_capacity(), 6);

        worker.capacity = Some(0);
        assert_eq!(worker.effective_capacity(), 1);
    }
}
