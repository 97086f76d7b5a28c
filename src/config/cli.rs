//! CLI argument parsing using clap

use crate::engine::Method;
use clap::{Parser, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Coordinator mode - accept peers, split the interval, sum the results
    Coordinator,
    /// Worker mode - connect to a coordinator and compute one sub-interval
    Worker,
}

/// distquad - distributed numerical integration of 1/ln(x)
#[derive(Parser, Debug)]
#[command(name = "distquad")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: coordinator or worker
    #[arg(long, value_enum)]
    pub mode: ExecutionMode,

    /// TOML configuration file (flags override its values)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Coordinator port (listen port in coordinator mode, target port in worker mode)
    #[arg(short = 'p', long, env = "DISTQUAD_PORT")]
    pub port: Option<u16>,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    // === Coordinator Options ===
    /// Address to listen on (coordinator mode only)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Number of peers to wait for before dispatching (coordinator mode only)
    #[arg(short = 'n', long)]
    pub peers: Option<usize>,

    /// Lower integration bound
    #[arg(short = 'a', long = "lower", allow_negative_numbers = true)]
    pub lower: Option<f64>,

    /// Upper integration bound
    #[arg(short = 'b', long = "upper", allow_negative_numbers = true)]
    pub upper: Option<f64>,

    /// Step size (must be > 0)
    #[arg(short = 's', long)]
    pub step: Option<f64>,

    /// Integration method: 1|midpoint, 2|trapezoid, 3|simpson
    #[arg(short = 'm', long)]
    pub method: Option<Method>,

    /// Abort if gathering peers or results takes longer than this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Write the final report as JSON to this file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    // === Worker Options ===
    /// Coordinator host to connect to (worker mode only)
    #[arg(long, env = "DISTQUAD_HOST")]
    pub host: Option<String>,

    /// Parallel execution units to use (worker mode only, defaults to CPU count)
    #[arg(long)]
    pub capacity: Option<u32>,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    ///
    /// Only catches what is wrong on its own; combined values are checked
    /// again after merging with the config file.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.peers == Some(0) {
            anyhow::bail!("peers must be at least 1");
        }

        if self.capacity == Some(0) {
            anyhow::bail!("capacity must be at least 1");
        }

        if let Some(step) = self.step {
            if !(step > 0.0) {
                anyhow::bail!("step must be greater than 0, got {}", step);
            }
        }

        if self.timeout == Some(0) {
            anyhow::bail!("timeout must be greater than 0 if specified");
        }

        match self.mode {
            ExecutionMode::Worker => {
                if self.peers.is_some() || self.json_output.is_some() {
                    anyhow::bail!("--peers and --json-output only apply to coordinator mode");
                }
            }
            ExecutionMode::Coordinator => {
                if self.capacity.is_some() {
                    anyhow::bail!("--capacity only applies to worker mode");
                }
            }
        }

        Ok(())
    }
}
