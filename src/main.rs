//! distquad CLI entry point

use anyhow::{Context, Result};
use distquad::config::cli::{Cli, ExecutionMode};
use distquad::config::{toml::load_config, validator, CoordinatorConfig, RuntimeConfig, WorkerConfig};
use distquad::distributed::{Coordinator, NodeOutcome, NodeService};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();
    cli.validate()?;

    // The config file may turn on debug logging too
    let config = load_config(&cli)?;

    init_tracing(&config.runtime);

    // Handle different execution modes
    match cli.mode {
        ExecutionMode::Coordinator => run_coordinator(config.coordinator),
        ExecutionMode::Worker => run_worker(config.worker),
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` from `--debug` or `[runtime] debug`.
fn init_tracing(runtime: &RuntimeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(runtime.default_log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Run in coordinator mode
fn run_coordinator(config: CoordinatorConfig) -> Result<()> {
    validator::validate_coordinator(&config)
        .context("Configuration validation failed")?;

    // One thread drives every connection
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let json_output = config.json_output.clone();
    let report = runtime.block_on(async {
        let coordinator = Coordinator::bind(config)
            .await
            .context("Failed to start coordinator")?;
        coordinator.run().await
    })?;

    distquad::output::text::print_report(&report);

    if let Some(path) = json_output {
        distquad::output::json::write_json_output(&path, &report, true)?;
        tracing::info!(path = %path.display(), "JSON report written");
    }

    Ok(())
}

/// Run in worker mode
fn run_worker(config: WorkerConfig) -> Result<()> {
    validator::validate_worker(&config)
        .context("Configuration validation failed")?;

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    let outcome = runtime.block_on(async {
        let service = NodeService::new(config).context("Failed to create node service")?;
        service.run().await
    })?;

    match outcome {
        NodeOutcome::Completed { value } => {
            tracing::info!(value, "task reported, exiting");
            Ok(())
        }
        NodeOutcome::Failed { message } => {
            tracing::warn!(message = %message, "task failed and was reported as an error");
            Ok(())
        }
        NodeOutcome::Rejected { message } => {
            anyhow::bail!("coordinator rejected this worker: {}", message)
        }
        NodeOutcome::Disconnected => {
            anyhow::bail!("coordinator closed the connection before assigning a task")
        }
    }
}
