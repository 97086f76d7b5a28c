//! Configuration validation

use super::*;
use crate::engine;
use anyhow::Result;

/// Validate the coordinator configuration, including its task.
pub fn validate_coordinator(config: &CoordinatorConfig) -> Result<()> {
    if config.expected_peers == 0 {
        anyhow::bail!("expected_peers must be at least 1");
    }

    if config.expected_peers > u32::MAX as usize {
        anyhow::bail!("expected_peers must fit in 32 bits, got {}", config.expected_peers);
    }

    if config.phase_timeout_secs == Some(0) {
        anyhow::bail!("phase_timeout_secs must be greater than 0 if specified");
    }

    if config.expected_peers > 1024 {
        tracing::warn!(
            expected_peers = config.expected_peers,
            "very high peer count, dispatch waits for every one of them"
        );
    }

    validate_task(&config.task)
}

/// Validate the global task before any peer is accepted.
///
/// Uses the same domain checks as the engine so a doomed run fails at startup
/// instead of after every peer has connected.
pub fn validate_task(task: &TaskSpec) -> Result<()> {
    engine::validate_step(task.h)
        .map_err(|e| anyhow::anyhow!("invalid task: {}", e))?;

    if task.a == task.b {
        tracing::warn!(a = task.a, "empty integration interval, the result will be 0");
        return Ok(());
    }

    engine::validate_interval(task.a, task.b)
        .map_err(|e| anyhow::anyhow!("invalid task: {}", e))?;

    if (task.b - task.a).abs() < task.h {
        tracing::warn!(
            a = task.a,
            b = task.b,
            h = task.h,
            "step is larger than the interval, the result will be 0"
        );
    }

    Ok(())
}

/// Validate the worker configuration
pub fn validate_worker(config: &WorkerConfig) -> Result<()> {
    if config.host.trim().is_empty() {
        anyhow::bail!("worker host must not be empty");
    }

    if config.port == 0 {
        anyhow::bail!("worker port must be greater than 0");
    }

    if config.capacity == Some(0) {
        anyhow::bail!("capacity must be at least 1 if specified");
    }

    // Warn if capacity is very high
    if let Some(capacity) = config.capacity {
        let cpus = crate::worker::default_capacity();
        if capacity > cpus.saturating_mul(4) {
            tracing::warn!(
                capacity,
                cpus,
                "capacity is far above the CPU count, threads will compete for cores"
            );
        }
    }

    Ok(())
}
