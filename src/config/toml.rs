//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Load the config file named on the command line (if any) and apply CLI overrides.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    merge_cli_with_config(cli, config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // The port means "listen on" or "connect to" depending on the role;
    // both sections get it so one flag works for either mode
    if let Some(port) = cli.port {
        config.coordinator.port = port;
        config.worker.port = port;
    }

    // Override coordinator settings
    if let Some(bind) = cli.bind {
        config.coordinator.bind_addr = bind;
    }
    if let Some(peers) = cli.peers {
        config.coordinator.expected_peers = peers;
    }
    if let Some(timeout) = cli.timeout {
        config.coordinator.phase_timeout_secs = Some(timeout);
    }
    if let Some(ref path) = cli.json_output {
        config.coordinator.json_output = Some(path.clone());
    }

    // Override task
    let task = &mut config.coordinator.task;
    if let Some(a) = cli.lower {
        task.a = a;
    }
    if let Some(b) = cli.upper {
        task.b = b;
    }
    if let Some(h) = cli.step {
        task.h = h;
    }
    if let Some(method) = cli.method {
        task.method = method;
    }

    // Override worker settings
    if let Some(ref host) = cli.host {
        config.worker.host = host.clone();
    }
    if let Some(capacity) = cli.capacity {
        config.worker.capacity = Some(capacity);
    }

    if cli.debug {
        config.runtime.debug = true;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_parse_toml_basic() {
        let toml = r#"
[coordinator]
port = 7100
expected_peers = 3
phase_timeout_secs = 30

[coordinator.task]
a = 2.0
b = 20.0
h = 0.001
method = "trapezoid"

[worker]
host = "10.0.1.10"
capacity = 8
"#;

        let config = parse_toml_string(toml).unwrap();
        assert_eq!(config.coordinator.port, 7100);
        assert_eq!(config.coordinator.expected_peers, 3);
        assert_eq!(config.coordinator.phase_timeout_secs, Some(30));
        assert_eq!(config.coordinator.task.b, 20.0);
        assert_eq!(config.coordinator.task.method, Method::Trapezoid);
        assert_eq!(config.worker.host, "10.0.1.10");
        assert_eq!(config.worker.capacity, Some(8));
        // Unset sections fall back to defaults
        assert_eq!(config.worker.port, DEFAULT_PORT);
    }

    #[test]
    fn test_parse_toml_method_by_number() {
        let config = parse_toml_string("[coordinator.task]\nmethod = 1\n").unwrap();
        assert_eq!(config.coordinator.task.method, Method::Midpoint);
        // Other task fields keep their defaults
        assert_eq!(config.coordinator.task.a, 2.0);
        assert_eq!(config.coordinator.task.h, 1e-4);
    }

    #[test]
    fn test_parse_toml_rejects_unknown_method() {
        assert!(parse_toml_string("[coordinator.task]\nmethod = 4\n").is_err());
        assert!(parse_toml_string("[coordinator.task]\nmethod = \"gauss\"\n").is_err());
    }

    #[test]
    fn test_parse_toml_empty() {
        let config = parse_toml_string("").unwrap();
        assert_eq!(config.coordinator.expected_peers, 1);
        assert!(!config.runtime.debug);
    }

    #[test]
    fn test_parse_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[coordinator]\nexpected_peers = 4").unwrap();

        let config = parse_toml_file(file.path()).unwrap();
        assert_eq!(config.coordinator.expected_peers, 4);

        assert!(parse_toml_file(Path::new("/nonexistent/distquad.toml")).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file_config = parse_toml_string(
            "[coordinator]\nport = 7100\nexpected_peers = 3\n[coordinator.task]\nh = 0.01\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from(["distquad", "--mode", "coordinator", "-n", "5", "--method", "1"])
            .unwrap();

        let merged = merge_cli_with_config(&cli, file_config).unwrap();
        assert_eq!(merged.coordinator.expected_peers, 5);
        assert_eq!(merged.coordinator.port, 7100);
        assert_eq!(merged.coordinator.task.h, 0.01);
        assert_eq!(merged.coordinator.task.method, Method::Midpoint);
    }

    #[test]
    fn test_debug_from_file_survives_merge() {
        let file_config = parse_toml_string("[runtime]\ndebug = true\n").unwrap();
        let cli = Cli::try_parse_from(["distquad", "--mode", "worker"]).unwrap();

        let merged = merge_cli_with_config(&cli, file_config).unwrap();
        assert!(merged.runtime.debug);
        assert_eq!(merged.runtime.default_log_filter(), "debug");

        let cli = Cli::try_parse_from(["distquad", "--mode", "worker", "--debug"]).unwrap();
        let merged = merge_cli_with_config(&cli, Config::default()).unwrap();
        assert_eq!(merged.runtime.default_log_filter(), "debug");
    }

    #[test]
    fn test_port_applies_to_both_roles() {
        let cli = Cli::try_parse_from(["distquad", "--mode", "worker", "-p", "6001"]).unwrap();
        let merged = merge_cli_with_config(&cli, Config::default()).unwrap();
        assert_eq!(merged.worker.port, 6001);
        assert_eq!(merged.coordinator.port, 6001);
    }
}
