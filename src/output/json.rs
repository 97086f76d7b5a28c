//! JSON output formatting
//!
//! Serializes the final run report: task parameters, final value, elapsed
//! time, and per-peer detail (sub-interval and outcome).

use crate::distributed::coordinator::{PeerReport, RunReport};
use crate::engine::Method;
use crate::util::time::format_duration;
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Duration with both microseconds and human-readable format
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuration {
    pub micros: u64,
    pub human: String,
}

impl JsonDuration {
    pub fn from_millis_f64(ms: f64) -> Self {
        let micros = (ms * 1_000.0).max(0.0).round() as u64;
        Self {
            micros,
            human: format_duration(Duration::from_micros(micros)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonTask {
    pub a: f64,
    pub b: f64,
    pub h: f64,
    pub method: Method,
}

/// Top-level JSON document
#[derive(Debug, Clone, Serialize)]
pub struct JsonRunReport {
    pub coordinator: String,
    pub task: JsonTask,
    pub value: f64,
    pub elapsed: JsonDuration,
    pub failed_peers: usize,
    pub peers: Vec<PeerReport>,
}

pub fn build_json_report(report: &RunReport) -> JsonRunReport {
    JsonRunReport {
        coordinator: report.coordinator.clone(),
        task: JsonTask {
            a: report.a,
            b: report.b,
            h: report.h,
            method: report.method,
        },
        value: report.value,
        elapsed: JsonDuration::from_millis_f64(report.elapsed_ms),
        failed_peers: report.failed_peers(),
        peers: report.peers.clone(),
    }
}

/// Write JSON output to file
pub fn write_json_output(output_path: &Path, report: &RunReport, pretty: bool) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON output: {}", output_path.display()))?;
    let document = build_json_report(report);

    if pretty {
        serde_json::to_writer_pretty(file, &document)?;
    } else {
        serde_json::to_writer(file, &document)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::coordinator::PeerOutcome;
    use crate::distributed::partition::Span;

    fn sample_report() -> RunReport {
        RunReport {
            value: 5.12,
            a: 2.0,
            b: 10.0,
            h: 1e-3,
            method: Method::Trapezoid,
            elapsed_ms: 2.5,
            coordinator: "coord-host".to_string(),
            peers: vec![
                PeerReport {
                    index: 0,
                    address: "127.0.0.1:4000".parse().unwrap(),
                    capacity: 1,
                    span: Span::new(2.0, 4.0),
                    outcome: PeerOutcome::Result { value: 5.12 },
                },
                PeerReport {
                    index: 1,
                    address: "127.0.0.1:4001".parse().unwrap(),
                    capacity: 3,
                    span: Span::new(4.0, 10.0),
                    outcome: PeerOutcome::Error {
                        message: "failed".to_string(),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_json_duration() {
        let d = JsonDuration::from_millis_f64(2.5);
        assert_eq!(d.micros, 2_500);
        assert_eq!(d.human, "2.50ms");
    }

    #[test]
    fn test_write_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json_output(&path, &sample_report(), true).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["value"], 5.12);
        assert_eq!(value["task"]["method"], "trapezoid");
        assert_eq!(value["elapsed"]["micros"], 2500);
        assert_eq!(value["failed_peers"], 1);
        assert_eq!(value["peers"][0]["address"], "127.0.0.1:4000");
        assert_eq!(value["peers"][0]["span"]["b"], 4.0);
        assert_eq!(value["peers"][0]["outcome"]["status"], "result");
        assert_eq!(value["peers"][1]["outcome"]["status"], "error");
        assert_eq!(value["peers"][1]["outcome"]["message"], "failed");
    }

    #[test]
    fn test_write_json_output_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");
        assert!(write_json_output(&path, &sample_report(), false).is_err());
    }
}
