//! Human-readable text output

use crate::distributed::coordinator::{PeerOutcome, RunReport};
use std::fmt::Write;

/// Print the final report to console
pub fn print_report(report: &RunReport) {
    print!("{}", format_report(report));
}

/// Render the final report
///
/// Shows the task, the final value, elapsed time, and one line per peer with
/// its sub-interval and what it reported.
pub fn format_report(report: &RunReport) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, report: &RunReport) -> std::fmt::Result {
    writeln!(out, "═══════════════════════════════════════════════════════════")?;
    writeln!(out, "                    FINAL RESULT")?;
    writeln!(out, "═══════════════════════════════════════════════════════════")?;
    writeln!(out)?;

    writeln!(out, "Integral of 1/ln(x) from {} to {}", report.a, report.b)?;
    writeln!(out, "  Method: {}", report.method)?;
    writeln!(out, "  Step:   {}", report.h)?;
    writeln!(out)?;
    writeln!(out, "Value:        {:.10}", report.value)?;
    writeln!(out, "Elapsed Time: {:.3} ms", report.elapsed_ms)?;
    writeln!(out)?;

    writeln!(out, "Peers ({}):", report.peers.len())?;
    for peer in &report.peers {
        let outcome = match &peer.outcome {
            PeerOutcome::Result { value } => format!("{:.10}", value),
            PeerOutcome::Error { message } => format!("ERROR ({}), counted as 0", message),
        };
        writeln!(
            out,
            "  #{:<3} {:<21} cores={:<4} [{}, {}] -> {}",
            peer.index, peer.address, peer.capacity, peer.span.a, peer.span.b, outcome
        )?;
    }

    let failed = report.failed_peers();
    if failed > 0 {
        writeln!(out)?;
        writeln!(out, "Warning: {} peer(s) failed, the value is incomplete", failed)?;
    }

    writeln!(out, "═══════════════════════════════════════════════════════════")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::coordinator::PeerReport;
    use crate::distributed::partition::Span;
    use crate::engine::Method;

    fn report(outcome: PeerOutcome) -> RunReport {
        RunReport {
            value: outcome.contribution(),
            a: 2.0,
            b: 10.0,
            h: 1e-4,
            method: Method::Simpson,
            elapsed_ms: 12.5,
            coordinator: "coord".to_string(),
            peers: vec![PeerReport {
                index: 0,
                address: "10.0.1.10:40000".parse().unwrap(),
                capacity: 4,
                span: Span::new(2.0, 10.0),
                outcome,
            }],
        }
    }

    #[test]
    fn test_format_report() {
        let text = format_report(&report(PeerOutcome::Result { value: 5.1204 }));
        assert!(text.contains("Value:        5.1204000000"));
        assert!(text.contains("Method: simpson"));
        assert!(text.contains("10.0.1.10:40000"));
        assert!(text.contains("12.500 ms"));
        assert!(!text.contains("Warning"));
    }

    #[test]
    fn test_format_report_with_failure() {
        let text = format_report(&report(PeerOutcome::Error {
            message: "boom".to_string(),
        }));
        assert!(text.contains("ERROR (boom), counted as 0"));
        assert!(text.contains("1 peer(s) failed"));
    }
}
