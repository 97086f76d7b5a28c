//! Interval partitioning
//!
//! Two policies split `[a, b]` into contiguous sub-intervals:
//!
//! - [`split_weighted`]: between peers, proportional to their capacity
//! - [`split_even`]: inside a peer, equal shares for each execution unit
//!
//! In both, span `i` ends exactly where span `i + 1` starts and the last span
//! ends exactly at `b`, so the spans tile the interval with no gap or overlap
//! regardless of floating-point rounding in the cut points.

use serde::Serialize;

/// Half-open view of a sub-interval, `a` to `b` in integration direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Span {
    pub a: f64,
    pub b: f64,
}

impl Span {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    pub fn width(&self) -> f64 {
        self.b - self.a
    }
}

/// Split `[a, b]` proportionally to `capacities`.
///
/// A capacity of 0 counts as 1. Spans come back in the same order as the
/// capacities. Returns an empty vector for an empty capacity list.
pub fn split_weighted(a: f64, b: f64, capacities: &[u32]) -> Vec<Span> {
    let Some(last) = capacities.len().checked_sub(1) else {
        return Vec::new();
    };

    let total: u64 = capacities.iter().map(|&c| u64::from(c.max(1))).sum();
    let length = b - a;

    let mut cursor = a;
    capacities
        .iter()
        .enumerate()
        .map(|(i, &capacity)| {
            let share = f64::from(capacity.max(1)) / total as f64;
            let start = cursor;
            let end = if i == last { b } else { cursor + length * share };
            cursor = end;
            Span::new(start, end)
        })
        .collect()
}

/// Split `[a, b]` into `parts` equal spans (at least one).
pub fn split_even(a: f64, b: f64, parts: usize) -> Vec<Span> {
    let parts = parts.max(1);
    let width = (b - a) / parts as f64;

    (0..parts)
        .map(|i| {
            let start = if i == 0 { a } else { a + i as f64 * width };
            let end = if i + 1 == parts {
                b
            } else {
                a + (i + 1) as f64 * width
            };
            Span::new(start, end)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tiles(spans: &[Span], a: f64, b: f64) {
        assert_eq!(spans.first().unwrap().a, a);
        assert_eq!(spans.last().unwrap().b, b);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].b, pair[1].a);
        }
    }

    #[test]
    fn test_weighted_one_and_three() {
        let spans = split_weighted(2.0, 10.0, &[1, 3]);
        assert_eq!(spans, vec![Span::new(2.0, 4.0), Span::new(4.0, 10.0)]);
    }

    #[test]
    fn test_weighted_zero_counts_as_one() {
        assert_eq!(
            split_weighted(0.0, 4.0, &[0, 1]),
            split_weighted(0.0, 4.0, &[1, 1])
        );
    }

    #[test]
    fn test_weighted_single_peer_gets_everything() {
        assert_eq!(split_weighted(2.0, 10.0, &[16]), vec![Span::new(2.0, 10.0)]);
    }

    #[test]
    fn test_weighted_empty() {
        assert!(split_weighted(2.0, 10.0, &[]).is_empty());
    }

    #[test]
    fn test_weighted_tiles_awkward_interval() {
        let caps = [3, 7, 1, 5, 2];
        let spans = split_weighted(0.1, 0.7, &caps);
        assert_eq!(spans.len(), caps.len());
        assert_tiles(&spans, 0.1, 0.7);

        // Width tracks capacity share
        let total: u32 = caps.iter().sum();
        for (span, &cap) in spans.iter().zip(&caps) {
            let expected = 0.6 * f64::from(cap) / f64::from(total);
            assert!((span.width() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_weighted_reversed_direction() {
        let spans = split_weighted(10.0, 2.0, &[1, 3]);
        assert_eq!(spans, vec![Span::new(10.0, 8.0), Span::new(8.0, 2.0)]);
    }

    #[test]
    fn test_even_split() {
        let spans = split_even(2.0, 10.0, 4);
        assert_eq!(
            spans,
            vec![
                Span::new(2.0, 4.0),
                Span::new(4.0, 6.0),
                Span::new(6.0, 8.0),
                Span::new(8.0, 10.0),
            ]
        );
    }

    #[test]
    fn test_even_split_tiles() {
        for parts in 1..=13 {
            let spans = split_even(0.3, 0.9, parts);
            assert_eq!(spans.len(), parts);
            assert_tiles(&spans, 0.3, 0.9);
        }
    }

    #[test]
    fn test_even_split_zero_parts() {
        assert_eq!(split_even(2.0, 3.0, 0), vec![Span::new(2.0, 3.0)]);
    }
}
