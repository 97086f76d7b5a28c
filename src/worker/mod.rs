//! Worker execution unit
//!
//! A peer computes its assigned sub-interval with a fixed-size pool of threads.
//! The sub-interval is split into one equal span per thread, every span is
//! integrated independently, and the partial results are summed only after all
//! of them have finished.
//!
//! Summation happens in span order on the calling thread, so the result is
//! deterministic for a given capacity no matter how the pool schedules work.
//!
//! # Example
//!
//! ```
//! use distquad::engine::Method;
//! use distquad::worker::ExecutionUnit;
//!
//! let unit = ExecutionUnit::new(4)?;
//! let value = unit.integrate(2.0, 10.0, 1e-3, Method::Simpson)?;
//! assert!((value - 5.120435).abs() < 5e-3);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::distributed::partition::{split_even, Span};
use crate::engine::{self, IntegrationError, Method};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Number of logical CPUs, never less than 1.
pub fn default_capacity() -> u32 {
    u32::try_from(num_cpus::get()).unwrap_or(u32::MAX).max(1)
}

/// Fixed-size compute pool for one peer
pub struct ExecutionUnit {
    capacity: usize,
    pool: rayon::ThreadPool,
}

impl ExecutionUnit {
    /// Build a pool with `capacity` threads (0 is treated as 1).
    pub fn new(capacity: u32) -> Result<Self, ComputeError> {
        let capacity = capacity.max(1) as usize;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|i| format!("quad-{}", i))
            .build()?;

        Ok(Self { capacity, pool })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Spans this unit would hand to its threads for `[a, b]`.
    pub fn spans(&self, a: f64, b: f64) -> Vec<Span> {
        split_even(a, b, self.capacity)
    }

    /// Integrate `[a, b]` across the pool.
    ///
    /// The first span to fail aborts the remaining ones and its error is
    /// returned; no partial sum is produced in that case.
    pub fn integrate(&self, a: f64, b: f64, h: f64, method: Method) -> Result<f64, ComputeError> {
        let spans = self.spans(a, b);

        let partials: Vec<f64> = self.pool.install(|| {
            spans
                .par_iter()
                .map(|span| engine::integrate(span.a, span.b, h, method))
                .collect::<Result<Vec<f64>, IntegrationError>>()
        })?;

        tracing::debug!(
            units = self.capacity,
            a,
            b,
            partials = ?partials,
            "sub-interval integrated"
        );

        Ok(partials.iter().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity_at_least_one() {
        assert!(default_capacity() >= 1);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let unit = ExecutionUnit::new(0).unwrap();
        assert_eq!(unit.capacity(), 1);
        assert_eq!(unit.spans(2.0, 3.0), vec![Span::new(2.0, 3.0)]);
    }

    #[test]
    fn test_matches_sequential_sum() {
        let unit = ExecutionUnit::new(4).unwrap();
        let parallel = unit.integrate(2.0, 10.0, 1e-3, Method::Simpson).unwrap();

        let sequential: f64 = split_even(2.0, 10.0, 4)
            .iter()
            .map(|s| engine::integrate(s.a, s.b, 1e-3, Method::Simpson).unwrap())
            .sum();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let unit = ExecutionUnit::new(3).unwrap();
        let first = unit.integrate(4.0, 10.0, 1e-3, Method::Midpoint).unwrap();
        for _ in 0..5 {
            assert_eq!(unit.integrate(4.0, 10.0, 1e-3, Method::Midpoint).unwrap(), first);
        }
    }

    #[test]
    fn test_single_unit_equals_direct_integration() {
        let unit = ExecutionUnit::new(1).unwrap();
        assert_eq!(
            unit.integrate(2.0, 4.0, 1e-3, Method::Trapezoid).unwrap(),
            engine::integrate(2.0, 4.0, 1e-3, Method::Trapezoid).unwrap()
        );
    }

    #[test]
    fn test_singular_sub_interval_fails_whole_task() {
        let unit = ExecutionUnit::new(2).unwrap();
        let err = unit.integrate(0.5, 2.0, 0.01, Method::Simpson).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::Integration(IntegrationError::Singularity { .. })
        ));
    }

    #[test]
    fn test_bad_step_fails() {
        let unit = ExecutionUnit::new(2).unwrap();
        assert!(unit.integrate(2.0, 4.0, 0.0, Method::Midpoint).is_err());
    }
}
