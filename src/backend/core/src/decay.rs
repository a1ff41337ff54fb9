//! Stochastic decay simulator.
//!
//! Forgetting is modelled as a Poisson process: over an elapsed interval `dt`
//! a count loses `k ~ Poisson(rate * dt)` units. The sampler works by
//! product-series inversion and is bounded in both directions: a vanishing
//! `e^-λ` short-circuits to [`SATURATED`] and the series stops after
//! [`MAX_ITERATIONS`] terms.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::error::ForgetError;

/// Maximum number of series terms evaluated for one sample.
pub const MAX_ITERATIONS: u64 = 1000;

/// Returned when `e^-λ` underflows; callers treat it as "remove everything".
pub const SATURATED: u64 = u64::MAX;

/// Below this, `e^-λ` is treated as zero.
const UNDERFLOW_THRESHOLD: f64 = 1e-8;

/// The series failed to pass the uniform draw within [`MAX_ITERATIONS`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("poisson sampling did not converge for lambda = {lambda} after {iterations} terms")]
pub struct ConvergenceError {
    pub lambda: f64,
    pub iterations: u64,
}

/// Draw from `Poisson(lambda)` using a fresh OS-seeded generator.
pub fn poisson(lambda: f64) -> Result<u64, ConvergenceError> {
    let mut rng = StdRng::from_entropy();
    poisson_with(lambda, &mut rng)
}

/// Draw from `Poisson(lambda)` using the supplied generator.
pub fn poisson_with<R: Rng + ?Sized>(lambda: f64, rng: &mut R) -> Result<u64, ConvergenceError> {
    poisson_bounded(lambda, rng, MAX_ITERATIONS)
}

fn poisson_bounded<R: Rng + ?Sized>(
    lambda: f64,
    rng: &mut R,
    max_iterations: u64,
) -> Result<u64, ConvergenceError> {
    if lambda <= 0.0 || !lambda.is_finite() {
        return Ok(0);
    }

    let mut term = (-lambda).exp();
    if term < UNDERFLOW_THRESHOLD {
        return Ok(SATURATED);
    }

    let r: f64 = rng.gen();
    let mut cumulative = term;
    let mut k: u64 = 0;

    while cumulative <= r {
        k += 1;
        if k > max_iterations {
            return Err(ConvergenceError {
                lambda,
                iterations: max_iterations,
            });
        }
        term *= lambda / k as f64;
        cumulative += term;
    }

    Ok(k)
}

/// Current wall-clock time as unix seconds.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Units of `count` lost since `last_time`, sampled against the wall clock.
pub fn decay(count: u64, total_mass: u64, last_time: i64, rate: f64) -> u64 {
    decay_at(count, total_mass, last_time, rate, now_unix())
}

/// Units of `count` lost between `last_time` and `now`.
///
/// The result is not clamped to `count`; the caller applies its own floor or
/// prune policy. Convergence failures are logged and treated as no decay.
pub fn decay_at(count: u64, _total_mass: u64, last_time: i64, rate: f64, now: i64) -> u64 {
    let mut rng = StdRng::from_entropy();
    decay_at_with(count, last_time, rate, now, &mut rng, MAX_ITERATIONS)
}

fn decay_at_with<R: Rng + ?Sized>(
    count: u64,
    last_time: i64,
    rate: f64,
    now: i64,
    rng: &mut R,
    max_iterations: u64,
) -> u64 {
    let dt = now.saturating_sub(last_time);
    if count == 0 || dt <= 0 {
        return 0;
    }

    let lambda = rate * dt as f64;
    if lambda == 0.0 {
        return 0;
    }

    match poisson_bounded(lambda, rng, max_iterations) {
        Ok(k) => k,
        Err(e) => {
            ForgetError::convergence_failed(rate, e.lambda)
                .with_context("iterations", e.iterations)
                .log();
            0
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Samplers
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of per-field decay amounts used by `Distribution::decay_with`.
pub trait DecaySampler {
    /// Units lost by a field holding `count` out of `total_mass`.
    fn sample(&mut self, count: u64, total_mass: u64, last_time: i64, rate: f64, now: i64) -> u64;
}

/// Production sampler: fresh entropy for every draw.
#[derive(Debug, Default, Clone, Copy)]
pub struct PoissonSampler;

impl DecaySampler for PoissonSampler {
    fn sample(&mut self, count: u64, total_mass: u64, last_time: i64, rate: f64, now: i64) -> u64 {
        decay_at(count, total_mass, last_time, rate, now)
    }
}

/// Poisson sampler driven by a caller-owned generator.
#[derive(Debug)]
pub struct RngSampler<R> {
    rng: R,
}

impl<R: Rng> RngSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSampler<StdRng> {
    /// Deterministic sampler for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> DecaySampler for RngSampler<R> {
    fn sample(&mut self, count: u64, _total_mass: u64, last_time: i64, rate: f64, now: i64) -> u64 {
        decay_at_with(count, last_time, rate, now, &mut self.rng, MAX_ITERATIONS)
    }
}

impl<F> DecaySampler for F
where
    F: FnMut(u64, u64, i64, f64, i64) -> u64,
{
    fn sample(&mut self, count: u64, total_mass: u64, last_time: i64, rate: f64, now: i64) -> u64 {
        self(count, total_mass, last_time, rate, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisson_mean_converges_to_lambda() {
        let mut rng = StdRng::seed_from_u64(7);
        let lambda = 3.0;
        let samples = 20_000;

        let total: u64 = (0..samples)
            .map(|_| poisson_with(lambda, &mut rng).unwrap())
            .sum();
        let mean = total as f64 / samples as f64;

        assert!((mean - lambda).abs() < 0.1, "mean {} too far from {}", mean, lambda);
    }

    #[test]
    fn test_poisson_zero_lambda() {
        assert_eq!(poisson(0.0), Ok(0));
        assert_eq!(poisson(-1.0), Ok(0));
    }

    #[test]
    fn test_poisson_saturates_on_underflow() {
        assert_eq!(poisson(50.0), Ok(SATURATED));
    }

    #[test]
    fn test_decay_zero_count() {
        assert_eq!(decay_at(0, 100, 0, 10.0, 1_000), 0);
    }

    #[test]
    fn test_decay_no_elapsed_time() {
        assert_eq!(decay_at(10, 10, 1_000, 0.5, 1_000), 0);
        assert_eq!(decay_at(10, 10, 2_000, 0.5, 1_000), 0);
    }

    #[test]
    fn test_decay_is_not_clamped_to_count() {
        // lambda = 100, far past the underflow threshold
        assert_eq!(decay_at(1, 1, 0, 1.0, 100), SATURATED);
    }

    #[test]
    fn test_decay_zero_rate() {
        assert_eq!(decay_at(10, 10, 0, 0.0, 1_000), 0);
    }

    #[test]
    fn test_seeded_sampler_is_reproducible() {
        let mut a = RngSampler::seeded(42);
        let mut b = RngSampler::seeded(42);

        let xs: Vec<u64> = (0..50).map(|_| a.sample(10, 10, 0, 0.2, 10)).collect();
        let ys: Vec<u64> = (0..50).map(|_| b.sample(10, 10, 0, 0.2, 10)).collect();

        assert_eq!(xs, ys);
    }

    /// Generator pinned at its largest output, so every uniform draw is just below 1.
    struct MaxRng;

    impl rand::RngCore for MaxRng {
        fn next_u32(&mut self) -> u32 {
            u32::MAX
        }

        fn next_u64(&mut self) -> u64 {
            u64::MAX
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0xff);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            dest.fill(0xff);
            Ok(())
        }
    }

    #[test]
    fn test_series_exhaustion_is_a_convergence_error() {
        let err = poisson_bounded(5.0, &mut MaxRng, 2).unwrap_err();
        assert_eq!(
            err,
            ConvergenceError {
                lambda: 5.0,
                iterations: 2
            }
        );

        // the full bound is enough for the same draw
        assert!(poisson_with(5.0, &mut MaxRng).is_ok());
    }

    #[test]
    fn test_convergence_failure_decays_nothing() {
        assert_eq!(decay_at_with(10, 0, 1.0, 5, &mut MaxRng, 2), 0);
        assert!(decay_at_with(10, 0, 1.0, 5, &mut MaxRng, MAX_ITERATIONS) > 2);
    }

    #[test]
    fn test_closure_sampler() {
        let mut fixed = |_: u64, _: u64, _: i64, _: f64, _: i64| 5u64;
        assert_eq!(fixed.sample(1, 1, 0, 1.0, 1), 5);
    }
}
