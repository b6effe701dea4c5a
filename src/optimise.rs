//! One-dimensional extremum search over a periodic angle.
//!
//! The caller supplies `φ ↦ [f, f', f'']` for a function with period 2π.
//! The search is a damped Newton iteration on `f'`: the step `f'/f''` is
//! taken as is when it is small, and replaced by a fixed nudge of `0.01π` in
//! the same direction when it is `π/2` or more, since such a step usually
//! means the curvature points the wrong way.
//!
//! Failure to find an extremum of the requested kind is an expected outcome
//! and is reported as `None`.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use crate::config::OptimiserConfig;
use crate::sky::wrap_angle;
use crate::{MatchError, Result};

/// Size of the fixed step used when the Newton step is too large.
const DAMPED_STEP: f64 = 0.01 * PI;

/// Kind of extremum requested from the optimiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumKind {
    Minimum,
    Maximum,
}

/// Newton-iteration extremum finder with a fixed configuration.
///
/// Holds no state between calls, so one optimiser may be shared by any
/// number of threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleOptimiser {
    tolerance: f64,
    max_iterations: usize,
    restarts: usize,
}

impl Default for AngleOptimiser {
    fn default() -> Self {
        let config = OptimiserConfig::default();
        Self {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            restarts: config.restarts,
        }
    }
}

impl AngleOptimiser {
    /// Create an optimiser, checking that the tolerance is positive and the
    /// iteration and restart counts are at least 1.
    pub fn new(config: OptimiserConfig) -> Result<Self> {
        if !(config.tolerance.is_finite() && config.tolerance > 0.0) {
            return Err(MatchError::Config(format!(
                "optimiser tolerance must be positive, got {}",
                config.tolerance
            )));
        }
        if config.max_iterations == 0 || config.restarts == 0 {
            return Err(MatchError::Config(format!(
                "optimiser needs at least one iteration and one start, got {} and {}",
                config.max_iterations, config.restarts
            )));
        }
        Ok(Self {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            restarts: config.restarts,
        })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// Search for an extremum starting from each of `restarts` evenly spaced
    /// angles `phi0 + 2πi/restarts` in turn, returning the first success.
    ///
    /// With `kind == None` any stationary point is accepted.
    pub fn find_extremum<F>(&self, derivs: F, phi0: f64, kind: Option<ExtremumKind>) -> Option<f64>
    where
        F: Fn(f64) -> [f64; 3],
    {
        (0..self.restarts).find_map(|i| {
            let start = phi0 + TAU * i as f64 / self.restarts as f64;
            self.find_single_extremum(&derivs, start, kind)
        })
    }

    /// Run a single Newton search from `phi0`.
    ///
    /// Returns the converged angle in `[0, 2π)`, or `None` if the iteration
    /// budget runs out, the derivatives are degenerate, or the search
    /// converges on the wrong kind of extremum.
    pub fn find_single_extremum<F>(
        &self,
        derivs: F,
        phi0: f64,
        kind: Option<ExtremumKind>,
    ) -> Option<f64>
    where
        F: Fn(f64) -> [f64; 3],
    {
        let mut phi = wrap_angle(phi0);
        for _ in 0..self.max_iterations {
            let [_, d1, d2] = derivs(phi);
            let mut step = d1 / d2;
            if step.is_nan() {
                return None;
            }
            if step.abs() >= FRAC_PI_2 {
                step = DAMPED_STEP.copysign(step);
            }
            phi = wrap_angle(phi - step);
            if step.abs() < self.tolerance {
                let Some(kind) = kind else {
                    return Some(phi);
                };
                if d2 == 0.0 {
                    return None;
                }
                let found = if d2 > 0.0 {
                    ExtremumKind::Minimum
                } else {
                    ExtremumKind::Maximum
                };
                if found != kind {
                    return None;
                }
                debug_assert!(
                    curvature_agrees(&derivs, phi, kind),
                    "function values around {phi} disagree with a {kind:?}"
                );
                return Some(phi);
            }
        }
        None
    }
}

/// Check the function on both sides of `phi` against the extremum kind.
fn curvature_agrees<F>(derivs: &F, phi: f64, kind: ExtremumKind) -> bool
where
    F: Fn(f64) -> [f64; 3],
{
    const DELTA: f64 = 1e-4;
    let f0 = derivs(phi)[0];
    let slack = 1e-12 * (1.0 + f0.abs());
    [phi - DELTA, phi + DELTA].iter().all(|&p| {
        let f = derivs(p)[0];
        match kind {
            ExtremumKind::Minimum => f >= f0 - slack,
            ExtremumKind::Maximum => f <= f0 + slack,
        }
    })
}
