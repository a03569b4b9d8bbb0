//! Quadratic-program backend
//!
//! The allocation layer builds a [`QuadraticProgram`] and hands it to any
//! [`QpSolver`]. The bundled [`ProjectedGradientSolver`] solves
//!
//! ```text
//! minimize    wᵀΣw − Rᵀw
//! subject to  Σw = 1,  0 ≤ w ≤ u,  wᵀΣw ≤ v_max
//! ```
//!
//! with accelerated projected gradient over the capped simplex. The variance
//! ceiling is handled through its Lagrangian: for t ∈ [0, 1] the minimizer of
//! wᵀΣw − t·Rᵀw has variance non-decreasing in t, so bisection on t finds the
//! largest return tilt that still respects the ceiling. t = 0 is the minimum
//! variance portfolio; if even that breaks the ceiling the program is
//! infeasible.

use super::covariance::quad_form;
use thiserror::Error;
use tracing::{debug, warn};

/// Outcome of a single solve attempt that produced no weights
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("No feasible solution exists with given constraints")]
    Infeasible,

    #[error("{0}")]
    NumericalFailure(String),
}

/// One mean-variance program over the long-only simplex
#[derive(Debug, Clone)]
pub struct QuadraticProgram<'a> {
    /// Daily covariance Σ
    pub covariance: &'a [Vec<f64>],
    /// Reward vector R; `None` minimizes variance alone
    pub returns: Option<&'a [f64]>,
    /// Per-asset upper bounds u; `None` leaves only w ≤ 1
    pub upper_bounds: Option<&'a [f64]>,
    /// Ceiling on wᵀΣw
    pub max_variance: Option<f64>,
}

impl<'a> QuadraticProgram<'a> {
    /// Minimize wᵀΣw on the simplex
    pub fn min_variance(covariance: &'a [Vec<f64>]) -> Self {
        Self {
            covariance,
            returns: None,
            upper_bounds: None,
            max_variance: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.covariance.len()
    }
}

/// Injected QP capability
pub trait QpSolver {
    fn solve(&self, program: &QuadraticProgram<'_>) -> Result<Vec<f64>, SolveError>;
}

/// FISTA with adaptive restart plus Lagrangian bisection on the variance cap
#[derive(Debug, Clone)]
pub struct ProjectedGradientSolver {
    /// Iteration limit per inner solve
    max_iterations: usize,
    /// Projected-gradient residual at which an inner solve stops
    tolerance: f64,
    /// Bisection steps on the return tilt
    bisection_steps: usize,
}

impl Default for ProjectedGradientSolver {
    fn default() -> Self {
        Self {
            max_iterations: 200_000,
            tolerance: 1e-12,
            bisection_steps: 60,
        }
    }
}

impl ProjectedGradientSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
            ..Self::default()
        }
    }

    pub fn with_bisection_steps(mut self, steps: usize) -> Self {
        self.bisection_steps = steps;
        self
    }

    /// minimize wᵀΣw − t·Rᵀw over {Σw = 1, 0 ≤ w ≤ u}
    fn minimize(
        &self,
        cov: &[Vec<f64>],
        linear: &[f64],
        upper: &[f64],
        start: &[f64],
    ) -> Result<Vec<f64>, SolveError> {
        let n = cov.len();
        let lipschitz = (2.0 * spectral_bound(cov)).max(1e-12);
        let step = 1.0 / lipschitz;
        // Rounding in y − step·g grows with the size of the linear pull
        let threshold = self.tolerance * (1.0 + step * linear.iter().fold(0.0, |m: f64, c| m.max(c.abs())));

        let mut x = project_capped_simplex(start, upper);
        let mut y = x.clone();
        let mut momentum = 1.0_f64;
        let mut residual = f64::INFINITY;

        for iteration in 0..self.max_iterations {
            let g = gradient(cov, linear, &y);
            let trial: Vec<f64> = (0..n).map(|i| y[i] - step * g[i]).collect();
            let x_next = project_capped_simplex(&trial, upper);

            if x_next.iter().any(|v| !v.is_finite()) {
                return Err(SolveError::NumericalFailure(format!(
                    "non-finite iterate at iteration {}",
                    iteration
                )));
            }

            // Optimality residual measured at the new point
            let g_next = gradient(cov, linear, &x_next);
            let trial: Vec<f64> = (0..n).map(|i| x_next[i] - step * g_next[i]).collect();
            let fixed_point = project_capped_simplex(&trial, upper);
            residual = x_next
                .iter()
                .zip(fixed_point.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);

            if residual <= threshold {
                return Ok(x_next);
            }

            // Restart momentum when it points uphill
            let uphill: f64 = (0..n).map(|i| (y[i] - x_next[i]) * (x_next[i] - x[i])).sum();
            if uphill > 0.0 {
                momentum = 1.0;
                y = x_next.clone();
            } else {
                let next_momentum = (1.0 + (1.0 + 4.0 * momentum * momentum).sqrt()) / 2.0;
                let beta = (momentum - 1.0) / next_momentum;
                y = (0..n).map(|i| x_next[i] + beta * (x_next[i] - x[i])).collect();
                momentum = next_momentum;
            }
            x = x_next;
        }

        if residual <= threshold.sqrt() {
            warn!(residual, iterations = self.max_iterations, "Accepting loosely converged solution");
            return Ok(x);
        }

        Err(SolveError::NumericalFailure(format!(
            "did not converge after {} iterations (residual {:e})",
            self.max_iterations, residual
        )))
    }
}

impl QpSolver for ProjectedGradientSolver {
    fn solve(&self, program: &QuadraticProgram<'_>) -> Result<Vec<f64>, SolveError> {
        let n = program.dimension();
        validate(program)?;

        let upper: Vec<f64> = match program.upper_bounds {
            Some(bounds) => bounds.iter().map(|b| b.min(1.0)).collect(),
            None => vec![1.0; n],
        };
        if upper.iter().sum::<f64>() < 1.0 - 1e-12 {
            return Err(SolveError::Infeasible);
        }

        let returns: Vec<f64> = program.returns.map(|r| r.to_vec()).unwrap_or_else(|| vec![0.0; n]);
        let tilted = |t: f64| -> Vec<f64> { returns.iter().map(|r| -t * r).collect() };
        let start = vec![1.0 / n as f64; n];

        let unconstrained = self.minimize(program.covariance, &tilted(1.0), &upper, &start)?;
        let cap = match program.max_variance {
            None => return Ok(unconstrained),
            Some(cap) => cap,
        };
        if quad_form(program.covariance, &unconstrained) <= cap {
            return Ok(unconstrained);
        }

        let floor = self.minimize(program.covariance, &tilted(0.0), &upper, &unconstrained)?;
        let floor_variance = quad_form(program.covariance, &floor);
        if floor_variance > cap {
            debug!(floor_variance, cap, "Variance ceiling below minimum variance");
            return Err(SolveError::Infeasible);
        }

        // Largest tilt whose minimizer stays under the ceiling
        let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
        let mut best = floor;
        for _ in 0..self.bisection_steps {
            let mid = 0.5 * (lo + hi);
            let candidate = self.minimize(program.covariance, &tilted(mid), &upper, &best)?;
            if quad_form(program.covariance, &candidate) <= cap {
                lo = mid;
                best = candidate;
            } else {
                hi = mid;
            }
        }

        Ok(best)
    }
}

fn validate(program: &QuadraticProgram<'_>) -> Result<(), SolveError> {
    let n = program.dimension();
    if n == 0 {
        return Err(SolveError::NumericalFailure("empty program".to_string()));
    }
    if program.covariance.iter().any(|row| row.len() != n) {
        return Err(SolveError::NumericalFailure("covariance is not square".to_string()));
    }
    if program.covariance.iter().flatten().any(|v| !v.is_finite()) {
        return Err(SolveError::NumericalFailure("non-finite covariance entry".to_string()));
    }
    if let Some(returns) = program.returns {
        if returns.len() != n || returns.iter().any(|r| !r.is_finite()) {
            return Err(SolveError::NumericalFailure("invalid return vector".to_string()));
        }
    }
    if let Some(bounds) = program.upper_bounds {
        if bounds.len() != n || bounds.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(SolveError::NumericalFailure("invalid upper bounds".to_string()));
        }
    }
    if let Some(cap) = program.max_variance {
        if !cap.is_finite() {
            return Err(SolveError::NumericalFailure("non-finite variance cap".to_string()));
        }
        if cap < 0.0 {
            return Err(SolveError::Infeasible);
        }
    }
    Ok(())
}

/// ∇(wᵀΣw + cᵀw) = 2Σw + c
fn gradient(cov: &[Vec<f64>], linear: &[f64], w: &[f64]) -> Vec<f64> {
    cov.iter()
        .zip(linear.iter())
        .map(|(row, c)| 2.0 * row.iter().zip(w.iter()).map(|(a, b)| a * b).sum::<f64>() + c)
        .collect()
}

/// Upper bound on the largest eigenvalue: min of the Gershgorin and Frobenius bounds
fn spectral_bound(matrix: &[Vec<f64>]) -> f64 {
    let gershgorin = matrix
        .iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let frobenius = matrix.iter().flatten().map(|v| v * v).sum::<f64>().sqrt();
    gershgorin.min(frobenius)
}

/// Euclidean projection onto {Σw = 1, 0 ≤ w ≤ u}.
///
/// Finds the shift τ with Σ clamp(v − τ, 0, u) = 1 by bisection. Callers
/// guarantee Σu ≥ 1.
pub(crate) fn project_capped_simplex(v: &[f64], upper: &[f64]) -> Vec<f64> {
    let clamp = |tau: f64| -> Vec<f64> {
        v.iter()
            .zip(upper.iter())
            .map(|(x, u)| (x - tau).max(0.0).min(*u))
            .collect()
    };

    let mut lo = v.iter().cloned().fold(f64::INFINITY, f64::min) - 1.0;
    let mut hi = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        let total: f64 = clamp(mid).iter().sum();
        if total > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    clamp(0.5 * (lo + hi))
}
