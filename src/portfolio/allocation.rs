//! Per-profile allocation with volatility-ceiling relaxation

use super::covariance::CovarianceMatrix;
use super::solver::{QpSolver, QuadraticProgram, SolveError};
use super::{PortfolioError, RELAXATION_STEP, TRADING_DAYS};
use crate::types::{round_dp, AssetMetadata, RiskProfile, Symbol};
use tracing::{debug, info};

/// Relaxation policy for infeasible profiles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxationSettings {
    /// Trading days per year used to annualize
    pub trading_days: f64,
    /// Amount added to the working volatility cap after each infeasible attempt
    pub step: f64,
    /// Upper bound on the number of relaxation steps
    pub max_relaxations: usize,
}

impl Default for RelaxationSettings {
    fn default() -> Self {
        Self {
            trading_days: TRADING_DAYS,
            step: RELAXATION_STEP,
            max_relaxations: 5000,
        }
    }
}

/// Solved allocation for one profile
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationResult {
    /// Weights (0-1) rounded to 3 decimals, in covariance order
    pub weights: Vec<f64>,
    /// R · w (annualized)
    pub expected_return: f64,
    /// sqrt(wᵀΣw) · sqrt(252) from the unrounded weights
    pub volatility: f64,
    /// B · w
    pub beta: f64,
    /// Working volatility cap the solution satisfies; `None` for the general portfolio
    pub volatility_cap: Option<f64>,
    /// Times the cap was raised before a feasible solution was found
    pub relaxations: usize,
}

impl AllocationResult {
    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// Builds and solves the mean-variance program for one risk profile
pub struct AllocationSolver<'a, S: QpSolver> {
    covariance: &'a CovarianceMatrix,
    metadata: &'a [AssetMetadata],
    solver: &'a S,
    settings: RelaxationSettings,
}

impl<'a, S: QpSolver> AllocationSolver<'a, S> {
    pub fn new(
        covariance: &'a CovarianceMatrix,
        metadata: &'a [AssetMetadata],
        solver: &'a S,
    ) -> Result<Self, PortfolioError> {
        if metadata.len() != covariance.len() {
            return Err(PortfolioError::DimensionMismatch {
                expected: covariance.len(),
                actual: metadata.len(),
            });
        }

        Ok(Self {
            covariance,
            metadata,
            solver,
            settings: RelaxationSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: RelaxationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn symbols(&self) -> &[Symbol] {
        self.covariance.symbols()
    }

    /// Solve for one profile; `None` yields the general minimum-variance portfolio.
    pub fn solve(&self, profile: Option<&RiskProfile>) -> Result<AllocationResult, PortfolioError> {
        match profile {
            None => {
                let program = QuadraticProgram::min_variance(self.covariance.values());
                let weights = self.solver.solve(&program).map_err(|e| self.fatal(e, "general"))?;
                Ok(self.build_result(weights, None, 0))
            }
            Some(profile) => self.solve_profile(profile),
        }
    }

    fn solve_profile(&self, profile: &RiskProfile) -> Result<AllocationResult, PortfolioError> {
        if !profile.max_volatility.is_finite() {
            return Err(PortfolioError::InvalidConstraint(format!(
                "volatility cap for {} is not finite",
                profile.name
            )));
        }

        let caps: Vec<f64> = self.metadata.iter().map(|m| m.max_allocation).collect();
        if caps.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(PortfolioError::InvalidConstraint(format!(
                "per-asset caps for {} must be non-negative",
                profile.name
            )));
        }
        let cap_total: f64 = caps.iter().sum();
        if cap_total < 1.0 - 1e-12 {
            return Err(PortfolioError::CapsBelowBudget { total: cap_total });
        }

        let returns: Vec<f64> = self.metadata.iter().map(|m| m.expected_return).collect();
        let mut max_volatility = profile.max_volatility;

        for attempt in 0..=self.settings.max_relaxations {
            if attempt > 0 {
                max_volatility += self.settings.step;
            }
            let daily_volatility = max_volatility / self.settings.trading_days.sqrt();
            let program = QuadraticProgram {
                covariance: self.covariance.values(),
                returns: Some(&returns),
                upper_bounds: Some(&caps),
                max_variance: Some(daily_volatility * daily_volatility),
            };

            match self.solver.solve(&program) {
                Ok(weights) => {
                    let result = self.build_result(weights, Some(max_volatility), attempt);
                    info!(
                        profile = %profile.name,
                        relaxations = attempt,
                        volatility_cap = max_volatility,
                        volatility = result.volatility,
                        expected_return = result.expected_return,
                        "Profile solved"
                    );
                    return Ok(result);
                }
                Err(SolveError::Infeasible) => {
                    debug!(profile = %profile.name, max_volatility, "Infeasible, relaxing volatility cap");
                }
                Err(e) => return Err(self.fatal(e, &profile.name)),
            }
        }

        Err(PortfolioError::RelaxationExhausted {
            profile: profile.name.clone(),
            attempts: self.settings.max_relaxations,
            max_volatility,
        })
    }

    fn fatal(&self, error: SolveError, profile: &str) -> PortfolioError {
        match error {
            SolveError::Infeasible => {
                PortfolioError::NumericalFailure(format!("{} portfolio has no feasible solution", profile))
            }
            SolveError::NumericalFailure(reason) => PortfolioError::NumericalFailure(format!("{}: {}", profile, reason)),
        }
    }

    fn build_result(&self, weights: Vec<f64>, volatility_cap: Option<f64>, relaxations: usize) -> AllocationResult {
        let variance = self.covariance.variance(&weights).max(0.0);
        let volatility = variance.sqrt() * self.settings.trading_days.sqrt();

        let rounded: Vec<f64> = weights.iter().map(|w| round_dp(*w, 3)).collect();
        let expected_return = rounded
            .iter()
            .zip(self.metadata.iter())
            .map(|(w, m)| w * m.expected_return)
            .sum();
        let beta = rounded.iter().zip(self.metadata.iter()).map(|(w, m)| w * m.beta).sum();

        AllocationResult {
            weights: rounded,
            expected_return,
            volatility,
            beta,
            volatility_cap,
            relaxations,
        }
    }
}
