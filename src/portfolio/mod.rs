//! # Portfolio Optimization Module
//!
//! Risk-profiled mean-variance (Markowitz) allocation:
//! - Daily log returns and pairwise-complete sample covariance
//! - Minimum variance portfolio on the long-only simplex ("general" profile)
//! - Return-rewarding portfolios under per-asset caps and a volatility ceiling
//! - Volatility-ceiling relaxation when a profile is infeasible
//!
//! ```rust,ignore
//! use portfolio_allocator::portfolio::{CovarianceMatrix, PortfolioAggregator, ProjectedGradientSolver};
//!
//! let cov = CovarianceMatrix::from_prices(&prices)?;
//! let solver = ProjectedGradientSolver::default();
//! let table = PortfolioAggregator::new(&cov, &metadata, &solver).aggregate("General", &profiles)?;
//! ```

pub mod aggregator;
pub mod allocation;
pub mod covariance;
pub mod solver;
#[cfg(test)]
mod tests;

pub use aggregator::{PortfolioAggregator, PortfolioTable, BETA_ROW, RETURN_ROW, VOLATILITY_ROW};
pub use allocation::{AllocationResult, AllocationSolver, RelaxationSettings};
pub use covariance::{log_returns, CovarianceMatrix};
pub use solver::{ProjectedGradientSolver, QpSolver, QuadraticProgram, SolveError};

use thiserror::Error;

/// Days per year used to annualize daily figures
pub const TRADING_DAYS: f64 = 252.0;

/// Step by which an infeasible volatility ceiling is raised
pub const RELAXATION_STEP: f64 = 0.002;

/// Portfolio optimization errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
    #[error("Insufficient data: {first}/{second} share {observations} returns, need at least 2")]
    InsufficientOverlap {
        first: String,
        second: String,
        observations: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("Symbol {0} added twice")]
    DuplicateSymbol(String),

    #[error("Symbol {0} collides with a summary row name")]
    ReservedSymbol(String),

    #[error("No assets left to allocate")]
    NoAssets,

    #[error("Covariance matrix is not symmetric at ({row}, {col})")]
    AsymmetricCovariance { row: usize, col: usize },

    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("Per-asset caps sum to {total}, below the fully-invested budget")]
    CapsBelowBudget { total: f64 },

    #[error("Profile {profile} still infeasible after {attempts} relaxations (volatility cap {max_volatility})")]
    RelaxationExhausted {
        profile: String,
        attempts: usize,
        max_volatility: f64,
    },

    #[error("Solver failed: {0}")]
    NumericalFailure(String),
}
