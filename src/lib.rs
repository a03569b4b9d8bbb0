//! Risk-Profiled Portfolio Allocator
//!
//! Mean-variance (Markowitz) allocations for a set of named risk profiles,
//! computed from upstream asset, price and volatility data.
//!
//! ## Architecture
//!
//! ```text
//! DataSource (HTTP) → PriceSeriesBuilder → CovarianceMatrix → AllocationSolver (×profiles)
//!                                                                    ↓
//!                                          CLI / HTTP API ← PortfolioAggregator
//! ```

pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod portfolio;
pub mod server;
pub mod service;
pub mod types;

#[cfg(test)]
mod config_tests;
