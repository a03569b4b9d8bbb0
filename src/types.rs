//! Core domain types shared by the data layer and the optimizer

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tradable asset identifier
pub type Symbol = String;

/// One price quote for a symbol
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub timestamp: NaiveDateTime,
    pub price: f64,
}

impl PriceObservation {
    pub fn new(timestamp: NaiveDateTime, price: f64) -> Self {
        Self { timestamp, price }
    }

    /// Calendar day the quote belongs to
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Raw asset-universe record as reported by the upstream service.
///
/// Allocation and expected return are in percent; beta is unitless.
/// A symbol may appear in several records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub symbol: Symbol,
    pub allocation_pct: Decimal,
    pub expected_return_pct: Decimal,
    pub beta: Decimal,
}

/// Per-symbol inputs to the optimizer, as fractions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetMetadata {
    /// Upper bound on the weight (0-1)
    pub max_allocation: f64,
    /// Expected annualized return
    pub expected_return: f64,
    pub beta: f64,
}

impl AssetMetadata {
    pub fn new(max_allocation: f64, expected_return: f64, beta: f64) -> Self {
        Self {
            max_allocation,
            expected_return,
            beta,
        }
    }
}

/// Named risk profile with an annualized volatility ceiling
#[derive(Debug, Clone, PartialEq)]
pub struct RiskProfile {
    pub name: String,
    /// Maximum annualized volatility as a fraction
    pub max_volatility: f64,
}

impl RiskProfile {
    pub fn new(name: impl Into<String>, max_volatility: f64) -> Self {
        Self {
            name: name.into(),
            max_volatility,
        }
    }

    /// Build a profile from a volatility quoted in percent
    pub fn from_percent(name: impl Into<String>, max_volatility_pct: Decimal) -> Option<Self> {
        let fraction = (max_volatility_pct / Decimal::ONE_HUNDRED).to_f64()?;
        Some(Self::new(name, fraction))
    }
}

/// Round to `dp` decimal places using decimal arithmetic.
///
/// Falls back to the input for values outside the decimal range.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .and_then(|d| d.round_dp(dp).to_f64())
        .unwrap_or(value)
}

/// Express a fraction as a percentage without binary noise in the last digits
pub fn to_percent(value: f64) -> f64 {
    Decimal::from_f64(value)
        .and_then(|d| (d * Decimal::ONE_HUNDRED).normalize().to_f64())
        .unwrap_or(value * 100.0)
}
