//! Input data: the upstream data-source seam, asset-universe reduction and
//! price-matrix assembly.

pub mod prices;

pub use prices::{PriceMatrix, PriceSeriesBuilder};

use crate::error::{AllocatorError, Result};
use crate::types::{AssetMetadata, AssetRecord, PriceObservation, Symbol};
use async_trait::async_trait;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

/// Source of the three upstream datasets a pipeline run needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Asset universe records (symbol, allocation %, expected return %, beta)
    async fn asset_universe(&self) -> Result<Vec<AssetRecord>>;

    /// Price history for one symbol
    async fn price_history(&self, symbol: &str) -> Result<Vec<PriceObservation>>;

    /// Profile name -> maximum annualized volatility in percent
    async fn volatility_profiles(&self) -> Result<HashMap<String, Decimal>>;
}

/// Distinct symbols in first-appearance order
pub fn unique_symbols(records: &[AssetRecord]) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.symbol.as_str()))
        .map(|r| r.symbol.clone())
        .collect()
}

/// Reduce the raw universe to one metadata entry per requested symbol.
///
/// Allocations are summed across all records of a symbol; expected return and
/// beta come from the first record. Percent fields are converted to fractions.
pub fn aggregate_metadata(records: &[AssetRecord], symbols: &[Symbol]) -> Result<Vec<AssetMetadata>> {
    symbols
        .iter()
        .map(|symbol| -> Result<AssetMetadata> {
            let mut matching = records.iter().filter(|r| &r.symbol == symbol);
            let first = matching
                .next()
                .ok_or_else(|| AllocatorError::Parse(format!("no asset record for {}", symbol)))?;

            let allocation_pct = matching.fold(first.allocation_pct, |acc, r| acc + r.allocation_pct);

            Ok(AssetMetadata::new(
                pct_to_fraction(allocation_pct, symbol)?,
                pct_to_fraction(first.expected_return_pct, symbol)?,
                to_f64(first.beta, symbol)?,
            ))
        })
        .collect()
}

fn pct_to_fraction(value: Decimal, symbol: &str) -> Result<f64> {
    to_f64(value / Decimal::ONE_HUNDRED, symbol)
}

fn to_f64(value: Decimal, symbol: &str) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| AllocatorError::Parse(format!("value {} for {} out of range", value, symbol)))
}
