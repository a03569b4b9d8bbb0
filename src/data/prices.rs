//! Aligned, gap-filtered price matrix
//!
//! Series are merged one symbol at a time. After every merge the column with
//! the most quotes sets the bar, and every column holding fewer than half of
//! that count is dropped. Because the bar is recomputed after each merge, a
//! symbol kept early can still be dropped once a richer symbol arrives later.

use crate::portfolio::PortfolioError;
use crate::types::{PriceObservation, Symbol};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Date-indexed price matrix with explicit gaps
#[derive(Debug, Clone, PartialEq)]
pub struct PriceMatrix {
    dates: Vec<NaiveDate>,
    symbols: Vec<Symbol>,
    /// columns[j][t] is the price of symbols[j] on dates[t]
    columns: Vec<Vec<Option<f64>>>,
}

impl PriceMatrix {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn columns(&self) -> &[Vec<Option<f64>>] {
        &self.columns
    }

    pub fn column(&self, symbol: &str) -> Option<&[Option<f64>]> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|j| self.columns[j].as_slice())
    }

    pub fn price(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        let t = self.dates.binary_search(&date).ok()?;
        self.column(symbol)?[t]
    }

    /// Number of non-missing prices for a symbol
    pub fn count(&self, symbol: &str) -> usize {
        self.column(symbol)
            .map(|c| c.iter().filter(|p| p.is_some()).count())
            .unwrap_or(0)
    }

    /// Number of dates in the index
    pub fn num_days(&self) -> usize {
        self.dates.len()
    }

    pub fn num_symbols(&self) -> usize {
        self.symbols.len()
    }

    /// True when no symbol survived filtering
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[derive(Debug, Clone)]
struct PriceColumn {
    symbol: Symbol,
    prices: BTreeMap<NaiveDate, f64>,
}

/// Incremental builder implementing the merge-then-filter fold
#[derive(Debug, Default)]
pub struct PriceSeriesBuilder {
    dates: BTreeSet<NaiveDate>,
    columns: Vec<PriceColumn>,
}

impl PriceSeriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outer-join one symbol's series into the matrix, then re-filter every
    /// column against the current richest column.
    pub fn push(&mut self, symbol: &str, observations: &[PriceObservation]) -> Result<(), PortfolioError> {
        if self.columns.iter().any(|c| c.symbol == symbol) {
            return Err(PortfolioError::DuplicateSymbol(symbol.to_string()));
        }

        let prices = daily_prices(symbol, observations)?;
        self.dates.extend(prices.keys().copied());
        self.columns.push(PriceColumn {
            symbol: symbol.to_string(),
            prices,
        });

        self.drop_sparse_columns();
        Ok(())
    }

    fn drop_sparse_columns(&mut self) {
        let max_count = self.columns.iter().map(|c| c.prices.len()).max().unwrap_or(0);

        self.columns.retain(|c| {
            let keep = c.prices.len() * 2 >= max_count;
            if !keep {
                debug!(
                    symbol = %c.symbol,
                    count = c.prices.len(),
                    max_count,
                    "Dropping symbol with insufficient price history"
                );
            }
            keep
        });
    }

    /// Symbols currently retained, in acceptance order
    pub fn symbols(&self) -> Vec<Symbol> {
        self.columns.iter().map(|c| c.symbol.clone()).collect()
    }

    pub fn build(self) -> PriceMatrix {
        let dates: Vec<NaiveDate> = self.dates.into_iter().collect();
        let symbols = self.columns.iter().map(|c| c.symbol.clone()).collect();
        let columns = self
            .columns
            .iter()
            .map(|c| dates.iter().map(|d| c.prices.get(d).copied()).collect())
            .collect();

        PriceMatrix {
            dates,
            symbols,
            columns,
        }
    }
}

/// Fold an ordered sequence of series into a price matrix
pub fn build_price_matrix<I, S>(series: I) -> Result<PriceMatrix, PortfolioError>
where
    I: IntoIterator<Item = (S, Vec<PriceObservation>)>,
    S: AsRef<str>,
{
    let mut builder = PriceSeriesBuilder::new();
    for (symbol, observations) in series {
        builder.push(symbol.as_ref(), &observations)?;
    }
    Ok(builder.build())
}

/// Normalize quotes to calendar days, keeping the first quote seen per day
fn daily_prices(symbol: &str, observations: &[PriceObservation]) -> Result<BTreeMap<NaiveDate, f64>, PortfolioError> {
    let mut prices = BTreeMap::new();
    for obs in observations {
        if !obs.price.is_finite() || obs.price <= 0.0 {
            return Err(PortfolioError::InvalidPrice {
                symbol: symbol.to_string(),
                price: obs.price,
            });
        }
        prices.entry(obs.day()).or_insert(obs.price);
    }
    Ok(prices)
}
