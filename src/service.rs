//! Allocation pipeline
//!
//! One run fetches the universe, assembles the price matrix, estimates the
//! covariance and solves every configured profile. Runs share no state.

use crate::config::{Config, OptimizerConfig};
use crate::data::{aggregate_metadata, unique_symbols, DataSource, PriceSeriesBuilder};
use crate::error::{AllocatorError, Result};
use crate::portfolio::{CovarianceMatrix, PortfolioAggregator, PortfolioTable, ProjectedGradientSolver};
use crate::types::{AssetRecord, PriceObservation, RiskProfile, Symbol};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

pub struct AllocationService {
    source: Arc<dyn DataSource>,
    config: Config,
}

impl AllocationService {
    pub fn new(source: Arc<dyn DataSource>, config: Config) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the full pipeline against freshly fetched data
    pub async fn compute(&self) -> Result<PortfolioTable> {
        let request_id = Uuid::new_v4();
        let span = info_span!("allocation", %request_id);

        let result = self.run().instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| warn!("Allocation failed: {}", e));
        }
        result
    }

    async fn run(&self) -> Result<PortfolioTable> {
        let records = self.source.asset_universe().await?;
        if records.is_empty() {
            return Err(AllocatorError::EmptyUniverse);
        }

        let symbols = unique_symbols(&records);
        info!(records = records.len(), symbols = symbols.len(), "Fetched asset universe");

        let mut histories = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let history = self.source.price_history(&symbol).await?;
            debug!(symbol = %symbol, quotes = history.len(), "Fetched price history");
            histories.push((symbol, history));
        }

        let profiles = resolve_profiles(&self.config.profiles.named, &self.source.volatility_profiles().await?)?;

        // The numerical core is synchronous; keep it off the async workers
        let optimizer = self.config.optimizer.clone();
        let general = self.config.profiles.general.clone();
        let span = Span::current();
        let table = tokio::task::spawn_blocking(move || {
            span.in_scope(|| allocate(&records, histories, &profiles, &optimizer, &general))
        })
        .await??;

        info!(profiles = table.len(), "Allocation complete");
        Ok(table)
    }
}

/// Synchronous half of a run: price matrix, covariance and every profile solve
pub fn allocate(
    records: &[AssetRecord],
    histories: Vec<(Symbol, Vec<PriceObservation>)>,
    profiles: &[RiskProfile],
    optimizer: &OptimizerConfig,
    general: &str,
) -> Result<PortfolioTable> {
    let mut builder = PriceSeriesBuilder::new();
    for (symbol, history) in &histories {
        builder.push(symbol, history)?;
    }
    let prices = builder.build();
    if prices.is_empty() {
        return Err(AllocatorError::EmptyUniverse);
    }
    info!(
        retained = prices.num_symbols(),
        days = prices.num_days(),
        "Price matrix assembled"
    );

    let metadata = aggregate_metadata(records, prices.symbols())?;
    let covariance = CovarianceMatrix::from_prices(&prices)?;
    let solver = ProjectedGradientSolver::new(optimizer.max_iterations, optimizer.tolerance);
    let table = PortfolioAggregator::new(&covariance, &metadata, &solver)
        .with_settings(optimizer.relaxation())
        .aggregate(general, profiles)?;

    Ok(table)
}

/// Look up each configured profile's volatility ceiling (percent)
pub fn resolve_profiles(names: &[String], volatilities: &HashMap<String, Decimal>) -> Result<Vec<RiskProfile>> {
    names
        .iter()
        .map(|name| -> Result<RiskProfile> {
            let pct = volatilities
                .get(name)
                .ok_or_else(|| AllocatorError::MissingProfile(name.clone()))?;
            RiskProfile::from_percent(name.clone(), *pct)
                .ok_or_else(|| AllocatorError::Parse(format!("volatility {} for {} out of range", pct, name)))
        })
        .collect()
}
