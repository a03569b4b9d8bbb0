//! Runs every profile and collects the results into one table

use super::allocation::{AllocationResult, AllocationSolver, RelaxationSettings};
use super::covariance::CovarianceMatrix;
use super::solver::QpSolver;
use super::PortfolioError;
use crate::types::{to_percent, AssetMetadata, RiskProfile, Symbol};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Summary row labels, emitted after the symbol rows
pub const RETURN_ROW: &str = "Return";
pub const VOLATILITY_ROW: &str = "Volatility";
pub const BETA_ROW: &str = "Beta";

const SUMMARY_ROWS: [&str; 3] = [RETURN_ROW, VOLATILITY_ROW, BETA_ROW];

/// Drives [`AllocationSolver`] for the general portfolio and each named profile
pub struct PortfolioAggregator<'a, S: QpSolver> {
    covariance: &'a CovarianceMatrix,
    metadata: &'a [AssetMetadata],
    solver: &'a S,
    settings: RelaxationSettings,
}

impl<'a, S: QpSolver> PortfolioAggregator<'a, S> {
    pub fn new(covariance: &'a CovarianceMatrix, metadata: &'a [AssetMetadata], solver: &'a S) -> Self {
        Self {
            covariance,
            metadata,
            solver,
            settings: RelaxationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RelaxationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// General portfolio first, then each profile in the given order
    pub fn aggregate(&self, general_name: &str, profiles: &[RiskProfile]) -> Result<PortfolioTable, PortfolioError> {
        let mut table = PortfolioTable::new(self.covariance.symbols().to_vec())?;
        let allocator = AllocationSolver::new(self.covariance, self.metadata, self.solver)?.with_settings(self.settings);

        table.push(general_name, allocator.solve(None)?);

        for profile in profiles {
            table.push(&profile.name, allocator.solve(Some(profile))?);
        }

        Ok(table)
    }
}

/// Ordered profile name -> allocation, sharing one symbol index.
///
/// Serializes as a JSON object keyed by profile name, each value keyed by
/// symbol plus `Return`, `Volatility` and `Beta`. Weights, return and
/// volatility are emitted as percentages; beta is emitted unscaled.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioTable {
    symbols: Vec<Symbol>,
    columns: Vec<(String, AllocationResult)>,
}

impl PortfolioTable {
    /// Fails when a symbol shares its name with a summary row
    pub fn new(symbols: Vec<Symbol>) -> Result<Self, PortfolioError> {
        if let Some(reserved) = symbols.iter().find(|s| SUMMARY_ROWS.contains(&s.as_str())) {
            return Err(PortfolioError::ReservedSymbol(reserved.clone()));
        }

        Ok(Self {
            symbols,
            columns: Vec::new(),
        })
    }

    pub fn push(&mut self, name: &str, result: AllocationResult) {
        self.columns.push((name.to_string(), result));
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn get(&self, profile: &str) -> Option<&AllocationResult> {
        self.columns.iter().find(|(name, _)| name == profile).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AllocationResult)> {
        self.columns.iter().map(|(name, r)| (name.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Output rows for one profile: (label, value) in emission order
    pub fn rows(&self, profile: &str) -> Option<Vec<(&str, f64)>> {
        let result = self.get(profile)?;
        Some(output_rows(&self.symbols, result))
    }
}

fn output_rows<'s>(symbols: &'s [Symbol], result: &AllocationResult) -> Vec<(&'s str, f64)> {
    let mut rows: Vec<(&str, f64)> = symbols
        .iter()
        .zip(result.weights.iter())
        .map(|(s, w)| (s.as_str(), to_percent(*w)))
        .collect();
    rows.push((RETURN_ROW, to_percent(result.expected_return)));
    rows.push((VOLATILITY_ROW, to_percent(result.volatility)));
    rows.push((BETA_ROW, result.beta));
    rows
}

struct ColumnView<'t> {
    symbols: &'t [Symbol],
    result: &'t AllocationResult,
}

impl Serialize for ColumnView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rows = output_rows(self.symbols, self.result);
        let mut map = serializer.serialize_map(Some(rows.len()))?;
        for (label, value) in rows {
            map.serialize_entry(label, &value)?;
        }
        map.end()
    }
}

impl Serialize for PortfolioTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, result) in &self.columns {
            map.serialize_entry(
                name,
                &ColumnView {
                    symbols: &self.symbols,
                    result,
                },
            )?;
        }
        map.end()
    }
}
