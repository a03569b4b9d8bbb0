//! Daily log returns and their sample covariance

use super::PortfolioError;
use crate::data::PriceMatrix;
use crate::types::Symbol;

/// Symmetric, symbol-indexed covariance of daily log returns
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    symbols: Vec<Symbol>,
    values: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
    /// Estimate covariance from a price matrix.
    ///
    /// Each pair uses only the days on which both symbols have a return, so
    /// different pairs may rest on different sample sizes.
    pub fn from_prices(prices: &PriceMatrix) -> Result<Self, PortfolioError> {
        let symbols = prices.symbols().to_vec();
        if symbols.is_empty() {
            return Err(PortfolioError::NoAssets);
        }

        let returns: Vec<Vec<Option<f64>>> = prices.columns().iter().map(|c| log_returns(c)).collect();

        let n = symbols.len();
        let mut values = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i..n {
                let (cov, observations) = pairwise_covariance(&returns[i], &returns[j]);
                let cov = cov.ok_or_else(|| PortfolioError::InsufficientOverlap {
                    first: symbols[i].clone(),
                    second: symbols[j].clone(),
                    observations,
                })?;
                values[i][j] = cov;
                values[j][i] = cov;
            }
        }

        Ok(Self { symbols, values })
    }

    /// Wrap a precomputed matrix, checking shape and symmetry
    pub fn from_values(symbols: Vec<Symbol>, values: Vec<Vec<f64>>) -> Result<Self, PortfolioError> {
        let n = symbols.len();
        if n == 0 {
            return Err(PortfolioError::NoAssets);
        }
        if values.len() != n {
            return Err(PortfolioError::DimensionMismatch {
                expected: n,
                actual: values.len(),
            });
        }
        for row in &values {
            if row.len() != n {
                return Err(PortfolioError::DimensionMismatch {
                    expected: n,
                    actual: row.len(),
                });
            }
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (values[i][j], values[j][i]);
                if (a - b).abs() > 1e-12 * a.abs().max(b.abs()).max(1.0) {
                    return Err(PortfolioError::AsymmetricCovariance { row: i, col: j });
                }
            }
        }

        Ok(Self { symbols, values })
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Portfolio variance wᵀΣw
    pub fn variance(&self, weights: &[f64]) -> f64 {
        quad_form(&self.values, weights)
    }
}

/// r[t] = ln(p[t]) - ln(p[t-1]); missing when either price is missing
pub fn log_returns(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut returns = Vec::with_capacity(prices.len());
    let mut previous: Option<f64> = None;
    for &price in prices {
        let r = match (previous, price) {
            (Some(p0), Some(p1)) => Some(p1.ln() - p0.ln()),
            _ => None,
        };
        returns.push(r);
        previous = price;
    }
    returns
}

/// Sample covariance over days where both series are present.
///
/// Returns the number of overlapping observations alongside; the covariance
/// is `None` when fewer than two overlap.
fn pairwise_covariance(a: &[Option<f64>], b: &[Option<f64>]) -> (Option<f64>, usize) {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b.iter())
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();

    let n = pairs.len();
    if n < 2 {
        return (None, n);
    }

    let mean_a = pairs.iter().map(|(x, _)| x).sum::<f64>() / n as f64;
    let mean_b = pairs.iter().map(|(_, y)| y).sum::<f64>() / n as f64;
    let sum: f64 = pairs.iter().map(|(x, y)| (x - mean_a) * (y - mean_b)).sum();

    (Some(sum / (n - 1) as f64), n)
}

pub(crate) fn quad_form(matrix: &[Vec<f64>], weights: &[f64]) -> f64 {
    matrix
        .iter()
        .zip(weights.iter())
        .map(|(row, &wi)| wi * row.iter().zip(weights.iter()).map(|(c, wj)| c * wj).sum::<f64>())
        .sum()
}
