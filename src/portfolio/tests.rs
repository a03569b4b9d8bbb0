//! Tests for the optimization pipeline

use super::*;
use crate::data::prices::build_price_matrix;
use crate::types::{AssetMetadata, PriceObservation, RiskProfile};
use chrono::NaiveDate;
use rand::Rng;

fn day(d: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, d)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

/// Prices whose consecutive log returns are exactly `returns`
fn series_from_returns(start: f64, returns: &[f64]) -> Vec<PriceObservation> {
    let mut price = start;
    let mut obs = vec![PriceObservation::new(day(1), price)];
    for (i, r) in returns.iter().enumerate() {
        price *= r.exp();
        obs.push(PriceObservation::new(day(i as u32 + 2), price));
    }
    obs
}

/// Two symbols with zero sample covariance: var(A) = 1e-4, var(B) = 3e-4
fn uncorrelated_pair() -> CovarianceMatrix {
    let prices = build_price_matrix(vec![
        ("A", series_from_returns(100.0, &[0.01, -0.01, 0.0])),
        ("B", series_from_returns(50.0, &[0.01, 0.01, -0.02])),
    ])
    .unwrap();
    CovarianceMatrix::from_prices(&prices).unwrap()
}

fn sample_covariance() -> CovarianceMatrix {
    CovarianceMatrix::from_values(
        vec!["A".to_string(), "B".to_string(), "C".to_string()],
        vec![
            vec![4.0e-4, 1.0e-4, 0.5e-4],
            vec![1.0e-4, 9.0e-4, 2.0e-4],
            vec![0.5e-4, 2.0e-4, 6.25e-4],
        ],
    )
    .unwrap()
}

fn sample_metadata() -> Vec<AssetMetadata> {
    vec![
        AssetMetadata::new(0.6, 0.08, 0.7),
        AssetMetadata::new(0.5, 0.15, 1.3),
        AssetMetadata::new(0.5, 0.11, 1.0),
    ]
}

fn assert_budget(result: &AllocationResult) {
    assert!((result.weight_sum() - 1.0).abs() <= 1e-3, "weights sum to {}", result.weight_sum());
    assert!(result.weights.iter().all(|w| *w >= 0.0), "negative weight in {:?}", result.weights);
}

#[test]
fn test_log_returns_skip_gaps() {
    let returns = log_returns(&[Some(100.0), Some(110.0), None, Some(121.0), Some(121.0)]);
    assert_eq!(returns[0], None);
    assert!((returns[1].unwrap() - (1.1f64).ln()).abs() < 1e-12);
    assert_eq!(returns[2], None);
    assert_eq!(returns[3], None);
    assert_eq!(returns[4], Some(0.0));
}

#[test]
fn test_covariance_is_symmetric() {
    let prices = build_price_matrix(vec![
        ("A", series_from_returns(100.0, &[0.01, -0.02, 0.015, 0.003, -0.007])),
        ("B", series_from_returns(20.0, &[0.02, 0.01, -0.01, 0.004, 0.0])),
        ("C", series_from_returns(7.0, &[-0.03, 0.02, 0.01, -0.002, 0.012])),
    ])
    .unwrap();
    let cov = CovarianceMatrix::from_prices(&prices).unwrap();

    for i in 0..cov.len() {
        for j in 0..cov.len() {
            assert_eq!(cov.get(i, j), cov.get(j, i));
        }
        assert!(cov.get(i, i) > 0.0);
    }
}

#[test]
fn test_covariance_closed_form() {
    let cov = uncorrelated_pair();
    assert!((cov.get(0, 0) - 1e-4).abs() < 1e-12);
    assert!((cov.get(1, 1) - 3e-4).abs() < 1e-12);
    assert!(cov.get(0, 1).abs() < 1e-12);
}

#[test]
fn test_covariance_uses_pairwise_complete_days() {
    // B is missing day 3, so returns on days 3 and 4 are undefined for B
    let mut b = series_from_returns(50.0, &[0.01, 0.02, -0.01, 0.03, -0.02]);
    b.remove(2);
    let prices = build_price_matrix(vec![
        ("A", series_from_returns(100.0, &[0.01, -0.02, 0.015, 0.003, -0.007])),
        ("B", b),
    ])
    .unwrap();
    let cov = CovarianceMatrix::from_prices(&prices).unwrap();

    // A's variance uses all 5 returns
    let a = [0.01, -0.02, 0.015, 0.003, -0.007];
    let mean = a.iter().sum::<f64>() / 5.0;
    let var = a.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 4.0;
    assert!((cov.get(0, 0) - var).abs() < 1e-12);

    // B's variance uses returns on days 2, 5, 6
    let rb = [0.01, 0.03, -0.02];
    let mean_b = rb.iter().sum::<f64>() / 3.0;
    let var_b = rb.iter().map(|x| (x - mean_b).powi(2)).sum::<f64>() / 2.0;
    assert!((cov.get(1, 1) - var_b).abs() < 1e-12);
}

#[test]
fn test_covariance_insufficient_overlap() {
    let prices = build_price_matrix(vec![("A", series_from_returns(100.0, &[0.01]))]).unwrap();
    let result = CovarianceMatrix::from_prices(&prices);
    assert!(matches!(result, Err(PortfolioError::InsufficientOverlap { observations: 1, .. })));
}

#[test]
fn test_from_values_rejects_asymmetry() {
    let result = CovarianceMatrix::from_values(
        vec!["A".to_string(), "B".to_string()],
        vec![vec![1e-4, 2e-5], vec![3e-5, 1e-4]],
    );
    assert_eq!(result, Err(PortfolioError::AsymmetricCovariance { row: 0, col: 1 }));
}

#[test]
fn test_general_splits_inverse_to_variance() {
    let cov = uncorrelated_pair();
    let metadata = vec![AssetMetadata::new(1.0, 0.10, 1.0), AssetMetadata::new(1.0, 0.20, 2.0)];
    let solver = ProjectedGradientSolver::default();

    let result = AllocationSolver::new(&cov, &metadata, &solver)
        .unwrap()
        .solve(None)
        .unwrap();

    // w_i ∝ 1/σ²_i  =>  (1/1e-4) : (1/3e-4) = 3 : 1
    assert!((result.weights[0] - 0.75).abs() < 1e-3, "{:?}", result.weights);
    assert!((result.weights[1] - 0.25).abs() < 1e-3, "{:?}", result.weights);

    let min_variance: f64 = 1.0 / (1.0 / 1e-4 + 1.0 / 3e-4);
    assert!((result.volatility - (min_variance * 252.0).sqrt()).abs() < 1e-6);
    assert!((result.expected_return - 0.125).abs() < 1e-9);
    assert!((result.beta - 1.25).abs() < 1e-9);
    assert_eq!(result.volatility_cap, None);
    assert_eq!(result.relaxations, 0);
}

#[test]
fn test_general_is_global_minimum_variance() {
    let cov = sample_covariance();
    let metadata = sample_metadata();
    let solver = ProjectedGradientSolver::default();
    let allocator = AllocationSolver::new(&cov, &metadata, &solver).unwrap();

    let result = allocator.solve(None).unwrap();
    assert_budget(&result);

    // Reported volatility comes from the unrounded optimum
    let best = result.volatility.powi(2) / TRADING_DAYS;
    assert!((cov.variance(&result.weights) - best).abs() < 1e-5);

    let mut rng = rand::rng();
    for _ in 0..5000 {
        let raw: Vec<f64> = (0..3).map(|_| rng.random::<f64>()).collect();
        let total: f64 = raw.iter().sum();
        let w: Vec<f64> = raw.iter().map(|x| x / total).collect();
        assert!(cov.variance(&w) >= best - 1e-12, "sample {:?} beats optimum", w);
    }
}

#[test]
fn test_profile_respects_caps_and_ceiling() {
    let cov = sample_covariance();
    let metadata = sample_metadata();
    let solver = ProjectedGradientSolver::default();
    let allocator = AllocationSolver::new(&cov, &metadata, &solver).unwrap();

    for max_volatility in [0.30, 0.35, 0.45] {
        let profile = RiskProfile::new("P", max_volatility);
        let result = allocator.solve(Some(&profile)).unwrap();
        assert_budget(&result);

        for (w, m) in result.weights.iter().zip(metadata.iter()) {
            assert!(*w <= m.max_allocation + 1e-3, "{} above cap {}", w, m.max_allocation);
        }
        let cap = result.volatility_cap.unwrap();
        assert!(result.volatility <= cap + 1e-3, "vol {} above cap {}", result.volatility, cap);
    }
}

#[test]
fn test_looser_ceiling_never_lowers_return() {
    let cov = sample_covariance();
    let metadata = sample_metadata();
    let solver = ProjectedGradientSolver::default();
    let allocator = AllocationSolver::new(&cov, &metadata, &solver).unwrap();

    let tight = allocator.solve(Some(&RiskProfile::new("tight", 0.30))).unwrap();
    let loose = allocator.solve(Some(&RiskProfile::new("loose", 0.45))).unwrap();
    assert!(loose.expected_return >= tight.expected_return - 1e-3);
}

#[test]
fn test_infeasible_ceiling_relaxes() {
    let cov = uncorrelated_pair();
    let metadata = vec![AssetMetadata::new(1.0, 0.10, 1.0), AssetMetadata::new(1.0, 0.20, 2.0)];
    let solver = ProjectedGradientSolver::default();
    let allocator = AllocationSolver::new(&cov, &metadata, &solver).unwrap();

    // Minimum achievable annualized volatility is about 13.7%
    let starting_cap = 0.05;
    let result = allocator.solve(Some(&RiskProfile::new("Conservative", starting_cap))).unwrap();

    assert!(result.relaxations >= 1);
    assert_budget(&result);
    let final_cap = result.volatility_cap.unwrap();
    assert!(final_cap > starting_cap);
    assert!((final_cap - (starting_cap + RELAXATION_STEP * result.relaxations as f64)).abs() < 1e-9);
    assert!(result.volatility > starting_cap);
    assert!(result.volatility <= final_cap + 1e-3);
    // One step earlier would still have been infeasible
    assert!(result.volatility > final_cap - RELAXATION_STEP - 1e-3);
}

#[test]
fn test_relaxation_is_bounded() {
    let cov = uncorrelated_pair();
    let metadata = vec![AssetMetadata::new(1.0, 0.10, 1.0), AssetMetadata::new(1.0, 0.20, 2.0)];
    let solver = ProjectedGradientSolver::default();
    let allocator = AllocationSolver::new(&cov, &metadata, &solver)
        .unwrap()
        .with_settings(RelaxationSettings {
            max_relaxations: 3,
            ..RelaxationSettings::default()
        });

    let result = allocator.solve(Some(&RiskProfile::new("Conservative", 0.01)));
    assert!(matches!(
        result,
        Err(PortfolioError::RelaxationExhausted { attempts: 3, .. })
    ));
}

#[test]
fn test_caps_below_budget_fail_fast() {
    let cov = uncorrelated_pair();
    let metadata = vec![AssetMetadata::new(0.3, 0.10, 1.0), AssetMetadata::new(0.4, 0.20, 2.0)];
    let solver = ProjectedGradientSolver::default();
    let allocator = AllocationSolver::new(&cov, &metadata, &solver).unwrap();

    let result = allocator.solve(Some(&RiskProfile::new("Moderate", 0.5)));
    assert!(matches!(result, Err(PortfolioError::CapsBelowBudget { .. })));
}

#[test]
fn test_metadata_length_must_match() {
    let cov = uncorrelated_pair();
    let metadata = vec![AssetMetadata::new(1.0, 0.10, 1.0)];
    let solver = ProjectedGradientSolver::default();
    assert!(matches!(
        AllocationSolver::new(&cov, &metadata, &solver),
        Err(PortfolioError::DimensionMismatch { expected: 2, actual: 1 })
    ));
}

/// Backend that always reports infeasibility, for exercising the loop
struct NeverFeasible;

impl QpSolver for NeverFeasible {
    fn solve(&self, _program: &QuadraticProgram<'_>) -> Result<Vec<f64>, SolveError> {
        Err(SolveError::Infeasible)
    }
}

/// Backend that fails numerically
struct Broken;

impl QpSolver for Broken {
    fn solve(&self, _program: &QuadraticProgram<'_>) -> Result<Vec<f64>, SolveError> {
        Err(SolveError::NumericalFailure("ill-conditioned".to_string()))
    }
}

#[test]
fn test_injected_backend_drives_relaxation() {
    let cov = uncorrelated_pair();
    let metadata = vec![AssetMetadata::new(1.0, 0.10, 1.0), AssetMetadata::new(1.0, 0.20, 2.0)];
    let allocator = AllocationSolver::new(&cov, &metadata, &NeverFeasible)
        .unwrap()
        .with_settings(RelaxationSettings {
            max_relaxations: 10,
            ..RelaxationSettings::default()
        });

    match allocator.solve(Some(&RiskProfile::new("Sophisticated", 0.2))) {
        Err(PortfolioError::RelaxationExhausted { max_volatility, .. }) => {
            // Last cap actually attempted: ten raises above the starting cap
            assert!((max_volatility - (0.2 + 10.0 * RELAXATION_STEP)).abs() < 1e-9);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_numerical_failure_is_not_retried() {
    let cov = uncorrelated_pair();
    let metadata = vec![AssetMetadata::new(1.0, 0.10, 1.0), AssetMetadata::new(1.0, 0.20, 2.0)];
    let allocator = AllocationSolver::new(&cov, &metadata, &Broken).unwrap();

    assert!(matches!(
        allocator.solve(Some(&RiskProfile::new("Moderate", 0.2))),
        Err(PortfolioError::NumericalFailure(_))
    ));
    assert!(matches!(allocator.solve(None), Err(PortfolioError::NumericalFailure(_))));
}

#[test]
fn test_aggregate_orders_general_first() {
    let cov = sample_covariance();
    let metadata = sample_metadata();
    let solver = ProjectedGradientSolver::default();
    let profiles = vec![
        RiskProfile::new("Conservative", 0.30),
        RiskProfile::new("Moderate", 0.35),
        RiskProfile::new("Sophisticated", 0.45),
    ];

    let table = PortfolioAggregator::new(&cov, &metadata, &solver)
        .aggregate("General", &profiles)
        .unwrap();

    assert_eq!(
        table.profile_names(),
        vec!["General", "Conservative", "Moderate", "Sophisticated"]
    );
    assert!(table.get("General").unwrap().volatility_cap.is_none());
    for (_, result) in table.iter() {
        assert_budget(result);
    }
}

#[test]
fn test_table_serializes_percentages_in_order() {
    let mut table = PortfolioTable::new(vec!["A".to_string(), "B".to_string()]).unwrap();
    table.push(
        "General",
        AllocationResult {
            weights: vec![0.75, 0.25],
            expected_return: 0.125,
            volatility: 0.1375,
            beta: 1.25,
            volatility_cap: None,
            relaxations: 0,
        },
    );
    table.push(
        "Moderate",
        AllocationResult {
            weights: vec![0.123, 0.877],
            expected_return: 0.1877,
            volatility: 0.2,
            beta: 1.877,
            volatility_cap: Some(0.2),
            relaxations: 0,
        },
    );

    let json = serde_json::to_string(&table).unwrap();
    assert_eq!(
        json,
        concat!(
            r#"{"General":{"A":75.0,"B":25.0,"Return":12.5,"Volatility":13.75,"Beta":1.25},"#,
            r#""Moderate":{"A":12.3,"B":87.7,"Return":18.77,"Volatility":20.0,"Beta":1.877}}"#
        )
    );

    let rows = table.rows("Moderate").unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[4], ("Beta", 1.877));
}

#[test]
fn test_summary_row_names_rejected_as_symbols() {
    for name in [RETURN_ROW, VOLATILITY_ROW, BETA_ROW] {
        let symbols = vec![name.to_string(), "X".to_string()];
        assert_eq!(
            PortfolioTable::new(symbols),
            Err(PortfolioError::ReservedSymbol(name.to_string()))
        );
    }

    let cov = CovarianceMatrix::from_values(
        vec!["Beta".to_string(), "X".to_string()],
        vec![vec![1e-4, 0.0], vec![0.0, 3e-4]],
    )
    .unwrap();
    let metadata = vec![AssetMetadata::new(1.0, 0.10, 1.0), AssetMetadata::new(1.0, 0.20, 1.2)];
    let solver = ProjectedGradientSolver::default();
    let result = PortfolioAggregator::new(&cov, &metadata, &solver).aggregate("General", &[]);
    assert_eq!(result, Err(PortfolioError::ReservedSymbol("Beta".to_string())));
}
