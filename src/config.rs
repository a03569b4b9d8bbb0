//! Configuration management
//!
//! Settings come from a TOML file layered with `ALLOCATOR__` environment
//! variables, e.g. `ALLOCATOR__SERVER__PORT=9000`. Every section has
//! defaults, so a missing file yields a usable configuration.

use crate::error::Result;
use crate::portfolio::{RelaxationSettings, RELAXATION_STEP, TRADING_DAYS};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://dracarinvest.com.br/Software/Portfolio/";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Upstream data service
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Base URL the endpoint paths are appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Solver and relaxation parameters
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    /// Trading days per year used to annualize volatility
    #[serde(default = "default_trading_days")]
    pub trading_days: f64,
    /// Volatility added to an infeasible profile's cap per retry
    #[serde(default = "default_relaxation_step")]
    pub relaxation_step: f64,
    #[serde(default = "default_max_relaxations")]
    pub max_relaxations: usize,
    /// Iteration cap for one QP solve
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Convergence tolerance on the projected-gradient residual
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_trading_days() -> f64 {
    TRADING_DAYS
}

fn default_relaxation_step() -> f64 {
    RELAXATION_STEP
}

fn default_max_relaxations() -> usize {
    5000
}

fn default_max_iterations() -> usize {
    200_000
}

fn default_tolerance() -> f64 {
    1e-12
}

impl OptimizerConfig {
    pub fn relaxation(&self) -> RelaxationSettings {
        RelaxationSettings {
            trading_days: self.trading_days,
            step: self.relaxation_step,
            max_relaxations: self.max_relaxations,
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            trading_days: default_trading_days(),
            relaxation_step: default_relaxation_step(),
            max_relaxations: default_max_relaxations(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

/// Which profiles to solve, in output order
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilesConfig {
    /// Output key of the unconstrained portfolio
    #[serde(default = "default_general")]
    pub general: String,
    /// Profile names as reported by the volatility source
    #[serde(default = "default_named")]
    pub named: Vec<String>,
}

fn default_general() -> String {
    "Geral".to_string()
}

fn default_named() -> Vec<String> {
    vec![
        "Conservador".to_string(),
        "Moderado".to_string(),
        "Sofisticado".to_string(),
    ]
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            general: default_general(),
            named: default_named(),
        }
    }
}

/// HTTP server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load from a TOML file (optional) and `ALLOCATOR__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let expanded = shellexpand::tilde(path);
        let settings = config::Config::builder()
            .add_source(config::File::from(Path::new(expanded.as_ref())).required(false))
            .add_source(
                config::Environment::with_prefix("ALLOCATOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
