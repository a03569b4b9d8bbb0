//! Crate-level error type

use crate::portfolio::PortfolioError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AllocatorError>;

#[derive(Error, Debug)]
pub enum AllocatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream {endpoint} returned status {status}")]
    Upstream { endpoint: String, status: u16 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Profile {0} missing from volatility source")]
    MissingProfile(String),

    #[error("Asset universe is empty")]
    EmptyUniverse,

    #[error(transparent)]
    Portfolio(#[from] PortfolioError),

    #[error("Allocation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AllocatorError {
    /// True for failures caused by the upstream data service rather than by
    /// the computation itself.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AllocatorError::Http(_)
                | AllocatorError::Upstream { .. }
                | AllocatorError::Json(_)
                | AllocatorError::Parse(_)
        )
    }
}
