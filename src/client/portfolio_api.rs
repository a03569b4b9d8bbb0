//! Portfolio service client
//!
//! Fetches the asset universe, per-symbol quote history and the volatility
//! ceiling of each risk profile from the upstream JSON endpoints.

use crate::config::SourceConfig;
use crate::data::DataSource;
use crate::error::{AllocatorError, Result};
use crate::types::{AssetRecord, PriceObservation};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::Client;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

const ASSETS_PATH: &str = "get_ativos";
const HISTORY_PATH: &str = "get_hist_cotacao";
const VOLATILITY_PATH: &str = "get_vol_perfil";

/// HTTP implementation of [`DataSource`]
#[derive(Clone)]
pub struct HttpDataSource {
    http: Client,
    base_url: String,
}

/// Numeric field that may arrive as a JSON number or a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Number(serde_json::Number),
    Text(String),
}

impl WireNumber {
    fn to_decimal(&self, field: &str) -> Result<Decimal> {
        let text = match self {
            WireNumber::Number(n) => n.to_string(),
            WireNumber::Text(s) => s.trim().to_string(),
        };
        parse_decimal(&text).ok_or_else(|| AllocatorError::Parse(format!("{} is not numeric: {:?}", field, text)))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct WireAsset {
    #[serde(rename = "codigo_ativo")]
    symbol: String,
    #[serde(rename = "alocacao")]
    allocation: WireNumber,
    #[serde(rename = "retorno")]
    expected_return: WireNumber,
    beta: WireNumber,
}

#[derive(Debug, Clone, Deserialize)]
struct WireQuote {
    #[serde(rename = "datahora_cotacao")]
    timestamp: String,
    #[serde(rename = "cotacao")]
    price: WireNumber,
}

impl HttpDataSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            warn!("Upstream {} returned {}", path, resp.status());
            return Err(AllocatorError::Upstream {
                endpoint: path.to_string(),
                status: resp.status().as_u16(),
            });
        }

        Ok(resp.text().await?)
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn asset_universe(&self) -> Result<Vec<AssetRecord>> {
        let body = self.get_text(ASSETS_PATH).await?;
        parse_assets(&body)
    }

    async fn price_history(&self, symbol: &str) -> Result<Vec<PriceObservation>> {
        let body = self.get_text(&format!("{}/{}", HISTORY_PATH, symbol)).await?;
        parse_price_history(&body)
    }

    async fn volatility_profiles(&self) -> Result<HashMap<String, Decimal>> {
        let body = self.get_text(VOLATILITY_PATH).await?;
        parse_volatility_profiles(&body)
    }
}

/// Parse the asset-universe payload: an array of asset records
pub fn parse_assets(body: &str) -> Result<Vec<AssetRecord>> {
    let wire: Vec<WireAsset> = serde_json::from_str(body)?;

    wire.into_iter()
        .map(|a| -> Result<AssetRecord> {
            Ok(AssetRecord {
                allocation_pct: a.allocation.to_decimal("alocacao")?,
                expected_return_pct: a.expected_return.to_decimal("retorno")?,
                beta: a.beta.to_decimal("beta")?,
                symbol: a.symbol,
            })
        })
        .collect()
}

/// Parse one symbol's quote history: an array of timestamped prices
pub fn parse_price_history(body: &str) -> Result<Vec<PriceObservation>> {
    let wire: Vec<WireQuote> = serde_json::from_str(body)?;

    wire.into_iter()
        .map(|q| -> Result<PriceObservation> {
            let price = q
                .price
                .to_decimal("cotacao")?
                .to_f64()
                .ok_or_else(|| AllocatorError::Parse("cotacao out of range".to_string()))?;
            Ok(PriceObservation::new(parse_timestamp(&q.timestamp)?, price))
        })
        .collect()
}

/// Parse profile volatility ceilings (percent).
///
/// Accepts `{"name": v}`, `[{"name": v}]` and the column layout
/// `{"name": [v]}`.
pub fn parse_volatility_profiles(body: &str) -> Result<HashMap<String, Decimal>> {
    let value: Value = serde_json::from_str(body)?;

    let object = match value {
        Value::Object(map) => map,
        Value::Array(mut rows) if rows.len() == 1 => match rows.remove(0) {
            Value::Object(map) => map,
            other => return Err(AllocatorError::Parse(format!("unexpected volatility row: {}", other))),
        },
        other => return Err(AllocatorError::Parse(format!("unexpected volatility payload: {}", other))),
    };

    object
        .into_iter()
        .map(|(name, v)| -> Result<(String, Decimal)> {
            let cell = match v {
                Value::Array(mut cells) if cells.len() == 1 => cells.remove(0),
                other => other,
            };
            let number: WireNumber = serde_json::from_value(cell)
                .map_err(|_| AllocatorError::Parse(format!("volatility for {} is not numeric", name)))?;
            let pct = number.to_decimal(&name)?;
            Ok((name, pct))
        })
        .collect()
}

/// Parse an upstream timestamp.
///
/// RFC 3339 keeps the local wall-clock time; naive forms may use a space or
/// `T` separator with optional fractional seconds, or be a bare date.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| AllocatorError::Parse(format!("invalid timestamp: {:?}", s)))
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s)).ok()
}
