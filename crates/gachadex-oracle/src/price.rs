//! Price-oracle client contract and HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::OracleError;

/// One price lookup result.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceQuote {
    #[serde(rename = "priceUsd")]
    pub price_usd: f64,
    #[serde(rename = "priceSol", default)]
    pub price_sol: f64,
    #[serde(rename = "marketCapUsd", default)]
    pub market_cap_usd: f64,
    /// Unix seconds the quote was computed at.
    pub timestamp: i64,
}

/// The consumed oracle contract: mint in, quote (or "not found") out.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn quote(&self, token_mint: &str) -> Result<Option<PriceQuote>, OracleError>;
}

/// HTTP oracle client: `GET {base_url}/price/{mint}`.
pub struct HttpPriceOracle {
    base_url: String,
    http: reqwest::Client,
}

impl HttpPriceOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn quote(&self, token_mint: &str) -> Result<Option<PriceQuote>, OracleError> {
        let url = format!("{}/price/{}", self.base_url.trim_end_matches('/'), token_mint);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(OracleError::Http(format!("HTTP {}", resp.status().as_u16())));
        }

        let quote = resp
            .json::<PriceQuote>()
            .await
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;
        Ok(Some(quote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_deserializes_oracle_shape() {
        let quote: PriceQuote = serde_json::from_str(
            r#"{"priceUsd": 0.0000421, "priceSol": 0.00000021, "marketCapUsd": 42100.0, "timestamp": 1700000000}"#,
        )
        .unwrap();
        assert!((quote.price_usd - 0.0000421).abs() < f64::EPSILON);
        assert_eq!(quote.timestamp, 1_700_000_000);
    }

    #[test]
    fn optional_fields_default() {
        let quote: PriceQuote =
            serde_json::from_str(r#"{"priceUsd": 1.0, "timestamp": 1}"#).unwrap();
        assert_eq!(quote.market_cap_usd, 0.0);
    }
}
