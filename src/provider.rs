//! External close-series providers used when the intercepted feed has not
//! produced enough history for an instrument.
//!
//! Both clients speak to free-tier REST APIs and are constructed with an
//! overridable base URL so tests can point them at a local mock server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

/// Source of recent 1-minute closes for a normalized symbol like `EUR/USD`.
#[async_trait]
pub trait CloseSeriesProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Most recent closes, oldest first, at most `limit` values.
    async fn recent_closes(&self, symbol: &str, limit: usize) -> Result<Vec<f64>>;
}

/// Strips the OTC suffix and splits `EUR/USD` into its two legs.
fn pair_legs(symbol: &str) -> Option<(String, String)> {
    let core = symbol
        .split(|c| c == '_' || c == '-')
        .next()
        .unwrap_or(symbol);
    let mut parts = core.split('/');
    let base = parts.next()?.trim().to_uppercase();
    let quote = parts.next()?.trim().to_uppercase();
    if base.is_empty() || quote.is_empty() || parts.next().is_some() {
        return None;
    }
    Some((base, quote))
}

/// Finnhub forex candle client.
/// Docs: https://finnhub.io/docs/api/forex-candles
pub struct FinnhubProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct FinnhubCandleResponse {
    #[serde(rename = "s")]
    status: String,
    #[serde(rename = "c", default)]
    closes: Vec<f64>,
}

impl FinnhubProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://finnhub.io/api/v1")
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CloseSeriesProvider for FinnhubProvider {
    fn name(&self) -> &'static str {
        "finnhub"
    }

    async fn recent_closes(&self, symbol: &str, limit: usize) -> Result<Vec<f64>> {
        let (base, quote) =
            pair_legs(symbol).with_context(|| format!("not a currency pair: {symbol}"))?;
        let to = chrono::Utc::now().timestamp();
        let from = to - (limit as i64 + 5) * 60;
        let url = format!(
            "{}/forex/candle?symbol=OANDA:{}_{}&resolution=1&from={}&to={}&token={}",
            self.base_url, base, quote, from, to, self.api_key
        );

        debug!(symbol, limit, "fetching finnhub closes");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send Finnhub request")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Finnhub API error: {}", response.status()));
        }

        let data: FinnhubCandleResponse = response
            .json()
            .await
            .context("Failed to parse Finnhub response")?;

        if data.status != "ok" {
            return Err(anyhow::anyhow!("Finnhub returned status {}", data.status));
        }

        let mut closes = data.closes;
        closes.retain(|c| c.is_finite() && *c > 0.0);
        if closes.len() > limit {
            closes.drain(..closes.len() - limit);
        }
        Ok(closes)
    }
}

/// Alpha Vantage FX_INTRADAY client.
/// Free tier: 25 calls/day.
/// Docs: https://www.alphavantage.co/documentation/
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct FxIntradayResponse {
    #[serde(rename = "Time Series FX (1min)", default)]
    series: BTreeMap<String, FxBar>,
}

#[derive(Debug, Deserialize)]
struct FxBar {
    #[serde(rename = "4. close")]
    close: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://www.alphavantage.co/query")
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CloseSeriesProvider for AlphaVantageProvider {
    fn name(&self) -> &'static str {
        "alphavantage"
    }

    async fn recent_closes(&self, symbol: &str, limit: usize) -> Result<Vec<f64>> {
        let (base, quote) =
            pair_legs(symbol).with_context(|| format!("not a currency pair: {symbol}"))?;
        let url = format!(
            "{}?function=FX_INTRADAY&from_symbol={}&to_symbol={}&interval=1min&outputsize=compact&apikey={}",
            self.base_url, base, quote, self.api_key
        );

        debug!(symbol, limit, "fetching alpha vantage closes");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send Alpha Vantage request")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Alpha Vantage API error: {}",
                response.status()
            ));
        }

        let data: FxIntradayResponse = response
            .json()
            .await
            .context("Failed to parse Alpha Vantage response")?;

        if data.series.is_empty() {
            return Err(anyhow::anyhow!("Alpha Vantage returned no series"));
        }

        // BTreeMap keys are timestamp strings, so iteration is oldest first.
        let mut closes: Vec<f64> = data
            .series
            .values()
            .filter_map(|bar| bar.close.parse::<f64>().ok())
            .filter(|c| c.is_finite() && *c > 0.0)
            .collect();
        if closes.len() > limit {
            closes.drain(..closes.len() - limit);
        }
        Ok(closes)
    }
}

/// Picks a provider from the environment: Finnhub when `FINNHUB_API_KEY` is
/// set, Alpha Vantage when `ALPHAVANTAGE_API_KEY` is, otherwise none and the
/// engine falls back to tick-built or synthetic candles.
pub fn provider_from_env() -> Option<Arc<dyn CloseSeriesProvider>> {
    if let Ok(key) = std::env::var("FINNHUB_API_KEY") {
        if !key.trim().is_empty() {
            return Some(Arc::new(FinnhubProvider::new(key)));
        }
    }
    if let Ok(key) = std::env::var("ALPHAVANTAGE_API_KEY") {
        if !key.trim().is_empty() {
            return Some(Arc::new(AlphaVantageProvider::new(key)));
        }
    }
    warn!("no close-series provider configured, using feed-derived candles only");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_legs_splits_and_uppercases() {
        assert_eq!(
            pair_legs("EUR/USD"),
            Some(("EUR".to_string(), "USD".to_string()))
        );
        assert_eq!(
            pair_legs("eur/usd_otc"),
            Some(("EUR".to_string(), "USD".to_string()))
        );
        assert_eq!(pair_legs("BTCUSD"), None);
        assert_eq!(pair_legs("A/B/C"), None);
    }
}
