//! Boundary to the browser-side companion that can actually press the
//! trade buttons. The policy loop only talks to the [`TradeActuator`]
//! trait; the shipped implementation drives the companion over a local
//! REST endpoint with short timeouts so a wedged page never stalls the
//! bridge.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::SignalSide;
use crate::symbol;
use crate::types::{BridgeError, Result};

const ACTUATOR_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountMode {
    Demo,
    Live,
}

impl AccountMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountMode::Demo => "demo",
            AccountMode::Live => "live",
        }
    }
}

/// Everything the auto-trade and auto-subscribe loops need from the
/// trading page.
#[async_trait]
pub trait TradeActuator: Send + Sync {
    /// Symbol shown on the active chart, normalized, if one is visible.
    async fn active_chart_symbol(&self) -> Result<Option<String>>;

    /// Whether the BUY/SELL buttons are visible and clickable.
    async fn is_trade_ui_ready(&self) -> Result<bool>;

    async fn switch_account(&self, mode: AccountMode) -> Result<()>;

    async fn set_stake(&self, amount: f64) -> Result<()>;

    /// Presses the button for the side. Returns false when the button was
    /// not found or the click did not land.
    async fn click_side(&self, side: SignalSide) -> Result<bool>;

    /// Pushes raw subscribe payloads onto the page's open socket. Returns
    /// the number of frames sent.
    async fn send_subscription_frames(&self, payloads: &[String]) -> Result<usize>;
}

/// REST client for the companion userscript's local control endpoint.
pub struct RestActuator {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartSymbolResponse {
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadyResponse {
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct ClickResponse {
    clicked: bool,
}

#[derive(Debug, Deserialize)]
struct SubscribeResponse {
    sent: usize,
}

impl RestActuator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_millis(ACTUATOR_TIMEOUT_MS))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.into(),
        }
    }

    fn map_err(err: reqwest::Error) -> BridgeError {
        if err.is_timeout() {
            BridgeError::ActuatorTimeout(ACTUATOR_TIMEOUT_MS)
        } else {
            BridgeError::Actuator(err.to_string())
        }
    }
}

#[async_trait]
impl TradeActuator for RestActuator {
    async fn active_chart_symbol(&self) -> Result<Option<String>> {
        let res: ChartSymbolResponse = self
            .client
            .get(format!("{}/chart/symbol", self.base_url))
            .send()
            .await
            .map_err(Self::map_err)?
            .json()
            .await
            .map_err(Self::map_err)?;
        Ok(res.symbol.as_deref().and_then(symbol::normalize))
    }

    async fn is_trade_ui_ready(&self) -> Result<bool> {
        let res: ReadyResponse = self
            .client
            .get(format!("{}/ui/ready", self.base_url))
            .send()
            .await
            .map_err(Self::map_err)?
            .json()
            .await
            .map_err(Self::map_err)?;
        Ok(res.ready)
    }

    async fn switch_account(&self, mode: AccountMode) -> Result<()> {
        debug!(mode = mode.as_str(), "switching account");
        self.client
            .post(format!("{}/account", self.base_url))
            .json(&serde_json::json!({ "mode": mode.as_str() }))
            .send()
            .await
            .map_err(Self::map_err)?
            .error_for_status()
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn set_stake(&self, amount: f64) -> Result<()> {
        self.client
            .post(format!("{}/stake", self.base_url))
            .json(&serde_json::json!({ "amount": amount.round() }))
            .send()
            .await
            .map_err(Self::map_err)?
            .error_for_status()
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn click_side(&self, side: SignalSide) -> Result<bool> {
        if side == SignalSide::Neutral {
            return Err(BridgeError::InvalidRequest(
                "cannot click a neutral side".to_string(),
            ));
        }
        let res: ClickResponse = self
            .client
            .post(format!("{}/trade", self.base_url))
            .json(&serde_json::json!({ "side": side.as_str() }))
            .send()
            .await
            .map_err(Self::map_err)?
            .json()
            .await
            .map_err(Self::map_err)?;
        Ok(res.clicked)
    }

    async fn send_subscription_frames(&self, payloads: &[String]) -> Result<usize> {
        if payloads.is_empty() {
            return Ok(0);
        }
        let res: SubscribeResponse = self
            .client
            .post(format!("{}/subscribe", self.base_url))
            .json(&serde_json::json!({ "payloads": payloads }))
            .send()
            .await
            .map_err(Self::map_err)?
            .json()
            .await
            .map_err(Self::map_err)?;
        Ok(res.sent)
    }
}
