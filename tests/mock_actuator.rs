//! Scripted TradeActuator for exercising the policy loop without a page

use std::sync::Mutex;

use async_trait::async_trait;
use driftnet::engine::SignalSide;
use driftnet::types::{BridgeError, Result};
use driftnet::{AccountMode, TradeActuator};

/// Records every call made by the policy so tests can assert on the exact
/// interaction sequence.
pub struct MockActuator {
    pub chart_symbol: Mutex<Option<String>>,
    pub ui_ready: Mutex<bool>,
    pub click_lands: Mutex<bool>,
    pub calls: Mutex<Vec<String>>,
    pub clicks: Mutex<Vec<SignalSide>>,
    pub stakes: Mutex<Vec<f64>>,
    pub accounts: Mutex<Vec<AccountMode>>,
    pub sent_payloads: Mutex<Vec<String>>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self {
            chart_symbol: Mutex::new(Some("EUR/USD".to_string())),
            ui_ready: Mutex::new(true),
            click_lands: Mutex::new(true),
            calls: Mutex::new(Vec::new()),
            clicks: Mutex::new(Vec::new()),
            stakes: Mutex::new(Vec::new()),
            accounts: Mutex::new(Vec::new()),
            sent_payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_chart_symbol(self, symbol: Option<&str>) -> Self {
        *self.chart_symbol.lock().unwrap() = symbol.map(str::to_string);
        self
    }

    pub fn with_ui_ready(self, ready: bool) -> Self {
        *self.ui_ready.lock().unwrap() = ready;
        self
    }

    pub fn with_click_lands(self, lands: bool) -> Self {
        *self.click_lands.lock().unwrap() = lands;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl TradeActuator for MockActuator {
    async fn active_chart_symbol(&self) -> Result<Option<String>> {
        self.record("active_chart_symbol");
        Ok(self.chart_symbol.lock().unwrap().clone())
    }

    async fn is_trade_ui_ready(&self) -> Result<bool> {
        self.record("is_trade_ui_ready");
        Ok(*self.ui_ready.lock().unwrap())
    }

    async fn switch_account(&self, mode: AccountMode) -> Result<()> {
        self.record("switch_account");
        self.accounts.lock().unwrap().push(mode);
        Ok(())
    }

    async fn set_stake(&self, amount: f64) -> Result<()> {
        self.record("set_stake");
        self.stakes.lock().unwrap().push(amount);
        Ok(())
    }

    async fn click_side(&self, side: SignalSide) -> Result<bool> {
        self.record("click_side");
        if side == SignalSide::Neutral {
            return Err(BridgeError::InvalidRequest(
                "cannot click a neutral side".to_string(),
            ));
        }
        self.clicks.lock().unwrap().push(side);
        Ok(*self.click_lands.lock().unwrap())
    }

    async fn send_subscription_frames(&self, payloads: &[String]) -> Result<usize> {
        self.record("send_subscription_frames");
        let mut sent = self.sent_payloads.lock().unwrap();
        sent.extend(payloads.iter().cloned());
        Ok(payloads.len())
    }
}
