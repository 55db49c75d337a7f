//! Auto-trade policy: turns fresh signals into button presses, gated by
//! confidence, cooldown and account safety rails.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::actuator::{AccountMode, TradeActuator};
use crate::engine::{SignalEngine, SignalSide};
use crate::store::QuoteStore;
use crate::symbol;
use crate::types::{now_ms, Expiry};

/// Instruments quoted within this window qualify as fallback targets.
const FALLBACK_FRESHNESS_MS: i64 = 30_000;
/// Executed attempts retained for inspection.
const ATTEMPT_LOG_CAP: usize = 100;

/// Masaniello-style progressive staking. Stake sizing only; win/loss
/// settlement stays with the operator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MasanielloConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bankroll: f64,
    #[serde(default = "default_target_wins")]
    pub target_wins: u32,
    #[serde(default = "default_win_probability")]
    pub win_probability: f64,
    #[serde(default = "default_current_step")]
    pub current_step: u32,
    #[serde(default = "default_min_stake")]
    pub min_stake: f64,
    #[serde(default = "default_max_stake_percent")]
    pub max_stake_percent: f64,
}

fn default_target_wins() -> u32 {
    10
}
fn default_win_probability() -> f64 {
    0.6
}
fn default_current_step() -> u32 {
    1
}
fn default_min_stake() -> f64 {
    1.0
}
fn default_max_stake_percent() -> f64 {
    0.02
}

impl Default for MasanielloConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bankroll: 0.0,
            target_wins: default_target_wins(),
            win_probability: default_win_probability(),
            current_step: default_current_step(),
            min_stake: default_min_stake(),
            max_stake_percent: default_max_stake_percent(),
        }
    }
}

/// Stake for the next attempt. Falls back to `base_amount` unless the
/// progression is enabled and its parameters are sane.
pub fn compute_stake(m: &MasanielloConfig, base_amount: f64) -> f64 {
    if !(m.enabled
        && m.bankroll > 0.0
        && m.target_wins > 0
        && m.win_probability > 0.0
        && m.win_probability < 1.0)
    {
        return base_amount;
    }
    let step = m.current_step.max(1).min(m.target_wins);
    let factor = (m.target_wins - (step - 1)) as f64 / m.target_wins as f64;
    let cap = m.bankroll * m.max_stake_percent;
    let raw = m.bankroll * factor * m.win_probability;
    raw.min(cap).max(m.min_stake)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTradeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_account")]
    pub account: AccountMode,
    /// Minimum confidence percent to act
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    /// Flat stake when the progression is off
    #[serde(default = "default_amount")]
    pub amount: f64,
    #[serde(default = "default_expiry")]
    pub expiry: Expiry,
    /// Trade only the symbol on the active chart
    #[serde(default = "default_active_chart_only")]
    pub active_chart_only: bool,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub masaniello: MasanielloConfig,
}

fn default_account() -> AccountMode {
    AccountMode::Demo
}
fn default_threshold() -> u8 {
    75
}
fn default_amount() -> f64 {
    1.0
}
fn default_expiry() -> Expiry {
    Expiry::Min1
}
fn default_active_chart_only() -> bool {
    true
}
fn default_cooldown_secs() -> u64 {
    60
}

impl Default for AutoTradeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account: default_account(),
            threshold: default_threshold(),
            amount: default_amount(),
            expiry: default_expiry(),
            active_chart_only: default_active_chart_only(),
            cooldown_secs: default_cooldown_secs(),
            masaniello: MasanielloConfig::default(),
        }
    }
}

/// One executed (or attempted) trade.
#[derive(Debug, Clone, Serialize)]
pub struct TradeAttempt {
    pub id: Uuid,
    pub symbol: String,
    pub side: SignalSide,
    pub expiry: Expiry,
    pub stake: f64,
    pub confidence: u8,
    pub account: AccountMode,
    pub ts_ms: i64,
}

/// Why a tick did or did not trade. Returned so callers can log and tests
/// can assert on the exact path taken.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Disabled,
    CoolingDown,
    NoSymbol,
    UiNotReady,
    Neutral { symbol: String },
    BelowThreshold { symbol: String, confidence: u8 },
    Executed { symbol: String, side: SignalSide, stake: f64 },
    Failed { symbol: String, side: SignalSide },
}

struct PolicyState {
    config: AutoTradeConfig,
    last_trade_at_ms: Option<i64>,
    preferred_symbol: Option<String>,
    attempts: VecDeque<TradeAttempt>,
}

pub struct AutoTradePolicy {
    store: Arc<QuoteStore>,
    engine: Arc<SignalEngine>,
    actuator: Arc<dyn TradeActuator>,
    state: Mutex<PolicyState>,
}

impl AutoTradePolicy {
    pub fn new(
        store: Arc<QuoteStore>,
        engine: Arc<SignalEngine>,
        actuator: Arc<dyn TradeActuator>,
    ) -> Self {
        Self {
            store,
            engine,
            actuator,
            state: Mutex::new(PolicyState {
                config: AutoTradeConfig::default(),
                last_trade_at_ms: None,
                preferred_symbol: None,
                attempts: VecDeque::new(),
            }),
        }
    }

    pub fn config(&self) -> AutoTradeConfig {
        self.state.lock().expect("policy lock poisoned").config.clone()
    }

    pub fn set_config(&self, config: AutoTradeConfig) {
        self.state.lock().expect("policy lock poisoned").config = config;
    }

    /// Preferred fallback symbol when not trading the active chart.
    /// Rejected if it does not normalize.
    pub fn set_preferred_symbol(&self, raw: Option<&str>) -> Option<String> {
        let normalized = raw.and_then(symbol::normalize);
        self.state
            .lock()
            .expect("policy lock poisoned")
            .preferred_symbol = normalized.clone();
        normalized
    }

    pub fn attempts(&self) -> Vec<TradeAttempt> {
        self.state
            .lock()
            .expect("policy lock poisoned")
            .attempts
            .iter()
            .cloned()
            .collect()
    }

    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(now_ms()).await
    }

    /// One policy evaluation with an explicit clock.
    pub async fn tick_at(&self, now: i64) -> TickOutcome {
        let (config, last_trade_at, preferred) = {
            let state = self.state.lock().expect("policy lock poisoned");
            (
                state.config.clone(),
                state.last_trade_at_ms,
                state.preferred_symbol.clone(),
            )
        };

        if !config.enabled {
            return TickOutcome::Disabled;
        }
        if let Some(last) = last_trade_at {
            if now - last < config.cooldown_secs as i64 * 1_000 {
                return TickOutcome::CoolingDown;
            }
        }

        let symbol = if config.active_chart_only {
            self.actuator.active_chart_symbol().await.unwrap_or(None)
        } else {
            preferred.or_else(|| self.fallback_symbol(now))
        };
        let Some(symbol) = symbol else {
            warn!("auto-trade: no symbol resolved");
            return TickOutcome::NoSymbol;
        };

        if !self.actuator.is_trade_ui_ready().await.unwrap_or(false) {
            warn!(%symbol, "auto-trade: trade UI not ready");
            return TickOutcome::UiNotReady;
        }

        let res = self.engine.analyze_at(&symbol, config.expiry, now).await;
        if res.side == SignalSide::Neutral {
            info!(%symbol, "auto-trade: neutral signal, skipping");
            return TickOutcome::Neutral { symbol };
        }
        if res.confidence < config.threshold {
            info!(
                %symbol,
                confidence = res.confidence,
                threshold = config.threshold,
                "auto-trade: below threshold"
            );
            return TickOutcome::BelowThreshold {
                symbol,
                confidence: res.confidence,
            };
        }

        if let Err(err) = self.actuator.switch_account(config.account).await {
            warn!(%err, "auto-trade: account switch failed, continuing");
        }
        let stake = compute_stake(&config.masaniello, config.amount);
        if let Err(err) = self.actuator.set_stake(stake).await {
            warn!(%err, "auto-trade: stake entry failed, continuing");
        }

        let clicked = self.actuator.click_side(res.side).await.unwrap_or(false);
        if !clicked {
            warn!(
                %symbol,
                side = %res.side,
                expiry = config.expiry.as_str(),
                "auto-trade FAILED"
            );
            return TickOutcome::Failed {
                symbol,
                side: res.side,
            };
        }

        info!(
            %symbol,
            side = %res.side,
            expiry = config.expiry.as_str(),
            stake,
            confidence = res.confidence,
            "auto-trade EXECUTED"
        );

        let attempt = TradeAttempt {
            id: Uuid::new_v4(),
            symbol: symbol.clone(),
            side: res.side,
            expiry: config.expiry,
            stake,
            confidence: res.confidence,
            account: config.account,
            ts_ms: now,
        };
        {
            let mut state = self.state.lock().expect("policy lock poisoned");
            state.last_trade_at_ms = Some(now);
            if state.config.masaniello.enabled {
                let m = &mut state.config.masaniello;
                m.current_step = (m.current_step.max(1) + 1).min(m.target_wins);
            }
            state.attempts.push_back(attempt);
            while state.attempts.len() > ATTEMPT_LOG_CAP {
                state.attempts.pop_front();
            }
        }

        TickOutcome::Executed {
            symbol,
            side: res.side,
            stake,
        }
    }

    /// Most recently updated instrument with a fresh finite price.
    fn fallback_symbol(&self, now: i64) -> Option<String> {
        self.store
            .instruments()
            .into_iter()
            .filter(|i| i.price.is_finite() && now - i.last_update_ms < FALLBACK_FRESHNESS_MS)
            .max_by_key(|i| i.last_update_ms)
            .map(|i| i.symbol)
    }
}
