//! The bridge glues everything together: it ingests intercepted frames,
//! tracks session state, learns the venue's subscribe frame shape from
//! outbound traffic, and drives the auto-trade and auto-subscribe loops.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::actuator::TradeActuator;
use crate::autotrade::AutoTradePolicy;
use crate::decode::decode_candidates;
use crate::extract::extract;
use crate::store::QuoteStore;
use crate::symbol;
use crate::types::{FrameDirection, FramePayload, FrameRecord, RawFrame};

/// Activity log entries kept for the status surface.
const ACTIVITY_LOG_CAP: usize = 100;
/// Cadence of the auto-trade policy loop.
const AUTO_TRADE_TICK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Idle,
    Connecting,
    Connected,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub ts_ms: i64,
    pub level: LogLevel,
    pub msg: String,
}

/// Shape of the venue's subscribe frame, learned from outbound traffic so
/// new symbols can be spliced into the same envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeTemplate {
    pub prefix: String,
    pub suffix: String,
    pub uses_slash: bool,
}

impl SubscribeTemplate {
    pub fn render(&self, symbol: &str) -> String {
        let sym = if self.uses_slash {
            symbol.to_string()
        } else {
            symbol.replace('/', "")
        };
        format!("{}{}{}", self.prefix, sym, self.suffix)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSubscribeConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_target_count")]
    pub target_count: usize,
}

fn default_enabled() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    10
}
fn default_target_count() -> usize {
    30
}

impl Default for AutoSubscribeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            target_count: default_target_count(),
        }
    }
}

/// Snapshot returned to status callers. Logs and frames are newest first.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: BridgeState,
    pub last_error: Option<String>,
    pub activity_log: Vec<ActivityEntry>,
    pub recent_frames: Vec<FrameRecord>,
    pub subscribe_template_learned: bool,
    pub discovered_symbols: usize,
}

struct BridgeInner {
    state: BridgeState,
    last_error: Option<String>,
    activity: VecDeque<ActivityEntry>,
    subscribe_template: Option<SubscribeTemplate>,
    auto_subscribe: AutoSubscribeConfig,
}

pub struct Bridge {
    store: Arc<QuoteStore>,
    policy: Arc<AutoTradePolicy>,
    actuator: Arc<dyn TradeActuator>,
    inner: Mutex<BridgeInner>,
}

impl Bridge {
    pub fn new(
        store: Arc<QuoteStore>,
        policy: Arc<AutoTradePolicy>,
        actuator: Arc<dyn TradeActuator>,
    ) -> Self {
        Self {
            store,
            policy,
            actuator,
            inner: Mutex::new(BridgeInner {
                state: BridgeState::Idle,
                last_error: None,
                activity: VecDeque::new(),
                subscribe_template: None,
                auto_subscribe: AutoSubscribeConfig::default(),
            }),
        }
    }

    fn log(&self, level: LogLevel, msg: impl Into<String>) {
        let msg = msg.into();
        match level {
            LogLevel::Info => info!("{msg}"),
            LogLevel::Warn => warn!("{msg}"),
            LogLevel::Error => error!("{msg}"),
        }
        let mut inner = self.inner.lock().expect("bridge lock poisoned");
        inner.activity.push_back(ActivityEntry {
            ts_ms: crate::types::now_ms(),
            level,
            msg,
        });
        while inner.activity.len() > ACTIVITY_LOG_CAP {
            inner.activity.pop_front();
        }
    }

    pub fn state(&self) -> BridgeState {
        self.inner.lock().expect("bridge lock poisoned").state
    }

    pub fn mark_connecting(&self) {
        {
            let mut inner = self.inner.lock().expect("bridge lock poisoned");
            inner.state = BridgeState::Connecting;
            inner.last_error = None;
        }
        self.log(LogLevel::Info, "session connecting");
    }

    pub fn mark_stopped(&self) {
        self.inner.lock().expect("bridge lock poisoned").state = BridgeState::Stopped;
        self.log(LogLevel::Warn, "session stopped (frame source closed)");
    }

    pub fn mark_error(&self, err: impl Into<String>) {
        let err = err.into();
        {
            let mut inner = self.inner.lock().expect("bridge lock poisoned");
            inner.state = BridgeState::Error;
            inner.last_error = Some(err.clone());
        }
        self.log(LogLevel::Error, err);
    }

    pub fn status(&self) -> StatusSnapshot {
        let inner = self.inner.lock().expect("bridge lock poisoned");
        StatusSnapshot {
            state: inner.state,
            last_error: inner.last_error.clone(),
            activity_log: inner.activity.iter().rev().cloned().collect(),
            recent_frames: self.store.recent_frames(),
            subscribe_template_learned: inner.subscribe_template.is_some(),
            discovered_symbols: self.store.discovered_symbols().len(),
        }
    }

    pub fn subscribe_template(&self) -> Option<SubscribeTemplate> {
        self.inner
            .lock()
            .expect("bridge lock poisoned")
            .subscribe_template
            .clone()
    }

    pub fn auto_subscribe_config(&self) -> AutoSubscribeConfig {
        self.inner
            .lock()
            .expect("bridge lock poisoned")
            .auto_subscribe
            .clone()
    }

    pub fn set_auto_subscribe_config(&self, cfg: AutoSubscribeConfig) {
        self.inner.lock().expect("bridge lock poisoned").auto_subscribe = cfg;
    }

    /// Feeds one intercepted frame through the pipeline: decode, retain for
    /// diagnostics, harvest symbols, extract quotes, learn templates.
    pub fn ingest_frame(&self, frame: RawFrame) {
        let candidates = decode_candidates(&frame.payload);
        let display = candidates.first().cloned().unwrap_or_else(|| match &frame.payload {
            FramePayload::Text(s) => s.clone(),
            FramePayload::Binary(b) => String::from_utf8_lossy(b).into_owned(),
        });
        self.store.push_frame(FrameRecord {
            direction: frame.direction,
            url: frame.source_url.clone(),
            payload: display.clone(),
            ts_ms: frame.ts_ms,
        });

        match frame.direction {
            FrameDirection::In => {
                {
                    let mut inner = self.inner.lock().expect("bridge lock poisoned");
                    if inner.state == BridgeState::Connecting {
                        inner.state = BridgeState::Connected;
                        drop(inner);
                        self.log(LogLevel::Info, "first market frame seen, session connected");
                    }
                }
                for cand in &candidates {
                    for sym in symbol::harvest(cand) {
                        self.store.note_symbol(&sym);
                    }
                }
                // First candidate that yields quotes wins.
                for cand in &candidates {
                    let ex = extract(cand);
                    if !ex.is_empty() {
                        self.store.apply_extraction(&ex, frame.ts_ms);
                        break;
                    }
                }
            }
            FrameDirection::Out => {
                if let Some(tpl) = learn_subscribe_template(&display) {
                    let uses_slash = tpl.uses_slash;
                    self.inner
                        .lock()
                        .expect("bridge lock poisoned")
                        .subscribe_template = Some(tpl);
                    self.log(
                        LogLevel::Info,
                        format!("learned subscribe template (uses_slash={uses_slash})"),
                    );
                }
            }
        }
    }

    /// One auto-subscribe pass: renders subscribe frames for discovered
    /// symbols through the learned template and hands them to the actuator.
    pub async fn auto_subscribe_tick(&self) {
        let (enabled, template, target_count) = {
            let inner = self.inner.lock().expect("bridge lock poisoned");
            (
                inner.auto_subscribe.enabled && inner.state == BridgeState::Connected,
                inner.subscribe_template.clone(),
                inner.auto_subscribe.target_count,
            )
        };
        if !enabled {
            return;
        }
        let Some(template) = template else {
            self.log(LogLevel::Warn, "auto-subscribe: no template learned yet");
            return;
        };
        let discovered = self.store.discovered_symbols();
        if discovered.is_empty() {
            return;
        }
        let target_n = target_count.min(discovered.len()).max(5).min(discovered.len());
        let payloads: Vec<String> = discovered
            .iter()
            .take(target_n)
            .map(|sym| template.render(sym))
            .collect();
        match self.actuator.send_subscription_frames(&payloads).await {
            Ok(sent) => self.log(
                LogLevel::Info,
                format!("auto-subscribe: sent {sent} subscribe frames"),
            ),
            Err(err) => self.log(LogLevel::Error, format!("auto-subscribe error: {err}")),
        }
    }

    /// Main loop: ingests frames and fires the timed policy loops until the
    /// frame source closes.
    pub async fn run(self: Arc<Self>, mut frames: mpsc::Receiver<RawFrame>) {
        self.mark_connecting();
        let mut trade_tick = tokio::time::interval(AUTO_TRADE_TICK);
        trade_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut subscribe_tick = tokio::time::interval(Duration::from_secs(
            self.auto_subscribe_config().interval_secs.max(2),
        ));
        subscribe_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                frame = frames.recv() => {
                    match frame {
                        Some(frame) => self.ingest_frame(frame),
                        None => {
                            self.mark_stopped();
                            break;
                        }
                    }
                }
                _ = trade_tick.tick() => {
                    if self.state() == BridgeState::Connected {
                        let outcome = self.policy.tick().await;
                        tracing::debug!(?outcome, "auto-trade tick");
                    }
                }
                _ = subscribe_tick.tick() => {
                    self.auto_subscribe_tick().await;
                }
            }
        }
    }
}

/// Learns the subscribe envelope from an outbound frame shaped like
/// `42["subscribe",{"symbol":"EUR/USD_otc"}]`.
fn learn_subscribe_template(payload: &str) -> Option<SubscribeTemplate> {
    let idx = payload.find(['[', '{'])?;
    let candidate = &payload[idx..];
    let parsed: Value = serde_json::from_str(candidate).ok()?;
    let arr = parsed.as_array()?;
    if arr.len() < 2 {
        return None;
    }
    let event = arr[0].as_str()?;
    if !event.to_lowercase().contains("sub") {
        return None;
    }
    let obj = arr[1].as_object()?;
    let id_like = ["symbol", "pair", "instrument", "code", "s"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))?;
    let pos = candidate.find(id_like)?;
    if pos == 0 {
        return None;
    }
    Some(SubscribeTemplate {
        prefix: candidate[..pos].to_string(),
        suffix: candidate[pos + id_like.len()..].to_string(),
        uses_slash: id_like.contains('/'),
    })
}
