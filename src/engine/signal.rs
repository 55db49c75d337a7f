//! Signal verdict and the serializable analysis report around it.

use serde::{Deserialize, Serialize};

use crate::microstructure::{FairValueGaps, LiquiditySweep, OrderFlow, ValueArea};
use crate::types::Expiry;

/// Direction verdict for a binary position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalSide {
    Call,
    Put,
    Neutral,
}

impl SignalSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSide::Call => "CALL",
            SignalSide::Put => "PUT",
            SignalSide::Neutral => "NEUTRAL",
        }
    }
}

impl std::fmt::Display for SignalSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the candle history backing an analysis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    /// External REST provider closes
    Provider,
    /// Minute candles built from intercepted ticks
    Ticks,
    /// Deterministic synthetic series, no live data available
    Synthetic,
}

/// One additive contribution to the score, kept for explainability.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreComponent {
    pub key: &'static str,
    pub score: f64,
    pub notes: String,
}

/// Indicator values at the moment of analysis.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IndicatorSnapshot {
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub last_price: f64,
    pub sr_window_min: f64,
    pub sr_window_max: f64,
}

/// Microstructure features at the moment of analysis.
#[derive(Debug, Clone, Serialize, Default)]
pub struct FeatureSnapshot {
    /// Order flow over the trailing 30 seconds
    pub ofi: OrderFlow,
    pub rv_1m: f64,
    pub rv_5m: f64,
    pub sweep: Option<LiquiditySweep>,
    pub fair_value_gaps: FairValueGaps,
    pub value_area: Option<ValueArea>,
    /// Whether the analysis minute sits on a preferred quarter-hour edge
    pub session_in_window: bool,
    pub dxy_bias: Option<f64>,
}

/// Full analysis report for one symbol and expiry.
#[derive(Debug, Clone, Serialize)]
pub struct SignalResult {
    pub symbol: String,
    pub expiry: Expiry,
    pub side: SignalSide,
    /// 0-100, distance of the score from neutral
    pub confidence: u8,
    /// Entry-timing advice matching the verdict
    pub entry_hint: &'static str,
    pub rationale: Vec<String>,
    pub indicators: IndicatorSnapshot,
    pub components: Vec<ScoreComponent>,
    pub features: FeatureSnapshot,
    pub timeframe_used: &'static str,
    pub data_origin: DataOrigin,
    pub generated_at_ms: i64,
}
