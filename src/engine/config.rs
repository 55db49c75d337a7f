//! Signal engine configuration
//!
//! Single source of truth for scoring weights and thresholds.

use serde::{Deserialize, Serialize};

use crate::types::Expiry;

/// Complete analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Score at or above which the verdict is CALL
    pub call_threshold: f64,
    /// Score at or below which the verdict is PUT
    pub put_threshold: f64,
    /// Fast EMA period
    pub ema_fast: usize,
    /// Slow EMA period
    pub ema_slow: usize,
    /// RSI period (Wilder smoothing)
    pub rsi_period: usize,
    /// RSI level treated as oversold
    pub rsi_oversold: f64,
    /// RSI level treated as overbought
    pub rsi_overbought: f64,
    /// Per-component score weights
    pub weights: ScoreWeights,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            call_threshold: 58.0,
            put_threshold: 42.0,
            ema_fast: 9,
            ema_slow: 21,
            rsi_period: 14,
            rsi_oversold: 35.0,
            rsi_overbought: 65.0,
            weights: ScoreWeights::default(),
        }
    }
}

/// Additive score contributions per component. The score starts at the
/// neutral 50 and each component adds or subtracts its weight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// EMA fast/slow alignment
    pub trend: f64,
    /// RSI beyond the oversold/overbought bands
    pub momentum_strong: f64,
    /// RSI leaning off neutral
    pub momentum_mild: f64,
    /// Price near swing support or resistance
    pub support_resistance: f64,
    /// Price near the 38.2/61.8 retracements
    pub fibonacci: f64,
    /// Candlestick pattern on the last two bars
    pub pattern: f64,
    /// Mean-reversion lean for sub-minute expiries
    pub short_expiry_mean_reversion: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            trend: 12.0,
            momentum_strong: 10.0,
            momentum_mild: 3.0,
            support_resistance: 8.0,
            fibonacci: 4.0,
            pattern: 6.0,
            short_expiry_mean_reversion: 5.0,
        }
    }
}

/// How much history an expiry is analyzed against.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AnalysisWindow {
    /// Human label of the timeframes blended for this expiry
    pub timeframe_label: &'static str,
    /// Candles requested from the data source
    pub lookback: usize,
    /// Trailing bars scanned for swing high/low
    pub sr_window: usize,
}

/// Longer expiries look at wider swing windows over the same lookback.
pub fn window_for(expiry: Expiry) -> AnalysisWindow {
    let (timeframe_label, lookback, sr_window) = match expiry {
        Expiry::Sec30 => ("15s/1m synthetic", 240, 40),
        Expiry::Min1 | Expiry::Min2 => ("1m", 240, 60),
        Expiry::Min3 | Expiry::Min5 => ("1m/5m", 240, 90),
        Expiry::Min10 | Expiry::Min15 => ("5m/15m", 240, 120),
        Expiry::Min30 | Expiry::Hour1 => ("15m/30m/1h", 240, 180),
    };
    AnalysisWindow {
        timeframe_label,
        lookback,
        sr_window,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_bracket_neutral() {
        let cfg = AnalysisConfig::default();
        assert!(cfg.put_threshold < 50.0 && 50.0 < cfg.call_threshold);
    }

    #[test]
    fn sr_window_widens_with_expiry() {
        assert!(window_for(Expiry::Sec30).sr_window < window_for(Expiry::Min5).sr_window);
        assert!(window_for(Expiry::Min5).sr_window < window_for(Expiry::Hour1).sr_window);
        assert_eq!(window_for(Expiry::Min1).lookback, 240);
    }
}
