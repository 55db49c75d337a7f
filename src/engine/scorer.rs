//! Confluence scorer: blends lagging indicators with tick microstructure
//! into a CALL/PUT/NEUTRAL verdict.
//!
//! The score starts at a neutral 50 and every component shifts it by its
//! weight. Component contributions are recorded individually so callers can
//! show why a verdict was reached.

use std::sync::Arc;

use tracing::debug;

use crate::candles::{closes, ticks_to_candles};
use crate::engine::config::{window_for, AnalysisConfig};
use crate::engine::signal::{
    DataOrigin, FeatureSnapshot, IndicatorSnapshot, ScoreComponent, SignalResult, SignalSide,
};
use crate::microstructure::{
    detect_fvg, detect_liquidity_sweep, order_flow_imbalance, realized_volatility,
    value_area_from_ticks, SweepSide,
};
use crate::provider::CloseSeriesProvider;
use crate::store::QuoteStore;
use crate::ta::{
    detect_patterns, ema, fibonacci_levels, find_recent_swing, infer_start_price, rsi,
    synthetic_ohlc, CandlePattern,
};
use crate::types::{now_ms, Candle, Expiry};

/// Tick history consulted for minute bars and microstructure features.
/// Thirty minutes of bars covers the RSI(14) and EMA(21) warm-ups; the
/// microstructure functions window themselves tighter off the last tick.
const TICK_LOOKBACK_MS: i64 = 30 * 60_000;

/// UTC minutes adjacent to quarter-hour edges where binary fills are
/// historically cleanest.
const PREFERRED_MINUTES: [u32; 12] = [0, 1, 14, 15, 16, 29, 30, 31, 44, 45, 46, 59];

/// USD majors averaged into a rough dollar-strength proxy. Quotes with USD
/// as base are negated so every term points the same way.
const USD_MAJORS: [&str; 7] = [
    "EUR/USD", "GBP/USD", "AUD/USD", "NZD/USD", "USD/JPY", "USD/CHF", "USD/CAD",
];

pub struct SignalEngine {
    store: Arc<QuoteStore>,
    provider: Option<Arc<dyn CloseSeriesProvider>>,
    config: AnalysisConfig,
}

impl SignalEngine {
    pub fn new(store: Arc<QuoteStore>, provider: Option<Arc<dyn CloseSeriesProvider>>) -> Self {
        Self::with_config(store, provider, AnalysisConfig::default())
    }

    pub fn with_config(
        store: Arc<QuoteStore>,
        provider: Option<Arc<dyn CloseSeriesProvider>>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub async fn analyze(&self, symbol: &str, expiry: Expiry) -> SignalResult {
        self.analyze_at(symbol, expiry, now_ms()).await
    }

    /// Analysis with a one-off config override instead of the engine's own.
    pub async fn analyze_with(
        &self,
        symbol: &str,
        expiry: Expiry,
        config: &AnalysisConfig,
    ) -> SignalResult {
        self.analyze_impl(symbol, expiry, now_ms(), config).await
    }

    /// Analysis with an explicit clock, for deterministic tests.
    pub async fn analyze_at(&self, symbol: &str, expiry: Expiry, now: i64) -> SignalResult {
        self.analyze_impl(symbol, expiry, now, &self.config).await
    }

    async fn analyze_impl(
        &self,
        symbol: &str,
        expiry: Expiry,
        now: i64,
        cfg: &AnalysisConfig,
    ) -> SignalResult {
        let window = window_for(expiry);

        let ticks = self.store.recent_ticks(symbol, TICK_LOOKBACK_MS, now);

        let provider_closes = match &self.provider {
            Some(p) => match p.recent_closes(symbol, window.lookback).await {
                Ok(c) => Some(c),
                Err(err) => {
                    debug!(symbol, provider = p.name(), %err, "close-series fetch failed");
                    None
                }
            },
            None => None,
        };

        // Candle source chain: provider closes, then tick-built minute bars,
        // then the deterministic synthetic walk.
        let (mut candles, mut origin) = match provider_closes {
            Some(c) if c.len() >= 10 => (candles_from_closes(&c, now), DataOrigin::Provider),
            _ => (
                synthetic_ohlc(symbol, window.lookback, infer_start_price(symbol), now),
                DataOrigin::Synthetic,
            ),
        };
        if ticks.len() >= 30 {
            let from_ticks = ticks_to_candles(&ticks, 1);
            if from_ticks.len() >= 10 {
                candles = from_ticks;
                origin = DataOrigin::Ticks;
            }
        }
        let close_series = closes(&candles);

        let ema_fast = *ema(&close_series, cfg.ema_fast).last().unwrap_or(&0.0);
        let ema_slow = *ema(&close_series, cfg.ema_slow).last().unwrap_or(&0.0);
        let rsi_last = *rsi(&close_series, cfg.rsi_period).last().unwrap_or(&50.0);
        let price = *close_series.last().unwrap_or(&0.0);

        let w_start = close_series.len().saturating_sub(window.sr_window);
        let sr_slice = &close_series[w_start..];
        let sr_min = sr_slice.iter().copied().fold(f64::INFINITY, f64::min);
        let sr_max = sr_slice.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sr_range = (sr_max - sr_min).max(1e-9);
        let pos = (price - sr_min) / sr_range;

        let (swing_high, swing_low) = find_recent_swing(&candles, window.lookback.min(120));
        let fib = fibonacci_levels(swing_high, swing_low);
        let near = |a: f64, b: f64| (a - b).abs() / b.abs().max(1e-9) < 0.0015;

        let patterns = detect_patterns(&candles);

        let mut score = 50.0;
        let mut rationale: Vec<String> = Vec::new();
        let mut components: Vec<ScoreComponent> = Vec::new();
        let push = |components: &mut Vec<ScoreComponent>,
                    score: &mut f64,
                    key: &'static str,
                    delta: f64,
                    notes: &str| {
            *score += delta;
            components.push(ScoreComponent {
                key,
                score: delta,
                notes: notes.to_string(),
            });
        };
        let w = cfg.weights;

        // Trend
        if ema_fast > ema_slow {
            rationale.push(format!("EMA({}) > EMA({})", cfg.ema_fast, cfg.ema_slow));
            push(&mut components, &mut score, "trend", w.trend, "bullish EMA alignment");
        } else if ema_fast < ema_slow {
            rationale.push(format!("EMA({}) < EMA({})", cfg.ema_fast, cfg.ema_slow));
            push(&mut components, &mut score, "trend", -w.trend, "bearish EMA alignment");
        }

        // Momentum
        if rsi_last < cfg.rsi_oversold {
            rationale.push(format!(
                "RSI({}) oversold (<{})",
                cfg.rsi_period, cfg.rsi_oversold
            ));
            push(&mut components, &mut score, "momentum", w.momentum_strong, "RSI oversold");
        } else if rsi_last > cfg.rsi_overbought {
            rationale.push(format!(
                "RSI({}) overbought (>{})",
                cfg.rsi_period, cfg.rsi_overbought
            ));
            push(&mut components, &mut score, "momentum", -w.momentum_strong, "RSI overbought");
        } else if rsi_last > 50.0 {
            rationale.push("RSI > 50 bullish".to_string());
            push(&mut components, &mut score, "momentum", w.momentum_mild, "RSI > 50");
        } else {
            rationale.push("RSI < 50 bearish".to_string());
            push(&mut components, &mut score, "momentum", -w.momentum_mild, "RSI < 50");
        }

        // Support / resistance position within the window
        if pos < 0.2 {
            rationale.push("Near support".to_string());
            push(&mut components, &mut score, "sr", w.support_resistance, "near support");
        } else if pos > 0.8 {
            rationale.push("Near resistance".to_string());
            push(&mut components, &mut score, "sr", -w.support_resistance, "near resistance");
        }

        // Fibonacci confluence with the prevailing trend
        if near(price, fib.level_61_8) || near(price, fib.level_50_0) || near(price, fib.level_38_2)
        {
            if ema_fast >= ema_slow {
                rationale.push("Fib confluence (bullish)".to_string());
                push(
                    &mut components,
                    &mut score,
                    "fib",
                    w.fibonacci,
                    "price near key Fib in bullish trend",
                );
            } else {
                rationale.push("Fib confluence (bearish)".to_string());
                push(
                    &mut components,
                    &mut score,
                    "fib",
                    -w.fibonacci,
                    "price near key Fib in bearish trend",
                );
            }
        }

        // Candlestick patterns
        let bullish_pa = patterns.iter().any(|p| {
            matches!(
                p,
                CandlePattern::BullishEngulfing | CandlePattern::Hammer | CandlePattern::PinBarBull
            )
        });
        let bearish_pa = patterns.iter().any(|p| {
            matches!(
                p,
                CandlePattern::BearishEngulfing
                    | CandlePattern::ShootingStar
                    | CandlePattern::PinBarBear
            )
        });
        if bullish_pa {
            rationale.push("Bullish candlestick pattern".to_string());
            push(&mut components, &mut score, "pattern", w.pattern, "bullish PA");
        }
        if bearish_pa {
            rationale.push("Bearish candlestick pattern".to_string());
            push(&mut components, &mut score, "pattern", -w.pattern, "bearish PA");
        }

        // Sub-minute expiries lean mean-reversion at RSI extremes
        if matches!(expiry, Expiry::Sec30 | Expiry::Min1) {
            if rsi_last < (cfg.rsi_oversold - 10.0).max(20.0) {
                rationale.push("Short expiry mean reversion (oversold)".to_string());
                push(
                    &mut components,
                    &mut score,
                    "short_mr",
                    w.short_expiry_mean_reversion,
                    "short-expiry MR (oversold)",
                );
            }
            if rsi_last > (cfg.rsi_overbought + 10.0).min(80.0) {
                rationale.push("Short expiry mean reversion (overbought)".to_string());
                push(
                    &mut components,
                    &mut score,
                    "short_mr",
                    -w.short_expiry_mean_reversion,
                    "short-expiry MR (overbought)",
                );
            }
        }

        // Order flow over 30s and 2m windows
        let mut features = FeatureSnapshot::default();
        if !ticks.is_empty() {
            let ofi_short = order_flow_imbalance(&ticks, 30_000);
            let ofi_long = order_flow_imbalance(&ticks, 120_000);
            features.ofi = ofi_short;
            let ofi_score = (ofi_short.imbalance * 8.0 + ofi_long.imbalance * 6.0).round();
            if ofi_score != 0.0 {
                push(
                    &mut components,
                    &mut score,
                    "order_flow",
                    ofi_score,
                    &format!(
                        "imbalance={:.2} pressure={:.2}",
                        ofi_short.imbalance, ofi_short.pressure
                    ),
                );
            }
        }

        // Volatility regime gate on short vs medium realized vol
        if !ticks.is_empty() {
            features.rv_1m = realized_volatility(&ticks, 60_000);
            features.rv_5m = realized_volatility(&ticks, 300_000);
            let ratio = features.rv_1m / features.rv_5m.max(1e-9);
            if ratio < 0.6 {
                push(&mut components, &mut score, "vol_regime", -4.0, "range compression");
            }
            if ratio > 1.8 {
                push(&mut components, &mut score, "vol_regime", -4.0, "volatility burst");
            }
        }

        // Liquidity sweep with rejection
        if candles.len() >= 10 {
            if let Some(sweep) = detect_liquidity_sweep(&candles, 20) {
                features.sweep = Some(sweep);
                let delta = (6.0 * sweep.strength).round();
                match sweep.side {
                    SweepSide::Low => {
                        push(&mut components, &mut score, "sweep", delta, "low sweep + rejection")
                    }
                    SweepSide::High => push(
                        &mut components,
                        &mut score,
                        "sweep",
                        -delta,
                        "high sweep + rejection",
                    ),
                }
            }
        }

        // Fair value gaps from displacement
        if candles.len() >= 3 {
            let gaps = detect_fvg(&candles);
            features.fair_value_gaps = gaps;
            if gaps.bullish {
                push(&mut components, &mut score, "fvg", 4.0, "bullish FVG");
            }
            if gaps.bearish {
                push(&mut components, &mut score, "fvg", -4.0, "bearish FVG");
            }
        }

        // Tick-profile value area: fade excursions outside value
        if ticks.len() >= 50 {
            let va = value_area_from_ticks(&ticks, 30);
            features.value_area = Some(va);
            if price < va.value_low {
                push(
                    &mut components,
                    &mut score,
                    "profile",
                    3.0,
                    "below value (mean reversion bias up)",
                );
            }
            if price > va.value_high {
                push(
                    &mut components,
                    &mut score,
                    "profile",
                    -3.0,
                    "above value (mean reversion bias down)",
                );
            }
        }

        // Time-of-day alignment
        let minute = utc_minute(now);
        features.session_in_window = PREFERRED_MINUTES.contains(&minute);
        if !features.session_in_window {
            push(&mut components, &mut score, "session", -2.0, "off preferred minute windows");
        }

        // Broad USD proxy from live majors
        let latest = self.store.latest_quote_map();
        let mut values: Vec<f64> = Vec::new();
        for s in USD_MAJORS {
            if let Some((p, _)) = latest.get(s) {
                values.push(if s.starts_with("USD/") { -p } else { *p });
            }
        }
        if values.len() >= 3 {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let dxy_bias = mean - values[0];
            features.dxy_bias = Some(dxy_bias);
            if dxy_bias > 0.0 {
                push(&mut components, &mut score, "dxy", -2.0, "USD broad strength (risk-off bias)");
            } else if dxy_bias < 0.0 {
                push(&mut components, &mut score, "dxy", 2.0, "USD broad weakness (risk-on bias)");
            }
        }

        let side = if score >= cfg.call_threshold {
            SignalSide::Call
        } else if score <= cfg.put_threshold {
            SignalSide::Put
        } else {
            SignalSide::Neutral
        };
        let confidence = ((score - 50.0).abs() * 2.0).round().clamp(0.0, 100.0) as u8;

        let entry_hint = match side {
            SignalSide::Call => {
                "CALL on minor pullback; confluence at support/Fib; avoid chasing spikes"
            }
            SignalSide::Put => {
                "PUT on minor bounce; confluence at resistance/Fib; avoid chasing drops"
            }
            SignalSide::Neutral => "Wait for clearer confluence of trend, RSI, S/R, and Fib",
        };

        SignalResult {
            symbol: symbol.to_string(),
            expiry,
            side,
            confidence,
            entry_hint,
            rationale,
            indicators: IndicatorSnapshot {
                ema_fast,
                ema_slow,
                rsi: round1(rsi_last),
                last_price: round5(price),
                sr_window_min: round5(sr_min),
                sr_window_max: round5(sr_max),
            },
            components,
            features,
            timeframe_used: window.timeframe_label,
            data_origin: origin,
            generated_at_ms: now,
        }
    }
}

/// Deterministic candles from a provider close series: each bar opens at
/// the previous close, so the series replays identically across calls.
fn candles_from_closes(close_series: &[f64], now: i64) -> Vec<Candle> {
    let n = close_series.len();
    close_series
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let open = if i == 0 { c } else { close_series[i - 1] };
            Candle {
                open_time_ms: now - ((n - 1 - i) as i64) * 60_000,
                open,
                high: open.max(c),
                low: open.min(c),
                close: c,
            }
        })
        .collect()
}

fn utc_minute(ts_ms: i64) -> u32 {
    ((ts_ms / 60_000).rem_euclid(60)) as u32
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round5(x: f64) -> f64 {
    (x * 100_000.0).round() / 100_000.0
}
