//! Lagging technical indicators and the synthetic-OHLC fallback.
//!
//! Every function here is pure and total on sparse history: RSI returns a
//! neutral 50 until it has `period + 1` samples, pattern detection returns
//! an empty set below two candles, and the synthetic generator is seeded by
//! the instrument symbol so repeated calls without live data reproduce the
//! same series within a process run.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::types::Candle;

/// Exponential moving average seeded with the first value, k = 2/(period+1).
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    if period <= 1 {
        return values.to_vec();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    out.push(prev);
    for &v in &values[1..] {
        prev = v * k + prev * (1.0 - k);
        out.push(prev);
    }
    out
}

/// RSI with Wilder's smoothing. Indices without enough history hold the
/// neutral 50 so callers on sparse series need no special cases.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![50.0; values.len()];
    if period == 0 || values.len() < period + 1 {
        return out;
    }
    let mut gain = 0.0;
    let mut loss = 0.0;
    for i in 1..=period {
        let diff = values[i] - values[i - 1];
        if diff >= 0.0 {
            gain += diff;
        } else {
            loss -= diff;
        }
    }
    gain /= period as f64;
    loss /= period as f64;
    out[period] = if loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + gain / loss)
    };
    for i in (period + 1)..values.len() {
        let diff = values[i] - values[i - 1];
        let cur_gain = diff.max(0.0);
        let cur_loss = (-diff).max(0.0);
        gain = (gain * (period as f64 - 1.0) + cur_gain) / period as f64;
        loss = (loss * (period as f64 - 1.0) + cur_loss) / period as f64;
        out[i] = if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        };
    }
    out
}

/// Swing high/low over the trailing `window` bars.
pub fn find_recent_swing(candles: &[Candle], window: usize) -> (f64, f64) {
    let slice = if candles.len() > window {
        &candles[candles.len() - window..]
    } else {
        candles
    };
    let mut high = f64::NEG_INFINITY;
    let mut low = f64::INFINITY;
    for c in slice {
        high = high.max(c.high);
        low = low.min(c.low);
    }
    if !high.is_finite() || !low.is_finite() {
        let last = candles.last().copied().unwrap_or(Candle {
            open_time_ms: 0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
        });
        return (last.high, last.low);
    }
    (high, low)
}

/// Standard retracement levels measured down from the swing high.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FibLevels {
    pub level_23_6: f64,
    pub level_38_2: f64,
    pub level_50_0: f64,
    pub level_61_8: f64,
    pub level_78_6: f64,
}

pub fn fibonacci_levels(swing_high: f64, swing_low: f64) -> FibLevels {
    let diff = swing_high - swing_low;
    let level = |pct: f64| swing_high - diff * pct;
    FibLevels {
        level_23_6: level(0.236),
        level_38_2: level(0.382),
        level_50_0: level(0.5),
        level_61_8: level(0.618),
        level_78_6: level(0.786),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CandlePattern {
    BullishEngulfing,
    BearishEngulfing,
    Hammer,
    ShootingStar,
    Doji,
    PinBarBull,
    PinBarBear,
}

/// Candlestick patterns evaluated on the last two bars only. Returns an
/// empty set below two candles.
pub fn detect_patterns(candles: &[Candle]) -> Vec<CandlePattern> {
    let mut patterns = Vec::new();
    if candles.len() < 2 {
        return patterns;
    }
    let last = candles[candles.len() - 1];
    let prev = candles[candles.len() - 2];
    let body_last = (last.close - last.open).abs();
    let body_prev = (prev.close - prev.open).abs();
    let range_last = last.high - last.low;

    if body_last > body_prev * 1.1 {
        let bullish = last.close > last.open
            && prev.close < prev.open
            && last.close >= prev.open
            && last.open <= prev.close;
        let bearish = last.close < last.open
            && prev.close > prev.open
            && last.open >= prev.close
            && last.close <= prev.open;
        if bullish {
            patterns.push(CandlePattern::BullishEngulfing);
        }
        if bearish {
            patterns.push(CandlePattern::BearishEngulfing);
        }
    }

    if range_last > 0.0 && body_last / range_last < 0.1 {
        patterns.push(CandlePattern::Doji);
    }

    let upper_wick = last.high - last.open.max(last.close);
    let lower_wick = last.open.min(last.close) - last.low;
    if lower_wick > body_last * 2.0 && upper_wick < body_last {
        patterns.push(CandlePattern::Hammer);
    }
    if upper_wick > body_last * 2.0 && lower_wick < body_last {
        patterns.push(CandlePattern::ShootingStar);
    }

    if lower_wick > range_last * 0.6 {
        patterns.push(CandlePattern::PinBarBull);
    }
    if upper_wick > range_last * 0.6 {
        patterns.push(CandlePattern::PinBarBear);
    }

    patterns
}

/// Deterministic pseudo-random 1-minute walk for instruments with no live
/// data. The seed is a hash of the symbol, so the shape is stable per
/// symbol; bars end at `now_ms`.
pub fn synthetic_ohlc(seed_key: &str, length: usize, start_price: f64, now_ms: i64) -> Vec<Candle> {
    let mut hasher = DefaultHasher::new();
    seed_key.hash(&mut hasher);
    let mut rng = StdRng::seed_from_u64(hasher.finish());

    let volatility = 0.002;
    let mut price = start_price * (0.9 + rng.gen::<f64>() * 0.2);
    let mut candles = Vec::with_capacity(length);
    for i in (0..length).rev() {
        let t = now_ms - (i as i64) * 60_000;
        let drift = (rng.gen::<f64>() - 0.5) * volatility * 0.2;
        let shock = (rng.gen::<f64>() - 0.5) * volatility;
        price = (price * (1.0 + drift + shock)).max(0.0001);
        let spread = (volatility * (0.5 + rng.gen::<f64>())).max(0.00005);
        let open = price * (1.0 + (rng.gen::<f64>() - 0.5) * spread * 0.2);
        let close = price * (1.0 + (rng.gen::<f64>() - 0.5) * spread * 0.2);
        let high = open.max(close) * (1.0 + rng.gen::<f64>() * spread);
        let low = open.min(close) * (1.0 - rng.gen::<f64>() * spread);
        candles.push(Candle {
            open_time_ms: t,
            open,
            high,
            low,
            close,
        });
    }
    candles
}

/// Plausible anchor price when seeding a synthetic series.
pub fn infer_start_price(symbol: &str) -> f64 {
    if symbol.contains("JPY") {
        return 150.0;
    }
    if symbol.contains("BTC") {
        return 45_000.0;
    }
    if symbol.contains("ETH") {
        return 2_500.0;
    }
    1.1
}
