//! Microstructure features computed from raw ticks and minute candles:
//! order-flow imbalance, realized volatility, liquidity sweeps, fair value
//! gaps and the tick-profile value area.

use serde::Serialize;

use crate::types::{Candle, Tick};

/// Signed tick-direction balance over the trailing `lookback_ms` of ticks.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OrderFlow {
    /// (upticks - downticks) / total, in [-1, 1]. 0 on empty input.
    pub imbalance: f64,
    /// Directional ticks over all ticks in the window, 0..1.
    pub pressure: f64,
}

/// Ticks must be in ascending time order; the window is anchored at the
/// last tick's timestamp.
pub fn order_flow_imbalance(ticks: &[Tick], lookback_ms: i64) -> OrderFlow {
    let Some(last) = ticks.last() else {
        return OrderFlow::default();
    };
    let cutoff = last.ts_ms - lookback_ms;
    let mut up = 0i64;
    let mut down = 0i64;
    let mut flat = 0i64;
    for t in ticks.iter().rev() {
        if t.ts_ms < cutoff {
            break;
        }
        if t.dir > 0 {
            up += 1;
        } else if t.dir < 0 {
            down += 1;
        } else {
            flat += 1;
        }
    }
    let total = (up + down + flat).max(1) as f64;
    OrderFlow {
        imbalance: (up - down) as f64 / total,
        pressure: (up + down) as f64 / total,
    }
}

/// Standard deviation of tick-to-tick log returns over the trailing
/// `lookback_ms`. Returns 0 below two ticks in the window.
pub fn realized_volatility(ticks: &[Tick], lookback_ms: i64) -> f64 {
    if ticks.len() < 2 {
        return 0.0;
    }
    let cutoff = ticks[ticks.len() - 1].ts_ms - lookback_ms;
    let start = ticks
        .iter()
        .position(|t| t.ts_ms >= cutoff)
        .unwrap_or(ticks.len());
    let sel = &ticks[start..];
    if sel.len() < 2 {
        return 0.0;
    }
    let mut returns = Vec::with_capacity(sel.len() - 1);
    for w in sel.windows(2) {
        let r = (w[1].price / w[0].price).ln();
        if r.is_finite() {
            returns.push(r);
        }
    }
    if returns.is_empty() {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let var = returns
        .iter()
        .map(|r| (r - mean) * (r - mean))
        .sum::<f64>()
        / returns.len() as f64;
    var.sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepSide {
    /// Took out the window high and closed back down.
    High,
    /// Took out the window low and closed back up.
    Low,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LiquiditySweep {
    pub side: SweepSide,
    /// Rejection wick as a fraction of the bar range, 0..1.
    pub strength: f64,
}

/// Stop-hunt detection on the last bar: it prints the extreme of the
/// trailing `window` bars, closes against the prior close, and leaves a
/// dominant rejection wick.
pub fn detect_liquidity_sweep(candles: &[Candle], window: usize) -> Option<LiquiditySweep> {
    if candles.len() < 3 {
        return None;
    }
    let slice = if candles.len() > window {
        &candles[candles.len() - window..]
    } else {
        candles
    };
    let last = slice[slice.len() - 1];
    let prev = slice[slice.len() - 2];
    let high = slice.iter().fold(f64::NEG_INFINITY, |m, c| m.max(c.high));
    let low = slice.iter().fold(f64::INFINITY, |m, c| m.min(c.low));
    let range = (last.high - last.low).max(1e-9);

    let upper_wick = last.high - last.close;
    let lower_wick = last.close - last.low;

    if last.high > high * 0.999 && last.close < prev.close && upper_wick > lower_wick {
        return Some(LiquiditySweep {
            side: SweepSide::High,
            strength: upper_wick / range,
        });
    }
    if last.low < low * 1.001 && last.close > prev.close && lower_wick > upper_wick {
        return Some(LiquiditySweep {
            side: SweepSide::Low,
            strength: lower_wick / range,
        });
    }
    None
}

/// Unfilled imbalance left by a displacement move over the last three bars.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FairValueGaps {
    pub bullish: bool,
    pub bearish: bool,
}

pub fn detect_fvg(candles: &[Candle]) -> FairValueGaps {
    let mut gaps = FairValueGaps::default();
    if candles.len() < 3 {
        return gaps;
    }
    let a = candles[candles.len() - 3];
    let b = candles[candles.len() - 2];
    let c = candles[candles.len() - 1];
    if a.high < c.low && b.close > a.high && c.close > b.high {
        gaps.bullish = true;
    }
    if a.low > c.high && b.close < a.low && c.close < b.low {
        gaps.bearish = true;
    }
    gaps
}

/// Tick-density price profile: point of control plus the band holding
/// roughly 70% of ticks.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ValueArea {
    pub poc: f64,
    pub value_low: f64,
    pub value_high: f64,
}

pub fn value_area_from_ticks(ticks: &[Tick], bins: usize) -> ValueArea {
    if ticks.len() < 10 || bins == 0 {
        return ValueArea {
            poc: ticks.last().map(|t| t.price).unwrap_or(0.0),
            value_low: 0.0,
            value_high: 0.0,
        };
    }
    let min = ticks.iter().map(|t| t.price).fold(f64::INFINITY, f64::min);
    let max = ticks
        .iter()
        .map(|t| t.price)
        .fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return ValueArea {
            poc: min,
            value_low: min,
            value_high: max,
        };
    }

    let step = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for t in ticks {
        let idx = (((t.price - min) / step) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    let mut poc_idx = 0usize;
    let mut poc_count = 0usize;
    for (i, &c) in counts.iter().enumerate() {
        if c > poc_count {
            poc_count = c;
            poc_idx = i;
        }
    }

    // Expand around the POC toward the heavier neighbor, high side on ties,
    // until the band covers ~70% of ticks.
    let total = ticks.len() as f64;
    let mut acc = counts[poc_idx];
    let mut lo = poc_idx;
    let mut hi = poc_idx;
    while (acc as f64) / total < 0.7 && (lo > 0 || hi < bins - 1) {
        let left = if lo > 0 { counts[lo - 1] as i64 } else { -1 };
        let right = if hi < bins - 1 { counts[hi + 1] as i64 } else { -1 };
        if right >= left {
            hi += 1;
            acc += counts[hi];
        } else {
            lo -= 1;
            acc += counts[lo];
        }
    }

    ValueArea {
        poc: min + (poc_idx as f64 + 0.5) * step,
        value_low: min + lo as f64 * step,
        value_high: min + (hi as f64 + 1.0) * step,
    }
}
