//! On-demand tick-to-OHLC bucketing.
//!
//! Candles are recomputed from tick history every time rather than cached
//! incrementally, trading a little CPU for zero staleness bugs.

use std::collections::BTreeMap;

use crate::types::{Candle, Tick};

/// Bucket ticks into fixed-width bars of `minutes` width. Buckets are
/// anchored to the first tick's minute boundary; empty buckets are skipped.
pub fn ticks_to_candles(ticks: &[Tick], minutes: i64) -> Vec<Candle> {
    if ticks.is_empty() || minutes <= 0 {
        return Vec::new();
    }
    let width_ms = minutes * 60_000;
    let anchor = ticks[0].ts_ms - ticks[0].ts_ms.rem_euclid(width_ms);

    let mut buckets: BTreeMap<i64, Candle> = BTreeMap::new();
    for tick in ticks {
        let key = anchor + ((tick.ts_ms - anchor) / width_ms) * width_ms;
        buckets
            .entry(key)
            .and_modify(|c| {
                c.high = c.high.max(tick.price);
                c.low = c.low.min(tick.price);
                c.close = tick.price;
            })
            .or_insert(Candle {
                open_time_ms: key,
                open: tick.price,
                high: tick.price,
                low: tick.price,
                close: tick.price,
            });
    }
    buckets.into_values().collect()
}

pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(ts_ms: i64, price: f64) -> Tick {
        Tick {
            ts_ms,
            price,
            dir: 0,
        }
    }

    #[test]
    fn buckets_ticks_into_minute_bars() {
        let base = 1_690_000_020_000;
        let ticks = vec![
            tick(base, 1.10),
            tick(base + 10_000, 1.12),
            tick(base + 20_000, 1.09),
            tick(base + 70_000, 1.11),
            tick(base + 80_000, 1.15),
        ];
        let candles = ticks_to_candles(&ticks, 1);
        assert_eq!(candles.len(), 2);
        let first = &candles[0];
        assert_eq!(first.open, 1.10);
        assert_eq!(first.high, 1.12);
        assert_eq!(first.low, 1.09);
        assert_eq!(first.close, 1.09);
        assert_eq!(first.open_time_ms % 60_000, 0);
        let second = &candles[1];
        assert_eq!(second.open, 1.11);
        assert_eq!(second.close, 1.15);
    }

    #[test]
    fn bars_come_out_time_ordered() {
        let base = 1_690_000_000_000;
        let ticks: Vec<Tick> = (0..300)
            .map(|i| tick(base + i * 1_000, 1.0 + (i % 7) as f64 * 0.001))
            .collect();
        let candles = ticks_to_candles(&ticks, 1);
        // 300s of ticks starting 40s into a minute spans six buckets
        assert_eq!(candles.len(), 6);
        assert!(candles.windows(2).all(|w| w[0].open_time_ms < w[1].open_time_ms));
    }

    #[test]
    fn empty_input_yields_no_bars() {
        assert!(ticks_to_candles(&[], 1).is_empty());
    }
}
