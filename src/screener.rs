//! Market screener: ranks recently priced instruments by their best
//! signal confidence across a fixed set of expiries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::engine::{SignalEngine, SignalSide};
use crate::store::QuoteStore;
use crate::types::{now_ms, Expiry, InstrumentInfo};

/// Expiries each candidate is scored against.
const EXPIRIES: [Expiry; 5] = [
    Expiry::Sec30,
    Expiry::Min1,
    Expiry::Min3,
    Expiry::Min5,
    Expiry::Min15,
];

/// Instruments whose last quote is older than this are skipped.
const FRESHNESS_MS: i64 = 60_000;
/// At most this many instruments are analyzed per sweep.
const CANDIDATE_CAP: usize = 80;
/// At most this many items are reported.
const REPORT_CAP: usize = 100;
/// Concurrent analysis workers.
const CONCURRENCY: usize = 6;

/// The strongest signal found for one instrument.
#[derive(Debug, Clone, Serialize)]
pub struct BestSignal {
    pub expiry: Expiry,
    pub side: SignalSide,
    pub confidence: u8,
    pub timeframe_used: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenerItem {
    pub symbol: String,
    pub category: &'static str,
    pub price: f64,
    pub last_update_ms: i64,
    pub best: BestSignal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenerReport {
    pub generated_at_ms: i64,
    pub count: usize,
    pub items: Vec<ScreenerItem>,
}

pub struct Screener {
    store: Arc<QuoteStore>,
    engine: Arc<SignalEngine>,
}

impl Screener {
    pub fn new(store: Arc<QuoteStore>, engine: Arc<SignalEngine>) -> Self {
        Self { store, engine }
    }

    pub async fn screen(&self) -> ScreenerReport {
        self.screen_at(now_ms()).await
    }

    /// Sweep with an explicit clock, for deterministic tests.
    pub async fn screen_at(&self, now: i64) -> ScreenerReport {
        let mut candidates: Vec<InstrumentInfo> = self
            .store
            .instruments()
            .into_iter()
            .filter(|i| i.price.is_finite() && i.price > 0.0 && now - i.last_update_ms < FRESHNESS_MS)
            .collect();
        candidates.truncate(CANDIDATE_CAP);
        debug!(candidates = candidates.len(), "screener sweep");

        let candidates = Arc::new(candidates);
        let next = Arc::new(AtomicUsize::new(0));

        let workers = CONCURRENCY.min(candidates.len());
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let candidates = Arc::clone(&candidates);
            let next = Arc::clone(&next);
            let engine = Arc::clone(&self.engine);
            handles.push(tokio::spawn(async move {
                let mut out: Vec<ScreenerItem> = Vec::new();
                loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(inst) = candidates.get(i) else {
                        break;
                    };
                    let mut best: Option<BestSignal> = None;
                    for expiry in EXPIRIES {
                        let res = engine.analyze_at(&inst.symbol, expiry, now).await;
                        let cur = BestSignal {
                            expiry,
                            side: res.side,
                            confidence: res.confidence,
                            timeframe_used: res.timeframe_used,
                        };
                        if best.as_ref().map_or(true, |b| cur.confidence > b.confidence) {
                            best = Some(cur);
                        }
                    }
                    if let Some(best) = best {
                        out.push(ScreenerItem {
                            symbol: inst.symbol.clone(),
                            category: inst.asset_class.as_str(),
                            price: inst.price,
                            last_update_ms: inst.last_update_ms,
                            best,
                        });
                    }
                }
                out
            }));
        }

        let mut items: Vec<ScreenerItem> = Vec::new();
        for handle in handles {
            if let Ok(part) = handle.await {
                items.extend(part);
            }
        }

        items.sort_by(|a, b| {
            b.best
                .confidence
                .cmp(&a.best.confidence)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        items.truncate(REPORT_CAP);

        ScreenerReport {
            generated_at_ms: now,
            count: items.len(),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_040_000;

    fn harness(store: Arc<QuoteStore>) -> Screener {
        let engine = Arc::new(SignalEngine::new(Arc::clone(&store), None));
        Screener::new(store, engine)
    }

    #[tokio::test]
    async fn empty_store_yields_empty_report() {
        let screener = harness(Arc::new(QuoteStore::new()));
        let report = screener.screen_at(NOW).await;
        assert_eq!(report.count, 0);
        assert!(report.items.is_empty());
    }

    #[tokio::test]
    async fn stale_quotes_are_skipped() {
        let store = Arc::new(QuoteStore::new());
        store.record_quote("EUR/USD", 1.09, NOW - 2 * 60_000);
        store.record_quote("GBP/USD", 1.27, NOW - 5_000);
        let screener = harness(store);
        let report = screener.screen_at(NOW).await;
        assert_eq!(report.count, 1);
        assert_eq!(report.items[0].symbol, "GBP/USD");
        assert_eq!(report.items[0].category, "currency");
    }

    #[tokio::test]
    async fn items_sorted_by_confidence_then_symbol() {
        let store = Arc::new(QuoteStore::new());
        for sym in ["EUR/USD", "GBP/USD", "AUD/USD", "USD/JPY"] {
            store.record_quote(sym, 1.0, NOW - 1_000);
        }
        let screener = harness(store);
        let report = screener.screen_at(NOW).await;
        assert_eq!(report.count, 4);
        for pair in report.items.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.best.confidence > b.best.confidence
                    || (a.best.confidence == b.best.confidence && a.symbol < b.symbol)
            );
        }
    }
}
