//! Authoritative in-memory market state.
//!
//! The store exclusively owns tick history and latest-quote records; every
//! read hands out copies so no caller can hold a reference into mutable
//! state. Mutation happens under short `RwLock` critical sections so the
//! synchronous ingestion pipeline never blocks on I/O.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use crate::extract::{Extraction, PayoutKey};
use crate::symbol;
use crate::types::{AssetClass, FrameRecord, InstrumentInfo, QuoteRecord, Tick};

/// Tick history cap per instrument; trimming is bulk, not per-tick.
pub const TICK_HISTORY_CAP: usize = 5000;
/// Recent raw frames retained for diagnostics.
pub const FRAME_RING_CAP: usize = 20;
/// Event-bus capacity; slow subscribers miss events rather than block.
const EVENT_CHANNEL_CAP: usize = 1024;

/// Quote-updated event published to subscribers.
#[derive(Debug, Clone)]
pub struct QuoteEvent {
    pub symbol: String,
    pub price: f64,
    pub ts_ms: i64,
}

#[derive(Debug, Clone)]
struct InstrumentQuote {
    id: String,
    display: String,
    asset_class: AssetClass,
    price: f64,
    ts_ms: i64,
}

#[derive(Default)]
struct StoreInner {
    quotes: HashMap<String, QuoteRecord>,
    ticks: HashMap<String, Vec<Tick>>,
    payouts_by_symbol: HashMap<String, f64>,
    payouts_by_id: HashMap<String, f64>,
    instrument_quotes: HashMap<String, InstrumentQuote>,
    seen_symbols: BTreeSet<String>,
    recent_frames: VecDeque<FrameRecord>,
}

/// Per-instrument quote/tick/payout state plus the frame ring.
pub struct QuoteStore {
    inner: RwLock<StoreInner>,
    quote_tx: broadcast::Sender<QuoteEvent>,
    frame_tx: broadcast::Sender<FrameRecord>,
}

impl Default for QuoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteStore {
    pub fn new() -> Self {
        let (quote_tx, _) = broadcast::channel(EVENT_CHANNEL_CAP);
        let (frame_tx, _) = broadcast::channel(EVENT_CHANNEL_CAP);
        Self {
            inner: RwLock::new(StoreInner::default()),
            quote_tx,
            frame_tx,
        }
    }

    /// Record a quote for a normalized symbol: computes tick direction,
    /// appends to bounded history, overwrites the latest-quote record, and
    /// publishes a quote-updated event.
    pub fn record_quote(&self, symbol: &str, price: f64, ts_ms: i64) {
        if !price.is_finite() {
            return;
        }
        {
            let mut inner = self.inner.write().expect("store lock poisoned");
            let history = inner.ticks.entry(symbol.to_string()).or_default();
            let dir = match history.last() {
                Some(prev) if price > prev.price => 1,
                Some(prev) if price < prev.price => -1,
                Some(_) => 0,
                None => 0,
            };
            history.push(Tick { ts_ms, price, dir });
            if history.len() > TICK_HISTORY_CAP {
                let excess = history.len() - TICK_HISTORY_CAP;
                history.drain(..excess);
            }
            inner.quotes.insert(
                symbol.to_string(),
                QuoteRecord {
                    symbol: symbol.to_string(),
                    price,
                    ts_ms,
                },
            );
            inner.seen_symbols.insert(symbol.to_string());
        }
        let _ = self.quote_tx.send(QuoteEvent {
            symbol: symbol.to_string(),
            price,
            ts_ms,
        });
    }

    /// Record a quote for a raw instrument id that did not normalize.
    /// Still published on the quote bus so clients see non-FX prices.
    pub fn record_instrument_quote(&self, id_raw: &str, price: f64, ts_ms: i64) {
        if id_raw.is_empty() || !price.is_finite() {
            return;
        }
        let id = id_raw.to_uppercase();
        let display = symbol::display_from_id(&id);
        let asset_class = symbol::classify(&id);
        {
            let mut inner = self.inner.write().expect("store lock poisoned");
            inner.instrument_quotes.insert(
                id.clone(),
                InstrumentQuote {
                    id,
                    display: display.clone(),
                    asset_class,
                    price,
                    ts_ms,
                },
            );
        }
        let _ = self.quote_tx.send(QuoteEvent {
            symbol: display,
            price,
            ts_ms,
        });
    }

    /// Record a payout percentage keyed by normalized symbol or raw id.
    pub fn record_payout(&self, key: &PayoutKey, percent: f64) {
        if !percent.is_finite() {
            return;
        }
        let mut inner = self.inner.write().expect("store lock poisoned");
        match key {
            PayoutKey::Symbol(sym) => {
                inner.payouts_by_symbol.insert(sym.clone(), percent);
            }
            PayoutKey::RawId(id) => {
                inner.payouts_by_id.insert(id.to_uppercase(), percent);
            }
        }
    }

    /// Apply everything one payload extraction yielded.
    pub fn apply_extraction(&self, ex: &Extraction, ts_ms: i64) {
        for q in &ex.quotes {
            self.record_quote(&q.symbol, q.price, ts_ms);
        }
        for i in &ex.instruments {
            self.record_instrument_quote(&i.id, i.price, ts_ms);
        }
        for p in &ex.payouts {
            self.record_payout(&p.key, p.percent);
        }
    }

    /// Remember a symbol seen in frame text even before it has a price.
    pub fn note_symbol(&self, symbol: &str) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        if inner.seen_symbols.insert(symbol.to_string()) {
            debug!(symbol, "discovered symbol");
        }
    }

    /// Push a decoded frame onto the bounded diagnostics ring and publish it.
    pub fn push_frame(&self, frame: FrameRecord) {
        {
            let mut inner = self.inner.write().expect("store lock poisoned");
            if inner.recent_frames.len() >= FRAME_RING_CAP {
                inner.recent_frames.pop_front();
            }
            inner.recent_frames.push_back(frame.clone());
        }
        let _ = self.frame_tx.send(frame);
    }

    /// Latest quotes, most recent first.
    pub fn latest_quotes(&self) -> Vec<QuoteRecord> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut out: Vec<QuoteRecord> = inner.quotes.values().cloned().collect();
        out.sort_by(|a, b| b.ts_ms.cmp(&a.ts_ms));
        out
    }

    /// Snapshot of symbol -> (price, ts) for cross-asset computations.
    pub fn latest_quote_map(&self) -> HashMap<String, (f64, i64)> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .quotes
            .iter()
            .map(|(k, v)| (k.clone(), (v.price, v.ts_ms)))
            .collect()
    }

    /// Ticks for a symbol within `lookback_ms` of `now_ms`, in arrival order.
    /// History is append-ordered, so scan back from the tail.
    pub fn recent_ticks(&self, raw_symbol: &str, lookback_ms: i64, now_ms: i64) -> Vec<Tick> {
        let symbol = match symbol::normalize(raw_symbol) {
            Some(s) => s,
            None => return Vec::new(),
        };
        let inner = self.inner.read().expect("store lock poisoned");
        let history = match inner.ticks.get(&symbol) {
            Some(h) if !h.is_empty() => h,
            _ => return Vec::new(),
        };
        let cutoff = now_ms - lookback_ms.max(0);
        let start = history
            .iter()
            .rposition(|t| t.ts_ms < cutoff)
            .map(|i| i + 1)
            .unwrap_or(0);
        history[start..].to_vec()
    }

    /// Live instrument listing: normalized quotes first, then raw instrument
    /// quotes not already represented, sorted by display symbol.
    pub fn instruments(&self) -> Vec<InstrumentInfo> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut out: Vec<InstrumentInfo> = Vec::new();
        for record in inner.quotes.values() {
            let id = record.symbol.replace('/', "");
            out.push(InstrumentInfo {
                asset_class: symbol::classify(&id),
                id,
                symbol: record.symbol.clone(),
                price: record.price,
                last_update_ms: record.ts_ms,
                payout: inner.payouts_by_symbol.get(&record.symbol).copied(),
            });
        }
        for iq in inner.instrument_quotes.values() {
            if out.iter().any(|x| x.id == iq.id) {
                continue;
            }
            out.push(InstrumentInfo {
                id: iq.id.clone(),
                symbol: iq.display.clone(),
                asset_class: iq.asset_class,
                price: iq.price,
                last_update_ms: iq.ts_ms,
                payout: inner.payouts_by_id.get(&iq.id).copied(),
            });
        }
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    /// Symbols discovered in frame text (priced or not), sorted.
    pub fn discovered_symbols(&self) -> Vec<String> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.seen_symbols.iter().cloned().collect()
    }

    /// Discovered symbols that have no live quote yet.
    pub fn unpriced_symbols(&self) -> Vec<String> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .seen_symbols
            .iter()
            .filter(|s| !inner.quotes.contains_key(*s))
            .cloned()
            .collect()
    }

    /// Recent frames, newest first.
    pub fn recent_frames(&self) -> Vec<FrameRecord> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.recent_frames.iter().rev().cloned().collect()
    }

    pub fn subscribe_quotes(&self) -> broadcast::Receiver<QuoteEvent> {
        self.quote_tx.subscribe()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<FrameRecord> {
        self.frame_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameDirection;

    #[test]
    fn tick_direction_tracks_previous_price() {
        let store = QuoteStore::new();
        store.record_quote("EUR/USD", 1.10, 1_000);
        store.record_quote("EUR/USD", 1.11, 2_000);
        store.record_quote("EUR/USD", 1.11, 3_000);
        store.record_quote("EUR/USD", 1.09, 4_000);
        let ticks = store.recent_ticks("EUR/USD", 60_000, 4_000);
        let dirs: Vec<i8> = ticks.iter().map(|t| t.dir).collect();
        assert_eq!(dirs, vec![0, 1, 0, -1]);
    }

    #[test]
    fn history_is_capped_to_most_recent_ticks() {
        let store = QuoteStore::new();
        let n = TICK_HISTORY_CAP + 250;
        for i in 0..n {
            store.record_quote("EUR/USD", 1.0 + i as f64 * 1e-6, i as i64);
        }
        let ticks = store.recent_ticks("EUR/USD", i64::MAX / 2, n as i64);
        assert_eq!(ticks.len(), TICK_HISTORY_CAP);
        assert_eq!(ticks.first().unwrap().ts_ms, 250);
        assert_eq!(ticks.last().unwrap().ts_ms, (n - 1) as i64);
    }

    #[test]
    fn recent_ticks_honors_lookback_window() {
        let store = QuoteStore::new();
        for i in 0..10 {
            store.record_quote("GBP/USD", 1.27, i * 1_000);
        }
        let ticks = store.recent_ticks("GBPUSD", 3_000, 9_000);
        assert_eq!(ticks.len(), 4); // ts 6000..=9000
        assert!(ticks.iter().all(|t| t.ts_ms >= 6_000));
    }

    #[test]
    fn recent_ticks_rejects_unknown_symbols() {
        let store = QuoteStore::new();
        store.record_quote("EUR/USD", 1.1, 1_000);
        assert!(store.recent_ticks("not a pair", 60_000, 1_000).is_empty());
    }

    #[test]
    fn instruments_merge_normalized_and_raw() {
        let store = QuoteStore::new();
        store.record_quote("EUR/USD", 1.08, 1_000);
        store.record_instrument_quote("AAPL", 189.4, 1_000);
        store.record_payout(&PayoutKey::Symbol("EUR/USD".to_string()), 92.0);
        let list = store.instruments();
        assert_eq!(list.len(), 2);
        let eur = list.iter().find(|i| i.symbol == "EUR/USD").unwrap();
        assert_eq!(eur.payout, Some(92.0));
        assert_eq!(eur.asset_class, AssetClass::Currency);
        let aapl = list.iter().find(|i| i.id == "AAPL").unwrap();
        assert_eq!(aapl.asset_class, AssetClass::Stock);
    }

    #[test]
    fn frame_ring_is_bounded() {
        let store = QuoteStore::new();
        for i in 0..(FRAME_RING_CAP + 5) {
            store.push_frame(FrameRecord {
                direction: FrameDirection::In,
                url: "wss://venue".to_string(),
                payload: format!("frame-{}", i),
                ts_ms: i as i64,
            });
        }
        let frames = store.recent_frames();
        assert_eq!(frames.len(), FRAME_RING_CAP);
        // newest first
        assert_eq!(frames[0].payload, format!("frame-{}", FRAME_RING_CAP + 4));
    }

    #[test]
    fn unpriced_symbols_excludes_quoted_ones() {
        let store = QuoteStore::new();
        store.note_symbol("EUR/USD");
        store.note_symbol("GBP/JPY");
        store.record_quote("EUR/USD", 1.08, 1_000);
        assert_eq!(store.unpriced_symbols(), vec!["GBP/JPY".to_string()]);
    }

    #[tokio::test]
    async fn quote_events_reach_subscribers() {
        let store = QuoteStore::new();
        let mut rx = store.subscribe_quotes();
        store.record_quote("EUR/USD", 1.0812, 42);
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.symbol, "EUR/USD");
        assert_eq!(evt.ts_ms, 42);
    }
}
