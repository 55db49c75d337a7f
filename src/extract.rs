//! Permissive quote extraction from decoded frame text.
//!
//! Frames commonly prefix structured payloads with protocol tags
//! (`42["quotes",...]`), so a strict parse is attempted first and embedded
//! JSON chunks are tried independently when it fails. The walk is
//! intentionally permissive: rare false positives are acceptable because
//! `symbol::normalize` rejects anything outside the instrument grammar.

use serde_json::Value;

use crate::symbol;

/// Keys treated as instrument-id synonyms on generic objects.
const SYMBOL_KEYS: &[&str] = &["symbol", "pair", "asset", "instrument", "code", "sym", "s"];

/// Keys treated as price synonyms on generic objects, in priority order.
const PRICE_KEYS: &[&str] = &[
    "price", "last", "bid", "ask", "bidPrice", "askPrice", "rate", "p", "c",
];

/// Keys treated as payout-percentage synonyms.
const PAYOUT_KEYS: &[&str] = &["payout", "profit", "profitability", "percent", "percentage"];

/// A quote for a normalized instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteUpdate {
    pub symbol: String,
    pub price: f64,
}

/// A quote for a raw (non-normalizable) instrument id.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentUpdate {
    pub id: String,
    pub price: f64,
}

/// A payout percentage keyed either by normalized symbol or raw id.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutUpdate {
    pub key: PayoutKey,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayoutKey {
    Symbol(String),
    RawId(String),
}

/// Everything one payload candidate yielded.
#[derive(Debug, Default, Clone)]
pub struct Extraction {
    pub quotes: Vec<QuoteUpdate>,
    pub instruments: Vec<InstrumentUpdate>,
    pub payouts: Vec<PayoutUpdate>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty() && self.instruments.is_empty() && self.payouts.is_empty()
    }
}

/// Extract candidate quotes/payouts from one decoded payload candidate.
pub fn extract(payload: &str) -> Extraction {
    let mut out = Extraction::default();
    let candidate = payload.trim();
    if candidate.is_empty() {
        return out;
    }

    // Strip protocol prefixes like Engine.IO numeric tags before the JSON.
    let stripped = match candidate.find(['[', '{']) {
        Some(idx) if idx > 0 => &candidate[idx..],
        _ => candidate,
    };

    if let Ok(value) = serde_json::from_str::<Value>(stripped) {
        walk(&value, &mut out);
        return out;
    }

    // Payload may embed multiple JSON blobs; try each balanced chunk.
    for chunk in balanced_chunks(stripped) {
        if let Ok(value) = serde_json::from_str::<Value>(chunk) {
            walk(&value, &mut out);
        }
    }

    out
}

/// Find balanced `[...]`/`{...}` substrings, skipping over string literals.
fn balanced_chunks(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut chunks = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let open = bytes[i];
        if open != b'[' && open != b'{' {
            i += 1;
            continue;
        }
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;
        for (j, &b) in bytes.iter().enumerate().skip(i) {
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'[' | b'{' => depth += 1,
                b']' | b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        end = Some(j + 1);
                        break;
                    }
                }
                _ => {}
            }
        }
        match end {
            Some(j) => {
                chunks.push(&text[i..j]);
                i = j;
            }
            None => break,
        }
    }
    chunks
}

fn walk(node: &Value, out: &mut Extraction) {
    match node {
        Value::Array(items) => {
            // ["EVENT", { ... }] event envelope
            if items.len() >= 2 {
                if let (Value::String(_), Value::Object(_)) = (&items[0], &items[1]) {
                    push_if_quote(&items[1], out);
                }
            }
            // ["EURJPY_otc", ts, price] or ["EURJPY_otc", price]
            if items.len() >= 2 {
                if let Value::String(head) = &items[0] {
                    let nums: Vec<f64> = items[1..]
                        .iter()
                        .filter_map(|v| v.as_f64())
                        .filter(|v| v.is_finite())
                        .collect();
                    let price = if nums.len() >= 2 {
                        nums.last().copied()
                    } else {
                        nums.first().copied()
                    };
                    let sym = symbol::normalize(head);
                    if let Some(price) = price {
                        match &sym {
                            Some(sym) => out.quotes.push(QuoteUpdate {
                                symbol: sym.clone(),
                                price,
                            }),
                            None => out.instruments.push(InstrumentUpdate {
                                id: head.to_uppercase(),
                                price,
                            }),
                        }
                    }
                    // A plausible payout percentage riding along in the tuple
                    if let Some(payout) = nums.iter().copied().find(|n| (1.0..=100.0).contains(n)) {
                        let key = match sym {
                            Some(sym) => PayoutKey::Symbol(sym),
                            None => PayoutKey::RawId(head.to_uppercase()),
                        };
                        out.payouts.push(PayoutUpdate {
                            key,
                            percent: payout,
                        });
                    }
                }
            }
            for item in items {
                walk(item, out);
            }
        }
        Value::Object(map) => {
            push_if_quote(node, out);
            for value in map.values() {
                walk(value, out);
            }
        }
        _ => {}
    }
}

fn push_if_quote(node: &Value, out: &mut Extraction) {
    let obj = match node.as_object() {
        Some(obj) => obj,
        None => return,
    };

    let id_like = SYMBOL_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str));
    let symbol_candidate = id_like.and_then(symbol::normalize);

    let price = PRICE_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(as_finite_number));

    if let Some(price) = price {
        match (&symbol_candidate, id_like) {
            (Some(sym), _) => out.quotes.push(QuoteUpdate {
                symbol: sym.clone(),
                price,
            }),
            (None, Some(id)) => out.instruments.push(InstrumentUpdate {
                id: id.to_uppercase(),
                price,
            }),
            (None, None) => {}
        }
    }

    for key in PAYOUT_KEYS {
        if let Some(val) = obj.get(*key).and_then(as_finite_number) {
            if (1.0..=100.0).contains(&val) {
                let key = match (&symbol_candidate, id_like) {
                    (Some(sym), _) => PayoutKey::Symbol(sym.clone()),
                    (None, Some(id)) => PayoutKey::RawId(id.to_uppercase()),
                    (None, None) => continue,
                };
                out.payouts.push(PayoutUpdate { key, percent: val });
            }
        }
    }
}

/// Numbers arrive as JSON numbers or as numeric strings; accept both.
fn as_finite_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_frame_yields_symbol_and_price() {
        let ex = extract(r#"["EURUSD_otc",1690000000000,1.07234]"#);
        assert_eq!(
            ex.quotes,
            vec![QuoteUpdate {
                symbol: "EUR/USD_otc".to_string(),
                price: 1.07234
            }]
        );
    }

    #[test]
    fn tuple_frame_with_single_number_uses_it_as_price() {
        let ex = extract(r#"["GBPUSD",1.2712]"#);
        assert_eq!(ex.quotes[0].symbol, "GBP/USD");
        assert_eq!(ex.quotes[0].price, 1.2712);
    }

    #[test]
    fn protocol_prefix_is_stripped() {
        let ex = extract(r#"42["stream",{"symbol":"EUR/USD","price":1.0801}]"#);
        assert_eq!(ex.quotes[0].symbol, "EUR/USD");
        assert_eq!(ex.quotes[0].price, 1.0801);
    }

    #[test]
    fn synonym_keys_and_string_prices_are_accepted() {
        let ex = extract(r#"{"sym":"AUDUSD","bid":"0.6520"}"#);
        assert_eq!(ex.quotes[0].symbol, "AUD/USD");
        assert_eq!(ex.quotes[0].price, 0.6520);
    }

    #[test]
    fn non_normalizable_ids_become_instrument_updates() {
        let ex = extract(r#"{"asset":"AAPL","price":189.43}"#);
        assert!(ex.quotes.is_empty());
        assert_eq!(
            ex.instruments,
            vec![InstrumentUpdate {
                id: "AAPL".to_string(),
                price: 189.43
            }]
        );
    }

    #[test]
    fn payout_keys_in_range_are_recorded() {
        let ex = extract(r#"{"symbol":"EURUSD","price":1.08,"payout":92}"#);
        assert_eq!(
            ex.payouts,
            vec![PayoutUpdate {
                key: PayoutKey::Symbol("EUR/USD".to_string()),
                percent: 92.0
            }]
        );
    }

    #[test]
    fn payout_outside_range_is_ignored() {
        let ex = extract(r#"{"symbol":"EURUSD","price":1.08,"payout":250}"#);
        assert!(ex.payouts.is_empty());
    }

    #[test]
    fn tuple_payout_rides_along() {
        let ex = extract(r#"["EURUSD_otc",1690000000000,97,1.07234]"#);
        assert_eq!(ex.quotes[0].price, 1.07234);
        assert_eq!(ex.payouts.len(), 1);
        assert_eq!(ex.payouts[0].percent, 97.0);
    }

    #[test]
    fn embedded_blobs_after_garbage_prefix_parse_independently() {
        let ex = extract(r#"noise noise {"pair":"EURJPY","last":157.21} trailing"#);
        assert_eq!(ex.quotes[0].symbol, "EUR/JPY");
    }

    #[test]
    fn nested_structures_are_walked() {
        let ex = extract(r#"{"data":{"updates":[{"s":"NZDUSD","p":0.6101}]}}"#);
        assert_eq!(ex.quotes[0].symbol, "NZD/USD");
    }

    #[test]
    fn unparseable_payload_yields_empty_extraction() {
        assert!(extract("pure garbage").is_empty());
        assert!(extract("").is_empty());
        assert!(extract("3probe").is_empty());
    }
}
