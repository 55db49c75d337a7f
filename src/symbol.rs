//! Symbol normalization and instrument classification.
//!
//! `normalize` maps arbitrary venue spellings (`EURUSD`, `ada-usd`,
//! `EUR/USD_otc`) onto the canonical `BASE/QUOTE[suffix]` form, returning
//! `None` for anything it does not track. `classify` buckets an id into an
//! asset class; it is a deterministic, total heuristic.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::AssetClass;

/// Currency and crypto bases accepted as the BASE leg.
static ALLOWED_BASE: phf::Set<&'static str> = phf::phf_set! {
    // Major/minor FX
    "USD", "EUR", "GBP", "JPY", "AUD", "CAD", "CHF", "NZD", "CNY", "RUB",
    "TRY", "SEK", "NOK", "DKK", "PLN", "HUF", "CZK", "ZAR", "MXN", "SGD",
    "HKD", "BRL", "ILS", "INR", "KRW", "SAR", "AED",
    // Crypto
    "BTC", "ETH", "LTC", "XRP", "ADA", "SOL", "BNB", "DOGE", "DOT", "TRX",
    "AVAX", "XLM", "ATOM", "ETC",
};

/// Quote currencies accepted as the QUOTE leg.
static ALLOWED_QUOTE: phf::Set<&'static str> = phf::phf_set! {
    "USD", "USDT", "EUR", "GBP", "JPY", "AUD", "CAD", "CHF", "NZD",
};

static CRYPTO_BASES: phf::Set<&'static str> = phf::phf_set! {
    "BTC", "ETH", "LTC", "XRP", "ADA", "SOL", "BNB", "DOGE", "DOT", "TRX",
    "AVAX", "XLM", "ATOM", "ETC", "BCH", "SHIB", "MATIC", "LINK",
};

static COMMODITY_TOKENS: phf::Set<&'static str> = phf::phf_set! {
    "XAU", "XAG", "XPT", "XPD", "UKOIL", "USOIL", "BRENT", "WTI", "NG",
    "XBR", "XTI", "XCU", "XAL", "COPPER", "SILVER", "GOLD",
};

static INDEX_TOKENS: phf::Set<&'static str> = phf::phf_set! {
    "US30", "US_30", "DJI", "SPX500", "SP500", "NAS100", "NDX", "GER40",
    "DE30", "UK100", "FTSE100", "FR40", "CAC40", "JP225", "NIKKEI", "HK50",
    "HSI", "AU200", "ASX200",
};

static OTC_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)([_-]otc\d*)$").unwrap());
static HYPHEN_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3,5}-[A-Z]{3,5}$").unwrap());
static SIX_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{6}$").unwrap());
static SLASH_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}/[A-Z]{3,5}$").unwrap());
static LOOSE_SLASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2,6}/[A-Z]{2,6}").unwrap());
static SIX_OR_SEVEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{6,7}$").unwrap());
static SHORT_TICKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{1,5}$").unwrap());
static EXACT_SLASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2,6}/[A-Z]{2,6}$").unwrap());

static HARVEST_SLASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{2,6}/[A-Z]{2,6})\b").unwrap());
static HARVEST_CONCAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{6,7}(?:[_-]OTC\d*)?)\b").unwrap());

/// Split an id into (core, suffix) where suffix is an optional `[_-]otc\d*`
/// marker preserved exactly as written.
fn split_suffix(raw: &str) -> (&str, &str) {
    match OTC_SUFFIX.find(raw) {
        Some(m) => (&raw[..m.start()], m.as_str()),
        None => (raw, ""),
    }
}

/// Normalize a raw symbol spelling to canonical `BASE/QUOTE[suffix]` form.
///
/// Returns `None` for anything that does not validate; callers treat that as
/// "not an instrument I track", never as an error. Idempotent:
/// `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(raw: &str) -> Option<String> {
    let original = raw.trim();
    if original.is_empty() {
        return None;
    }

    let (core_raw, suffix) = split_suffix(original);
    let mut core = core_raw.trim().to_uppercase();

    // ADA-USD -> ADA/USD
    if HYPHEN_PAIR.is_match(&core) {
        core = core.replacen('-', "/", 1);
    }

    // EURUSD -> EUR/USD
    if SIX_LETTER.is_match(&core) {
        core = format!("{}/{}", &core[..3], &core[3..]);
    }

    if !SLASH_PAIR.is_match(&core) {
        return None;
    }
    let (base, quote) = core.split_once('/')?;
    if base == quote {
        return None;
    }
    if !ALLOWED_BASE.contains(base) || !ALLOWED_QUOTE.contains(quote) {
        return None;
    }

    // Re-attach the suffix verbatim
    Some(format!("{}/{}{}", base, quote, suffix))
}

/// Classify an instrument id into an asset class.
///
/// A rule cascade over the BASE/QUOTE tokens; total and deterministic but
/// explicitly best-effort.
pub fn classify(id_raw: &str) -> AssetClass {
    let id = id_raw.to_uppercase();
    let (core, _) = split_suffix(&id);

    if LOOSE_SLASH.is_match(core) {
        let (base, quote) = core.split_once('/').unwrap_or((core, ""));
        if CRYPTO_BASES.contains(base) {
            return AssetClass::Crypto;
        }
        if COMMODITY_TOKENS.contains(base) {
            return AssetClass::Commodity;
        }
        if ALLOWED_BASE.contains(base) && ALLOWED_QUOTE.contains(quote) {
            return AssetClass::Currency;
        }
        return AssetClass::Stock;
    }

    // EURUSD, XAUUSD, BTCUSD style
    if SIX_OR_SEVEN.is_match(core) {
        let split = core.len() - 3;
        let base = &core[..split];
        let quote = &core[split..];
        if CRYPTO_BASES.contains(base) {
            return AssetClass::Crypto;
        }
        if COMMODITY_TOKENS.contains(base) {
            return AssetClass::Commodity;
        }
        if ALLOWED_BASE.contains(base) && ALLOWED_QUOTE.contains(quote) {
            return AssetClass::Currency;
        }
        return AssetClass::Stock;
    }

    if INDEX_TOKENS.contains(core) {
        return AssetClass::Index;
    }
    if SHORT_TICKER.is_match(core) {
        return AssetClass::Stock;
    }
    AssetClass::Currency
}

/// Human-readable display form for a raw instrument id (`EURUSD_OTC` ->
/// `EUR/USD_OTC`), falling back to the uppercased id.
pub fn display_from_id(id_raw: &str) -> String {
    let id = id_raw.to_uppercase();
    let (core, suffix) = split_suffix(&id);
    if SIX_OR_SEVEN.is_match(core) {
        let split = core.len() - 3;
        return format!("{}/{}{}", &core[..split], &core[split..], suffix);
    }
    if EXACT_SLASH.is_match(core) {
        return format!("{}{}", core, suffix);
    }
    id
}

/// Scan arbitrary decoded text for symbol-shaped tokens and return the
/// normalized hits. Feeds the discovered-symbols set.
pub fn harvest(text: &str) -> Vec<String> {
    let upper = text.to_uppercase();
    let mut out = Vec::new();
    for caps in HARVEST_SLASH.captures_iter(&upper) {
        if let Some(norm) = normalize(&caps[1]) {
            if !out.contains(&norm) {
                out.push(norm);
            }
        }
    }
    for caps in HARVEST_CONCAT.captures_iter(&upper) {
        if let Some(norm) = normalize(&caps[1]) {
            if !out.contains(&norm) {
                out.push(norm);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_concatenated_fx() {
        assert_eq!(normalize("EURUSD"), Some("EUR/USD".to_string()));
        assert_eq!(normalize("eurusd"), Some("EUR/USD".to_string()));
    }

    #[test]
    fn normalizes_hyphen_form() {
        assert_eq!(normalize("ADA-USD"), Some("ADA/USD".to_string()));
    }

    #[test]
    fn preserves_otc_suffix_verbatim() {
        assert_eq!(normalize("EURUSD_otc"), Some("EUR/USD_otc".to_string()));
        assert_eq!(normalize("GBP/JPY-OTC2"), Some("GBP/JPY-OTC2".to_string()));
    }

    #[test]
    fn rejects_same_base_and_quote() {
        assert_eq!(normalize("USDUSD"), None);
        assert_eq!(normalize("USD/USD"), None);
    }

    #[test]
    fn rejects_unknown_codes() {
        assert_eq!(normalize("FOO/BAR"), None);
        assert_eq!(normalize("ZZZUSD"), None);
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("hello world"), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in [
            "EURUSD",
            "EURUSD_otc",
            "ada-usd",
            "BTC/USDT",
            "GBPJPY-otc3",
            "garbage",
            "USD/USD",
        ] {
            let once = normalize(raw);
            let twice = once.as_deref().and_then(normalize);
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn classifies_by_rule_cascade() {
        assert_eq!(classify("EUR/USD"), AssetClass::Currency);
        assert_eq!(classify("EURUSD_OTC"), AssetClass::Currency);
        assert_eq!(classify("BTC/USD"), AssetClass::Crypto);
        assert_eq!(classify("BTCUSD"), AssetClass::Crypto);
        assert_eq!(classify("XAUUSD"), AssetClass::Commodity);
        assert_eq!(classify("US30"), AssetClass::Index);
        assert_eq!(classify("AAPL"), AssetClass::Stock);
        // unrecognized slash pair defaults to Stock, everything else Currency
        assert_eq!(classify("FOO/BAR"), AssetClass::Stock);
        assert_eq!(classify("##weird##"), AssetClass::Currency);
    }

    #[test]
    fn display_formats_concat_ids() {
        assert_eq!(display_from_id("EURUSD_otc"), "EUR/USD_OTC");
        assert_eq!(display_from_id("BTCUSD"), "BTC/USD");
        assert_eq!(display_from_id("EUR/USD"), "EUR/USD");
        assert_eq!(display_from_id("weird-id"), "WEIRD-ID");
    }

    #[test]
    fn harvest_finds_both_token_shapes() {
        let text = r#"42["quotes",{"a":"EUR/USD","b":"GBPJPY_OTC","junk":"FOOBARBAZ"}]"#;
        let found = harvest(text);
        assert!(found.contains(&"EUR/USD".to_string()));
        assert!(found.contains(&"GBP/JPY_OTC".to_string()));
        assert!(!found.iter().any(|s| s.contains("FOO")));
    }
}
