use serde::{Deserialize, Serialize};

/// Direction of an intercepted frame relative to the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDirection {
    In,
    Out,
}

/// Raw frame payload as delivered by the browser collaborator.
///
/// The venue applies zero or more of base64/gzip/deflate interchangeably,
/// so the payload is kept opaque until `decode::decode_candidates` runs.
#[derive(Debug, Clone)]
pub enum FramePayload {
    Text(String),
    Binary(Vec<u8>),
}

/// A raw intercepted frame. Transient: consumed by the ingestion pipeline
/// and only retained (as decoded display text) in the bounded frame ring.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub direction: FrameDirection,
    pub source_url: String,
    pub payload: FramePayload,
    pub ts_ms: i64,
}

/// Frame record kept for diagnostics (decoded display text only).
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    pub direction: FrameDirection,
    pub url: String,
    pub payload: String,
    pub ts_ms: i64,
}

/// One price observation for an instrument, with direction relative to the
/// previous tick for the same instrument.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Tick {
    pub ts_ms: i64,
    pub price: f64,
    /// -1 down, 0 flat/first, 1 up
    pub dir: i8,
}

/// Fixed-width OHLC bar derived from tick history on demand.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Candle {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Latest quote for a normalized instrument.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteRecord {
    pub symbol: String,
    pub price: f64,
    pub ts_ms: i64,
}

/// Asset-class bucket. Heuristic and best-effort, never authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    Currency,
    Crypto,
    Commodity,
    Stock,
    Index,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Currency => "currency",
            AssetClass::Crypto => "crypto",
            AssetClass::Commodity => "commodity",
            AssetClass::Stock => "stock",
            AssetClass::Index => "index",
        }
    }
}

/// Entry in the live instrument listing exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentInfo {
    pub id: String,
    pub symbol: String,
    pub asset_class: AssetClass,
    pub price: f64,
    pub last_update_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<f64>,
}

/// Contract duration offered by the venue. Maps to an internal analysis
/// timeframe and lookback window (see `engine::config`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expiry {
    #[serde(rename = "30s")]
    Sec30,
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "2m")]
    Min2,
    #[serde(rename = "3m")]
    Min3,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "10m")]
    Min10,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
}

impl Expiry {
    pub fn as_str(&self) -> &'static str {
        match self {
            Expiry::Sec30 => "30s",
            Expiry::Min1 => "1m",
            Expiry::Min2 => "2m",
            Expiry::Min3 => "3m",
            Expiry::Min5 => "5m",
            Expiry::Min10 => "10m",
            Expiry::Min15 => "15m",
            Expiry::Min30 => "30m",
            Expiry::Hour1 => "1h",
        }
    }

    pub fn seconds(&self) -> u64 {
        match self {
            Expiry::Sec30 => 30,
            Expiry::Min1 => 60,
            Expiry::Min2 => 120,
            Expiry::Min3 => 180,
            Expiry::Min5 => 300,
            Expiry::Min10 => 600,
            Expiry::Min15 => 900,
            Expiry::Min30 => 1800,
            Expiry::Hour1 => 3600,
        }
    }
}

impl std::fmt::Display for Expiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Expiry {
    type Err = BridgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "30s" => Ok(Expiry::Sec30),
            "1m" => Ok(Expiry::Min1),
            "2m" => Ok(Expiry::Min2),
            "3m" => Ok(Expiry::Min3),
            "5m" => Ok(Expiry::Min5),
            "10m" => Ok(Expiry::Min10),
            "15m" => Ok(Expiry::Min15),
            "30m" => Ok(Expiry::Min30),
            "1h" => Ok(Expiry::Hour1),
            other => Err(BridgeError::InvalidRequest(format!(
                "unknown expiry: {}",
                other
            ))),
        }
    }
}

/// Error taxonomy for the bridge core.
///
/// Decode failures and normalization rejections are deliberately absent:
/// they are expected outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("actuator error: {0}")]
    Actuator(String),

    #[error("actuator call timed out after {0}ms")]
    ActuatorTimeout(u64),

    #[error("bridge not connected")]
    NotConnected,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
