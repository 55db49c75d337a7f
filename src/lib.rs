//! driftnet: turns a mirrored stream of trading-venue WebSocket frames into
//! live quotes, CALL/PUT/NEUTRAL signals and policy-gated trade actions.
//!
//! The pipeline is: [`ws_source`] taps frames, [`bridge`] decodes and
//! ingests them into the [`store`], the [`engine`] scores instruments on
//! demand, and [`autotrade`] decides when a signal becomes a button press
//! through the [`actuator`] boundary.

pub mod actuator;
pub mod autotrade;
pub mod bridge;
pub mod candles;
pub mod decode;
pub mod engine;
pub mod extract;
pub mod microstructure;
pub mod provider;
pub mod screener;
pub mod settings;
pub mod store;
pub mod symbol;
pub mod ta;
pub mod types;
pub mod ws_source;

pub use actuator::{AccountMode, RestActuator, TradeActuator};
pub use autotrade::{AutoTradeConfig, AutoTradePolicy, MasanielloConfig, TickOutcome};
pub use bridge::{Bridge, BridgeState, StatusSnapshot, SubscribeTemplate};
pub use engine::{AnalysisConfig, SignalEngine, SignalResult, SignalSide};
pub use provider::{provider_from_env, CloseSeriesProvider};
pub use screener::{Screener, ScreenerReport};
pub use settings::Settings;
pub use store::QuoteStore;
pub use types::{BridgeError, Expiry, RawFrame, Result};
pub use ws_source::WsFrameSource;
