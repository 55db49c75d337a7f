//! Process configuration, layered from an optional `driftnet.toml` file
//! and `DRIFTNET_*` environment variables.

use serde::Deserialize;

use crate::autotrade::AutoTradeConfig;
use crate::bridge::AutoSubscribeConfig;
use crate::engine::AnalysisConfig;
use crate::types::{BridgeError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// WebSocket endpoint of the companion frame tap
    #[serde(default = "default_tap_url")]
    pub tap_url: String,
    /// REST control endpoint of the companion actuator
    #[serde(default = "default_actuator_url")]
    pub actuator_url: String,
    #[serde(default)]
    pub autotrade: AutoTradeConfig,
    #[serde(default)]
    pub auto_subscribe: AutoSubscribeConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_tap_url() -> String {
    "ws://127.0.0.1:8777/frames".to_string()
}

fn default_actuator_url() -> String {
    "http://127.0.0.1:8778".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tap_url: default_tap_url(),
            actuator_url: default_actuator_url(),
            autotrade: AutoTradeConfig::default(),
            auto_subscribe: AutoSubscribeConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Settings {
    /// File settings lose to environment overrides, e.g.
    /// `DRIFTNET_AUTOTRADE__THRESHOLD=80`.
    pub fn load() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name("driftnet").required(false))
            .add_source(config::Environment::with_prefix("DRIFTNET").separator("__"))
            .build()
            .map_err(|e| BridgeError::Config(e.to_string()))?;
        cfg.try_deserialize()
            .map_err(|e| BridgeError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_yield_defaults() {
        let cfg = config::Config::builder().build().unwrap();
        let settings: Settings = cfg.try_deserialize().unwrap();
        assert_eq!(settings.tap_url, default_tap_url());
        assert!(!settings.autotrade.enabled);
        assert!(settings.auto_subscribe.enabled);
        assert_eq!(settings.autotrade.threshold, 75);
    }

    #[test]
    fn defaults_match_builder_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.actuator_url, "http://127.0.0.1:8778");
        assert_eq!(settings.analysis.call_threshold, 58.0);
    }
}
