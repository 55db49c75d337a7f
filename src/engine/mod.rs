//! Signal engine: configuration, verdict types and the confluence scorer.

pub mod config;
pub mod scorer;
pub mod signal;

pub use config::{window_for, AnalysisConfig, AnalysisWindow, ScoreWeights};
pub use scorer::SignalEngine;
pub use signal::{
    DataOrigin, FeatureSnapshot, IndicatorSnapshot, ScoreComponent, SignalResult, SignalSide,
};
