use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn, Level};

use driftnet::{
    provider_from_env, AutoTradePolicy, Bridge, QuoteStore, RestActuator, Settings, SignalEngine,
    TradeActuator, WsFrameSource,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting driftnet bridge...");

    let settings = Settings::load()?;
    info!(tap_url = %settings.tap_url, actuator_url = %settings.actuator_url, "configuration loaded");

    let store = Arc::new(QuoteStore::new());
    let provider = provider_from_env();
    let engine = Arc::new(SignalEngine::with_config(
        Arc::clone(&store),
        provider,
        settings.analysis.clone(),
    ));
    let actuator: Arc<dyn TradeActuator> = Arc::new(RestActuator::new(&settings.actuator_url));

    let policy = Arc::new(AutoTradePolicy::new(
        Arc::clone(&store),
        Arc::clone(&engine),
        Arc::clone(&actuator),
    ));
    policy.set_config(settings.autotrade.clone());

    let bridge = Arc::new(Bridge::new(Arc::clone(&store), policy, actuator));
    bridge.set_auto_subscribe_config(settings.auto_subscribe.clone());

    let (frame_tx, frame_rx) = mpsc::channel(1024);
    let source = WsFrameSource::connect(&settings.tap_url, frame_tx).await?;
    info!("✓ frame tap connected");

    let runner = tokio::spawn(Arc::clone(&bridge).run(frame_rx));

    // Keep the tap alive; the bridge loop ends only when the frame channel
    // closes for good.
    let mut backoff_secs = 2u64;
    loop {
        tokio::time::sleep(Duration::from_secs(5)).await;
        if runner.is_finished() {
            break;
        }
        if !source.is_connected().await {
            warn!("frame tap disconnected, reconnecting in {backoff_secs}s");
            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            match source.reconnect().await {
                Ok(()) => {
                    info!("frame tap reconnected");
                    backoff_secs = 2;
                }
                Err(err) => {
                    warn!(%err, "frame tap reconnect failed");
                    backoff_secs = (backoff_secs * 2).min(60);
                }
            }
        }
    }

    runner.await?;
    info!("bridge stopped");
    Ok(())
}
