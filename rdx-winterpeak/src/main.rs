use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use winterpeak::config::load_config;
use winterpeak::prelude::*;

const USAGE: &str = "usage: winterpeak <config> <payload.json> [--once]";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Parse arguments and load the configuration.
    let args: Vec<String> = std::env::args().skip(1).collect();
    let once = args.iter().any(|a| a == "--once");
    let paths: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let (config_path, payload_path) = match paths.as_slice() {
        [config, payload] => (config.as_str(), payload.as_str()),
        _ => bail!(USAGE),
    };
    let config = Arc::new(
        load_config(config_path).with_context(|| format!("loading {config_path}"))?,
    );

    // 3. Build the controller and the engine.
    let clock = Arc::new(SystemClock::new(config.timezone));
    let controller = RefreshController::new(JsonFileSource::new(payload_path), config, clock);
    let engine = PeakEngine::new(controller);
    spawn_event_listener(&engine);
    engine.add_sink(TracingSink).await;

    // 4. Publish once, or keep publishing until Ctrl+C.
    if once {
        let state = engine.publish_once().await?;
        println!(
            "{} {}",
            "current state:".dimmed(),
            state.composite_state().cyan().bold()
        );
        return Ok(());
    }
    engine.run().await?;
    Ok(())
}

/// Logs every schedule transition the engine broadcasts.
fn spawn_event_listener(engine: &PeakEngine<JsonFileSource>) {
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("[SCHEDULE] => {:?}", event);
        }
    });
}
