//! # Headless Session Client
//!
//! Connects to a configured streaming endpoint, opens a voice session and
//! logs every decoded event. This binary is the reference host for the
//! engine: real frontends embed [`voice_session_engine::Session`] the same
//! way and attach actual capture and playback devices at the sink seams.

use anyhow::Result;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice_session_engine::{transport, AppConfig, NullSink, Session};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-session-engine v{}", env!("CARGO_PKG_VERSION"));

    let url = config.connection.stream_url();
    info!("Connecting to {}", config.connection.api_url);
    let (ws, _response) = connect_async(url.as_str()).await?;
    info!("WebSocket connection established");

    // Headless host: no audio devices, so both channels discard into null sinks
    let mut session = Session::new(&config, Box::new(NullSink), Box::new(NullSink));

    // Log decoded events in place of a UI collaborator
    let mut events = session
        .take_events()
        .expect("event receiver taken at startup");
    let collaborator = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(?event, "Event");
        }
    });

    session.start_voice_session(&config.connection.agent_id)?;

    let ping_interval = Duration::from_secs(config.connection.ping_interval_secs);
    let pump = transport::run_websocket(ws, &mut session, ping_interval);

    tokio::select! {
        result = pump => {
            if let Err(err) = result {
                error!("Transport error: {}", err);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, ending session...");
        }
    }

    session.end_session();
    collaborator.abort();

    info!("Client stopped");
    Ok(())
}

/// Initialize the tracing system for the client.
///
/// `RUST_LOG` controls what gets logged; the default keeps the engine at
/// debug and everything else at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_session_engine=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
