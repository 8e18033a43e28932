use callbot::application::outbound::OutboundDispatcher;
use callbot::application::session::AgentRuntime;
use callbot::config::Config;
use callbot::infrastructure::livekit::LiveKitControl;
use callbot::interface::api::{build_router, init_metrics, AppState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting callbot");

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded: {:?}", config);

    if config.livekit.api_key.is_empty() || config.livekit.api_secret.is_empty() {
        warn!("LiveKit API key or secret not set; control-plane calls will be rejected");
    }
    if config.sip.outbound_trunk_id.is_empty() {
        warn!("No outbound SIP trunk configured; outbound calls cannot be dialed");
    }

    info!("Initializing Prometheus metrics exporter");
    let prometheus_handle = init_metrics()?;

    let control = Arc::new(LiveKitControl::new(
        config.livekit.clone(),
        config.livekit.request_timeout(),
    )?);
    info!("LiveKit control plane at {}", config.livekit.url);

    let runtime = Arc::new(AgentRuntime::from_config(&config, control.clone()));
    let dispatcher = Arc::new(OutboundDispatcher::new(
        control,
        config.agent.outbound_agent_name.clone(),
    ));

    let state = AppState {
        runtime,
        dispatcher,
        session: config.session.clone(),
    };
    let app = build_router(state, prometheus_handle);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {} (session runtimes connect to /agent/ws)", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await?;

    Ok(())
}
