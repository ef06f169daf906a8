use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::signal;
use tracing::{debug, info, warn};

use arcjet::analyze::BasicAnalyzer;
use arcjet::api::{create_router, AppState};
use arcjet::cache::OutcomeCache;
use arcjet::client::HttpClient;
use arcjet::config::Config;
use arcjet::observability::{init_tracing, MetricsRegistry};
use arcjet::pipeline::Protector;
use arcjet::policy::load_rules;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        "Starting arcjet-protect"
    );

    if config.key.is_empty() {
        warn!("ARCJET_KEY is not set; the decision service will reject requests");
    }

    // Load rules
    let rules = load_rules(&config.rules_path)?;
    info!(
        path = %config.rules_path.display(),
        rules = rules.len(),
        "Rules loaded"
    );

    // Remote client
    let client_config = config.client_config();
    info!(
        base_url = %client_config.base_url,
        decide_timeout_ms = client_config.decide_timeout.as_millis(),
        "Decision service configured"
    );
    let client = Arc::new(HttpClient::new(client_config)?);

    // Pipeline
    let cache = Arc::new(OutcomeCache::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let protector = Protector::new(
        config.protector_config(),
        vec![rules],
        client,
        Arc::new(BasicAnalyzer::new()),
        cache.clone(),
    )
    .with_metrics(metrics.clone());

    if protector.rules().is_overloaded() {
        warn!(
            rules = protector.rules().len(),
            "More rules than allowed; every request will return an error decision"
        );
    }

    // Periodically drop expired cache entries
    let sweep_interval = config.cache_sweep_interval();
    let sweep_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = cache.len(), "Purged expired cache entries");
            }
        }
    });

    // Create application state
    let state = Arc::new(AppState {
        protector,
        metrics,
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    // Create router
    let app = create_router(state);

    // Parse listen address
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(addr = %addr, "Starting HTTP server");

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    if config.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    // Cleanup
    info!("Shutting down...");
    sweep_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
