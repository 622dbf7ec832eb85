//! Tributary Binary Entry Point
//!
//! Runs the metrics aggregation bridge. Core functionality is provided by
//! the `tributary` library crate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tributary::{
    CollectionEngine, HealthMonitor, InfluxClient, MemoryStore, QueryCatalog, Scheduler, Source,
    SourceRegistry, StatusReporter, TimeSeriesClient,
    config::{AppConfig, parse_duration},
    server::{AppState, create_router},
};

/// Tributary - Metrics Aggregation Bridge
#[derive(Parser, Debug)]
#[command(name = "tributary", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "TRIBUTARY_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "TRIBUTARY_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "TRIBUTARY_SERVER_PORT")]
    server_port: Option<u16>,

    /// Collection interval, e.g. "60s" (overrides config file)
    #[arg(long, env = "TRIBUTARY_INTERVAL", value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Write to an in-memory store instead of the central store
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tributary=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Tributary - Metrics Aggregation Bridge");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(interval) = cli.interval {
        config.collection.interval = interval;
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Central: {}, Sources: {}, Interval: {}",
        config.server.bind,
        config.server.port,
        config.central.url,
        config.sources.len(),
        humantime::format_duration(config.collection.interval),
    );

    // Serve status before the engine is ready; endpoints answer 503 until then
    let app_state = AppState::new();
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on: http://{}", addr);

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let router = create_router(app_state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    // Build store clients
    let timeout = config.collection.request_timeout;
    let central: Arc<dyn TimeSeriesClient> = if cli.dry_run {
        tracing::warn!("Dry run: points are kept in memory, central store is not contacted");
        Arc::new(MemoryStore::new("dry-run"))
    } else {
        Arc::new(InfluxClient::with_timeout(
            &config.central.url,
            config.central.token.as_str(),
            config.central.org.as_str(),
            timeout,
        )?)
    };

    let mut sources = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let client = InfluxClient::with_timeout(
            &source.url,
            source.token.as_str(),
            source.org.as_str(),
            timeout,
        )?;
        let mut entry = Source::new(&source.name, Arc::new(client))
            .with_buckets(source.buckets.iter().cloned());
        if let Some(alias) = &source.host_alias {
            entry = entry.with_host_alias(alias);
        }
        tracing::info!(
            source = %source.name,
            url = %source.url,
            buckets = ?source.buckets,
            host_alias = ?source.host_alias,
            "Configured source"
        );
        sources.push(entry);
    }
    let registry = Arc::new(SourceRegistry::new(sources));

    let catalog = Arc::new(QueryCatalog::load_or_default(
        &config.collection.queries_path,
    ));

    let engine = Arc::new(
        CollectionEngine::new(registry.clone(), catalog, central.clone())
            .with_request_timeout(timeout),
    );
    let monitor = Arc::new(HealthMonitor::new(registry, central).with_probe_timeout(timeout));

    // The central store is the only write target; without it there is nothing to do
    if !monitor.probe_central().await {
        shutdown.cancel();
        let _ = server.await;
        return Err(format!("central store unreachable: {}", config.central.url).into());
    }

    app_state.install(StatusReporter::new(
        Arc::clone(&engine),
        config.collection.interval,
    ));

    let scheduler = Scheduler::new(engine, monitor, config.collection.interval)
        .with_error_backoff(config.collection.error_backoff);
    let collection = tokio::spawn(scheduler.run(shutdown.clone()));

    tracing::info!("Press Ctrl+C to shutdown");
    shutdown_signal().await;

    tracing::info!("Stopping collection, waiting for in-flight cycle...");
    shutdown.cancel();
    match collection.await {
        Ok(cycles) => tracing::info!("Collection stopped after {} cycles", cycles),
        Err(e) => tracing::error!("Scheduler task failed: {}", e),
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Web server error: {}", e),
        Err(e) => tracing::error!("Web server task failed: {}", e),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
