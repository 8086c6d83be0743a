use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use kagami::auth::{AuthVerifier, JwtVerifier};
use kagami::cache::{ResultCache, TokioFsBackend};
use kagami::config::Config;
use kagami::constants::DEFAULT_CACHE_QUEUE_DEPTH;
use kagami::observability::TracingSink;
use kagami::pipeline::RequestPipeline;
use kagami::router::Router;
use kagami::server::ImageServer;
use kagami::source::{HttpClient, SourceRegistry};

/// Kagami - on-demand image transformation proxy
#[derive(Parser, Debug)]
#[command(name = "kagami")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging subsystem
    kagami::logging::init_subscriber()
        .map_err(|e| anyhow!("failed to initialize logging subsystem: {}", e))?;

    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("failed to load configuration '{}'", args.config.display()))?;

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        routes = config.routes.len(),
        auth_enabled = config.auth.is_some(),
        "Configuration loaded successfully"
    );

    let client = HttpClient::new(Duration::from_secs(config.server.fetch_timeout_secs))?;
    let registry = SourceRegistry::with_builtin_sources(client);
    let router = Router::from_config(&config, &registry);
    if router.is_empty() {
        tracing::warn!("No routes could be registered");
    }

    let verifier: Option<Arc<dyn AuthVerifier>> = match &config.auth {
        Some(auth) => JwtVerifier::from_config(auth)?.map(|v| Arc::new(v) as Arc<dyn AuthVerifier>),
        None => None,
    };

    if args.test {
        tracing::info!(routes = router.len(), "Configuration test successful");
        return Ok(());
    }

    let cache = Arc::new(ResultCache::new(
        Arc::new(TokioFsBackend::new()),
        config.server.cache_writers,
        DEFAULT_CACHE_QUEUE_DEPTH,
    ));
    let pipeline = RequestPipeline::new(router, cache, verifier, Arc::new(TracingSink));
    let server = ImageServer::new(Arc::new(pipeline));

    let listener = ImageServer::bind(&config.server).await?;
    tracing::info!("Starting Kagami image proxy");

    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
