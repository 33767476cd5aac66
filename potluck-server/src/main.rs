use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use potluck_server::{
    cache::new_cache,
    config::Config,
    database::Database,
    routes::{router, AppState},
    storage,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Path to the YAML configuration file
    #[clap(long, default_value = "potluck.yml")]
    config: String,

    /// The address and optionally port to bind to, overriding the configuration
    #[clap(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    // Parse command line arguments
    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("Loading configuration from {}", args.config))?;

    // initialize tracing
    std::fs::create_dir_all(&config.logging.directory)?;
    let file_appender = tracing_appender::rolling::daily(&config.logging.directory, "access.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // connect to the database
    let db = Database::connect_with(
        &config.database.path,
        Duration::from_millis(config.database.busy_timeout_ms),
    )
    .context("Connecting to database")?;
    let blobs = storage::from_config(&config.storage)
        .await
        .context("Connecting to blob storage")?;

    // build our application with a route
    let app = router(AppState {
        db,
        blobs,
        bucket_root: Arc::from(config.storage.bucket_root.as_str()),
        cache: new_cache(),
    })
    .layer(
        tower_http::compression::CompressionLayer::new()
            .quality(tower_http::CompressionLevel::Fastest),
    )
    .layer(tower_http::trace::TraceLayer::new_for_http());

    let address = args.address.unwrap_or(config.server.address);
    // In development, use HTTP. In production, use HTTPS.
    if let Some(tls) = config.server.tls {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;
        let tls_config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .context("Loading TLS certificate")?;

        let addr = address.parse()?;
        tracing::info!("Listening on {}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .context("Starting TLS server")?;
    } else {
        let listener = tokio::net::TcpListener::bind(&address).await?;
        tracing::info!("Listening on {}", address);
        axum::serve(listener, app).await?;
    }
    Ok(())
}
