use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use shopsync_core::{
    credentials::PostgresCredentialStore, dispatch::HttpJobInvoker, platform::PlatformClient,
};
use shopsync_server::{AppState, config::Config, routes};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "shopsync-server")]
#[command(
    about = "Credential refresh and scheduled job dispatch for delegated marketplace shops"
)]
struct Cli {
    /// Bind address override
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Port override
    #[arg(long, env = "SERVER_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let store = Arc::new(PostgresCredentialStore::new(pool));
    let platform = Arc::new(PlatformClient::new(
        config.platform_base_url.clone(),
        config.platform_proxy_url.clone(),
    )?);
    let invoker = Arc::new(HttpJobInvoker::new(
        config.jobs_base_url.clone(),
        config.jobs_service_token.clone(),
    )?);

    let cors = build_cors_layer(&config.cors_allowed_origins);
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid bind address")?;

    let state = AppState {
        config: Arc::new(config),
        store,
        platform,
        invoker,
    };

    let app = routes::create_api_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "shopsync server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(AllowMethods::any())
            .allow_headers(AllowHeaders::any());
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any())
}
