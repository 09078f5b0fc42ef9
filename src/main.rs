use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tenant_gate::config::{AppConfig, StoreKind};

#[derive(Parser)]
#[command(name = "tenant-gate")]
#[command(about = "Document CRUD API gated by bearer-token roles")]
#[command(version)]
struct Args {
    #[arg(long, help = "Port to listen on (overrides PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Permission table JSON file (overrides ROLES_FILE)")]
    roles: Option<String>,

    #[arg(long, help = "Use the in-memory store instead of PostgreSQL")]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, KEYCLOAK_*, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(roles) = args.roles {
        config.server.roles_file = roles;
    }
    if args.memory {
        config.database.backend = StoreKind::Memory;
    }

    tracing::info!("Starting {} in {:?} mode", config.app.name, config.environment);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let state = tenant_gate::build_state(config)
        .await
        .context("failed to initialise application state")?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, tenant_gate::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
