//! Warden API server binary.
//!
//! Connects to PostgreSQL, applies migrations, optionally seeds the default
//! role ladder and serves the auth API until Ctrl-C.

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use warden_api::config::{DEFAULT_BIND_ADDR, DEFAULT_DATABASE_URL};
use warden_core::{AuthConfig, AuthEngine, Stores};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "warden_api_server", about = "Warden authentication API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Provision the default roles (user, moderator, admin, super_admin) at startup.
    #[arg(long, default_value_t = false)]
    seed_roles: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,warden_api=debug,warden_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let auth = AuthConfig::from_env()?;
    info!(?auth, bind_addr = %args.bind_addr, "starting warden_api_server");

    info!(max_connections = args.max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(auth.store_timeout)
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    warden_core::migrate::migrate(&pool).await?;

    let engine = AuthEngine::new(auth, Stores::postgres(pool))?;
    if args.seed_roles {
        let roles = engine.roles().seed_defaults().await?;
        info!(count = roles.len(), "default roles provisioned");
    }

    let app = warden_api::router(warden_api::AppState::new(engine));

    let listener = tokio::net::TcpListener::bind(&args.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
