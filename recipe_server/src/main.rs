//! Authentication server for the recipe sharing backend.
//!
//! Serves registration, login, logout and password reset over HTTP, backed by
//! PostgreSQL (or an in-memory store for local runs).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use log::info;
use pico_args::Arguments;
use recipe_auth::{
    db::{Database, Store},
    mail::{Mailer, MemoryMailer, SmtpMailer},
};
use recipe_server::{api, config::ServerConfig, logging};

const HELP: &str = "\
Run the recipe authentication server

USAGE:
  recipe_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/recipes]

FLAGS:
  --memory-store           Keep users and revoked tokens in memory instead of PostgreSQL
  -h, --help               Print help information

ENVIRONMENT:
  ACCESS_TOKEN_SECRET      Session token signing secret (required, >= 32 bytes)
  ACCESS_TOKEN_RESET       Reset token signing secret (required, >= 32 bytes)
  PASSWORD_PEPPER          Password hashing pepper (>= 16 bytes)
  APP_ENV                  'development' returns reset tokens instead of emailing them
  APP_URL                  Base URL of reset links
  TRUST_PROXY_HEADERS      'true' keys rate limits on X-Forwarded-For (only behind a proxy)
  SMTP_HOST, SMTP_PORT, SMTP_USER, SMTP_PASS, SMTP_FROM
  (See .env.example for all configuration options)
";

/// How often expired blacklist entries are deleted
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    memory_store: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        memory_store: pargs.contains("--memory-store"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;

    info!("Starting recipe auth server at {}", config.bind);

    let (store, database) = if args.memory_store {
        log::warn!("Using the in-memory store; all data is lost on shutdown");
        (Store::memory(), None)
    } else {
        info!("Connecting to database");
        let db = Database::new(&config.database)
            .await
            .context("Failed to connect to database")?;
        db.migrate().await.context("Failed to apply migrations")?;
        info!("Database connected and migrated");
        (Store::postgres(db.pool().clone()), Some(db))
    };

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp).context("Invalid SMTP configuration")?),
        None => Arc::new(MemoryMailer::new()),
    };

    let state = api::AppState::new(store, mailer, &config.auth, database.clone())?
        .with_trusted_proxy(config.trust_proxy_headers);
    spawn_blacklist_purge(state.clone());

    let app = api::create_router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shutting down server...");
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Periodically drop blacklist entries whose tokens have expired
fn spawn_blacklist_purge(state: api::AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = state.sessions.purge_expired_revocations().await {
                log::error!("Failed to purge expired blacklist entries: {}", e);
            }
        }
    });
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
