//! Multi-table Tonk/Reem game server.
//!
//! One actor task per table, database-backed ledger, stake-partitioned
//! matchmaking, and a WebSocket session surface.

mod api;
mod config;
mod logging;
mod metrics;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use ctrlc::set_handler;
use pico_args::Arguments;
use reem::{
    auth::AuthVerifier,
    db::{Database, PgGameRepository, PgTableRepository},
    ledger::{LedgerManager, PgLedgerStore},
    matchmaker::{Matchmaker, Seating},
    queue::QueueManager,
    table::{TableManager, STAKE_LADDER},
};
use tokio::sync::{mpsc, RwLock};

use config::ServerConfig;

const HELP: &str = "\
Run a multi-table Reem game server

USAGE:
  reem_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:7070]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:7070)
  DATABASE_URL             PostgreSQL connection string
  TOKEN_SECRET             HS256 secret shared with the auth service
  CORS_ALLOWED_ORIGINS     Comma-separated origins, or *
  PING_INTERVAL_SECS       Heartbeat cadence            [default: 30]
  CLEANUP_INTERVAL_SECS    Queue expiry sweep cadence   [default: 60]
  MATCHMAKER_INTERVAL_SECS Periodic matchmaker cadence  [default: 10]
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Note: dotenvy does not override variables already set.
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }
    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let db_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;

    set_handler(|| std::process::exit(0))?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, db_url_override)
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration validation failed: {e}"))?;
    tracing::info!("configuration loaded");

    if let Err(e) = metrics::init_metrics(config.metrics_bind) {
        tracing::warn!("metrics unavailable: {e}");
    } else {
        tracing::info!("metrics at http://{}/metrics", config.metrics_bind);
    }

    tracing::info!("connecting to database");
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("database connection failed: {e}"))?;
    let pool = Arc::new(db.pool().clone());

    let ledger = LedgerManager::new(Arc::new(PgLedgerStore::new(pool.clone())));
    let games = Arc::new(PgGameRepository::new(pool.clone()));
    let tables_repo = Arc::new(PgTableRepository::new(pool.clone()));
    let queues = Arc::new(QueueManager::new(&STAKE_LADDER));

    let table_manager = Arc::new(TableManager::new(ledger, games, tables_repo));
    table_manager.start();

    // Matchmaker trigger must be wired before the preset tables spawn so
    // their actors can nudge it on disconnects.
    let (match_tx, match_rx) = mpsc::channel(64);
    table_manager.set_match_trigger(match_tx.clone()).await;

    // Preset pools: two tables per stake rung, for the server's lifetime.
    let preset = table_manager.create_preset_tables().await;
    tracing::info!("{} preset table(s) ready", preset.len());
    let matchmaker = Matchmaker::new(
        queues.clone(),
        table_manager.clone() as Arc<dyn Seating>,
        config.matchmaker_interval,
    );
    tokio::spawn(matchmaker.run(match_rx));
    tracing::info!(
        "matchmaker running every {:?}",
        config.matchmaker_interval
    );

    // Background sweep: purge queue entries past their TTL.
    {
        let queues = queues.clone();
        let cleanup_interval = config.cleanup_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(cleanup_interval);
            loop {
                tick.tick().await;
                let purged = queues.purge_expired().await;
                if !purged.is_empty() {
                    tracing::info!("purged {} expired queue entr(ies)", purged.len());
                }
            }
        });
    }

    let state = api::AppState {
        auth: AuthVerifier::new(&config.token_secret),
        tables: table_manager,
        queues,
        match_tx,
        sessions: Arc::new(RwLock::new(HashMap::new())),
        ping_interval: config.ping_interval,
        idle_timeout: config.idle_timeout,
    };
    let app = api::create_router(state, &config.allowed_origins);

    tracing::info!("listening on http://{}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {e}", config.bind))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    tracing::info!("shutting down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
}
