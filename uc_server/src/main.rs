//! Uncooperative game server.
//!
//! Games are persisted to Postgres when `DATABASE_URL` is set and kept in
//! memory otherwise. Stored games are restored on startup.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use log::{info, warn};
use pico_args::Arguments;
use uc_server::{api, config::ServerConfig, logging, metrics};
use uncooperative::{
    db::{Database, InMemorySnapshotStore, SnapshotStore},
    room::GameManager,
};

const HELP: &str = "\
Run an uncooperative game server

USAGE:
  uc_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url     URL         Database connection string  [default: env DATABASE_URL, in-memory when unset]
  --games      N           Games to create on startup when none were restored  [default: 0]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND                  Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL                 PostgreSQL connection string
  DB_MAX_CONNECTIONS, ...      Pool settings
  METRICS_BIND                 Prometheus exporter address (disabled when unset)
  SUMMARY_DELAY_MS             How long turn summaries stay up  [default: 5000]
  GAME_DEFAULT_TURNS           [default: 10]
  GAME_DEFAULT_TREASURY        [default: 40000000]
  GAME_DEFAULT_MAX_EXTRACTION  [default: 5000000]
  GAME_DEFAULT_INTEREST_RATE   [default: 0.10]
  RUST_LOG                     Log filter  [default: info,sqlx=warn,hyper=warn]
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    num_games: usize,
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
        num_games: pargs.opt_value_from_str("--games")?.unwrap_or(0),
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;
    info!("Starting uncooperative server at {}", config.bind);

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(Error::msg)?;
        info!("Prometheus metrics at http://{metrics_bind}/metrics");
    }

    let (store, database): (Arc<dyn SnapshotStore>, Option<Arc<Database>>) =
        match &config.database {
            Some(db_config) => {
                info!("Connecting to database");
                let database = Database::new(db_config)
                    .await
                    .context("Failed to connect to database")?;
                database
                    .migrate()
                    .await
                    .context("Failed to create the games table")?;
                info!("Database connected successfully");
                let store: Arc<dyn SnapshotStore> = Arc::new(database.snapshot_store());
                (store, Some(Arc::new(database)))
            }
            None => {
                warn!("DATABASE_URL not set, games are kept in memory only");
                let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
                (store, None)
            }
        };

    let game_manager = Arc::new(GameManager::new(
        store,
        config.room.clone(),
        config.game_defaults.clone(),
    ));

    let restored = game_manager
        .load_existing_games()
        .await
        .context("Failed to restore games")?;
    info!("Restored {restored} game(s)");

    if restored == 0 {
        for i in 0..args.num_games {
            match game_manager.create_game(None).await {
                Ok(game_id) => {
                    metrics::games_created_total();
                    info!("Created game {} with ID {game_id}", i + 1);
                }
                Err(e) => log::error!("Failed to create game {}: {e}", i + 1),
            }
        }
    }

    for game in game_manager.list_games().await {
        api::watch_game(&game_manager, game.id).await;
        info!(
            "  - {} {} turn {}/{} - {}/{} players, treasury ${:.0}",
            game.id,
            game.status,
            game.turn,
            game.max_turns,
            game.player_count,
            game.max_players,
            game.treasury
        );
    }
    metrics::active_games(game_manager.active_game_count().await);

    let app = api::create_router(api::AppState {
        game_manager,
        database: database.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    if let Some(database) = database.and_then(|db| Arc::try_unwrap(db).ok()) {
        database.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}
