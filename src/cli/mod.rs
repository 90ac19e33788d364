use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::{self, AppState};
use crate::auth::AuthHandler;
use crate::background::{BackgroundTasks, TracingEnricher};
use crate::config::AppConfig;
use crate::database::{DatabaseManager, DocumentStore, MemoryDocumentStore, PgDocumentStore};
use crate::media::{CloudinaryClient, UploadOptions};

#[derive(Parser)]
#[command(name = "cars-api")]
#[command(about = "Used car listings API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve(ServeArgs),

    #[command(about = "Create the collection tables if they do not exist")]
    Migrate,

    #[command(about = "Issue a bearer token for an existing user id")]
    Token {
        #[arg(long)]
        user_id: Uuid,

        #[arg(long)]
        username: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    #[arg(long, help = "Bind address, overrides HOST")]
    pub host: Option<String>,

    #[arg(long, help = "Port, overrides PORT")]
    pub port: Option<u16>,

    #[arg(long, help = "Keep documents in memory instead of Postgres")]
    pub memory: bool,
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => serve(args, config).await,
        Commands::Migrate => migrate(&config).await,
        Commands::Token { user_id, username } => {
            let auth = AuthHandler::from_config(&config.security)?;
            println!("{}", auth.issue_token(user_id, &username)?);
            Ok(())
        }
    }
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let db = DatabaseManager::connect(&config.database).await?;
    db.migrate().await.context("failed to create tables")?;
    db.close().await;
    info!("Tables are up to date");
    Ok(())
}

async fn serve(args: ServeArgs, mut config: AppConfig) -> anyhow::Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config
        .validate(!args.memory)
        .context("invalid configuration")?;

    let (store, db): (Arc<dyn DocumentStore>, Option<DatabaseManager>) = if args.memory {
        warn!("Using the in-memory store; data is lost on exit");
        (Arc::new(MemoryDocumentStore::new()), None)
    } else {
        let db = DatabaseManager::connect(&config.database).await?;
        db.migrate().await.context("failed to create tables")?;
        (Arc::new(PgDocumentStore::new(&db)), Some(db))
    };

    let auth = Arc::new(AuthHandler::from_config(&config.security)?);
    let media = Arc::new(CloudinaryClient::new(&config.media)?);
    let (background, worker) = BackgroundTasks::spawn(Arc::new(TracingEnricher));

    let state = AppState::new(
        store,
        auth,
        media,
        background,
        UploadOptions::from_config(&config.media),
    );
    let router = app::router(state, &config);

    let bind_addr = config.bind_address();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("cars-api listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router and its task handles are gone, so the queue closes and drains
    worker.shutdown().await;
    if let Some(db) = db {
        db.close().await;
    }
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
