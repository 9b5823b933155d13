use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linkcut::{
    auth::JwtAuthenticator,
    config::{AppConfig, StorageBackend},
    db::{self, SqliteLinkStore},
    health::HealthChecker,
    memory::MemoryLinkStore,
    metrics::Metrics,
    probe::ReqwestProbe,
    service::LinkService,
    store::LinkStore,
    AppState,
};

#[derive(Parser)]
#[command(name = "linkcut", version, about = "URL shortener with background link health checks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and the health checker (default)
    Serve,
    /// Print a bearer token for an account id
    IssueToken { account_id: String },
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent; env vars may already be set)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkcut=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let authenticator = JwtAuthenticator::new(config.jwt_secret.as_bytes(), config.token_ttl);

    match cli.command.unwrap_or(Command::Serve) {
        Command::IssueToken { account_id } => {
            let token = authenticator
                .issue(&account_id)
                .context("failed to sign token")?;
            println!("{token}");
            Ok(())
        }
        Command::Serve => serve(config, authenticator).await,
    }
}

async fn serve(config: AppConfig, authenticator: JwtAuthenticator) -> anyhow::Result<()> {
    tracing::info!("Starting linkcut on {}", config.bind_addr());
    tracing::info!("Base URL: {}", config.base_url);

    let store: Arc<dyn LinkStore> = match config.storage {
        StorageBackend::Sqlite => {
            let pool = db::connect(&config.database_url, 10)
                .await
                .with_context(|| format!("failed to open {}", config.database_url))?;
            Arc::new(SqliteLinkStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; links are lost on restart");
            Arc::new(MemoryLinkStore::new())
        }
    };

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);

    // ── Health checker ─────────────────────────────────────────────────────
    let (stop, shutdown) = watch::channel(false);
    let health = if config.health_check_enabled {
        let probe = ReqwestProbe::new(config.health_check.probe_timeout)
            .context("failed to build probe HTTP client")?;
        let checker =
            HealthChecker::new(store.clone(), Arc::new(probe), config.health_check.clone())
                .with_metrics(metrics.clone());
        Some(checker.spawn(shutdown))
    } else {
        tracing::info!("Health checker disabled");
        None
    };

    let service = LinkService::new(store)
        .max_attempts(config.max_generation_attempts)
        .with_metrics(metrics.clone());
    let state = Arc::new(AppState {
        service,
        authenticator: Arc::new(authenticator),
        metrics,
    });

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, linkcut::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop.send(true);
    if let Some(handle) = health {
        let totals = handle.join().await;
        tracing::info!(
            "Health checker stopped after {} probe(s), {} status change(s)",
            totals.probed,
            totals.changed
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
