use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use content_forge::config::{Config, StoreBackend};
use content_forge::content::{
    ArticleStore, InMemoryContentStore, KeywordStore, WebhookPublisher, WebsiteStore,
};
use content_forge::control::ControlSurface;
use content_forge::db::{create_pool, run_migrations, PgContentStore, PgJobStore};
use content_forge::llm::{ImageGenerator, OpenAIImageGenerator, LLM};
use content_forge::pipeline::{Orchestrator, StageExecutor};
use content_forge::queue::{InMemoryJobStore, JobStore, Worker};
use content_forge::utils::init_logger;
use content_forge::{create_router, AppState};

#[derive(Parser)]
#[command(name = "content-forge", version, about = "Keyword-to-article generation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// HTTP API and background worker (default)
    Serve,
    /// HTTP API only
    Api,
    /// Background worker only
    Worker,
}

/// Store handles shared by the API and the worker.
struct Stores {
    jobs: Arc<dyn JobStore>,
    keywords: Arc<dyn KeywordStore>,
    websites: Arc<dyn WebsiteStore>,
    articles: Arc<dyn ArticleStore>,
}

async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.store.backend {
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database).await?;

            info!("Running database migrations...");
            run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            info!("Database migrations completed");

            let content = Arc::new(PgContentStore::new(pool.clone()));
            Ok(Stores {
                jobs: Arc::new(PgJobStore::new(pool)),
                keywords: content.clone(),
                websites: content.clone(),
                articles: content,
            })
        }
        StoreBackend::Memory => {
            warn!("Using in-memory stores; jobs are lost on restart");
            let content = match &config.store.seed_file {
                Some(path) => Arc::new(InMemoryContentStore::from_seed_file(path).await?),
                None => Arc::new(InMemoryContentStore::new()),
            };
            Ok(Stores {
                jobs: Arc::new(InMemoryJobStore::new()),
                keywords: content.clone(),
                websites: content.clone(),
                articles: content,
            })
        }
    }
}

fn build_worker(config: &Config, stores: &Stores) -> anyhow::Result<Worker> {
    let llm = LLM::from_config(&config.llm)?;
    info!(provider = %config.llm.provider, model = %llm.model(), "LLM configured");

    let images: Option<Arc<dyn ImageGenerator>> = if config.llm.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY not set; jobs that include images will fail at the image stage");
        None
    } else {
        Some(Arc::new(OpenAIImageGenerator::new(
            &config.llm.openai_api_key,
            &config.llm.image_model,
        )))
    };

    let executor = StageExecutor::standard(llm, images, &config.worker);
    let orchestrator = Orchestrator::new(
        stores.jobs.clone(),
        stores.keywords.clone(),
        stores.websites.clone(),
        stores.articles.clone(),
        Arc::new(WebhookPublisher::new()),
        executor,
    );

    Ok(Worker::new(
        stores.jobs.clone(),
        stores.keywords.clone(),
        orchestrator,
        config.worker.poll_interval(),
    ))
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    // Load configuration
    let config = Config::from_env()?;
    let _log_guard = init_logger(&config.logging);
    info!("Configuration loaded: {:?}", config.server);

    let stores = open_stores(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let run_worker = command != Command::Api && config.worker.enabled;
    let worker_handle = if run_worker {
        let worker = build_worker(&config, &stores)?;
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { worker.run(rx).await }))
    } else {
        info!("Background worker disabled");
        None
    };

    if command == Command::Worker {
        wait_for_shutdown(shutdown_rx).await;
    } else {
        let state = AppState {
            control: Arc::new(ControlSurface::new(
                stores.jobs.clone(),
                stores.keywords.clone(),
                stores.websites.clone(),
            )),
            jobs: stores.jobs.clone(),
            articles: stores.articles.clone(),
            config: config.clone(),
        };
        let app = create_router(state);

        let host: std::net::IpAddr = config
            .server
            .host
            .parse()
            .with_context(|| format!("HOST is not an IP address: {}", config.server.host))?;
        let addr = SocketAddr::from((host, config.server.port));
        info!("Server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
    }

    // Let the in-flight job reach a terminal state
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task panicked");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
