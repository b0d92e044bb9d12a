use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;

use dialogue_pipeline::config::PipelineConfig;
use dialogue_pipeline::http::pipeline_routes;
use dialogue_pipeline::llm::{LlmConfig, create_provider};
use dialogue_pipeline::pipeline::{
    ConversationWriter, DialogueGenerator, GenerationJob, Reconciler, SentimentClassifier,
    spawn_reconciler,
};
use dialogue_pipeline::queue::{LibSqlQueue, MessageQueue};
use dialogue_pipeline::scheduler::spawn_generation_ticker;
use dialogue_pipeline::store::{LibSqlBackend, MessageStore};
use dialogue_pipeline::worker::{ClassifierWorker, spawn_classifier_worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PipelineConfig::from_env().context("invalid configuration")?;

    eprintln!("Dialogue pipeline v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Database: {}", config.db_path);
    eprintln!("   Schedule: {}", config.schedule);
    eprintln!("   Trigger: http://0.0.0.0:{}/generate", config.http_port);

    // Required values are not checked here; stages fail on first use instead.
    if config.table_name.is_empty() {
        tracing::warn!("TABLE_NAME is not set, store calls will fail");
    }
    if config.queue_url.is_empty() {
        tracing::warn!("QUEUE_URL is not set, queue calls will fail");
    }

    // ── Collaborators ─────────────────────────────────────────────────────
    let llm = create_provider(&LlmConfig::from(&config))?;

    let backend = LibSqlBackend::new_local(Path::new(&config.db_path), &config.table_name)
        .await
        .context("failed to open message store")?;
    let queue: Arc<dyn MessageQueue> = Arc::new(
        LibSqlQueue::shared(
            backend.database(),
            &config.queue_url,
            config.visibility_timeout,
        )
        .await
        .context("failed to open queue")?,
    );
    let store: Arc<dyn MessageStore> = Arc::new(backend);

    // ── Generation side ───────────────────────────────────────────────────
    let job = Arc::new(GenerationJob::new(
        DialogueGenerator::new(Arc::clone(&llm)),
        ConversationWriter::new(Arc::clone(&store), Arc::clone(&queue)),
    ));

    let (ticker_handle, ticker_shutdown) =
        spawn_generation_ticker(Arc::clone(&job), &config.schedule)?;

    // ── Classification side ───────────────────────────────────────────────
    let classifier = Arc::new(SentimentClassifier::new(
        Arc::clone(&llm),
        Arc::clone(&store),
    ));
    let worker = Arc::new(ClassifierWorker::new(
        Arc::clone(&queue),
        classifier,
        config.max_receive_count,
    ));
    let (worker_handle, worker_shutdown) = spawn_classifier_worker(worker, config.poll_interval);

    let reconciler = config.reconcile_interval.map(|interval| {
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            config.reconcile_grace,
        ));
        spawn_reconciler(reconciler, interval)
    });

    // ── HTTP ──────────────────────────────────────────────────────────────
    let app = pipeline_routes(job, Arc::clone(&store));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown requested");
        })
        .await?;

    ticker_shutdown.store(true, Ordering::Relaxed);
    worker_shutdown.store(true, Ordering::Relaxed);
    if let Some((_, shutdown)) = &reconciler {
        shutdown.store(true, Ordering::Relaxed);
    }

    // Let an in-flight generation run or delivery finish. The reconciler
    // only notices its flag on the next interval tick, so it is not awaited.
    ticker_handle.await.ok();
    worker_handle.await.ok();

    Ok(())
}
