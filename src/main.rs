use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use review_assist::config::BotConfig;
use review_assist::ledger::{AuditSink, Ledger, LibSqlLedger};
use review_assist::llm::DeepSeekClient;
use review_assist::marketplace::SellerApiClient;
use review_assist::pipeline::{PipelineConfig, ReviewPipeline};
use review_assist::responder::Responder;

#[tokio::main]
async fn main() -> review_assist::error::Result<()> {
    // Log to stdout and a daily-rolling file. The guard must live for the
    // whole process or buffered file output is lost.
    let file_appender = tracing_appender::rolling::daily("logs", "review-assist.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    let config = BotConfig::from_env()?;

    eprintln!("Review Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.database_path.display());
    eprintln!("   Poll interval: {}s", config.run_interval.as_secs());
    eprintln!("   Hourly post quota: {}", config.max_responses_per_hour);
    eprintln!("   Mark processed upstream: {}\n", config.mark_as_processed);

    // ── Ledger ──────────────────────────────────────────────────────
    let ledger = Arc::new(LibSqlLedger::new_local(&config.database_path).await?);

    let products = ledger.list_active_products().await?;
    if !products.is_empty() {
        eprintln!("   Monitoring {} products", products.len());
    }

    // ── Marketplace client ──────────────────────────────────────────
    let audit: Arc<dyn AuditSink> = ledger.clone();
    let source = Arc::new(
        SellerApiClient::new(config.ozon_client_id.clone(), config.ozon_api_key.clone())
            .with_audit(audit),
    );

    if !source.health_check().await {
        tracing::warn!("Seller API health check failed; continuing anyway");
    }

    // ── Responder ───────────────────────────────────────────────────
    let generator = Arc::new(DeepSeekClient::new(config.deepseek_api_key.clone()));
    let responder = Responder::new(generator);

    // ── Pipeline ────────────────────────────────────────────────────
    let pipeline_config = PipelineConfig {
        run_interval: config.run_interval,
        max_responses_per_hour: config.max_responses_per_hour,
        mark_as_processed: config.mark_as_processed,
        ..PipelineConfig::default()
    };
    let pipeline = ReviewPipeline::new(source, responder, ledger.clone(), pipeline_config);

    // Ctrl-C flips the shutdown flag; the pipeline finishes its in-flight
    // review attempt and then exits the loop.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    pipeline.run(shutdown_rx).await;
    Ok(())
}
