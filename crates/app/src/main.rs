use std::{sync::Arc, time::Duration};

use migration::{Migrator, MigratorTrait};

use engine::{BillProcessor, Dispatcher, EngineConfig, ProcessorConfig, ingest_channel};
use ledger_client::HttpLedgerClient;
use settings::Database;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "autobill={level},server={level},engine={level},ledger_client={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.server.database).await?;

    let mut config = EngineConfig::default();
    if let Some(window) = settings.engine.group_window_secs {
        config.group_window_secs = window;
    }
    config.fingerprint_bucket_secs = settings.engine.fingerprint_bucket_secs;
    config.ai_enabled = settings.engine.ai_enabled;
    if let Some(secs) = settings.engine.ai_timeout_secs {
        config.ai_timeout = Duration::from_secs(secs);
    }
    if let Some(currency) = settings.engine.default_currency.clone() {
        config.default_currency = currency;
    }

    let engine = Arc::new(
        engine::Engine::builder()
            .database(db)
            .config(config)
            .build()
            .await?,
    );

    let ledger = HttpLedgerClient::new(
        &settings.ledger.base_url,
        Duration::from_secs(settings.ledger.timeout_secs),
    )?;
    let dispatcher = Arc::new(
        Dispatcher::new(Arc::new(ledger))
            .with_delay(Duration::from_millis(settings.ledger.sync_delay_ms)),
    );

    let processor = BillProcessor::spawn(
        engine.clone(),
        dispatcher,
        ProcessorConfig {
            sync_interval: Duration::from_secs(settings.processor.sync_interval_secs),
            ..ProcessorConfig::default()
        },
    );

    let mut tasks = tokio::task::JoinSet::new();

    let (ingest, queue) = ingest_channel(settings.ingest.queue_size);
    queue.spawn_workers(settings.ingest.workers, engine.clone(), &mut tasks);

    let state = server::ServerState {
        engine,
        ingest,
        sync: processor.trigger_handle(),
    };
    let bind = settings
        .server
        .bind
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = settings.server.port;
    tasks.spawn(async move {
        server::run(state, &bind, port).await;
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    // Drain: the in-flight dispatch finishes, the rest of the batch is
    // cancelled at the next record boundary.
    processor.shutdown().await;
    tasks.shutdown().await;

    Ok(())
}

async fn parse_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
