//! TradeSync Server - Main entry point

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tradesync_common::logging::{init_logging, LogConfig};

use tradesync_server::{
    api,
    audit::{AuditSink, FileAuditSink, NoopAuditSink},
    config::{Config, StoreBackend},
    db,
    ingest::IngestService,
    store::{MemoryStore, PgStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::builder()
        .log_file_prefix("tradesync-server")
        .filter_directives("tradesync_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    info!("Starting TradeSync Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let normalizer = config.time.normalizer()?;
    info!(rule = ?config.time.dst_rule, target_offset = %normalizer.target_offset(), "Timestamp normalizer ready");

    let audit: Arc<dyn AuditSink> = if config.audit.enabled {
        let sink = FileAuditSink::new(&config.audit.dir)?;
        info!(dir = %sink.dir().display(), "Raw batch archive enabled");
        Arc::new(sink)
    } else {
        info!("Raw batch archive disabled (AUDIT_ENABLED=false)");
        Arc::new(NoopAuditSink)
    };

    match config.store {
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;

            let service = IngestService::new(PgStore::new(pool), normalizer, audit);
            api::serve(&config.server, service).await
        },
        StoreBackend::Memory => {
            let service = IngestService::new(MemoryStore::new(), normalizer, audit);
            api::serve(&config.server, service).await
        },
    }
}
