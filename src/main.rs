//! Daily News Digest — Binary Entrypoint
//! One batch invocation: process every configured entity and tracked
//! subject, then consolidate daily archives. Scheduling lives outside
//! (cron/CI); this process runs to completion and exits.

use std::time::Duration;

use daily_news_digest::archive::ArchiveDir;
use daily_news_digest::config;
use daily_news_digest::pipeline::{self, RunOptions};
use daily_news_digest::sources::rss::RssProvider;
use daily_news_digest::sources::search::SearchProvider;
use daily_news_digest::sources::types::SourceProvider;
use daily_news_digest::store::{MergeParams, MergeStore};
use daily_news_digest::summarize::ModelChain;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

const SEARCH_ITEMS_PER_SUBJECT: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = config::load_default()?;
    if cfg.entities.is_empty() && cfg.subjects.is_empty() {
        tracing::warn!("no entities or subjects configured, nothing to do");
        return Ok(());
    }

    let chain = ModelChain::from_env();
    if !chain.has_any_credentials() {
        tracing::warn!("no model credentials set; summaries and ranking degrade gracefully");
    }

    let data_dir = std::env::var("DIGEST_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let archive_dir = std::env::var("DIGEST_ARCHIVE_DIR").unwrap_or_else(|_| "archive".to_string());
    let params = MergeParams::default();
    let store = MergeStore::with_params(&data_dir, params);
    let archive = ArchiveDir::new(&archive_dir, params);

    let pause_secs = std::env::var("DIGEST_REQUEST_PAUSE_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2);
    let opts = RunOptions {
        request_pause: Duration::from_secs(pause_secs),
    };

    let now = chrono::Utc::now().timestamp().max(0) as u64;

    for entity in &cfg.entities {
        if !config::run_flag(&entity.key) {
            tracing::info!(entity = %entity.key, "skipped by configuration");
            continue;
        }

        let providers: Vec<Box<dyn SourceProvider>> = entity
            .feeds
            .iter()
            .map(|url| Box::new(RssProvider::from_url("rss", url.clone())) as Box<dyn SourceProvider>)
            .collect();

        match pipeline::process_entity(entity, &providers, &chain, &store, &archive, &opts, now)
            .await
        {
            Ok(report) => {
                if !report.persisted {
                    tracing::error!(entity = %report.entity, "run finished but history was NOT persisted");
                } else {
                    tracing::info!(
                        entity = %report.entity,
                        fetched = report.fetched,
                        chosen = report.chosen,
                        degraded = report.degraded,
                        history = report.history_len,
                        "entity done"
                    );
                }
            }
            Err(e) => tracing::error!(entity = %entity.key, error = ?e, "entity run failed"),
        }
    }

    if config::run_flag("subjects") {
        for subject in &cfg.subjects {
            let provider = SearchProvider::new(&subject.keywords, SEARCH_ITEMS_PER_SUBJECT);
            match pipeline::process_subject(subject, &provider, &store, now).await {
                Ok(report) => tracing::info!(
                    subject = %report.entity,
                    fetched = report.fetched,
                    merged = report.history_len,
                    "subject done"
                ),
                Err(e) => tracing::error!(subject = %subject.id, error = ?e, "subject run failed"),
            }
        }
    }

    let consolidate = std::env::var("CONSOLIDATE_ARCHIVES")
        .map(|v| config::parse_flag(&v))
        .unwrap_or(true);
    if consolidate {
        for entity in &cfg.entities {
            if let Err(e) = archive.consolidate_all(&entity.key) {
                tracing::error!(entity = %entity.key, error = ?e, "archive consolidation failed");
            }
        }
    }

    Ok(())
}
