// src/pipeline.rs
//! Per-entity run orchestration: collect → select → rank → summarize →
//! merge → archive. Single-threaded and run-to-completion; partial progress
//! is durable because every entity merges independently.

use std::time::Duration;

use anyhow::Result;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::archive::ArchiveDir;
use crate::config::{EntityConfig, SubjectConfig};
use crate::rank;
use crate::select;
use crate::sources::{self, types::RawItem, types::SourceProvider};
use crate::store::{MergeStore, Record};
use crate::summarize::{self, ModelChain, PLACEHOLDER_SUMMARY};

/// Fixed pause between summarization calls; a throttling courtesy to remote
/// providers, not a correctness requirement.
pub const DEFAULT_REQUEST_PAUSE: Duration = Duration::from_secs(2);

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_entity_runs_total", "Completed per-entity runs.");
        describe_counter!(
            "digest_summaries_degraded_total",
            "Items published with a placeholder summary."
        );
    });
}

pub struct RunOptions {
    pub request_pause: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            request_pause: DEFAULT_REQUEST_PAUSE,
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub entity: String,
    pub fetched: usize,
    pub chosen: usize,
    pub degraded: usize,
    pub history_len: usize,
    pub persisted: bool,
}

fn to_record(item: &RawItem, summary: String) -> Record {
    Record {
        title: item.title.clone(),
        link: item.link.clone(),
        summary,
        source: item.source.clone(),
        image_url: item.image_url.clone(),
        timestamp: item.published_at,
    }
}

/// Run one category end to end. Item-level failures degrade that item only;
/// the only loud failure mode is the history persist step.
pub async fn process_entity(
    cfg: &EntityConfig,
    providers: &[Box<dyn SourceProvider>],
    chain: &ModelChain,
    store: &MergeStore,
    archive: &ArchiveDir,
    opts: &RunOptions,
    now: u64,
) -> Result<RunReport> {
    ensure_metrics_described();
    tracing::info!(entity = %cfg.key, "processing");

    let raw = sources::collect(providers).await;
    let fetched = raw.len();

    let pool = select::select(&raw, &cfg.selection_policy(), now);
    let chosen = if cfg.use_ranking {
        rank::rank(pool, cfg.max_items, cfg.ranking_strategy, chain).await
    } else {
        let mut pool = pool;
        pool.truncate(cfg.max_items);
        pool
    };

    let mut records = Vec::with_capacity(chosen.len());
    let mut degraded = 0usize;
    for (idx, item) in chosen.iter().enumerate() {
        if idx > 0 && !opts.request_pause.is_zero() {
            tokio::time::sleep(opts.request_pause).await;
        }

        let content = format!("{}\n\nURL: {}", item.snippet, item.link);
        let summary =
            match summarize::summarize(chain, &content, &item.title, &cfg.display_name).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(entity = %cfg.key, link = %item.link, error = %e, "summary degraded");
                    counter!("digest_summaries_degraded_total").increment(1);
                    degraded += 1;
                    PLACEHOLDER_SUMMARY.to_string()
                }
            };
        records.push(to_record(item, summary));
    }

    let outcome = store.merge_and_persist(&cfg.key, records.clone(), now);
    archive.write_daily(&cfg.key, &records, now)?;

    counter!("digest_entity_runs_total").increment(1);
    Ok(RunReport {
        entity: cfg.key.clone(),
        fetched,
        chosen: records.len(),
        degraded,
        history_len: outcome.history.len(),
        persisted: outcome.persisted,
    })
}

/// Run one tracked subject: search-fed items keep their snippet as summary
/// (no model call) and accumulate straight into the subject's history.
pub async fn process_subject(
    subject: &SubjectConfig,
    provider: &dyn SourceProvider,
    store: &MergeStore,
    now: u64,
) -> Result<RunReport> {
    ensure_metrics_described();

    let raw = match provider.fetch_latest().await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(subject = %subject.id, error = ?e, "subject fetch failed");
            Vec::new()
        }
    };
    let fetched = raw.len();

    let records: Vec<Record> = raw
        .iter()
        .map(|it| to_record(it, it.snippet.clone()))
        .collect();

    let outcome = store.merge_and_persist(&subject.id, records.clone(), now);

    counter!("digest_entity_runs_total").increment(1);
    Ok(RunReport {
        entity: subject.id.clone(),
        fetched,
        chosen: records.len(),
        degraded: 0,
        history_len: outcome.history.len(),
        persisted: outcome.persisted,
    })
}
