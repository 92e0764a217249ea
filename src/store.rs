// src/store.rs
//! Deduplicating incremental merge store: one JSON history file per entity,
//! replaced atomically on every merge.
//!
//! Merge order matters: new records are iterated before existing ones, so a
//! newer edition of a duplicate link/title wins the collision.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "digest_records_deduped_total",
            "Records dropped as link or near-title duplicates."
        );
        describe_counter!(
            "digest_records_expired_total",
            "Records dropped for falling outside the recency window."
        );
        describe_counter!(
            "digest_persist_errors_total",
            "History writes that failed; in-memory result was still returned."
        );
    });
}

/// One published item in an entity's durable history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub timestamp: u64, // unix seconds
}

impl Record {
    /// Case/whitespace/punctuation-insensitive key used for near-duplicate
    /// comparison. Derived, never persisted.
    pub fn title_key(&self) -> String {
        normalize_title(&self.title)
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if !last_was_space && !out.is_empty() {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

#[derive(Clone, Copy, Debug)]
pub struct MergeParams {
    /// Normalized-title similarity at or above this collapses two records.
    pub similarity_threshold: f64,
    /// Records older than `now - max_age_secs` are dropped, never persisted.
    pub max_age_secs: u64,
    /// Max records sharing one local calendar date.
    pub per_day_quota: usize,
    /// Hard cap on history length after all other rules.
    pub history_cap: usize,
    /// Fixed UTC offset used for day bucketing (local calendar dates).
    pub tz_offset_secs: i32,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
            max_age_secs: 30 * 24 * 3600,
            per_day_quota: 2,
            history_cap: 100,
            tz_offset_secs: 9 * 3600,
        }
    }
}

/// Day bucket for quota purposes: local calendar day index since the epoch.
pub fn day_bucket(ts: u64, tz_offset_secs: i32) -> i64 {
    (ts as i64 + tz_offset_secs as i64).div_euclid(86_400)
}

/// `YYYY-MM-DD` in the configured local offset; used for artifact names.
pub fn day_string(ts: u64, tz_offset_secs: i32) -> String {
    let offset = chrono::FixedOffset::east_opt(tz_offset_secs)
        .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).expect("utc offset"));
    chrono::DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.with_timezone(&offset).format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

/// Optional per-entity pre-filter, e.g. a disambiguation rule rejecting items
/// where a tracked keyword is used as a common word rather than a name.
pub type RecordFilter = Box<dyn Fn(&Record) -> bool + Send + Sync>;

/// Result of a merge. `persisted == false` means the durable store may still
/// hold the prior history; callers must not assume the write succeeded.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub history: Vec<Record>,
    pub persisted: bool,
}

/// Dedup primitive: first-seen-in-iteration-order wins, where "duplicate"
/// means an exact link match or normalized-title similarity at or above the
/// threshold. Shared between the merge store and the archive consolidator.
pub fn dedup_records(records: Vec<Record>, similarity_threshold: f64) -> Vec<Record> {
    ensure_metrics_described();
    let mut kept: Vec<Record> = Vec::with_capacity(records.len());
    let mut deduped = 0usize;
    for rec in records {
        let key = rec.title_key();
        let dup = kept.iter().any(|k| {
            k.link == rec.link
                || normalized_levenshtein(&k.title_key(), &key) >= similarity_threshold
        });
        if dup {
            deduped += 1;
            continue;
        }
        kept.push(rec);
    }
    counter!("digest_records_deduped_total").increment(deduped as u64);
    kept
}

/// Pure merge core.
///
/// Window-filters both lists, dedups the union (new first, so on a collision
/// the newer edition wins), sorts by timestamp desc and enforces the per-day
/// quota plus the history cap.
pub fn merge_records(
    new: Vec<Record>,
    existing: Vec<Record>,
    now: u64,
    params: &MergeParams,
) -> Vec<Record> {
    ensure_metrics_described();
    let floor = now.saturating_sub(params.max_age_secs);
    let in_window = |r: &Record| r.timestamp >= floor && r.timestamp <= now;

    let mut expired = 0usize;
    let union: Vec<Record> = new
        .into_iter()
        .chain(existing)
        .filter(|r| {
            let keep = in_window(r);
            if !keep {
                expired += 1;
            }
            keep
        })
        .collect();

    let mut kept = dedup_records(union, params.similarity_threshold);

    // Stable: equal timestamps keep the new-first iteration order.
    kept.sort_by_key(|r| std::cmp::Reverse(r.timestamp));

    // Per-calendar-day quota, scanning in sorted order.
    let mut per_day: HashMap<i64, usize> = HashMap::new();
    kept.retain(|r| {
        let n = per_day.entry(day_bucket(r.timestamp, params.tz_offset_secs)).or_insert(0);
        *n += 1;
        *n <= params.per_day_quota
    });

    kept.truncate(params.history_cap);

    counter!("digest_records_expired_total").increment(expired as u64);
    kept
}

pub struct MergeStore {
    data_dir: PathBuf,
    params: MergeParams,
    filters: HashMap<String, RecordFilter>,
}

impl MergeStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_params(data_dir, MergeParams::default())
    }

    pub fn with_params(data_dir: impl Into<PathBuf>, params: MergeParams) -> Self {
        Self {
            data_dir: data_dir.into(),
            params,
            filters: HashMap::new(),
        }
    }

    pub fn params(&self) -> &MergeParams {
        &self.params
    }

    /// Install a per-entity pre-filter applied to incoming records only.
    pub fn set_filter(&mut self, entity: &str, filter: RecordFilter) {
        self.filters.insert(entity.to_string(), filter);
    }

    fn history_path(&self, entity: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", safe_file_name(entity)))
    }

    /// Empty history when nothing is stored yet or the file is unreadable.
    pub fn load_history(&self, entity: &str) -> Vec<Record> {
        let path = self.history_path(entity);
        match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(entity, error = %e, "unreadable history, starting empty");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    /// Load → merge → persist (atomic replace). Idempotent: re-submitting the
    /// same batch leaves the history unchanged. A failed write is logged
    /// loudly and reported through the outcome; the merged list is still
    /// returned so the current run can proceed.
    pub fn merge_and_persist(&self, entity: &str, new: Vec<Record>, now: u64) -> MergeOutcome {
        ensure_metrics_described();

        let new = match self.filters.get(entity) {
            Some(filter) => new.into_iter().filter(|r| filter(r)).collect(),
            None => new,
        };

        let existing = self.load_history(entity);
        let merged = merge_records(new, existing, now, &self.params);

        let persisted = match self.persist(entity, &merged) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(entity, error = ?e, "history persist failed; durable store may be stale");
                counter!("digest_persist_errors_total").increment(1);
                false
            }
        };

        MergeOutcome {
            history: merged,
            persisted,
        }
    }

    fn persist(&self, entity: &str, records: &[Record]) -> Result<()> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("creating {}", self.data_dir.display()))?;
        let path = self.history_path(entity);
        let json = serde_json::to_string_pretty(records).context("serializing history")?;
        write_atomic(&path, json.as_bytes())
    }
}

/// All-or-nothing write: temp file in the same directory, then rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("writing {}", tmp.display()))?;
    }
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Entity ids double as file names; strip characters that can't appear there.
fn safe_file_name(entity: &str) -> String {
    entity
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ts: u64, link: &str, title: &str) -> Record {
        Record {
            title: title.into(),
            link: link.into(),
            summary: "s".into(),
            source: "src".into(),
            image_url: None,
            timestamp: ts,
        }
    }

    #[test]
    fn normalize_title_is_case_space_punct_insensitive() {
        assert_eq!(
            normalize_title("OpenAI  Releases, GPT-5!"),
            normalize_title("openai releases gpt 5")
        );
    }

    #[test]
    fn day_bucket_respects_offset() {
        // 23:30 UTC is already the next day at +1h.
        let ts = 86_400 - 1_800;
        assert_eq!(day_bucket(ts, 0), 0);
        assert_eq!(day_bucket(ts, 3_600), 1);
    }

    #[test]
    fn exact_link_duplicate_collapses_to_new_record() {
        let params = MergeParams::default();
        let now = 1_000_000_000;
        let existing = vec![rec(now - 100, "https://x/1", "Old edition")];
        let new = vec![rec(now - 50, "https://x/1", "Completely different words")];
        let out = merge_records(new, existing, now, &params);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Completely different words");
    }

    #[test]
    fn future_timestamps_are_dropped() {
        let params = MergeParams::default();
        let now = 1_000_000_000;
        let out = merge_records(vec![rec(now + 500, "https://x/f", "From the future")], vec![], now, &params);
        assert!(out.is_empty());
    }

    #[test]
    fn unknown_timestamp_zero_is_outside_window() {
        let params = MergeParams::default();
        let now = 1_000_000_000;
        let out = merge_records(vec![rec(0, "https://x/z", "No date")], vec![], now, &params);
        assert!(out.is_empty());
    }

    #[test]
    fn history_cap_applies_after_quota() {
        let params = MergeParams {
            history_cap: 3,
            per_day_quota: 2,
            ..Default::default()
        };
        let now = 1_000_000_000;
        // Two per day across three days = 6 eligible, cap keeps 3 newest.
        let titles = [
            "Quantum chips reach a milestone",
            "Browser vendors agree on standards",
            "Robotics startup raises a round",
            "New compiler backend lands",
            "Satellite network goes live",
            "Open dataset released for audio",
        ];
        let new: Vec<Record> = titles
            .iter()
            .enumerate()
            .map(|(i, t)| rec(now - i as u64 * 43_200, &format!("https://x/{i}"), t))
            .collect();
        let out = merge_records(new, vec![], now, &params);
        assert_eq!(out.len(), 3);
        assert!(out.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }
}
