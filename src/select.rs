// src/select.rs
//! Selection engine: filter and order the raw pool before ranking.
//!
//! Pure over its inputs (`now` is passed in); the only nondeterminism is the
//! deliberate shuffle in `Random` mode.

use rand::seq::SliceRandom;

use crate::sources::types::RawItem;

pub const DEFAULT_RECENT_WINDOW_SECS: u64 = 48 * 3600;
/// Below this many recent items the recency preference is abandoned and the
/// whole filtered pool is used, so a momentarily stale feed still yields output.
const MIN_RECENT_POOL: usize = 5;
const RANDOM_WINDOW_SECS: u64 = 3 * 24 * 3600;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    Time,
    Random,
    Keyword,
}

impl SelectionMode {
    /// Unknown mode strings fall back to `Time` rather than failing the run.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => SelectionMode::Random,
            "keyword" => SelectionMode::Keyword,
            "time" => SelectionMode::Time,
            other => {
                if !other.is_empty() {
                    tracing::warn!(mode = other, "unknown selection mode, using time");
                }
                SelectionMode::Time
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SelectionPolicy {
    pub mode: SelectionMode,
    pub keywords: Vec<String>,
    pub max_items: usize,
    pub recent_window_secs: u64,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Time,
            keywords: Vec::new(),
            max_items: 15,
            recent_window_secs: DEFAULT_RECENT_WINDOW_SECS,
        }
    }
}

/// Filter and order the pool. Does NOT truncate to `max_items`; the caller
/// truncates when no ranking stage follows.
pub fn select(items: &[RawItem], policy: &SelectionPolicy, now: u64) -> Vec<RawItem> {
    // 1) Keyword filter (Keyword mode only)
    let mut pool: Vec<RawItem> =
        if policy.mode == SelectionMode::Keyword && !policy.keywords.is_empty() {
            let kws: Vec<String> = policy
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            items
                .iter()
                .filter(|it| {
                    let haystack = format!("{} {}", it.title, it.snippet).to_lowercase();
                    kws.iter().any(|kw| haystack.contains(kw))
                })
                .cloned()
                .collect()
        } else {
            items.to_vec()
        };

    // 2) Prefer recent items, but only when the recent pool is not too sparse
    let floor = now.saturating_sub(policy.recent_window_secs);
    let recent: Vec<RawItem> = pool
        .iter()
        .filter(|it| it.published_at >= floor)
        .cloned()
        .collect();
    if recent.len() >= MIN_RECENT_POOL {
        pool = recent;
    }

    // 3) Order by mode
    match policy.mode {
        SelectionMode::Time | SelectionMode::Keyword => {
            // Stable: equal timestamps keep encounter order.
            pool.sort_by_key(|it| std::cmp::Reverse(it.published_at));
        }
        SelectionMode::Random => {
            let floor3 = now.saturating_sub(RANDOM_WINDOW_SECS);
            let recent3: Vec<RawItem> = pool
                .iter()
                .filter(|it| it.published_at >= floor3)
                .cloned()
                .collect();
            if !recent3.is_empty() {
                pool = recent3;
            }
            pool.shuffle(&mut rand::rng());
        }
    }

    pool
}
