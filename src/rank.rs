// src/rank.rs
//! Ranking engine: narrow an ordered candidate pool to the items worth
//! publishing. The remote model is advisory only; any failure downgrades to
//! the heuristic scorer so ranking can never block publication.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashSet;

use crate::sources::types::RawItem;
use crate::summarize::ModelChain;

/// Ranking never operates on an unbounded pool.
pub const RANK_POOL_CAP: usize = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RankStrategy {
    Heuristic,
    Llm,
    Hybrid,
}

impl RankStrategy {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm" => RankStrategy::Llm,
            "hybrid" => RankStrategy::Hybrid,
            _ => RankStrategy::Heuristic,
        }
    }
}

// Signed title-scoring lexicon. Weights: notable entity +3, event +2,
// business/policy +2, low-value -2 per match.
const NOTABLE_ENTITIES: &[&str] = &[
    "openai",
    "google",
    "apple",
    "anthropic",
    "microsoft",
    "meta",
    "nvidia",
    "deepmind",
    "gemini",
    "gpt",
    "claude",
];
const EVENT_TERMS: &[&str] = &[
    "launch", "release", "unveil", "announce", "debut", "introduce", "ship",
];
const BUSINESS_TERMS: &[&str] = &[
    "acquisition",
    "acquire",
    "merger",
    "funding",
    "regulation",
    "policy",
    "partnership",
    "invest",
];
const LOW_VALUE_TERMS: &[&str] = &[
    "tutorial", "how to", "guide", "sponsored", "webinar", "promo", "giveaway",
];

pub fn heuristic_score(title: &str) -> i32 {
    let t = title.to_lowercase();
    let count = |terms: &[&str]| terms.iter().filter(|k| t.contains(*k)).count() as i32;
    3 * count(NOTABLE_ENTITIES) + 2 * count(EVENT_TERMS) + 2 * count(BUSINESS_TERMS)
        - 2 * count(LOW_VALUE_TERMS)
}

/// Deterministic ranking: (score desc, timestamp desc), stable on ties.
pub fn rank_heuristic(candidates: &[RawItem], limit: usize) -> Vec<RawItem> {
    let mut scored: Vec<(i32, RawItem)> = candidates
        .iter()
        .map(|it| (heuristic_score(&it.title), it.clone()))
        .collect();
    scored.sort_by_key(|(score, it)| (std::cmp::Reverse(*score), std::cmp::Reverse(it.published_at)));
    scored.into_iter().map(|(_, it)| it).take(limit).collect()
}

/// Parse an ordered index list out of a free-form model reply. Out-of-range
/// indices are ignored; duplicates collapse to first occurrence.
fn parse_ranked_indices(reply: &str, len: usize) -> Vec<usize> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"\d+").unwrap());

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in re.find_iter(reply) {
        if let Ok(idx) = m.as_str().parse::<usize>() {
            if idx < len && seen.insert(idx) {
                out.push(idx);
            }
        }
    }
    out
}

fn ranking_prompt(candidates: &[RawItem], limit: usize) -> String {
    let listing = candidates
        .iter()
        .enumerate()
        .map(|(idx, it)| format!("{idx}. {}", it.title))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "The following is a list of tech news headlines.\n\
         Pick the {limit} most important and meaningful ones for today's digest.\n\n\
         Importance criteria:\n\
         1. New products or models from major tech companies\n\
         2. Breakthrough research results\n\
         3. Major acquisitions or policy changes\n\
         4. Exclude plain tutorials and promotional pieces\n\n\
         Reply with ONLY the index numbers of your picks, most important first,\n\
         separated by commas. Example: 1, 5, 10, 3, 2\n\n\
         [Headlines]\n{listing}"
    )
}

async fn rank_llm(candidates: &[RawItem], limit: usize, chain: &ModelChain) -> Option<Vec<RawItem>> {
    let reply = match chain.complete(&ranking_prompt(candidates, limit)).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "remote ranking failed, using heuristic");
            return None;
        }
    };

    let indices = parse_ranked_indices(&reply, candidates.len());
    if indices.is_empty() {
        tracing::warn!(reply_len = reply.len(), "unparseable ranking reply, using heuristic");
        return None;
    }

    Some(
        indices
            .into_iter()
            .take(limit)
            .map(|i| candidates[i].clone())
            .collect(),
    )
}

/// Rank `candidates` down to at most `limit` items.
///
/// All strategies share a pre-step: stable sort by timestamp desc and cap to
/// [`RANK_POOL_CAP`]. `Llm` falls back to `Heuristic` on any failure; `Hybrid`
/// tops a short LLM result up from the heuristic ordering.
pub async fn rank(
    candidates: Vec<RawItem>,
    limit: usize,
    strategy: RankStrategy,
    chain: &ModelChain,
) -> Vec<RawItem> {
    let mut pool = candidates;
    pool.sort_by_key(|it| std::cmp::Reverse(it.published_at));
    pool.truncate(RANK_POOL_CAP);

    match strategy {
        RankStrategy::Heuristic => rank_heuristic(&pool, limit),
        RankStrategy::Llm => match rank_llm(&pool, limit, chain).await {
            Some(picked) => picked,
            None => rank_heuristic(&pool, limit),
        },
        RankStrategy::Hybrid => {
            let mut picked = rank_llm(&pool, limit, chain).await.unwrap_or_default();
            if picked.len() < limit {
                let chosen: HashSet<String> = picked.iter().map(|it| it.link.clone()).collect();
                for it in rank_heuristic(&pool, pool.len()) {
                    if picked.len() >= limit {
                        break;
                    }
                    if !chosen.contains(&it.link) {
                        picked.push(it);
                    }
                }
            }
            picked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(ts: u64, title: &str) -> RawItem {
        RawItem {
            source: "t".into(),
            published_at: ts,
            title: title.into(),
            link: format!("https://example.test/{ts}-{}", title.len()),
            snippet: String::new(),
            image_url: None,
        }
    }

    #[test]
    fn heuristic_scores_signed_weights() {
        assert_eq!(heuristic_score("OpenAI releases GPT update"), 3 + 3 + 2);
        assert_eq!(heuristic_score("A tutorial on sorting"), -2);
        assert_eq!(heuristic_score("Nothing special"), 0);
    }

    #[test]
    fn heuristic_breaks_score_ties_by_recency() {
        let older = item(100, "OpenAI launch");
        let newer = item(200, "Google launch");
        let out = rank_heuristic(&[older, newer.clone()], 2);
        assert_eq!(out[0].title, newer.title);
    }

    #[test]
    fn indices_are_bounded_and_deduped() {
        assert_eq!(parse_ranked_indices("2, 0, 2, 99, 1", 3), vec![2, 0, 1]);
        assert!(parse_ranked_indices("no numbers", 3).is_empty());
    }

    #[tokio::test]
    async fn llm_reply_orders_selection() {
        use crate::summarize::{ModelChain, ScriptedProvider};
        let items = vec![item(300, "a"), item(200, "b"), item(100, "c")];
        let chain = ModelChain::new(vec![Box::new(ScriptedProvider::new(
            "mock",
            vec![Ok("1, 0".into())],
        ))]);
        let out = rank(items, 2, RankStrategy::Llm, &chain).await;
        let titles: Vec<&str> = out.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn hybrid_tops_up_from_heuristic() {
        use crate::summarize::{ModelChain, ScriptedProvider};
        let items = vec![
            item(300, "plain one"),
            item(200, "OpenAI launch"),
            item(100, "plain two"),
        ];
        // Model only picks index 2; heuristic must fill the second slot.
        let chain = ModelChain::new(vec![Box::new(ScriptedProvider::new(
            "mock",
            vec![Ok("2".into())],
        ))]);
        let out = rank(items, 2, RankStrategy::Hybrid, &chain).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "plain two");
        assert_eq!(out[1].title, "OpenAI launch");
    }
}
