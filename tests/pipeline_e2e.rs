// tests/pipeline_e2e.rs
//! End-to-end entity run against fixture feeds and a scripted model chain:
//! one item summarizes cleanly, the next degrades to a placeholder, and the
//! run still merges and archives everything.

use daily_news_digest::archive::ArchiveDir;
use daily_news_digest::config::EntityConfig;
use daily_news_digest::pipeline::{process_entity, process_subject, RunOptions};
use daily_news_digest::rank::RankStrategy;
use daily_news_digest::select::SelectionMode;
use daily_news_digest::sources::rss::RssProvider;
use daily_news_digest::sources::types::SourceProvider;
use daily_news_digest::store::{MergeParams, MergeStore};
use daily_news_digest::summarize::{
    ModelChain, ProviderFailure, ScriptedProvider, PLACEHOLDER_SUMMARY,
};

const NOW: u64 = 1_767_254_400; // 2026-01-01 08:00:00 UTC

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Wire</title>
    <item>
      <title>Model X launched</title>
      <link>https://example.test/model-x</link>
      <pubDate>Thu, 01 Jan 2026 07:00:00 GMT</pubDate>
      <description>The flagship model ships today.</description>
    </item>
    <item>
      <title>Chipmaker opens new fab</title>
      <link>https://example.test/new-fab</link>
      <pubDate>Thu, 01 Jan 2026 06:00:00 GMT</pubDate>
      <description>Production starts next quarter.</description>
    </item>
  </channel>
</rss>"#;

fn entity() -> EntityConfig {
    EntityConfig {
        key: "tech".into(),
        display_name: "Tech".into(),
        feeds: vec![],
        selection_mode: SelectionMode::Time,
        keywords: vec![],
        max_items: 5,
        use_ranking: false,
        ranking_strategy: RankStrategy::Heuristic,
    }
}

#[tokio::test]
async fn degraded_item_is_published_with_placeholder() {
    let data = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    let store = MergeStore::new(data.path());
    let archive = ArchiveDir::new(archives.path(), MergeParams::default());

    let providers: Vec<Box<dyn SourceProvider>> =
        vec![Box::new(RssProvider::from_fixture("wire", FEED))];

    // First call succeeds, every later call is malformed → chain exhausted.
    let chain = ModelChain::new(vec![Box::new(ScriptedProvider::new(
        "scripted",
        vec![
            Ok("A fine summary.".into()),
            Err(ProviderFailure::Malformed("junk".into())),
        ],
    ))]);

    let opts = RunOptions {
        request_pause: std::time::Duration::ZERO,
    };
    let report = process_entity(&entity(), &providers, &chain, &store, &archive, &opts, NOW)
        .await
        .unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.chosen, 2);
    assert_eq!(report.degraded, 1);
    assert!(report.persisted);

    let history = store.load_history("tech");
    assert_eq!(history.len(), 2);
    // Time order: the newer item got the scripted success.
    assert_eq!(history[0].link, "https://example.test/model-x");
    assert_eq!(history[0].summary, "A fine summary.");
    assert_eq!(history[1].summary, PLACEHOLDER_SUMMARY);

    // One daily artifact was written and parses back into records.
    let entity_dir = archives.path().join("tech");
    let files: Vec<_> = std::fs::read_dir(&entity_dir).unwrap().flatten().collect();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn rerun_with_same_feed_does_not_duplicate() {
    let data = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    let store = MergeStore::new(data.path());
    let archive = ArchiveDir::new(archives.path(), MergeParams::default());

    let providers: Vec<Box<dyn SourceProvider>> =
        vec![Box::new(RssProvider::from_fixture("wire", FEED))];
    let chain = ModelChain::new(vec![Box::new(ScriptedProvider::new(
        "scripted",
        vec![Ok("Summary.".into())],
    ))]);
    let opts = RunOptions {
        request_pause: std::time::Duration::ZERO,
    };

    let first = process_entity(&entity(), &providers, &chain, &store, &archive, &opts, NOW)
        .await
        .unwrap();
    let second = process_entity(&entity(), &providers, &chain, &store, &archive, &opts, NOW + 600)
        .await
        .unwrap();

    assert_eq!(first.history_len, 2);
    assert_eq!(second.history_len, 2);
    assert_eq!(store.load_history("tech").len(), 2);
}

#[tokio::test]
async fn no_credentials_still_produces_records() {
    struct NoKey;
    impl daily_news_digest::summarize::TextProvider for NoKey {
        fn complete<'a>(
            &'a self,
            _prompt: &'a str,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<Output = Result<String, ProviderFailure>>
                    + Send
                    + 'a,
            >,
        > {
            unreachable!("must not be called without credentials");
        }
        fn name(&self) -> &'static str {
            "nokey"
        }
        fn has_credentials(&self) -> bool {
            false
        }
    }

    let data = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    let store = MergeStore::new(data.path());
    let archive = ArchiveDir::new(archives.path(), MergeParams::default());

    let providers: Vec<Box<dyn SourceProvider>> =
        vec![Box::new(RssProvider::from_fixture("wire", FEED))];
    let chain = ModelChain::new(vec![Box::new(NoKey)]);
    let opts = RunOptions {
        request_pause: std::time::Duration::ZERO,
    };

    let report = process_entity(&entity(), &providers, &chain, &store, &archive, &opts, NOW)
        .await
        .unwrap();
    assert_eq!(report.degraded, 2);
    assert!(store
        .load_history("tech")
        .iter()
        .all(|r| r.summary == PLACEHOLDER_SUMMARY));
}

#[tokio::test]
async fn subjects_accumulate_snippets_without_model_calls() {
    struct Fixed;
    #[async_trait::async_trait]
    impl SourceProvider for Fixed {
        async fn fetch_latest(
            &self,
        ) -> anyhow::Result<Vec<daily_news_digest::sources::types::RawItem>> {
            Ok(vec![daily_news_digest::sources::types::RawItem {
                source: "search".into(),
                published_at: NOW - 120,
                title: "Acme wins contract".into(),
                link: "https://example.test/acme".into(),
                snippet: "Acme signed a multi-year deal.".into(),
                image_url: None,
            }])
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    let data = tempfile::tempdir().unwrap();
    let store = MergeStore::new(data.path());
    let subject = daily_news_digest::config::SubjectConfig {
        id: "acme".into(),
        name: "Acme".into(),
        keywords: vec!["Acme".into()],
    };

    let report = process_subject(&subject, &Fixed, &store, NOW).await.unwrap();
    assert_eq!(report.history_len, 1);
    let history = store.load_history("acme");
    assert_eq!(history[0].summary, "Acme signed a multi-year deal.");
}
