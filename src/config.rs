// src/config.rs
//! Entity/subject configuration: TOML file plus per-entity env overrides.
//! The loading mechanism is deliberately thin; core components only ever see
//! the resolved structs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::rank::RankStrategy;
use crate::select::{SelectionMode, SelectionPolicy, DEFAULT_RECENT_WINDOW_SECS};

pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/entities.toml";

fn default_max_items() -> usize {
    15
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    entities: BTreeMap<String, RawEntity>,
    #[serde(default)]
    subjects: BTreeMap<String, RawSubject>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    display_name: Option<String>,
    #[serde(default)]
    feeds: Vec<String>,
    #[serde(default)]
    selection_mode: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default = "default_max_items")]
    max_items: usize,
    #[serde(default)]
    use_ranking: bool,
    #[serde(default)]
    ranking_strategy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSubject {
    name: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

/// One harvested category (an RSS-fed digest section).
#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub key: String,
    pub display_name: String,
    pub feeds: Vec<String>,
    pub selection_mode: SelectionMode,
    pub keywords: Vec<String>,
    pub max_items: usize,
    pub use_ranking: bool,
    pub ranking_strategy: RankStrategy,
}

impl EntityConfig {
    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            mode: self.selection_mode,
            keywords: self.keywords.clone(),
            max_items: self.max_items,
            recent_window_secs: DEFAULT_RECENT_WINDOW_SECS,
        }
    }
}

/// One tracked subject (news harvested by keyword search).
#[derive(Debug, Clone)]
pub struct SubjectConfig {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub entities: Vec<EntityConfig>,
    pub subjects: Vec<SubjectConfig>,
}

/// Load from `$DIGEST_CONFIG_PATH`, falling back to `config/entities.toml`.
/// A missing file is an empty config, not an error.
pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let raw: RawConfig = toml::from_str(&content)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    Ok(resolve(raw))
}

fn resolve(raw: RawConfig) -> AppConfig {
    let entities = raw
        .entities
        .into_iter()
        .map(|(key, e)| {
            let upper = key.to_uppercase();

            let mode_str = std::env::var(format!("{upper}_SELECTION_MODE"))
                .ok()
                .or(e.selection_mode)
                .unwrap_or_default();

            let keywords = match std::env::var(format!("{upper}_KEYWORDS")) {
                Ok(v) if !v.trim().is_empty() => v
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                _ => e.keywords,
            };

            let use_ranking = std::env::var(format!("{upper}_USE_RANKING"))
                .map(|v| parse_flag(&v))
                .unwrap_or(e.use_ranking);

            EntityConfig {
                display_name: e.display_name.unwrap_or_else(|| upper.clone()),
                feeds: e.feeds,
                selection_mode: SelectionMode::parse(&mode_str),
                keywords,
                max_items: e.max_items,
                use_ranking,
                ranking_strategy: RankStrategy::parse(
                    e.ranking_strategy.as_deref().unwrap_or("hybrid"),
                ),
                key,
            }
        })
        .collect();

    let subjects = raw
        .subjects
        .into_iter()
        .map(|(id, s)| SubjectConfig {
            name: s.name.unwrap_or_else(|| id.clone()),
            keywords: s.keywords,
            id,
        })
        .collect();

    AppConfig { entities, subjects }
}

/// Lenient boolean for env flags: "true", "1", "yes", "y", "on".
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y" | "on"
    )
}

/// `RUN_<KEY>` run flags default to enabled.
pub fn run_flag(key: &str) -> bool {
    std::env::var(format!("RUN_{}", key.to_uppercase()))
        .map(|v| parse_flag(&v))
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[entities.ai]
display_name = "AI News"
feeds = ["https://example.test/feed.xml"]
selection_mode = "time"
max_items = 10
use_ranking = true
ranking_strategy = "llm"

[entities.xr]
selection_mode = "nonsense"

[subjects.acme]
name = "Acme Robotics"
keywords = ["Acme", "Acme Robotics"]
"#;

    #[test]
    fn sample_config_resolves() {
        let raw: RawConfig = toml::from_str(SAMPLE).unwrap();
        let cfg = resolve(raw);
        assert_eq!(cfg.entities.len(), 2);
        let ai = cfg.entities.iter().find(|e| e.key == "ai").unwrap();
        assert_eq!(ai.display_name, "AI News");
        assert_eq!(ai.max_items, 10);
        assert!(ai.use_ranking);
        assert_eq!(ai.ranking_strategy, RankStrategy::Llm);

        // Unknown mode string degrades to Time.
        let xr = cfg.entities.iter().find(|e| e.key == "xr").unwrap();
        assert_eq!(xr.selection_mode, SelectionMode::Time);
        assert_eq!(xr.max_items, 15);

        assert_eq!(cfg.subjects.len(), 1);
        assert_eq!(cfg.subjects[0].name, "Acme Robotics");
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_take_precedence() {
        std::env::set_var("AI_SELECTION_MODE", "random");
        std::env::set_var("AI_KEYWORDS", "gpt, llm ,");
        std::env::set_var("AI_USE_RANKING", "off");

        let raw: RawConfig = toml::from_str(SAMPLE).unwrap();
        let cfg = resolve(raw);
        let ai = cfg.entities.iter().find(|e| e.key == "ai").unwrap();
        assert_eq!(ai.selection_mode, SelectionMode::Random);
        assert_eq!(ai.keywords, vec!["gpt".to_string(), "llm".to_string()]);
        assert!(!ai.use_ranking);

        std::env::remove_var("AI_SELECTION_MODE");
        std::env::remove_var("AI_KEYWORDS");
        std::env::remove_var("AI_USE_RANKING");
    }

    #[test]
    fn flags_parse_leniently() {
        assert!(parse_flag("Yes"));
        assert!(parse_flag(" 1 "));
        assert!(!parse_flag("off"));
        assert!(!parse_flag(""));
    }
}
