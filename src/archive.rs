// src/archive.rs
//! Daily archive artifacts and their consolidation.
//!
//! One artifact per (entity, date, run): a JSON array of `Record` named
//! `YYYY-MM-DD_HHMMSS.json` under the entity's archive directory. Repeated
//! runs on the same day can leave several artifacts behind; `write_daily`
//! folds same-day artifacts into the earliest-named one as it writes, and
//! `consolidate_date` does the same reconciliation after the fact.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::store::{dedup_records, write_atomic, MergeParams, Record};

pub struct ArchiveDir {
    root: PathBuf,
    params: MergeParams,
}

impl ArchiveDir {
    pub fn new(root: impl Into<PathBuf>, params: MergeParams) -> Self {
        Self {
            root: root.into(),
            params,
        }
    }

    fn entity_dir(&self, entity: &str) -> PathBuf {
        self.root.join(entity)
    }

    /// `YYYY-MM-DD_HHMMSS` in the configured local offset.
    pub fn run_id(&self, now: u64) -> String {
        let offset = chrono::FixedOffset::east_opt(self.params.tz_offset_secs)
            .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).expect("utc offset"));
        chrono::DateTime::from_timestamp(now as i64, 0)
            .map(|dt| dt.with_timezone(&offset).format("%Y-%m-%d_%H%M%S").to_string())
            .unwrap_or_else(|| "1970-01-01_000000".to_string())
    }

    /// Artifact file names for one entity, sorted ascending.
    fn list_artifacts(&self, entity: &str) -> Vec<String> {
        let dir = self.entity_dir(entity);
        let mut names: Vec<String> = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|n| n.ends_with(".json"))
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Write (or extend) today's artifact. Records already present in same-day
    /// artifacts are folded in through the dedup primitive, the earliest file
    /// name stays canonical and later run files are removed.
    pub fn write_daily(&self, entity: &str, records: &[Record], now: u64) -> Result<PathBuf> {
        let dir = self.entity_dir(entity);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

        let date = crate::store::day_string(now, self.params.tz_offset_secs);
        let mut same_day: Vec<String> = self
            .list_artifacts(entity)
            .into_iter()
            .filter(|n| n.starts_with(&date))
            .collect();

        let primary = if same_day.is_empty() {
            format!("{}.json", self.run_id(now))
        } else {
            same_day.remove(0)
        };

        // This run's records first, then prior artifacts newest-file first.
        let mut combined: Vec<Record> = records.to_vec();
        combined.extend(self.parse_artifact(&dir.join(&primary)));
        for name in same_day.iter().rev() {
            combined.extend(self.parse_artifact(&dir.join(name)));
        }
        let merged = dedup_records(combined, self.params.similarity_threshold);

        let path = dir.join(&primary);
        let json = serde_json::to_string_pretty(&merged).context("serializing artifact")?;
        write_atomic(&path, json.as_bytes())?;

        for name in same_day {
            let p = dir.join(name);
            if let Err(e) = fs::remove_file(&p) {
                tracing::warn!(path = %p.display(), error = %e, "failed to remove stale artifact");
            }
        }
        Ok(path)
    }

    /// Collapse all artifacts for one entity+date into the earliest-named one.
    /// Safe when zero or one artifact exists (re-validation only).
    pub fn consolidate_date(&self, entity: &str, date: &str) -> Result<()> {
        let dir = self.entity_dir(entity);
        let files: Vec<String> = self
            .list_artifacts(entity)
            .into_iter()
            .filter(|n| n.starts_with(date))
            .collect();

        if files.len() < 2 {
            // Re-validate: an unreadable single artifact is worth a warning.
            if let Some(name) = files.first() {
                let _ = self.parse_artifact(&dir.join(name));
            }
            return Ok(());
        }

        let primary = files[0].clone();
        let duplicates = &files[1..];

        let mut combined = Vec::new();
        for name in files.iter().rev() {
            combined.extend(self.parse_artifact(&dir.join(name)));
        }
        let merged = dedup_records(combined, self.params.similarity_threshold);

        let json = serde_json::to_string_pretty(&merged).context("serializing artifact")?;
        write_atomic(&dir.join(&primary), json.as_bytes())?;

        for name in duplicates {
            let p = dir.join(name);
            if let Err(e) = fs::remove_file(&p) {
                tracing::warn!(path = %p.display(), error = %e, "failed to remove stale artifact");
            }
        }
        tracing::info!(entity, date, kept = %primary, removed = duplicates.len(), "archives consolidated");
        Ok(())
    }

    /// Consolidate every date that has more than one artifact.
    pub fn consolidate_all(&self, entity: &str) -> Result<()> {
        let mut dates: Vec<String> = self
            .list_artifacts(entity)
            .iter()
            .filter_map(|n| n.split('_').next().map(str::to_string))
            .collect();
        dates.sort();
        dates.dedup();
        for date in dates {
            self.consolidate_date(entity, &date)?;
        }
        Ok(())
    }

    /// Inverse of rendering: an artifact parses straight back into records.
    /// Unreadable artifacts contribute nothing rather than failing the pass.
    fn parse_artifact(&self, path: &Path) -> Vec<Record> {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "unreadable artifact");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_uses_local_offset() {
        let a = ArchiveDir::new("unused", MergeParams { tz_offset_secs: 0, ..Default::default() });
        // 2026-01-01 00:00:00 UTC
        assert_eq!(a.run_id(1_767_225_600), "2026-01-01_000000");
        let kst = ArchiveDir::new(
            "unused",
            MergeParams { tz_offset_secs: 9 * 3600, ..Default::default() },
        );
        assert_eq!(kst.run_id(1_767_225_600), "2026-01-01_090000");
    }
}
