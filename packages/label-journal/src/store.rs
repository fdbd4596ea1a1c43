//! LabelStore - the in-memory label map backed by the journal
//!
//! `open()` replays the journal, compacts it when the duplication ratio is
//! too high, and keeps an append handle. Every mutation is appended (and
//! flushed) before the in-memory map changes, so memory never runs ahead of
//! disk.
//!
//! # Usage
//!
//! ```no_run
//! use labext_journal::{LabelStore, RawCodec};
//!
//! let mut store = LabelStore::open("labels.tsv", RawCodec).unwrap();
//! store
//!     .apply_changes(vec![
//!         ("a".to_string(), Some("X".to_string())),
//!         ("b".to_string(), Some("Y".to_string())),
//!         ("a".to_string(), None),
//!     ])
//!     .unwrap();
//! assert_eq!(store.count(), 1);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};
use crate::journal::compaction::{self, CompactionResult, DEFAULT_DUPLICATION_RATIO};
use crate::journal::replay::{self, CompactionStats, ReplayOptions};
use crate::journal::writer::{self, JournalWriter};
use crate::journal::LabelMap;
use crate::label::{serialize_checked, LabelCodec};

/// How far each append is pushed before the call returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Flush to the OS after every record.
    Flush,
    /// Flush and `sync_data` after every record.
    #[default]
    Sync,
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Compact on open when `duplicate_writes / distinct_keys` exceeds this.
    pub duplication_ratio: f64,
    /// Run the compaction policy at open time.
    pub compact_on_open: bool,
    pub durability: Durability,
    /// Drop an unterminated last record (a crash mid-append) instead of
    /// replaying it.
    pub tolerate_torn_tail: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            duplication_ratio: DEFAULT_DUPLICATION_RATIO,
            compact_on_open: true,
            durability: Durability::Sync,
            tolerate_torn_tail: true,
        }
    }
}

impl StoreConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.duplication_ratio.is_finite() || self.duplication_ratio < 0.0 {
            return Err(JournalError::InvalidConfig(format!(
                "duplication_ratio must be a non-negative number, got {}",
                self.duplication_ratio
            )));
        }
        Ok(())
    }

    fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            tolerate_torn_tail: self.tolerate_torn_tail,
        }
    }
}

/// Persistent example -> label map.
///
/// Exclusively owns its journal for its whole lifetime. There is no close:
/// every write is already durable when the call that made it returns.
pub struct LabelStore<C: LabelCodec> {
    path: PathBuf,
    codec: C,
    config: StoreConfig,
    labels: LabelMap<C::Label>,
    stats: CompactionStats,
    /// `None` once a reopen after compaction failed; writes are refused.
    journal: Option<JournalWriter>,
}

impl<C: LabelCodec> LabelStore<C> {
    pub fn open(path: impl AsRef<Path>, codec: C) -> Result<Self> {
        Self::open_with_config(path, codec, StoreConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, codec: C, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        compaction::recover_interrupted(&path)?;

        tracing::debug!(path = %path.display(), "loading label journal");
        let replay = replay::replay_with(&path, &codec, config.replay_options())?;

        let compact = replay.existed
            && config.compact_on_open
            && compaction::should_compact(&replay.stats, config.duplication_ratio);

        if compact {
            tracing::debug!(
                duplicates = replay.stats.duplicate_writes,
                distinct = replay.stats.distinct_keys,
                "compacting journal with many duplicate writes"
            );
            compaction::compact(&path, &replay.labels, &codec)?;
        } else if replay.stats.truncated_tail {
            tracing::warn!(
                path = %path.display(),
                valid_len = replay.valid_len,
                "truncating journal to its last well-formed record"
            );
            writer::truncate_to(&path, replay.valid_len)?;
        }

        let mut journal = JournalWriter::open(&path, config.durability)?;
        if !compact && replay.needs_newline {
            journal.terminate_line()?;
        }

        tracing::debug!(labels = replay.labels.len(), "finished loading label journal");

        Ok(Self {
            path,
            codec,
            config,
            labels: replay.labels,
            stats: replay.stats,
            journal: Some(journal),
        })
    }

    // -- Read Operations ------------------------------------------------------

    /// Label of `example_id`; `KeyNotFound` if it is unlabeled.
    pub fn get(&self, example_id: &str) -> Result<&C::Label> {
        self.labels
            .get(example_id)
            .ok_or_else(|| JournalError::KeyNotFound(example_id.to_string()))
    }

    pub fn has(&self, example_id: &str) -> bool {
        self.labels.contains_key(example_id)
    }

    /// Number of currently labeled examples.
    pub fn count(&self) -> usize {
        self.labels.len()
    }

    /// Labeled examples in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &C::Label)> {
        self.labels.iter().map(|(id, label)| (id.as_str(), label))
    }

    pub fn labels(&self) -> &LabelMap<C::Label> {
        &self.labels
    }

    /// Statistics gathered when the journal was replayed at open.
    pub fn stats(&self) -> &CompactionStats {
        &self.stats
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // -- Write Operations -----------------------------------------------------

    /// Apply changes in order. `None` deletes (absent ids are fine), `Some`
    /// upserts.
    ///
    /// Each change is appended and flushed before the next one starts. There
    /// is no rollback: if change `k` fails, changes `0..k` are already durable
    /// and the error is returned.
    pub fn apply_changes<I, S>(&mut self, changes: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Option<C::Label>)>,
        S: Into<String>,
    {
        let journal = self.journal.as_mut().ok_or(JournalError::JournalClosed)?;
        for (example_id, label) in changes {
            let example_id = example_id.into();
            match label {
                None => {
                    journal.append(&example_id, "")?;
                    self.labels.remove(&example_id);
                }
                Some(label) => {
                    let raw = serialize_checked(&self.codec, &example_id, &label)?;
                    journal.append(&example_id, &raw)?;
                    self.labels.insert(example_id, label);
                }
            }
        }
        Ok(())
    }

    pub fn put(&mut self, example_id: impl Into<String>, label: C::Label) -> Result<()> {
        self.apply_changes([(example_id.into(), Some(label))])
    }

    pub fn delete(&mut self, example_id: impl Into<String>) -> Result<()> {
        self.apply_changes([(example_id.into(), None)])
    }

    /// Rewrite the journal down to one record per label, now.
    pub fn compact(&mut self) -> Result<CompactionResult> {
        let result = compaction::compact(&self.path, &self.labels, &self.codec)?;
        self.reopen_journal()?;
        Ok(result)
    }

    /// Swap in a fresh append handle. The old one points at a replaced file,
    /// so it is dropped first: if the reopen fails, writes fail too.
    fn reopen_journal(&mut self) -> Result<()> {
        self.journal = None;
        self.journal = Some(JournalWriter::open(&self.path, self.config.durability)?);
        Ok(())
    }
}

// -- Tests --------------------------------------------------------------------
