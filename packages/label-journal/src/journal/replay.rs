//! Journal replay: rebuild the label map from the full log.
//!
//! Single pass in file order, last write wins, a tombstone removes. An id
//! that is tombstoned and then written again is live; only ids whose final
//! record is a tombstone are absent after replay.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;

use crate::error::{JournalError, Result};
use crate::journal::codec::RecordReader;
use crate::journal::LabelMap;
use crate::label::LabelCodec;

/// Duplicate-write statistics gathered once per load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompactionStats {
    /// Records applied during replay (a dropped torn tail is not counted).
    pub total_records_replayed: usize,
    /// Ids seen in the journal, live or tombstoned.
    pub distinct_keys: usize,
    /// Records that overwrote or deleted an id seen earlier.
    pub duplicate_writes: usize,
    /// A torn trailing record was dropped.
    pub truncated_tail: bool,
}

impl CompactionStats {
    /// `duplicate_writes / distinct_keys`, or 0.0 for an empty journal.
    pub fn duplication_ratio(&self) -> f64 {
        if self.distinct_keys == 0 {
            return 0.0;
        }
        self.duplicate_writes as f64 / self.distinct_keys as f64
    }
}

/// Replay strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Drop an unterminated final record (a crash mid-append) and report
    /// `truncated_tail`. When false, such a record is applied if it decodes,
    /// for journals written by other tools; malformed records elsewhere are
    /// always fatal.
    pub tolerate_torn_tail: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            tolerate_torn_tail: true,
        }
    }
}

/// Full replay outcome.
#[derive(Debug, Clone)]
pub struct Replay<L> {
    pub labels: LabelMap<L>,
    pub stats: CompactionStats,
    /// Byte length of the well-formed prefix of the journal.
    pub valid_len: u64,
    /// The last accepted record has no trailing newline. Only possible when
    /// torn tails are not tolerated.
    pub needs_newline: bool,
    /// The journal file was present.
    pub existed: bool,
}

impl<L> Replay<L> {
    fn empty() -> Self {
        Self {
            labels: BTreeMap::new(),
            stats: CompactionStats::default(),
            valid_len: 0,
            needs_newline: false,
            existed: false,
        }
    }
}

/// Replay `path` into a label map. A missing file is an empty journal.
pub fn replay<C: LabelCodec>(
    path: impl AsRef<Path>,
    codec: &C,
) -> Result<(LabelMap<C::Label>, CompactionStats)> {
    let replay = replay_with(path, codec, ReplayOptions::default())?;
    Ok((replay.labels, replay.stats))
}

pub fn replay_with<C: LabelCodec>(
    path: impl AsRef<Path>,
    codec: &C,
    options: ReplayOptions,
) -> Result<Replay<C::Label>> {
    let path = path.as_ref();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Replay::empty()),
        Err(e) => return Err(e.into()),
    };

    // A crash mid-append can split a multi-byte character at the very end.
    let (text, torn_bytes) = match std::str::from_utf8(&bytes) {
        Ok(text) => (text, false),
        Err(e) if e.error_len().is_none() => {
            let valid = &bytes[..e.valid_up_to()];
            (std::str::from_utf8(valid).unwrap_or_default(), true)
        }
        Err(e) => {
            let line = bytes[..e.valid_up_to()].iter().filter(|&&b| b == b'\n').count() + 1;
            return Err(JournalError::malformed(line, "invalid UTF-8"));
        }
    };

    let mut replay = replay_text(text, torn_bytes, codec, options)?;
    replay.existed = true;
    Ok(replay)
}

/// Replay an in-memory journal buffer.
pub fn replay_str<C: LabelCodec>(
    text: &str,
    codec: &C,
    options: ReplayOptions,
) -> Result<Replay<C::Label>> {
    replay_text(text, false, codec, options)
}

fn replay_text<C: LabelCodec>(
    text: &str,
    torn_bytes: bool,
    codec: &C,
    options: ReplayOptions,
) -> Result<Replay<C::Label>> {
    // None marks a pending tombstone; swept after the scan.
    let mut working: BTreeMap<String, Option<C::Label>> = BTreeMap::new();
    let mut stats = CompactionStats::default();
    let mut valid_len = 0usize;
    let mut needs_newline = false;

    let mut records = RecordReader::new(text).peekable();
    while let Some(record) = records.next() {
        let at_tail = records.peek().is_none() && !record.terminated;

        // Every append ends in a newline, so an unterminated last record is
        // torn even when it happens to decode (`id\t` would read as a
        // tombstone, `id\tpos` as a label nobody chose).
        if at_tail && (torn_bytes || options.tolerate_torn_tail) {
            if !options.tolerate_torn_tail {
                return Err(JournalError::malformed(record.line, "truncated record"));
            }
            tracing::warn!(line = record.line, "dropping unterminated journal tail");
            stats.truncated_tail = true;
            break;
        }

        decode_and_apply(record.outcome, codec, &mut working, &mut stats)?;
        valid_len = record.end;
        needs_newline = !record.terminated;
    }

    if torn_bytes && !stats.truncated_tail {
        // Only the split bytes of a new record made it to disk.
        if !options.tolerate_torn_tail {
            let line = text.bytes().filter(|&b| b == b'\n').count() + 1;
            return Err(JournalError::malformed(line, "truncated record"));
        }
        tracing::warn!("dropping partial journal record");
        stats.truncated_tail = true;
    }

    stats.distinct_keys = working.len();
    let labels: LabelMap<C::Label> = working
        .into_iter()
        .filter_map(|(id, label)| label.map(|label| (id, label)))
        .collect();

    tracing::debug!(
        records = stats.total_records_replayed,
        live = labels.len(),
        distinct = stats.distinct_keys,
        duplicates = stats.duplicate_writes,
        "journal replayed"
    );

    Ok(Replay {
        labels,
        stats,
        valid_len: valid_len as u64,
        needs_newline,
        existed: false,
    })
}

fn decode_and_apply<C: LabelCodec>(
    outcome: Result<(String, String)>,
    codec: &C,
    working: &mut BTreeMap<String, Option<C::Label>>,
    stats: &mut CompactionStats,
) -> Result<()> {
    let (id, field) = outcome?;
    let label = if field.is_empty() {
        None
    } else {
        Some(codec.deserialize(&field)?)
    };

    stats.total_records_replayed += 1;
    if working.insert(id, label).is_some() {
        stats.duplicate_writes += 1;
    }
    Ok(())
}

// -- Tests --------------------------------------------------------------------
