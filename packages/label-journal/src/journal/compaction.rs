//! Journal compaction.
//!
//! Rewrites the journal so it holds exactly one record per live label:
//! 1. write every entry to `<path>.tmp` and fsync it
//! 2. rename `<path>` -> `<path>.backup`
//! 3. rename `<path>.tmp` -> `<path>`
//! 4. remove `<path>.backup`
//!
//! A crash between any two steps leaves at least one complete copy on disk;
//! `recover_interrupted()` puts things back in order on the next open.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::Result;
use crate::journal::codec::write_record;
use crate::journal::replay::CompactionStats;
use crate::journal::LabelMap;
use crate::label::{serialize_checked, LabelCodec};

/// Compact when more than this share of replayed writes were superseded.
pub const DEFAULT_DUPLICATION_RATIO: f64 = 0.2;

// ── Policy ──────────────────────────────────────────────────────────

/// Open-time compaction policy.
///
/// True for an empty journal, or when `duplicate_writes / distinct_keys`
/// exceeds `ratio`.
pub fn should_compact(stats: &CompactionStats, ratio: f64) -> bool {
    stats.distinct_keys == 0 || stats.duplication_ratio() > ratio
}

// ── Paths ───────────────────────────────────────────────────────────

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub fn tmp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".backup")
}

// ── Compact ─────────────────────────────────────────────────────────

/// Result of a compaction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// Records in the rewritten journal
    pub records_written: usize,
    /// Size of the rewritten journal
    pub bytes_written: u64,
    /// Compaction duration in milliseconds
    pub duration_ms: u64,
}

/// Replace the journal at `path` with one record per entry of `labels`.
///
/// Entries are written in key order, so compacting the same map twice
/// produces byte-identical files.
pub fn compact<C: LabelCodec>(
    path: impl AsRef<Path>,
    labels: &LabelMap<C::Label>,
    codec: &C,
) -> Result<CompactionResult> {
    let path = path.as_ref();
    let start = Instant::now();
    let tmp = tmp_path(path);
    let backup = backup_path(path);

    // Serialize everything up front so a codec error never leaves a tmp file.
    let mut records = Vec::with_capacity(labels.len());
    for (id, label) in labels {
        records.push((id.as_str(), serialize_checked(codec, id, label)?));
    }

    let mut writer = BufWriter::new(File::create(&tmp)?);
    for (id, raw) in &records {
        write_record(&mut writer, id, raw)?;
    }
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    let bytes_written = file.metadata()?.len();
    drop(file);

    let had_original = path.exists();
    if had_original {
        fs::rename(path, &backup)?;
    }
    fs::rename(&tmp, path)?;
    sync_parent(path)?;
    if had_original {
        fs::remove_file(&backup)?;
    }

    let result = CompactionResult {
        records_written: records.len(),
        bytes_written,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    tracing::debug!(
        path = %path.display(),
        records = result.records_written,
        bytes = result.bytes_written,
        "journal compacted"
    );
    Ok(result)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}

// ── Recovery ────────────────────────────────────────────────────────

/// What `recover_interrupted()` found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing left over from an earlier compaction.
    Clean,
    /// Crash after step 2: the backup was moved back into place.
    RestoredBackup,
    /// Crash after step 3: the stale backup was removed.
    RemovedBackup,
    /// Crash during step 1: the partial tmp file was removed.
    RemovedTmp,
}

/// Finish or roll back a compaction that was interrupted by a crash.
pub fn recover_interrupted(path: impl AsRef<Path>) -> Result<RecoveryAction> {
    let path = path.as_ref();
    let tmp = tmp_path(path);
    let backup = backup_path(path);
    let mut action = RecoveryAction::Clean;

    if backup.exists() {
        if path.exists() {
            tracing::warn!(backup = %backup.display(), "removing backup left by interrupted compaction");
            fs::remove_file(&backup)?;
            action = RecoveryAction::RemovedBackup;
        } else {
            tracing::warn!(backup = %backup.display(), "restoring journal from compaction backup");
            fs::rename(&backup, path)?;
            action = RecoveryAction::RestoredBackup;
        }
    }

    if tmp.exists() {
        tracing::warn!(tmp = %tmp.display(), "removing partial compaction output");
        fs::remove_file(&tmp)?;
        if action == RecoveryAction::Clean {
            action = RecoveryAction::RemovedTmp;
        }
    }

    Ok(action)
}

// ── Tests ──────────────────────────────────────────────────────────
