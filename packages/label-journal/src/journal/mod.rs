//! Append-only label journal.
//!
//! On-disk format: UTF-8 text, one record per line, two tab-separated fields
//! (`example_id`, `serialized_label`). An empty second field is a tombstone.
//!
//! ```text
//! img_001\tcat
//! img_002\tdog
//! img_001\t            <- tombstone: img_001 is unlabeled again
//! "a\tb"\tcat          <- quoted because the id contains a tab
//! ```

pub mod codec;
pub mod replay;
pub mod compaction;
pub mod writer;

use std::collections::BTreeMap;

pub use codec::{decode_record, encode_record, write_record, RawRecord, RecordReader};
pub use replay::{replay, replay_str, replay_with, CompactionStats, Replay, ReplayOptions};
pub use compaction::{
    compact, recover_interrupted, should_compact, CompactionResult, RecoveryAction,
    DEFAULT_DUPLICATION_RATIO,
};
pub use writer::{truncate_to, JournalWriter};

/// Current truth: example id -> deserialized label. Unlabeled ids are absent.
pub type LabelMap<L> = BTreeMap<String, L>;
