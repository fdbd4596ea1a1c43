//! labext-journal - persistent label storage for notebook annotators
//!
//! Labels are kept in an append-only, tab-delimited journal. Every mutation
//! is appended synchronously; the in-memory label map is rebuilt by replaying
//! the journal on open, and the journal is compacted when it has accumulated
//! too many superseded writes.
//!
//! ```no_run
//! use labext_journal::{LabelStore, RawCodec};
//!
//! let mut store = LabelStore::open("labels.tsv", RawCodec).unwrap();
//! store.put("example-1", "positive".to_string()).unwrap();
//! assert!(store.has("example-1"));
//! ```

pub mod error;
pub mod journal;
pub mod label;
pub mod store;
pub mod navigation;
pub mod annotator;
pub mod tunnel;

pub use error::{JournalError, Result};
pub use journal::{
    compact, replay, should_compact, CompactionResult, CompactionStats, LabelMap,
    DEFAULT_DUPLICATION_RATIO,
};
pub use label::{ClassIdCodec, JsonCodec, LabelCodec, RawCodec};
pub use store::{Durability, LabelStore, StoreConfig};
pub use navigation::{Cursor, Example, TextExample};
pub use annotator::{Annotator, AnnotatorOptions, KeyEvent, Progress, UiEvent};
pub use tunnel::{ChannelTunnel, Envelope, Message, RecordingTunnel, Tunnel, TunnelRecord, Versioned};
