//! Append handle for the journal.
//!
//! One writer per journal: the owning store is the only code that appends.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::journal::codec::encode_record;
use crate::store::Durability;

pub struct JournalWriter {
    path: PathBuf,
    file: File,
    durability: Durability,
    records_appended: u64,
}

impl JournalWriter {
    /// Open `path` for appending, creating it if missing.
    pub fn open(path: impl AsRef<Path>, durability: Durability) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            durability,
            records_appended: 0,
        })
    }

    /// Append one record and make it durable before returning.
    ///
    /// The whole line goes out in a single write so a crash can only ever
    /// leave a torn tail, never an interleaved record.
    pub fn append(&mut self, example_id: &str, field: &str) -> Result<()> {
        let mut line = encode_record(example_id, field);
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.sync()?;
        self.records_appended += 1;
        Ok(())
    }

    /// Terminate an unterminated last line so the next record starts fresh.
    pub fn terminate_line(&mut self) -> Result<()> {
        self.file.write_all(b"\n")?;
        self.sync()
    }

    fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        if self.durability == Durability::Sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn records_appended(&self) -> u64 {
        self.records_appended
    }
}

/// Cut the journal back to its well-formed prefix.
pub fn truncate_to(path: impl AsRef<Path>, len: u64) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path.as_ref())?;
    file.set_len(len)?;
    file.sync_all()?;
    Ok(())
}

// -- Tests --------------------------------------------------------------------
