//! # file_log
//!
//! why: the replicated log must survive crashes and restarts
//! relations: implements raft_core::RaftLog, shares the atomic writer in lib.rs
//! what: FileRaftLog, an in-memory copy of the log mirrored to log.jsonl

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use raft_core::log::check_batch_start;
use raft_core::{LogEntry, LogError, LogIndex, RaftLog, Term, NO_INDEX, NO_TERM};

use crate::{invalid_data, remove_stale_temp, write_atomically};

const LOG_FILE: &str = "log.jsonl";

/// file-based raft log
///
/// `log.jsonl` holds one JSON entry per line. Appends write the new lines at
/// the end of the file and sync before returning. Anything that removes
/// entries (truncation, a batch replacing the suffix) rewrites the whole file
/// atomically, so truncate-and-append is all or nothing across a crash.
///
/// Reads are served from memory. If a write fails the in-memory copy is
/// rolled back and the next mutation rewrites the file from memory.
#[derive(Debug)]
pub struct FileRaftLog {
    dir: PathBuf,
    entries: Vec<LogEntry>,
    needs_rewrite: bool,
}

impl FileRaftLog {
    /// open the log at `dir`, recovering any entries written before
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        remove_stale_temp(&dir, LOG_FILE)?;
        let (entries, torn_tail) = read_entries(&dir.join(LOG_FILE))?;
        let mut log = Self {
            dir,
            entries,
            needs_rewrite: false,
        };
        if torn_tail {
            warn!(
                "discarding unfinished append after entry {} in {}",
                log.last_index(),
                log.dir.display()
            );
            log.rewrite()?;
        }
        info!("recovered {} log entries from {}", log.entries.len(), log.dir.display());
        Ok(log)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// all entries, oldest first
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    fn position(&self, index: LogIndex) -> Option<usize> {
        usize::try_from(index)
            .ok()
            .filter(|&pos| pos < self.entries.len())
    }

    fn append_lines(&self, entries: &[LogEntry]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.dir.join(LOG_FILE))?;
        file.write_all(&encode_lines(entries)?)?;
        file.sync_data()
    }

    fn rewrite(&mut self) -> io::Result<()> {
        write_atomically(&self.dir, LOG_FILE, &encode_lines(&self.entries)?)?;
        self.needs_rewrite = false;
        Ok(())
    }

    /// cut the log at `pos`, add `entries`, persist; restore on failure
    fn replace_suffix(&mut self, pos: usize, entries: &[LogEntry]) -> Result<(), LogError> {
        // an empty log may not have its file yet; the rewrite creates it durably
        let appending = pos == self.entries.len() && pos > 0 && !self.needs_rewrite;
        let removed = self.entries.split_off(pos);
        self.entries.extend_from_slice(entries);

        let written = if appending {
            self.append_lines(entries)
        } else {
            self.rewrite()
        };
        if let Err(e) = written {
            self.entries.truncate(pos);
            self.entries.extend(removed);
            self.needs_rewrite = true;
            return Err(e.into());
        }
        if !removed.is_empty() {
            debug!("replaced {} entries from index {pos}", removed.len());
        }
        Ok(())
    }
}

fn encode_lines(entries: &[LogEntry]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut buf, entry).map_err(invalid_data)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Entries from complete lines, and whether an unterminated tail was dropped.
///
/// An append only returns once its trailing newline is on disk, so a last
/// line without one is a write that never finished.
fn read_entries(path: &Path) -> io::Result<(Vec<LogEntry>, bool)> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), false)),
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    let mut lines = contents.split(|byte| *byte == b'\n').peekable();
    while let Some(line) = lines.next() {
        if lines.peek().is_none() {
            return Ok((entries, !line.is_empty()));
        }
        entries.push(serde_json::from_slice(line).map_err(invalid_data)?);
    }
    Ok((entries, false))
}

impl RaftLog for FileRaftLog {
    fn append(&mut self, entry: LogEntry) -> Result<LogIndex, LogError> {
        let pos = self.entries.len();
        self.replace_suffix(pos, std::slice::from_ref(&entry))?;
        Ok(self.last_index())
    }

    fn append_batch(
        &mut self,
        starting_at: LogIndex,
        entries: &[LogEntry],
    ) -> Result<LogIndex, LogError> {
        check_batch_start(starting_at, self.last_index())?;
        self.replace_suffix(starting_at as usize, entries)?;
        Ok(self.last_index())
    }

    fn truncate_from(&mut self, index: LogIndex) -> Result<(), LogError> {
        if index < 0 {
            return Err(LogError::InvalidIndex {
                index,
                last_index: self.last_index(),
            });
        }
        match self.position(index) {
            Some(pos) => self.replace_suffix(pos, &[]),
            None => Ok(()),
        }
    }

    fn entry_at(&self, index: LogIndex) -> Result<LogEntry, LogError> {
        self.position(index)
            .map(|pos| self.entries[pos].clone())
            .ok_or(LogError::NotFound { index })
    }

    fn last_index(&self) -> LogIndex {
        self.entries.len() as LogIndex - 1
    }

    fn term_at(&self, index: LogIndex) -> Result<Term, LogError> {
        if index == NO_INDEX {
            return Ok(NO_TERM);
        }
        self.position(index)
            .map(|pos| self.entries[pos].term)
            .ok_or(LogError::NotFound { index })
    }
}
