//! # raft-storage
//!
//! why: provide durable persistence for raft state using standard rust fs apis
//! relations: implements raft-core's RaftLog and StateStore contracts
//! what: FileRaftLog, FileStateStore, and the atomic json write they share
//!
//! Whole-file writes go to a temp file, are synced, renamed over the live file
//! and the directory is synced. A crash at any point leaves either the previous
//! or the new state on disk, never a mix of the two. The log only takes this
//! path when entries are removed; plain appends go to the end of its file.

mod file_log;
mod file_state;

pub use crate::file_log::FileRaftLog;
pub use crate::file_state::FileStateStore;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// atomic write: write to temp file, sync, then rename over `name`
pub(crate) fn write_json_atomically<T: Serialize + ?Sized>(
    dir: &Path,
    name: &str,
    value: &T,
    pretty: bool,
) -> io::Result<()> {
    let json = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    }
    .map_err(invalid_data)?;
    write_atomically(dir, name, &json)
}

/// atomic write of raw bytes: temp file, sync, rename over `name`, sync dir
pub(crate) fn write_atomically(dir: &Path, name: &str, contents: &[u8]) -> io::Result<()> {
    let temp_path = dir.join(format!("{name}.tmp"));
    let mut file = File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    fs::rename(&temp_path, dir.join(name))?;
    sync_dir(dir)
}

/// read a json file, `None` if it does not exist yet
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&contents)
        .map(Some)
        .map_err(invalid_data)
}

pub(crate) fn invalid_data(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// leftover temp file from a write that never reached its rename
pub(crate) fn remove_stale_temp(dir: &Path, name: &str) -> io::Result<()> {
    match fs::remove_file(dir.join(format!("{name}.tmp"))) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

// the rename itself is only durable once the directory entry is synced
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
