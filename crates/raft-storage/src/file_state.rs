//! # file_state
//!
//! why: persist term and vote so a restarted node never votes twice in a term
//! relations: implements raft_core::StateStore, shares the atomic writer in lib.rs
//! what: FileStateStore backed by meta.json

use std::fs;
use std::io;
use std::path::PathBuf;

use log::debug;
use raft_core::{MemberId, StateStore, Term};
use serde::{Deserialize, Serialize};

use crate::{read_json, remove_stale_temp, write_json_atomically};

const META_FILE: &str = "meta.json";

/// metadata structure for term and vote
#[derive(Serialize, Deserialize, Default)]
struct MetaData {
    term: Term,
    voted_for: Option<MemberId>,
}

/// file-based term/vote store
///
/// stores `meta.json` in the given directory
#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// open the store at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        remove_stale_temp(&dir, META_FILE)?;
        Ok(Self { dir })
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }
}

impl StateStore for FileStateStore {
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<MemberId>) -> io::Result<()> {
        debug!("saving term {term} vote {voted_for:?} to {}", self.dir.display());
        write_json_atomically(&self.dir, META_FILE, &MetaData { term, voted_for }, true)
    }

    fn load_term_and_vote(&self) -> io::Result<(Term, Option<MemberId>)> {
        let meta: MetaData = read_json(&self.meta_path())?.unwrap_or_default();
        Ok((meta.term, meta.voted_for))
    }
}
