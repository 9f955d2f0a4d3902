//! Durable consensus metadata: the committed quorum and term for one tablet.
//!
//! Created once at first bootstrap, loaded at every startup, and re-flushed
//! whenever the committed quorum changes. Flushes go through the atomic
//! write path, so a reader sees either the prior record or the new one,
//! never a torn one.

use crate::quorum::Quorum;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::ids::TabletId;
use tessera_store::fs_manager::{read_file, FsManager};

/// The lowest possible term; used when creating a tablet's first record.
pub const MINIMUM_TERM: u64 = 0;

#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
struct ConsensusMetaRecord {
    committed_quorum: Quorum,
    current_term: u64,
}

/// Durable record of the committed quorum for one tablet.
///
/// Flushes are single-writer: the tablet's bootstrap path owns this
/// exclusively.
#[derive(Debug)]
pub struct ConsensusMeta {
    fs: Arc<FsManager>,
    tablet_id: TabletId,
    record: ConsensusMetaRecord,
}

impl ConsensusMeta {
    /// Initializes and flushes the record for a new tablet.
    pub fn create(
        fs: Arc<FsManager>,
        tablet_id: TabletId,
        committed_quorum: Quorum,
        current_term: u64,
    ) -> Result<ConsensusMeta> {
        let cmeta = ConsensusMeta {
            fs,
            tablet_id,
            record: ConsensusMetaRecord {
                committed_quorum,
                current_term,
            },
        };
        cmeta.flush()?;
        Ok(cmeta)
    }

    /// Loads the record for an existing tablet. NotFound if it was never
    /// created, Corruption if it does not decode.
    pub fn load(fs: Arc<FsManager>, tablet_id: TabletId) -> Result<ConsensusMeta> {
        let path = fs.consensus_metadata_path(&tablet_id);
        let bytes = read_file(&path).map_err(|e| {
            e.prepend(format!(
                "unable to load consensus metadata for tablet {}",
                tablet_id
            ))
        })?;
        let (record, _): (ConsensusMetaRecord, _) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).map_err(|e| {
                TesseraError::corruption(format!(
                    "bad consensus metadata record for tablet {}: {}",
                    tablet_id, e
                ))
            })?;
        Ok(ConsensusMeta {
            fs,
            tablet_id,
            record,
        })
    }

    /// Atomically persists the in-memory state.
    pub fn flush(&self) -> Result<()> {
        let bytes = bincode::encode_to_vec(&self.record, bincode::config::standard())?;
        let path = self.fs.consensus_metadata_path(&self.tablet_id);
        self.fs
            .atomic_write(&path, &bytes)
            .map_err(|e| e.prepend("unable to flush consensus metadata"))
    }

    pub fn tablet_id(&self) -> &TabletId {
        &self.tablet_id
    }

    pub fn committed_quorum(&self) -> &Quorum {
        &self.record.committed_quorum
    }

    /// Replaces the in-memory quorum. Not durable until [`ConsensusMeta::flush`].
    pub fn set_committed_quorum(&mut self, quorum: Quorum) {
        self.record.committed_quorum = quorum;
    }

    pub fn current_term(&self) -> u64 {
        self.record.current_term
    }

    pub fn set_current_term(&mut self, term: u64) {
        self.record.current_term = term;
    }
}
