//! Filesystem layout manager.
//!
//! Owns a storage root with this layout:
//!
//! ```text
//! <root>/instance            # uuid + format version, written once
//! <root>/consensus-meta/<tablet_id>
//! <root>/tablet-meta/<tablet_id>
//! ```
//!
//! All metadata writes go through [`FsManager::atomic_write`], which never
//! publishes a torn record: readers see either the prior version or the new
//! one.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::ids::TabletId;

const INSTANCE_FILE: &str = "instance";
const CONSENSUS_META_DIR: &str = "consensus-meta";
const TABLET_META_DIR: &str = "tablet-meta";
const DATA_DIR: &str = "data";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
struct InstanceRecord {
    format_version: u32,
    uuid: String,
}

/// Manager for one storage root. Cheap to clone behind an Arc; all writes
/// are atomic rename-into-place.
#[derive(Debug)]
pub struct FsManager {
    root: PathBuf,
    uuid: String,
}

impl FsManager {
    /// Initializes a fresh storage root. Fails with AlreadyPresent if the
    /// root was initialized before.
    pub fn create_new(root: impl AsRef<Path>) -> Result<FsManager> {
        let root = root.as_ref().to_path_buf();
        let instance_path = root.join(INSTANCE_FILE);
        if instance_path.exists() {
            return Err(TesseraError::already_present(format!(
                "storage root '{}' is already initialized",
                root.display()
            )));
        }
        fs::create_dir_all(root.join(CONSENSUS_META_DIR))?;
        fs::create_dir_all(root.join(TABLET_META_DIR))?;
        fs::create_dir_all(root.join(DATA_DIR))?;

        let record = InstanceRecord {
            format_version: FORMAT_VERSION,
            uuid: uuid::Uuid::new_v4().to_string(),
        };
        let bytes = bincode::encode_to_vec(&record, bincode::config::standard())?;
        let fs_manager = FsManager {
            root,
            uuid: record.uuid,
        };
        fs_manager.atomic_write(&instance_path, &bytes)?;
        log::info!(
            "Initialized storage root {} with uuid {}",
            fs_manager.root.display(),
            fs_manager.uuid
        );
        Ok(fs_manager)
    }

    /// Opens an existing storage root.
    ///
    /// Fails with NotFound if the root was never initialized, Corruption if
    /// the instance record does not decode, and IllegalState on a format
    /// version mismatch (the catalog does not migrate itself).
    pub fn open(root: impl AsRef<Path>) -> Result<FsManager> {
        let root = root.as_ref().to_path_buf();
        let instance_path = root.join(INSTANCE_FILE);
        let bytes = read_file(&instance_path).map_err(|e| {
            e.prepend(format!(
                "unable to read instance record from '{}'",
                root.display()
            ))
        })?;
        let (record, _): (InstanceRecord, _) =
            bincode::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| TesseraError::corruption(format!("bad instance record: {}", e)))?;
        if record.format_version != FORMAT_VERSION {
            return Err(TesseraError::illegal_state(format!(
                "storage root '{}' has format version {}, expected {}",
                root.display(),
                record.format_version,
                FORMAT_VERSION
            )));
        }
        Ok(FsManager {
            root,
            uuid: record.uuid,
        })
    }

    /// Opens the root if initialized, otherwise creates it.
    pub fn open_or_create(root: impl AsRef<Path>) -> Result<FsManager> {
        if root.as_ref().join(INSTANCE_FILE).exists() {
            FsManager::open(root)
        } else {
            FsManager::create_new(root)
        }
    }

    /// The stable identity of this filesystem instance.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn consensus_metadata_path(&self, tablet_id: &TabletId) -> PathBuf {
        self.root.join(CONSENSUS_META_DIR).join(tablet_id.as_str())
    }

    pub fn tablet_metadata_path(&self, tablet_id: &TabletId) -> PathBuf {
        self.root.join(TABLET_META_DIR).join(tablet_id.as_str())
    }

    pub fn data_block_path(&self, block_id: &str) -> PathBuf {
        self.root.join(DATA_DIR).join(block_id)
    }

    /// Writes `bytes` to `path` atomically: temp file in the same directory,
    /// fsync, rename into place, fsync the directory.
    pub fn atomic_write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            TesseraError::invalid_argument(format!("path '{}' has no parent", path.display()))
        })?;
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("meta")
        ));
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&tmp_path, path)?;
        fsync_dir(parent)?;
        Ok(())
    }
}

/// Reads a whole file, mapping a missing file to NotFound.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TesseraError::not_found(format!("'{}'", path.display()))
        } else {
            TesseraError::from(e)
        }
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn fsync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}
