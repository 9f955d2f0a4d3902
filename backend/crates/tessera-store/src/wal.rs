//! Minimal write-ahead log for a hosted tablet.
//!
//! Committed write batches are appended as length-prefixed bincode records
//! and fsynced before the write is acknowledged. At bootstrap the log is
//! replayed in order to rebuild the in-memory row store. A torn tail record
//! (crash mid-append) is dropped; everything before it is intact.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::rpc::WriteRequest;

/// Append-only log of committed write batches for one tablet.
pub struct WriteAheadLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl WriteAheadLog {
    /// Opens the log at `path` for appending, creating it (and its parent
    /// directory) if needed.
    pub fn open(path: PathBuf) -> Result<WriteAheadLog> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        Ok(WriteAheadLog {
            path,
            file: Mutex::new(file),
        })
    }

    /// Appends one batch and fsyncs. The batch is durable once this returns.
    pub fn append(&self, req: &WriteRequest) -> Result<()> {
        let bytes = bincode::encode_to_vec(req, bincode::config::standard())?;
        let mut file = self.file.lock();
        file.write_all(&(bytes.len() as u32).to_le_bytes())?;
        file.write_all(&bytes)?;
        file.sync_data()?;
        Ok(())
    }

    /// Reads every intact record from the start of the log.
    ///
    /// A truncated record at the tail is dropped with a warning; a corrupt
    /// record in the middle is an error.
    pub fn replay(&self) -> Result<Vec<WriteRequest>> {
        let mut reader = File::open(&self.path)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let mut batches = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            if pos + 4 > data.len() {
                log::warn!(
                    "Dropping torn record at offset {} of log {}",
                    pos,
                    self.path.display()
                );
                break;
            }
            let len = u32::from_le_bytes(data[pos..pos + 4].try_into().expect("4 bytes"))
                as usize;
            pos += 4;
            if pos + len > data.len() {
                log::warn!(
                    "Dropping torn record at offset {} of log {}",
                    pos - 4,
                    self.path.display()
                );
                break;
            }
            let (req, _): (WriteRequest, _) =
                bincode::decode_from_slice(&data[pos..pos + len], bincode::config::standard())
                    .map_err(|e| {
                        TesseraError::corruption(format!(
                            "bad record at offset {} of log {}: {}",
                            pos - 4,
                            self.path.display(),
                            e
                        ))
                    })?;
            batches.push(req);
            pos += len;
        }
        Ok(batches)
    }
}
