//! Batched log relay.
//!
//! Output is buffered per container and log name and shipped to the
//! control API once a batch is big enough or old enough. A batch that
//! fails to send stays buffered for the next flush.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::Instant;

use corral_core::Name;

use crate::client::{ClientError, ControlApi};

/// Log name for init-script output.
pub const INIT_LOG: &str = "init";
/// Log name for the container console.
pub const CONSOLE_LOG: &str = "console";

#[derive(Debug)]
struct Batch {
    data: Vec<u8>,
    since: Instant,
}

/// Buffers log output until it is worth sending.
#[derive(Debug)]
pub struct LogRelay {
    batches: Mutex<BTreeMap<(Name, String), Batch>>,
    flush_bytes: usize,
    flush_after: Duration,
}

impl LogRelay {
    /// Create a relay flushing at `flush_bytes` or after `flush_after`.
    #[must_use]
    pub fn new(flush_bytes: usize, flush_after: Duration) -> Self {
        Self {
            batches: Mutex::new(BTreeMap::new()),
            flush_bytes,
            flush_after,
        }
    }

    /// Buffer `data` for a container's log.
    pub fn push(&self, container: &Name, log: &str, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.batches
            .lock()
            .entry((container.clone(), log.to_string()))
            .or_insert_with(|| Batch {
                data: Vec::new(),
                since: Instant::now(),
            })
            .data
            .extend_from_slice(data);
    }

    /// Bytes buffered and not yet sent.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.batches.lock().values().map(|b| b.data.len()).sum()
    }

    /// Send every batch that is due, or all of them if `force` is set.
    ///
    /// Returns the number of batches sent.
    ///
    /// # Errors
    ///
    /// Returns the first send error. The failed batch and everything not
    /// yet attempted stay buffered.
    pub async fn flush(&self, api: &dyn ControlApi, force: bool) -> Result<usize, ClientError> {
        let due: Vec<((Name, String), Batch)> = {
            let mut batches = self.batches.lock();
            let keys: Vec<_> = batches
                .iter()
                .filter(|(_, b)| {
                    force || b.data.len() >= self.flush_bytes || b.since.elapsed() >= self.flush_after
                })
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| batches.remove(&k).map(|b| (k, b)))
                .collect()
        };

        let mut sent = 0;
        let mut due = due.into_iter();
        while let Some(((container, log), batch)) = due.next() {
            if let Err(e) = api.append_log(&container, &log, batch.data.clone()).await {
                tracing::warn!(container = %container, log = %log, error = %e, "Log relay failed, keeping batch");
                self.restore((container, log), batch);
                for (key, batch) in due {
                    self.restore(key, batch);
                }
                return Err(e);
            }
            sent += 1;
        }
        Ok(sent)
    }

    /// Put an unsent batch back in front of anything pushed meanwhile.
    fn restore(&self, key: (Name, String), mut batch: Batch) {
        let mut batches = self.batches.lock();
        if let Some(newer) = batches.remove(&key) {
            batch.data.extend_from_slice(&newer.data);
        }
        batches.insert(key, batch);
    }

    /// Buffer whatever was appended to `path` after `offset`.
    ///
    /// Returns the new offset. A file shorter than `offset` was rotated and
    /// is read from the start.
    ///
    /// # Errors
    ///
    /// Returns I/O errors other than a missing file.
    pub async fn tail_file(
        &self,
        container: &Name,
        log: &str,
        path: &Path,
        offset: u64,
    ) -> std::io::Result<u64> {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(offset),
            Err(e) => return Err(e),
        };
        let len = file.metadata().await?.len();
        let start = if len < offset { 0 } else { offset };
        if len == start {
            return Ok(start);
        }

        file.seek(SeekFrom::Start(start)).await?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;
        self.push(container, log, &data);
        Ok(start + data.len() as u64)
    }
}
