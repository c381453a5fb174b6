// Write-ahead log for the record store.
//
// Record layout (little-endian):
// ┌────────────┬────────────┬───────────┐
// │ u32 len    │ u32 crc32  │ payload…  │
// └────────────┴────────────┴───────────┘
// - `len`    : number of bytes in payload
// - `crc32`  : checksum of payload for corruption detection
//
// A sealed (rotated) file ends with a trailer: a `u32::MAX` length marker
// followed by a u64 rolling hash folding every record's checksum. The
// current file carries no trailer; after a hard kill its tail may be torn,
// which recovery tolerates.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crc32fast::Hasher;
use parking_lot::{Condvar, Mutex};
use tracing::{error, info};

use crate::delta::StateDelta;
use crate::error::{StorageError, StorageResult, WalError};

const HEADER_SIZE: usize = 8; // 4 bytes length + 4 bytes crc32
const TRAILER_MARK: u32 = u32::MAX;
const RING_CAPACITY: usize = 1 << 14;

/// Name of the file currently being appended to.
pub const CURRENT_FILE: &str = "wal-current.bin";

fn rolling_step(hash: u64, len: u32, crc: u32) -> u64 {
    hash.rotate_left(7) ^ (((len as u64) << 32) | crc as u64)
}

#[derive(Debug, Clone)]
pub struct WalConfig {
    pub directory: PathBuf,
    pub enabled: bool,
    pub synchronous_commit: bool,
    pub flush_interval: Duration,
    pub rotate_deltas_count: usize,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("durability"),
            enabled: true,
            synchronous_commit: true,
            flush_interval: Duration::from_millis(100),
            rotate_deltas_count: 100_000,
        }
    }
}

struct WalFile {
    writer: BufWriter<File>,
    path: PathBuf,
    deltas: usize,
    rolling_hash: u64,
    /// Highest transaction id of any delta in the file; names the file at
    /// rotation.
    latest_tx: u64,
}

impl WalFile {
    fn open(path: PathBuf) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .read(true)
            .open(&path)?;
        file.seek(SeekFrom::End(0))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            deltas: 0,
            rolling_hash: 0,
            latest_tx: 0,
        })
    }

    /// Appends one length-prefixed record. On a write failure the file is
    /// truncated back so a partial record never persists.
    fn append(&mut self, delta: &StateDelta) -> Result<(), WalError> {
        let payload = postcard::to_allocvec(delta)
            .map_err(|e| WalError::SerializationFailed(e.to_string()))?;
        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let checksum = hasher.finalize();
        let len = payload.len() as u32;

        let original_pos = self.writer.stream_position()?;
        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&checksum.to_le_bytes());
        data.extend_from_slice(&payload);
        if let Err(e) = self.writer.write_all(&data) {
            self.writer.seek(SeekFrom::Start(original_pos))?;
            self.writer.get_ref().set_len(original_pos)?;
            return Err(WalError::Io(e));
        }
        self.rolling_hash = rolling_step(self.rolling_hash, len, checksum);
        self.deltas += 1;
        self.latest_tx = self.latest_tx.max(delta.tx().raw());
        Ok(())
    }

    fn sync(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Writes the hash trailer, syncs and renames the file to its final
    /// `wal-<latest_tx_id>.bin` name.
    fn seal(mut self) -> Result<(), WalError> {
        self.writer.write_all(&TRAILER_MARK.to_le_bytes())?;
        self.writer.write_all(&self.rolling_hash.to_le_bytes())?;
        self.sync()?;
        let sealed = self
            .path
            .with_file_name(format!("wal-{}.bin", self.latest_tx));
        fs::rename(&self.path, &sealed)?;
        info!(file = %sealed.display(), deltas = self.deltas, "sealed WAL file");
        Ok(())
    }
}

struct WalInner {
    config: WalConfig,
    buffer: Mutex<VecDeque<StateDelta>>,
    space: Condvar,
    file: Mutex<Option<WalFile>>,
    enabled: AtomicBool,
    poisoned: AtomicBool,
    shutdown: AtomicBool,
}

/// The write-ahead log: a bounded in-memory ring of deltas drained to disk
/// by a flusher thread, with synchronous flushing of transaction ends when
/// synchronous commit is on.
pub struct Wal {
    inner: Arc<WalInner>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl Wal {
    pub fn new(config: WalConfig) -> StorageResult<Self> {
        let file = if config.enabled {
            Some(WalFile::open(config.directory.join(CURRENT_FILE)).map_err(StorageError::Wal)?)
        } else {
            None
        };
        let enabled = config.enabled;
        let inner = Arc::new(WalInner {
            config,
            buffer: Mutex::new(VecDeque::new()),
            space: Condvar::new(),
            file: Mutex::new(file),
            enabled: AtomicBool::new(enabled),
            poisoned: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });
        Ok(Self {
            inner,
            flusher: Mutex::new(None),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.inner.config.directory
    }

    pub fn is_poisoned(&self) -> bool {
        self.inner.poisoned.load(Ordering::Acquire)
    }

    /// Recovery turns emission off while replaying so replayed mutations do
    /// not re-log themselves.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner
            .enabled
            .store(enabled && self.inner.config.enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Enqueues a delta. Blocks while the ring is full (back-pressure).
    ///
    /// When the delta ends a transaction and synchronous commit is on, the
    /// ring is drained and the file synced before returning, so a commit
    /// acknowledgement implies durability.
    pub fn emplace(&self, delta: StateDelta) -> StorageResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        if self.is_poisoned() {
            return Err(StorageError::WalWriteFailure);
        }
        let synchronous = self.inner.config.synchronous_commit && delta.is_transaction_end();
        {
            let mut buffer = self.inner.buffer.lock();
            while buffer.len() >= RING_CAPACITY {
                if self.is_poisoned() {
                    return Err(StorageError::WalWriteFailure);
                }
                let _ = self
                    .inner
                    .space
                    .wait_for(&mut buffer, Duration::from_millis(100));
            }
            buffer.push_back(delta);
        }
        if synchronous {
            self.flush()?;
        }
        Ok(())
    }

    /// Drains the ring to the file, syncs, and rotates at a safe point.
    pub fn flush(&self) -> StorageResult<()> {
        if !self.inner.config.enabled {
            return Ok(());
        }
        // The file lock is taken before draining so two concurrent flushes
        // cannot interleave their batches out of ring order.
        let mut file_slot = self.inner.file.lock();
        let drained: Vec<StateDelta> = {
            let mut buffer = self.inner.buffer.lock();
            let drained = buffer.drain(..).collect();
            self.inner.space.notify_all();
            drained
        };
        let result = self.write_out(&mut file_slot, drained);
        if let Err(e) = &result {
            self.inner.poisoned.store(true, Ordering::Release);
            error!(error = %e, "WAL write failed; refusing further commits");
        }
        result
    }

    fn write_out(
        &self,
        file_slot: &mut Option<WalFile>,
        drained: Vec<StateDelta>,
    ) -> StorageResult<()> {
        if drained.is_empty() {
            if let Some(file) = file_slot.as_mut() {
                file.sync().map_err(StorageError::Wal)?;
            }
            return Ok(());
        }
        for delta in &drained {
            let file = file_slot
                .as_mut()
                .expect("WAL file is open while durability is enabled");
            file.append(delta).map_err(StorageError::Wal)?;
            // Rotate only on a transaction end so no transaction is torn
            // across files while a safe point exists.
            if file.deltas >= self.inner.config.rotate_deltas_count && delta.is_transaction_end()
            {
                file.sync().map_err(StorageError::Wal)?;
                let full = file_slot.take().expect("checked above");
                full.seal().map_err(StorageError::Wal)?;
                *file_slot = Some(
                    WalFile::open(self.inner.config.directory.join(CURRENT_FILE))
                        .map_err(StorageError::Wal)?,
                );
            }
        }
        if let Some(file) = file_slot.as_mut() {
            file.sync().map_err(StorageError::Wal)?;
        }
        Ok(())
    }

    /// Starts the periodic flusher thread.
    pub fn start_flusher(self: &Arc<Self>) {
        let mut slot = self.flusher.lock();
        if slot.is_some() || !self.inner.config.enabled {
            return;
        }
        let wal = Arc::clone(self);
        let interval = self.inner.config.flush_interval;
        *slot = Some(std::thread::spawn(move || {
            while !wal.inner.shutdown.load(Ordering::Acquire) {
                std::thread::sleep(interval);
                let _ = wal.flush();
            }
        }));
    }

    /// Stops the flusher and performs a final drain.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
        let _ = self.flush();
    }
}

/// WAL files in replay order: sealed files sorted by the transaction id in
/// their name, then the current file.
pub fn wal_files(directory: &Path) -> io::Result<Vec<PathBuf>> {
    let mut sealed: Vec<(u64, PathBuf)> = Vec::new();
    let mut current = None;
    if !directory.exists() {
        return Ok(Vec::new());
    }
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == CURRENT_FILE {
            current = Some(path);
        } else if let Some(tx) = name
            .strip_prefix("wal-")
            .and_then(|rest| rest.strip_suffix(".bin"))
            .and_then(|tx| tx.parse::<u64>().ok())
        {
            sealed.push((tx, path));
        }
    }
    sealed.sort_by_key(|(tx, _)| *tx);
    let mut files: Vec<PathBuf> = sealed.into_iter().map(|(_, path)| path).collect();
    files.extend(current);
    Ok(files)
}

/// Streaming reader over one WAL file, verifying per-record checksums and
/// the trailer when one is present.
pub struct WalReader {
    reader: BufReader<File>,
    rolling_hash: u64,
    done: bool,
}

impl WalReader {
    pub fn open(path: &Path) -> Result<Self, WalError> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            rolling_hash: 0,
            done: false,
        })
    }

    fn read_record(&mut self) -> Option<Result<StateDelta, WalError>> {
        let mut header = [0u8; HEADER_SIZE];
        if let Err(e) = self.reader.read_exact(&mut header[..4]) {
            // EOF at a record boundary ends the (unsealed) file cleanly.
            self.done = true;
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return None;
            }
            return Some(Err(WalError::Io(e)));
        }
        let len = u32::from_le_bytes(header[..4].try_into().unwrap());
        if len == TRAILER_MARK {
            self.done = true;
            let mut trailer = [0u8; 8];
            if let Err(e) = self.reader.read_exact(&mut trailer) {
                return Some(Err(WalError::Io(e)));
            }
            let expected = u64::from_le_bytes(trailer);
            if expected != self.rolling_hash {
                return Some(Err(WalError::TrailerMismatch));
            }
            return None;
        }
        if let Err(e) = self.reader.read_exact(&mut header[4..]) {
            self.done = true;
            return Some(Err(WalError::Io(e)));
        }
        let checksum = u32::from_le_bytes(header[4..].try_into().unwrap());
        let mut payload = vec![0u8; len as usize];
        if let Err(e) = self.reader.read_exact(&mut payload) {
            self.done = true;
            return Some(Err(WalError::Io(e)));
        }
        let mut hasher = Hasher::new();
        hasher.update(&payload);
        if hasher.finalize() != checksum {
            self.done = true;
            return Some(Err(WalError::ChecksumMismatch));
        }
        self.rolling_hash = rolling_step(self.rolling_hash, len, checksum);
        match postcard::from_bytes(&payload) {
            Ok(delta) => Some(Ok(delta)),
            Err(e) => {
                self.done = true;
                Some(Err(WalError::DeserializationFailed(e.to_string())))
            }
        }
    }
}

impl Iterator for WalReader {
    type Item = Result<StateDelta, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.read_record()
    }
}

#[cfg(test)]
mod tests {
    use quiver_common::types::{Gid, TxnId};

    use super::*;

    fn delta(tx: u64, local: u64) -> StateDelta {
        StateDelta::CreateVertex {
            tx: TxnId::new(tx),
            gid: Gid::new(0, local),
        }
    }

    fn test_config(dir: &Path) -> WalConfig {
        WalConfig {
            directory: dir.to_path_buf(),
            enabled: true,
            synchronous_commit: true,
            flush_interval: Duration::from_millis(10),
            rotate_deltas_count: 1_000,
        }
    }

    #[test]
    fn append_flush_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::new(test_config(dir.path())).unwrap();
        wal.emplace(delta(1, 1)).unwrap();
        wal.emplace(delta(1, 2)).unwrap();
        wal.emplace(StateDelta::TransactionCommit { tx: TxnId::new(1) })
            .unwrap();

        let files = wal_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        let deltas: Vec<_> = WalReader::open(&files[0])
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[0], delta(1, 1));
        assert!(deltas[2].is_transaction_end());
    }

    #[test]
    fn rotation_seals_with_valid_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.rotate_deltas_count = 2;
        let wal = Wal::new(config).unwrap();
        wal.emplace(delta(1, 1)).unwrap();
        wal.emplace(StateDelta::TransactionCommit { tx: TxnId::new(1) })
            .unwrap();
        wal.emplace(delta(2, 2)).unwrap();
        wal.emplace(StateDelta::TransactionCommit { tx: TxnId::new(2) })
            .unwrap();

        let files = wal_files(dir.path()).unwrap();
        // One sealed file named by the last transaction, plus the fresh
        // current file.
        assert!(files[0].file_name().unwrap().to_str().unwrap().contains("wal-1"));
        let sealed: Vec<_> = WalReader::open(&files[0])
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(sealed.len(), 2);
    }

    #[test]
    fn corrupted_record_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::new(test_config(dir.path())).unwrap();
        wal.emplace(delta(1, 1)).unwrap();
        wal.emplace(StateDelta::TransactionCommit { tx: TxnId::new(1) })
            .unwrap();
        drop(wal);

        // Append garbage with a valid-looking length but a wrong checksum.
        let path = dir.path().join(CURRENT_FILE);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&20u32.to_le_bytes()).unwrap();
        file.write_all(&12345u32.to_le_bytes()).unwrap();
        file.write_all(&[0u8; 20]).unwrap();
        file.sync_data().unwrap();

        let mut reader = WalReader::open(&path).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next().unwrap(),
            Err(WalError::ChecksumMismatch)
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn disabled_wal_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.enabled = false;
        let wal = Wal::new(config).unwrap();
        wal.emplace(delta(1, 1)).unwrap();
        wal.flush().unwrap();
        assert!(wal_files(dir.path()).unwrap().is_empty());
    }
}
