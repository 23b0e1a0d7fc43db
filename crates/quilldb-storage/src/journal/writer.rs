//! Journal writer implementation

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::entry::{JournalEntry, JournalOp};
use super::error::{JournalError, JournalResult};
use super::recovery::JournalRecovery;
use super::Lsn;

/// Magic number at the start of journal files: "QLLJRNL\0"
pub(super) const JOURNAL_MAGIC: [u8; 8] = [0x51, 0x4C, 0x4C, 0x4A, 0x52, 0x4E, 0x4C, 0x00];

/// Current journal format version
pub(super) const JOURNAL_VERSION: u32 = 1;

/// File header: 8 bytes magic + 4 bytes version + 4 bytes reserved
pub(super) const HEADER_SIZE: u64 = 16;

/// Configuration for the journal writer.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Buffer size for writes (default: 64KB).
    pub buffer_size: usize,

    /// When buffered frames are fsynced.
    pub sync_mode: SyncMode,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { buffer_size: 64 * 1024, sync_mode: SyncMode::Immediate }
    }
}

/// Sync mode determines when appended frames reach stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Sync after every append (safest, slowest).
    Immediate,
    /// Sync after every `n` appends.
    Batched(usize),
    /// Never sync explicitly, rely on the OS and on checkpoints.
    Never,
}

/// Append-only writer for the counter journal.
///
/// Frames are `[length: u32][bincode entry][crc32: u32]`. LSNs are assigned
/// here at append time and recovered from the file on reopen, so a restarted
/// writer continues the sequence rather than restarting it.
pub struct JournalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    position: u64,
    current_lsn: Lsn,
    checkpoint_lsn: Lsn,
    config: JournalConfig,
    ops_since_sync: usize,
}

impl JournalWriter {
    /// Open or create a journal file.
    ///
    /// An existing file is scanned to recover the append position and the
    /// highest assigned LSN. A torn final frame is discarded by resuming
    /// the append position at the last intact frame boundary.
    pub fn open(path: impl AsRef<Path>, config: JournalConfig) -> JournalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let exists = path.exists();

        let file =
            OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path)?;
        let mut writer = BufWriter::with_capacity(config.buffer_size, file);

        let (position, current_lsn, checkpoint_lsn) = if exists {
            Self::recover_state(&path)?
        } else {
            Self::write_header(&mut writer)?;
            (HEADER_SIZE, 0, 0)
        };

        writer.seek(SeekFrom::Start(position))?;

        Ok(Self {
            path,
            writer,
            position,
            current_lsn,
            checkpoint_lsn,
            config,
            ops_since_sync: 0,
        })
    }

    fn write_header(writer: &mut BufWriter<File>) -> JournalResult<()> {
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&JOURNAL_MAGIC)?;
        writer.write_all(&JOURNAL_VERSION.to_le_bytes())?;
        writer.write_all(&[0u8; 4])?;
        writer.flush()?;
        Ok(())
    }

    /// Scan an existing file for (append position, max LSN, checkpoint LSN).
    fn recover_state(path: &Path) -> JournalResult<(u64, Lsn, Lsn)> {
        let recovery = JournalRecovery::open(path)?;
        let mut max_lsn = 0;
        let mut checkpoint_lsn = 0;

        for result in recovery.iter() {
            match result {
                Ok(entry) => {
                    max_lsn = max_lsn.max(entry.lsn);
                    if let Some(flushed) = entry.checkpoint_lsn() {
                        checkpoint_lsn = checkpoint_lsn.max(flushed);
                    }
                }
                Err(JournalError::Truncated { offset }) => {
                    // Torn tail from a crash mid-append. Resume here.
                    return Ok((offset, max_lsn, checkpoint_lsn));
                }
                Err(e) if e.is_corruption() => {
                    // Append after the last intact frame.
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let len = std::fs::metadata(path)?.len();
        Ok((len, max_lsn, checkpoint_lsn))
    }

    /// Append a batch of operations, assigning them consecutive LSNs.
    ///
    /// Returns the LSN of the last operation in the batch. All frames of
    /// the batch are buffered before any sync, so a crash either keeps the
    /// whole batch (up to a torn final frame) or none of the synced part.
    pub fn append(&mut self, ops: &[JournalOp]) -> JournalResult<Lsn> {
        if ops.is_empty() {
            return Ok(self.current_lsn);
        }

        for op in ops {
            let lsn = self.current_lsn + 1;
            self.write_frame(&JournalEntry { lsn, op: *op })?;
            self.current_lsn = lsn;
        }
        self.ops_since_sync += ops.len();

        match self.config.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batched(n) if self.ops_since_sync >= n => self.sync()?,
            _ => {}
        }

        Ok(self.current_lsn)
    }

    fn encode_frame(entry: &JournalEntry) -> JournalResult<Vec<u8>> {
        let data = bincode::serde::encode_to_vec(entry, bincode::config::standard())
            .map_err(|e| JournalError::Encode(e.to_string()))?;
        let crc = crc32(&data);

        let mut frame = Vec::with_capacity(8 + data.len());
        frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
        frame.extend_from_slice(&data);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    fn write_frame(&mut self, entry: &JournalEntry) -> JournalResult<()> {
        let frame = Self::encode_frame(entry)?;
        self.writer.write_all(&frame)?;
        self.position += frame.len() as u64;
        Ok(())
    }

    /// Flush buffered frames and fsync the file.
    pub fn sync(&mut self) -> JournalResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.ops_since_sync = 0;
        Ok(())
    }

    /// Record that all adjustments up to `flushed_lsn` are materialized in
    /// the main storage, then truncate the journal down to the unflushed
    /// suffix.
    ///
    /// `retain_from` is the byte offset the caller captured together with
    /// `flushed_lsn` under its own synchronization: every frame before it
    /// carries an LSN at or below the flushed point. Truncation is
    /// therefore a raw copy of the byte suffix, proportional to the frames
    /// appended since the snapshot rather than to the whole file. The copy
    /// goes into a temp file that is atomically renamed over the journal,
    /// so a crash mid-checkpoint leaves either the old or the new file,
    /// never a partial one.
    pub fn checkpoint(&mut self, flushed_lsn: Lsn, retain_from: u64) -> JournalResult<()> {
        self.sync()?;

        let retain_from = retain_from.clamp(HEADER_SIZE, self.position);
        let suffix_len = self.position - retain_from;
        let marker_lsn = self.current_lsn + 1;
        let marker = Self::encode_frame(&JournalEntry {
            lsn: marker_lsn,
            op: JournalOp::Checkpoint { flushed_lsn },
        })?;

        let temp_path = self.path.with_extension("journal.tmp");
        let temp_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut temp_writer = BufWriter::with_capacity(self.config.buffer_size, temp_file);
        Self::write_header(&mut temp_writer)?;

        let mut source = File::open(&self.path)?;
        source.seek(SeekFrom::Start(retain_from))?;
        std::io::copy(&mut source.take(suffix_len), &mut temp_writer)?;
        temp_writer.write_all(&marker)?;

        temp_writer.flush()?;
        temp_writer.get_ref().sync_all()?;
        drop(temp_writer);

        std::fs::rename(&temp_path, &self.path)?;

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.writer = BufWriter::with_capacity(self.config.buffer_size, file);
        let new_position = HEADER_SIZE + suffix_len + marker.len() as u64;
        self.writer.seek(SeekFrom::Start(new_position))?;
        self.position = new_position;
        self.current_lsn = marker_lsn;
        self.checkpoint_lsn = self.checkpoint_lsn.max(flushed_lsn);

        Ok(())
    }

    /// Highest LSN assigned so far.
    #[must_use]
    pub const fn current_lsn(&self) -> Lsn {
        self.current_lsn
    }

    /// Byte offset where the next frame will be written. Captured by
    /// checkpoint callers so truncation can keep the suffix by offset
    /// instead of rescanning the file.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// LSN covered by the most recent checkpoint.
    #[must_use]
    pub const fn checkpoint_lsn(&self) -> Lsn {
        self.checkpoint_lsn
    }

    /// Path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// CRC32 over the IEEE polynomial.
pub(super) fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc = !0u32;

    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }

    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use quilldb_core::ObjectId;
    use tempfile::tempdir;

    #[test]
    fn create_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.journal");

        let journal = JournalWriter::open(&path, JournalConfig::default()).unwrap();
        assert_eq!(journal.current_lsn(), 0);
        assert_eq!(journal.checkpoint_lsn(), 0);
        assert!(path.exists());
    }

    #[test]
    fn batch_gets_consecutive_lsns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.journal");

        let mut journal = JournalWriter::open(&path, JournalConfig::default()).unwrap();
        let ops = [
            JournalOp::adjust(ObjectId::new(1), 2),
            JournalOp::adjust(ObjectId::new(2), -1),
            JournalOp::remove(ObjectId::new(3)),
        ];
        let last = journal.append(&ops).unwrap();
        assert_eq!(last, 3);
        assert_eq!(journal.current_lsn(), 3);

        // Empty batches do not advance the sequence.
        assert_eq!(journal.append(&[]).unwrap(), 3);
    }

    #[test]
    fn batched_sync_counts_ops() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.journal");

        let config = JournalConfig { sync_mode: SyncMode::Batched(3), ..Default::default() };
        let mut journal = JournalWriter::open(&path, config).unwrap();

        journal.append(&[JournalOp::adjust(ObjectId::new(1), 1)]).unwrap();
        journal.append(&[JournalOp::adjust(ObjectId::new(1), 1)]).unwrap();
        assert_eq!(journal.ops_since_sync, 2);
        journal.append(&[JournalOp::adjust(ObjectId::new(1), 1)]).unwrap();
        assert_eq!(journal.ops_since_sync, 0);
    }

    #[test]
    fn torn_tail_is_discarded_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.journal");

        {
            let mut journal = JournalWriter::open(&path, JournalConfig::default()).unwrap();
            journal.append(&[JournalOp::adjust(ObjectId::new(1), 1)]).unwrap();
            journal.sync().unwrap();
        }

        // Simulate a crash mid-append: a length prefix with no payload.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&20u32.to_le_bytes()).unwrap();
            file.write_all(b"par").unwrap();
        }

        let mut journal = JournalWriter::open(&path, JournalConfig::default()).unwrap();
        assert_eq!(journal.current_lsn(), 1);
        let lsn = journal.append(&[JournalOp::adjust(ObjectId::new(1), 1)]).unwrap();
        journal.sync().unwrap();
        assert_eq!(lsn, 2);

        // The overwritten tail must read back cleanly.
        let recovery = JournalRecovery::open(&path).unwrap();
        let entries: Vec<_> = recovery.iter().map(Result::unwrap).collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn crc32_is_stable() {
        let data = b"counter journal frame";
        assert_eq!(crc32(data), crc32(data));
        assert_ne!(crc32(data), crc32(b"different payload"));
    }
}
