//! Journal recovery: reading and validating framed entries

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use super::entry::JournalEntry;
use super::error::{JournalError, JournalResult};
use super::writer::{crc32, HEADER_SIZE, JOURNAL_MAGIC, JOURNAL_VERSION};

/// Sanity bound on a single frame's payload.
const MAX_ENTRY_LEN: usize = 1024 * 1024;

/// Reads a journal file back, validating each frame's checksum.
///
/// Iteration yields entries in append order. A torn final frame surfaces as
/// [`JournalError::Truncated`]; anything failing its checksum surfaces as a
/// corruption error. What to do about either is the caller's policy.
pub struct JournalRecovery {
    path: PathBuf,
    reader: BufReader<File>,
    position: u64,
    file_size: u64,
}

impl JournalRecovery {
    /// Open a journal file for reading.
    pub fn open(path: impl AsRef<Path>) -> JournalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        Self::validate_header(&mut reader)?;

        Ok(Self { path, reader, position: HEADER_SIZE, file_size })
    }

    fn validate_header(reader: &mut BufReader<File>) -> JournalResult<()> {
        reader.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 8];
        if reader.read_exact(&mut magic).is_err() {
            return Err(JournalError::InvalidFormat("file too small for header".into()));
        }
        if magic != JOURNAL_MAGIC {
            return Err(JournalError::InvalidFormat(format!("bad magic number: {magic:?}")));
        }

        let mut version_bytes = [0u8; 4];
        if reader.read_exact(&mut version_bytes).is_err() {
            return Err(JournalError::InvalidFormat("file too small for header".into()));
        }
        let version = u32::from_le_bytes(version_bytes);
        if version != JOURNAL_VERSION {
            return Err(JournalError::InvalidFormat(format!(
                "unsupported journal version {version}, expected {JOURNAL_VERSION}"
            )));
        }

        reader.seek(SeekFrom::Current(4))?;
        Ok(())
    }

    /// Read the next frame, or `None` at a clean end of file.
    fn read_entry(&mut self) -> JournalResult<Option<JournalEntry>> {
        if self.position >= self.file_size {
            return Ok(None);
        }

        self.reader.seek(SeekFrom::Start(self.position))?;

        let mut len_bytes = [0u8; 4];
        match self.reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(JournalError::Truncated { offset: self.position });
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len == 0 || len > MAX_ENTRY_LEN {
            return Err(JournalError::InvalidFormat(format!("invalid frame length: {len}")));
        }

        let mut data = vec![0u8; len];
        match self.reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(JournalError::Truncated { offset: self.position });
            }
            Err(e) => return Err(e.into()),
        }

        let mut crc_bytes = [0u8; 4];
        match self.reader.read_exact(&mut crc_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(JournalError::Truncated { offset: self.position });
            }
            Err(e) => return Err(e.into()),
        }

        let stored = u32::from_le_bytes(crc_bytes);
        let computed = crc32(&data);
        if stored != computed {
            return Err(JournalError::ChecksumMismatch {
                offset: self.position,
                expected: stored,
                actual: computed,
            });
        }

        let (entry, _): (JournalEntry, _) =
            bincode::serde::decode_from_slice(&data, bincode::config::standard())
                .map_err(|e| JournalError::Decode(e.to_string()))?;

        self.position += 4 + len as u64 + 4;
        Ok(Some(entry))
    }

    /// Consume the recovery handle into an entry iterator.
    #[must_use]
    pub fn iter(self) -> JournalEntryIterator {
        JournalEntryIterator { recovery: self, finished: false }
    }

    /// Read every intact entry, applying the strictness policy.
    ///
    /// With `strict` set, any corrupt frame is an error. Otherwise reading
    /// stops at the first bad frame with a warning and returns what was
    /// recovered up to that point. A torn tail is tolerated in both modes.
    pub fn read_all(self, strict: bool) -> JournalResult<Vec<JournalEntry>> {
        let path = self.path.clone();
        let mut entries = Vec::new();

        for result in self.iter() {
            match result {
                Ok(entry) => entries.push(entry),
                Err(JournalError::Truncated { offset }) => {
                    warn!(path = %path.display(), offset, "journal has a torn tail, ignoring");
                    break;
                }
                Err(e) if e.is_corruption() && !strict => {
                    warn!(path = %path.display(), error = %e, "stopping at corrupt journal frame");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(entries)
    }
}

/// Iterator over journal entries.
///
/// Yields `Err` once on the first unreadable frame, then ends. Entries past
/// a bad frame cannot be trusted because framing is not self-resynchronizing.
pub struct JournalEntryIterator {
    recovery: JournalRecovery,
    finished: bool,
}

impl Iterator for JournalEntryIterator {
    type Item = JournalResult<JournalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.recovery.read_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
