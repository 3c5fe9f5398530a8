//! Append-only journal backing the subscription store and pull-point registry.
//!
//! File layout: 4 magic bytes, 1 version byte, then frames of
//! `len:u32 LE | msgpack entry | crc32:u32 LE`. On open the journal is
//! replayed into memory; a frame cut short by a crash is truncated away.

use crate::error::{MediatorError, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Current journal format version.
const JOURNAL_VERSION: u8 = 1;

/// Header size (magic + version).
const HEADER_SIZE: u64 = 5;

/// Upper bound on a single frame.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Typed append-only journal.
pub struct Journal<T> {
    path: PathBuf,
    magic: [u8; 4],
    writer: Mutex<BufWriter<File>>,
    _entry: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> Journal<T> {
    /// Open or create a journal and return every entry it holds, in order.
    pub fn open(path: impl AsRef<Path>, magic: &[u8; 4]) -> Result<(Self, Vec<T>)> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let (entries, good_len) = Self::replay(&path, magic)?;
            let file = OpenOptions::new().write(true).open(&path)?;
            if file.metadata()?.len() > good_len {
                warn!(path = %path.display(), good_len, "truncating torn journal tail");
                file.set_len(good_len)?;
                file.sync_all()?;
            }
            entries
        } else {
            Self::write_header(&path, magic)?;
            Vec::new()
        };

        let file = OpenOptions::new().append(true).open(&path)?;

        Ok((
            Self {
                path,
                magic: *magic,
                writer: Mutex::new(BufWriter::new(file)),
                _entry: PhantomData,
            },
            entries,
        ))
    }

    /// Append one entry and fsync it.
    pub fn append(&self, entry: &T) -> Result<()> {
        let mut writer = self.writer.lock();
        Self::write_frame(&mut *writer, entry)?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Replace the journal contents with `entries` (used for compaction).
    pub fn rewrite(&self, entries: &[T]) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;

        let tmp = self.path.with_extension("compact");
        Self::write_header(&tmp, &self.magic)?;
        {
            let mut out = BufWriter::new(OpenOptions::new().append(true).open(&tmp)?);
            for entry in entries {
                Self::write_frame(&mut out, entry)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        *writer = BufWriter::new(OpenOptions::new().append(true).open(&self.path)?);
        Ok(())
    }

    fn write_header(path: &Path, magic: &[u8; 4]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(magic)?;
        file.write_all(&[JOURNAL_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn write_frame<W: Write>(writer: &mut W, entry: &T) -> Result<()> {
        let encoded = rmp_serde::to_vec(entry)?;
        writer.write_all(&(encoded.len() as u32).to_le_bytes())?;
        writer.write_all(&encoded)?;
        writer.write_all(&crc32fast::hash(&encoded).to_le_bytes())?;
        Ok(())
    }

    /// Read all complete frames. Returns the entries and the byte length of
    /// the valid prefix.
    fn replay(path: &Path, magic: &[u8; 4]) -> Result<(Vec<T>, u64)> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut header = [0u8; HEADER_SIZE as usize];
        if !read_full(&mut reader, &mut header)? {
            return Err(MediatorError::InvalidFormat("journal header truncated".into()));
        }
        if &header[..4] != magic {
            return Err(MediatorError::InvalidFormat(format!(
                "bad journal magic in {}",
                path.display()
            )));
        }
        if header[4] != JOURNAL_VERSION {
            return Err(MediatorError::InvalidFormat(format!(
                "unsupported journal version: {}",
                header[4]
            )));
        }

        let mut entries = Vec::new();
        let mut good_len = HEADER_SIZE;

        loop {
            let mut len_bytes = [0u8; 4];
            if !read_full(&mut reader, &mut len_bytes)? {
                break;
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            if len > MAX_FRAME_LEN {
                return Err(MediatorError::Corruption("journal frame too large".into()));
            }

            let mut encoded = vec![0u8; len];
            let mut checksum = [0u8; 4];
            if !read_full(&mut reader, &mut encoded)? || !read_full(&mut reader, &mut checksum)? {
                break;
            }
            if u32::from_le_bytes(checksum) != crc32fast::hash(&encoded) {
                return Err(MediatorError::Corruption("journal checksum mismatch".into()));
            }

            entries.push(rmp_serde::from_slice(&encoded)?);
            good_len += 4 + len as u64 + 4;
        }

        Ok((entries, good_len))
    }
}

/// Fill `buf` completely. `Ok(false)` means EOF came first.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
