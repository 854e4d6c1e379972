//! On-disk filesets: one info file and one data file per block of a shard.
//!
//! ```text
//! {prefix}/data/{namespace}/{shard}/fileset-{block_start}-{volume}-info.json
//! {prefix}/data/{namespace}/{shard}/fileset-{block_start}-{volume}-data.db
//! ```
//!
//! Snapshots live under `snapshots/` instead of `data/`. The data file is a
//! sequence of entries, each `[u32 id len][id][u32 data len][data]` with
//! big-endian lengths; `data` is one m3tsz stream.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bytes::{Buf, BufMut, Bytes};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::Options;

#[derive(Debug, Error)]
pub enum FilesetError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: invalid info file: {source}")]
    InvalidInfo {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt data file at byte {offset}: {reason}")]
    Corrupt { offset: usize, reason: &'static str },

    #[error("data file has {0} trailing bytes after the last entry")]
    TrailingBytes(usize),

    #[error("unknown fileset type: {0}")]
    UnknownType(String),
}

/// Whether a fileset came from a flush or a snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileSetType {
    #[default]
    Flush,
    Snapshot,
}

impl FileSetType {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Flush => "data",
            Self::Snapshot => "snapshots",
        }
    }
}

impl FromStr for FileSetType {
    type Err = FilesetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flush" => Ok(Self::Flush),
            "snapshot" => Ok(Self::Snapshot),
            other => Err(FilesetError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for FileSetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flush => f.write_str("flush"),
            Self::Snapshot => f.write_str("snapshot"),
        }
    }
}

/// Identifies one fileset on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesetId {
    pub namespace: String,
    pub shard: u32,
    /// Block start in nanoseconds.
    pub block_start: i64,
    pub volume: u32,
    pub fileset_type: FileSetType,
}

impl FilesetId {
    fn dir(&self, prefix: &Path) -> PathBuf {
        prefix
            .join(self.fileset_type.dir_name())
            .join(&self.namespace)
            .join(self.shard.to_string())
    }

    fn file(&self, prefix: &Path, suffix: &str) -> PathBuf {
        self.dir(prefix).join(format!(
            "fileset-{}-{}-{}",
            self.block_start, self.volume, suffix
        ))
    }

    pub fn info_path(&self, prefix: &Path) -> PathBuf {
        self.file(prefix, "info.json")
    }

    pub fn data_path(&self, prefix: &Path) -> PathBuf {
        self.file(prefix, "data.db")
    }
}

/// Contents of the info file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FilesetInfo {
    pub block_start: i64,
    pub volume: u32,
    /// Number of entries in the data file.
    pub entries: usize,
    /// Options the streams were encoded with.
    #[serde(default)]
    pub encoding: Options,
}

/// One series of a fileset.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: String,
    /// The series' m3tsz stream; shares the data file's buffer.
    pub data: Bytes,
}

/// Reads a fileset entry by entry.
#[derive(Debug)]
pub struct FilesetReader {
    info: FilesetInfo,
    data: Bytes,
    offset: usize,
    read: usize,
}

impl FilesetReader {
    /// Opens the fileset named by `id` under `prefix`.
    pub fn open(prefix: impl AsRef<Path>, id: &FilesetId) -> Result<Self, FilesetError> {
        let prefix = prefix.as_ref();

        let info_path = id.info_path(prefix);
        let raw = fs::read(&info_path).map_err(|source| FilesetError::Io {
            path: info_path.clone(),
            source,
        })?;
        let info: FilesetInfo = serde_json::from_slice(&raw)
            .map_err(|source| FilesetError::InvalidInfo { path: info_path, source })?;

        let data_path = id.data_path(prefix);
        let data = fs::read(&data_path).map_err(|source| FilesetError::Io {
            path: data_path.clone(),
            source,
        })?;

        debug!(
            "opened {} fileset {}/{} block {} volume {}: {} entries, {} bytes",
            id.fileset_type,
            id.namespace,
            id.shard,
            id.block_start,
            id.volume,
            info.entries,
            data.len()
        );

        Ok(Self {
            info,
            data: Bytes::from(data),
            offset: 0,
            read: 0,
        })
    }

    /// Returns the next entry, or `None` once the data file is consumed.
    pub fn streaming_read(&mut self) -> Result<Option<Entry>, FilesetError> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }

        let id_offset = self.offset;
        let id = self.read_chunk()?;
        let id = String::from_utf8(id.to_vec()).map_err(|_| FilesetError::Corrupt {
            offset: id_offset,
            reason: "id is not valid utf-8",
        })?;
        let data = self.read_chunk()?;

        self.read += 1;
        Ok(Some(Entry { id, data }))
    }

    /// Entry count recorded in the info file.
    pub fn entries(&self) -> usize {
        self.info.entries
    }

    /// Entries returned by `streaming_read` so far.
    pub fn entries_read(&self) -> usize {
        self.read
    }

    pub fn info(&self) -> &FilesetInfo {
        &self.info
    }

    /// Closes the reader. Fails if every recorded entry was read but the data
    /// file continues past them.
    pub fn close(self) -> Result<(), FilesetError> {
        if self.read == self.info.entries && self.offset < self.data.len() {
            return Err(FilesetError::TrailingBytes(self.data.len() - self.offset));
        }
        debug!("closed fileset after {} entries", self.read);
        Ok(())
    }

    fn read_chunk(&mut self) -> Result<Bytes, FilesetError> {
        let mut rest = &self.data[self.offset..];
        if rest.remaining() < 4 {
            return Err(FilesetError::Corrupt {
                offset: self.offset,
                reason: "truncated length",
            });
        }
        let len = rest.get_u32() as usize;
        let start = self.offset + 4;
        if rest.remaining() < len {
            return Err(FilesetError::Corrupt {
                offset: start,
                reason: "truncated entry",
            });
        }
        self.offset = start + len;
        Ok(self.data.slice(start..start + len))
    }
}

/// Writes a fileset. Nothing is visible on disk until [`close`](Self::close).
#[derive(Debug)]
pub struct FilesetWriter {
    prefix: PathBuf,
    id: FilesetId,
    encoding: Options,
    buf: Vec<u8>,
    entries: usize,
}

impl FilesetWriter {
    pub fn new(prefix: impl Into<PathBuf>, id: FilesetId, encoding: Options) -> Self {
        Self {
            prefix: prefix.into(),
            id,
            encoding,
            buf: Vec::new(),
            entries: 0,
        }
    }

    /// Appends one series.
    pub fn write(&mut self, id: &str, data: &[u8]) {
        self.buf.put_u32(id.len() as u32);
        self.buf.put_slice(id.as_bytes());
        self.buf.put_u32(data.len() as u32);
        self.buf.put_slice(data);
        self.entries += 1;
    }

    /// Writes the data file, then the info file.
    pub fn close(self) -> Result<(), FilesetError> {
        let dir = self.id.dir(&self.prefix);
        fs::create_dir_all(&dir).map_err(|source| FilesetError::Io { path: dir, source })?;

        let data_path = self.id.data_path(&self.prefix);
        fs::write(&data_path, &self.buf).map_err(|source| FilesetError::Io {
            path: data_path,
            source,
        })?;

        let info = FilesetInfo {
            block_start: self.id.block_start,
            volume: self.id.volume,
            entries: self.entries,
            encoding: self.encoding,
        };
        let info_path = self.id.info_path(&self.prefix);
        let json = serde_json::to_vec_pretty(&info).map_err(|source| FilesetError::InvalidInfo {
            path: info_path.clone(),
            source,
        })?;
        fs::write(&info_path, json).map_err(|source| FilesetError::Io {
            path: info_path,
            source,
        })?;

        debug!(
            "wrote {} fileset with {} entries, {} bytes",
            self.id.fileset_type,
            self.entries,
            self.buf.len()
        );
        Ok(())
    }
}
