//! Incremental zip archive construction.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Errors raised while writing the archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive format error: {0}")]
    Zip(#[from] ZipError),

    #[error("Duplicate archive entry: {0}")]
    DuplicateEntry(String),

    #[error("Archive already finished")]
    Finished,

    #[error("Archive task failed: {0}")]
    TaskFailed(String),
}

/// Compression applied to archive entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveCompression {
    #[default]
    Deflated,
    Stored,
}

impl ArchiveCompression {
    fn method(self) -> CompressionMethod {
        match self {
            ArchiveCompression::Deflated => CompressionMethod::Deflated,
            ArchiveCompression::Stored => CompressionMethod::Stored,
        }
    }
}

/// Result of a finished archive.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Number of entries written.
    pub entries: usize,
    /// Sum of uncompressed payload sizes.
    pub payload_bytes: u64,
    /// Size of the archive file on disk.
    pub archive_bytes: u64,
}

/// Writes one archive entry per staged payload.
///
/// Zip writing is blocking, so every operation runs on the blocking pool.
/// The writer travels into the blocking task and back, leaving `None`
/// behind if that task dies.
pub struct ArchiveBuilder {
    path: PathBuf,
    options: SimpleFileOptions,
    writer: Option<ZipWriter<File>>,
    entries: Vec<String>,
    taken: HashSet<String>,
    payload_bytes: u64,
}

impl ArchiveBuilder {
    /// Creates (or truncates) the archive file.
    pub async fn create(
        path: impl Into<PathBuf>,
        compression: ArchiveCompression,
    ) -> Result<Self, ArchiveError> {
        let path = path.into();
        let target = path.clone();
        let file = tokio::task::spawn_blocking(move || File::create(&target))
            .await
            .map_err(|e| ArchiveError::TaskFailed(e.to_string()))?
            .map_err(|source| ArchiveError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            options: SimpleFileOptions::default().compression_method(compression.method()),
            writer: Some(ZipWriter::new(file)),
            entries: Vec::new(),
            taken: HashSet::new(),
            payload_bytes: 0,
        })
    }

    /// Path of the archive being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry names appended so far, in append order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Appends the payload file as a new entry. Returns the bytes copied.
    pub async fn append(&mut self, entry_name: &str, payload: &Path) -> Result<u64, ArchiveError> {
        if !self.taken.insert(entry_name.to_string()) {
            return Err(ArchiveError::DuplicateEntry(entry_name.to_string()));
        }

        let mut writer = self.writer.take().ok_or(ArchiveError::Finished)?;
        let options = self.options;
        let archive_path = self.path.clone();
        let payload = payload.to_path_buf();
        let name = entry_name.to_string();

        let (writer, result) = tokio::task::spawn_blocking(move || {
            let result = write_entry(&mut writer, options, &name, &payload, &archive_path);
            (writer, result)
        })
        .await
        .map_err(|e| ArchiveError::TaskFailed(e.to_string()))?;

        self.writer = Some(writer);
        let copied = result?;
        self.entries.push(entry_name.to_string());
        self.payload_bytes += copied;
        Ok(copied)
    }

    /// Writes the central directory and closes the file.
    pub async fn finish(mut self) -> Result<ArchiveSummary, ArchiveError> {
        let writer = self.writer.take().ok_or(ArchiveError::Finished)?;
        let path = self.path.clone();

        let archive_bytes = tokio::task::spawn_blocking(move || -> Result<u64, ArchiveError> {
            let file = writer.finish()?;
            file.sync_all()
                .and_then(|_| file.metadata())
                .map(|m| m.len())
                .map_err(|source| ArchiveError::Io { path, source })
        })
        .await
        .map_err(|e| ArchiveError::TaskFailed(e.to_string()))??;

        Ok(ArchiveSummary {
            path: self.path,
            entries: self.entries.len(),
            payload_bytes: self.payload_bytes,
            archive_bytes,
        })
    }
}

fn write_entry(
    writer: &mut ZipWriter<File>,
    options: SimpleFileOptions,
    name: &str,
    payload: &Path,
    archive_path: &Path,
) -> Result<u64, ArchiveError> {
    let read_error = |source| ArchiveError::Io {
        path: payload.to_path_buf(),
        source,
    };
    let file = File::open(payload).map_err(read_error)?;
    let size = file.metadata().map_err(read_error)?.len();

    writer.start_file(name, options.large_file(size > u32::MAX as u64))?;
    std::io::copy(&mut BufReader::new(file), writer).map_err(|source| ArchiveError::Io {
        path: archive_path.to_path_buf(),
        source,
    })
}
