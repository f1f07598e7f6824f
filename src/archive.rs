//! Trace archive traversal.
//!
//! A run's traces arrive either as a directory of per-rank JSON files, a
//! single JSON file, or a tar archive (optionally gzip or zstd compressed).
//! Every variant yields the same lazy stream of [`RecordSource`]s.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::debug;

use crate::trace::RecordSource;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const BZIP2_MAGIC: [u8; 3] = *b"BZh";
const XZ_MAGIC: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];

/// Errors that can occur while reading a trace archive
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Trace archive not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Unsupported {format} compression in {}; recompress as gzip or zstd", .path.display())]
    UnsupportedCompression {
        path: PathBuf,
        format: Compression,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_error(path: &Path, source: io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Stream of raw records borrowed from an open archive
pub type RecordSources<'a> = Box<dyn Iterator<Item = Result<RecordSource, ArchiveError>> + 'a>;

/// Compression applied to a tar archive, detected from its leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
    /// Recognized but not decoded
    Bzip2,
    /// Recognized but not decoded
    Xz,
}

impl Compression {
    pub fn detect(magic: &[u8]) -> Self {
        if magic.starts_with(&ZSTD_MAGIC) {
            Compression::Zstd
        } else if magic.starts_with(&GZIP_MAGIC) {
            Compression::Gzip
        } else if magic.starts_with(&XZ_MAGIC) {
            Compression::Xz
        } else if magic.starts_with(&BZIP2_MAGIC) {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Compression::None => "no",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
            Compression::Bzip2 => "bzip2",
            Compression::Xz => "xz",
        };
        f.write_str(name)
    }
}

/// An opened source of per-rank trace files
pub enum TraceArchive {
    Directory { root: PathBuf, files: Vec<PathBuf> },
    File(PathBuf),
    Tarball {
        path: PathBuf,
        compression: Compression,
        archive: tar::Archive<Box<dyn Read>>,
    },
}

impl std::fmt::Debug for TraceArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceArchive::Directory { root, files } => f
                .debug_struct("Directory")
                .field("root", root)
                .field("files", &files.len())
                .finish(),
            TraceArchive::File(path) => f.debug_tuple("File").field(path).finish(),
            TraceArchive::Tarball {
                path, compression, ..
            } => f
                .debug_struct("Tarball")
                .field("path", path)
                .field("compression", compression)
                .finish(),
        }
    }
}

impl TraceArchive {
    /// Open a directory, a `.json` file or a (compressed) tarball
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        if !path.exists() {
            return Err(ArchiveError::NotFound {
                path: path.to_path_buf(),
            });
        }

        if path.is_dir() {
            let mut files = Vec::new();
            collect_json_files(path, &mut files)?;
            files.sort();
            debug!("Found {} trace files under {}", files.len(), path.display());
            return Ok(TraceArchive::Directory {
                root: path.to_path_buf(),
                files,
            });
        }

        if path.extension().map_or(false, |ext| ext == "json") {
            return Ok(TraceArchive::File(path.to_path_buf()));
        }

        let (compression, reader) = open_tar_stream(path)?;
        debug!("Opened {} as tar archive ({:?})", path.display(), compression);
        Ok(TraceArchive::Tarball {
            path: path.to_path_buf(),
            compression,
            archive: tar::Archive::new(reader),
        })
    }

    /// Lazily yield every `.json` regular file in the archive.
    ///
    /// Tar archives are single-pass; calling this twice on the same
    /// tarball yields nothing the second time.
    pub fn sources(&mut self) -> Result<RecordSources<'_>, ArchiveError> {
        match self {
            TraceArchive::Directory { root, files } => {
                let root: &Path = root;
                Ok(Box::new(files.iter().map(move |file| {
                    let bytes = fs::read(file).map_err(|e| io_error(file, e))?;
                    let name = file.strip_prefix(root).unwrap_or(file);
                    Ok(RecordSource::new(name.display().to_string(), bytes))
                })))
            }
            TraceArchive::File(path) => {
                let path: &Path = path;
                Ok(Box::new(std::iter::once_with(move || {
                    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
                    Ok(RecordSource::new(path.display().to_string(), bytes))
                })))
            }
            TraceArchive::Tarball { path, archive, .. } => {
                let archive_path: &Path = path;
                let entries = archive
                    .entries()
                    .map_err(|e| io_error(archive_path, e))?;
                Ok(Box::new(entries.filter_map(move |entry| {
                    read_tar_entry(archive_path, entry).transpose()
                })))
            }
        }
    }
}

fn collect_json_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ArchiveError> {
    for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
        let entry = entry.map_err(|e| io_error(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_error(&path, e))?;
        if file_type.is_dir() {
            collect_json_files(&path, files)?;
        } else if file_type.is_file() && path.extension().map_or(false, |ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(())
}

fn open_tar_stream(path: &Path) -> Result<(Compression, Box<dyn Read>), ArchiveError> {
    let mut file = File::open(path).map_err(|e| io_error(path, e))?;

    let mut magic = Vec::with_capacity(XZ_MAGIC.len());
    (&mut file)
        .take(XZ_MAGIC.len() as u64)
        .read_to_end(&mut magic)
        .map_err(|e| io_error(path, e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| io_error(path, e))?;

    let compression = Compression::detect(&magic);
    let reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(BufReader::new(file)),
        Compression::Gzip => Box::new(GzDecoder::new(BufReader::new(file))),
        Compression::Zstd => {
            Box::new(zstd::stream::read::Decoder::new(file).map_err(|e| io_error(path, e))?)
        }
        Compression::Bzip2 | Compression::Xz => {
            return Err(ArchiveError::UnsupportedCompression {
                path: path.to_path_buf(),
                format: compression,
            })
        }
    };
    Ok((compression, reader))
}

fn read_tar_entry<R: Read>(
    archive_path: &Path,
    entry: io::Result<tar::Entry<'_, R>>,
) -> Result<Option<RecordSource>, ArchiveError> {
    let mut entry = entry.map_err(|e| io_error(archive_path, e))?;
    if !entry.header().entry_type().is_file() {
        return Ok(None);
    }

    let name = entry
        .path()
        .map_err(|e| io_error(archive_path, e))?
        .to_string_lossy()
        .into_owned();
    if !name.ends_with(".json") {
        return Ok(None);
    }

    // The header's declared size is not trusted for preallocation
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| io_error(&archive_path.join(&name), e))?;
    Ok(Some(RecordSource::new(name, bytes)))
}
