//! Local cache of raw catalog tables.
//!
//! Each catalog gets one binary file under the raw-data directory, named from
//! the catalog name and identifier (see [`CatalogDescriptor::cache_file_name`]).
//! A file that exists is trusted indefinitely; delete it to force a re-fetch.
//! A file that exists but cannot be decoded is an error, never a silent miss.
//!
//! File layout: an 8-byte magic tag followed by a bincode-encoded envelope
//! holding the format version, the catalog identifier and the table list.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{CatalogDescriptor, CACHE_EXTENSION};
use crate::fetch::{FetchError, RemoteFetcher};
use crate::settings::RowLimit;
use crate::table::TableList;

const CACHE_MAGIC: &[u8; 8] = b"CLCACHE\0";
const CACHE_FORMAT_VERSION: u32 = 1;

/// Errors raised while resolving tables through the cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode tables for {path}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Serialize)]
struct CacheEnvelopeRef<'a> {
    format_version: u32,
    cds_id: &'a str,
    tables: &'a TableList,
}

#[derive(Deserialize)]
struct CacheEnvelope {
    format_version: u32,
    cds_id: String,
    tables: TableList,
}

/// Fetch-or-load front end for raw catalog tables
#[derive(Debug)]
pub struct TableCache<F> {
    raw_data_dir: PathBuf,
    fetcher: F,
    row_limit: RowLimit,
}

impl<F: RemoteFetcher> TableCache<F> {
    pub fn new(raw_data_dir: impl Into<PathBuf>, fetcher: F, row_limit: RowLimit) -> Self {
        Self {
            raw_data_dir: raw_data_dir.into(),
            fetcher,
            row_limit,
        }
    }

    pub fn raw_data_dir(&self) -> &Path {
        &self.raw_data_dir
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Cache file location for a catalog
    pub fn cache_path(&self, descriptor: &CatalogDescriptor) -> PathBuf {
        descriptor.cache_path(&self.raw_data_dir)
    }

    /// Return the tables of `descriptor`, from disk if cached, otherwise from
    /// the remote fetcher (writing the cache file on the way).
    pub fn resolve(&self, descriptor: &CatalogDescriptor) -> Result<TableList, CacheError> {
        let path = self.cache_path(descriptor);

        if path.is_file() {
            debug!("Cache hit for {} at {}", descriptor.name, path.display());
            return self.load(&path, &descriptor.cds_id);
        }

        info!(
            "Cache miss for {}, fetching {} (row limit {})",
            descriptor.name, descriptor.cds_id, self.row_limit
        );
        let tables = self.fetcher.fetch(&descriptor.cds_id, self.row_limit)?;
        self.store(&path, &descriptor.cds_id, &tables)?;
        Ok(tables)
    }

    /// Decode a cache file, checking it belongs to `cds_id`.
    pub fn load(&self, path: &Path, cds_id: &str) -> Result<TableList, CacheError> {
        let bytes = fs::read(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let corrupt = |reason: String| CacheError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let payload = bytes
            .strip_prefix(CACHE_MAGIC.as_slice())
            .ok_or_else(|| corrupt("missing cache header".to_string()))?;

        let (envelope, consumed): (CacheEnvelope, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(|e| corrupt(e.to_string()))?;

        if consumed != payload.len() {
            return Err(corrupt(format!(
                "{} trailing bytes after table data",
                payload.len() - consumed
            )));
        }
        if envelope.format_version != CACHE_FORMAT_VERSION {
            return Err(corrupt(format!(
                "format version {} (expected {CACHE_FORMAT_VERSION})",
                envelope.format_version
            )));
        }
        if envelope.cds_id != cds_id {
            return Err(corrupt(format!(
                "holds catalog {} but {cds_id} was requested",
                envelope.cds_id
            )));
        }

        Ok(envelope.tables)
    }

    /// Write a cache file, creating the raw-data directory if needed.
    ///
    /// The bytes go to a sibling temporary file that is renamed into place,
    /// so an interrupted write never leaves a truncated cache file behind.
    pub fn store(&self, path: &Path, cds_id: &str, tables: &TableList) -> Result<(), CacheError> {
        let io_error = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let envelope = CacheEnvelopeRef {
            format_version: CACHE_FORMAT_VERSION,
            cds_id,
            tables,
        };
        let encoded = bincode::serde::encode_to_vec(&envelope, bincode::config::standard())
            .map_err(|e| CacheError::Encode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut bytes = Vec::with_capacity(CACHE_MAGIC.len() + encoded.len());
        bytes.extend_from_slice(CACHE_MAGIC);
        bytes.extend_from_slice(&encoded);

        let partial = path.with_extension(format!("{CACHE_EXTENSION}.partial"));
        if let Err(source) = fs::write(&partial, &bytes).and_then(|()| fs::rename(&partial, path)) {
            if let Err(e) = fs::remove_file(&partial) {
                debug!("Could not remove {}: {e}", partial.display());
            }
            return Err(io_error(source));
        }

        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    /// Cache files currently present in the raw-data directory, sorted by name
    pub fn list_cached_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        if !self.raw_data_dir.exists() {
            return Ok(Vec::new());
        }

        let io_error = |source| CacheError::Io {
            path: self.raw_data_dir.clone(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.raw_data_dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some(CACHE_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
