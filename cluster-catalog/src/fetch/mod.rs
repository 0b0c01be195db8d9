//! Remote catalog retrieval
//!
//! The loader never talks to a catalog service directly. It asks a
//! [`RemoteFetcher`] for every table published under a catalog identifier and
//! gets back a [`TableList`] keyed by fully-qualified table name.

mod vizier;

pub use vizier::{parse_vizier_tsv, VizierFetcher};

use thiserror::Error;

use crate::settings::RowLimit;
use crate::table::TableList;

/// Errors that can occur while retrieving a catalog
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request for {cds_id} failed: {message}")]
    Http { cds_id: String, message: String },

    #[error("Server returned status {status} for {cds_id}")]
    Status { cds_id: String, status: u16 },

    #[error("Malformed response for {cds_id} at line {line}: {message}")]
    Parse {
        cds_id: String,
        line: usize,
        message: String,
    },

    #[error("No tables returned for {cds_id}")]
    NotFound { cds_id: String },

    #[error("Catalog {cds_id} is not cached and remote fetching is disabled")]
    Offline { cds_id: String },
}

/// Provider of the named tables published under a catalog identifier.
///
/// Implementations block until the whole collection is available. Timeouts
/// and retries are left to the implementation.
pub trait RemoteFetcher {
    /// Fetch every table of `cds_id`, asking for at most `row_limit` rows per
    /// table.
    fn fetch(&self, cds_id: &str, row_limit: RowLimit) -> Result<TableList, FetchError>;
}

impl<F: RemoteFetcher + ?Sized> RemoteFetcher for &F {
    fn fetch(&self, cds_id: &str, row_limit: RowLimit) -> Result<TableList, FetchError> {
        (**self).fetch(cds_id, row_limit)
    }
}

impl<F: RemoteFetcher + ?Sized> RemoteFetcher for Box<F> {
    fn fetch(&self, cds_id: &str, row_limit: RowLimit) -> Result<TableList, FetchError> {
        (**self).fetch(cds_id, row_limit)
    }
}

/// Fetcher for runs that must only use the local cache
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl RemoteFetcher for OfflineFetcher {
    fn fetch(&self, cds_id: &str, _row_limit: RowLimit) -> Result<TableList, FetchError> {
        Err(FetchError::Offline {
            cds_id: cds_id.to_string(),
        })
    }
}
