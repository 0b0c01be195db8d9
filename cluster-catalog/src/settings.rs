//! Runtime settings for a load run.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default catalog list location, relative to the working directory
pub const DEFAULT_CATALOGS_FILE: &str = "catalogs.yaml";
/// Default directory for raw table cache files
pub const DEFAULT_RAW_DATA_DIR: &str = "data/raw";
/// Default VizieR mirror
pub const DEFAULT_VIZIER_URL: &str = "https://vizier.cds.unistra.fr";

/// Maximum number of rows requested per table from the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowLimit {
    /// Request every row
    #[default]
    Unbounded,
    /// Request at most this many rows
    Rows(usize),
}

impl fmt::Display for RowLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowLimit::Unbounded => write!(f, "unlimited"),
            RowLimit::Rows(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for RowLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unlimited") || s == "-1" {
            return Ok(RowLimit::Unbounded);
        }
        let rows: usize = s
            .parse()
            .map_err(|_| format!("Invalid row limit '{s}' (expected a count or 'unlimited')"))?;
        if rows == 0 {
            return Err("Row limit must be positive".to_string());
        }
        Ok(RowLimit::Rows(rows))
    }
}

/// Settings shared by every catalog in a load run
#[derive(Debug, Clone)]
pub struct Settings {
    /// YAML catalog list
    pub catalogs_file: PathBuf,
    /// Directory holding one cache file per catalog
    pub raw_data_dir: PathBuf,
    /// Row limit passed to the remote fetcher
    pub row_limit: RowLimit,
    /// Base URL of the VizieR service
    pub vizier_url: String,
    /// Never contact the remote service; a cache miss is an error
    pub offline: bool,
}

impl Settings {
    pub fn with_raw_data_dir(raw_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_data_dir: raw_data_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalogs_file: PathBuf::from(DEFAULT_CATALOGS_FILE),
            raw_data_dir: PathBuf::from(DEFAULT_RAW_DATA_DIR),
            row_limit: RowLimit::Unbounded,
            vizier_url: DEFAULT_VIZIER_URL.to_string(),
            offline: false,
        }
    }
}
