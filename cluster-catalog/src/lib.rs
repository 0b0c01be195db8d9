//! Star cluster catalog loading
//!
//! Loads open-cluster catalogs published on VizieR, caches their raw tables
//! locally and groups per-star membership rows into named [`StarCluster`]s
//! anchored on the sky, ready for the interactive dashboard.
//!
//! Pipeline, leaves first:
//! - [`config`]: validate the YAML catalog list into [`CatalogDescriptor`]s
//! - [`cache`]: load each catalog's tables from disk, or fetch and store them
//! - [`fetch`]: the remote side, a [`RemoteFetcher`] such as [`VizierFetcher`]
//! - [`cluster`]: partition membership tables into clusters with anchors
//! - [`loader`]: run every catalog in order and merge into one mapping
//!
//! ```no_run
//! use cluster_catalog::{DataLoader, Settings, VizierFetcher};
//!
//! let settings = Settings::default();
//! let loader = DataLoader::from_settings(&settings, VizierFetcher::new());
//! let outcome = loader.run_config_file(&settings.catalogs_file)?;
//! println!("{} clusters", outcome.clusters.len());
//! # Ok::<(), cluster_catalog::LoadError>(())
//! ```

pub mod cache;
pub mod cluster;
pub mod config;
pub mod coords;
pub mod fetch;
pub mod loader;
pub mod settings;
pub mod table;

#[cfg(test)]
mod test_util;

pub use cache::{CacheError, TableCache};
pub use cluster::{BuildError, Catalog, ClusterMap, StarCluster};
pub use config::{
    parse_catalog_entries, read_catalog_file, validate_catalogs, CatalogDescriptor,
    ClusterColumns, RawCatalogEntry, TableRole, ValidationError,
};
pub use coords::{CoordinateAnchor, IcrsCoord};
pub use fetch::{parse_vizier_tsv, FetchError, OfflineFetcher, RemoteFetcher, VizierFetcher};
pub use loader::{
    export_clusters_json, find_cluster, ClusterCollision, DataLoader, GlobalClusterMapping,
    LoadError, LoadOutcome,
};
pub use settings::{RowLimit, Settings};
pub use table::{Table, TableList, Value};
