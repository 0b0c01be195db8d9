//! Catalog aggregation
//!
//! [`DataLoader`] drives a whole load run: for every configured catalog, in
//! list order, it resolves the raw tables through the [`TableCache`], builds
//! the catalog's star clusters and merges them into one global mapping keyed
//! by cluster name.
//!
//! When two catalogs publish a cluster under the same name, the catalog later
//! in the list wins and its [`StarCluster`] replaces the earlier one outright.
//! Member lists are never merged across catalogs. Every replacement is
//! reported in [`LoadOutcome::collisions`].
//!
//! The run is fail-fast: the first catalog that cannot be resolved or built
//! aborts the run and nothing is returned for the catalogs before it.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;

use crate::cache::{CacheError, TableCache};
use crate::cluster::{BuildError, Catalog, ClusterMap, StarCluster};
use crate::config::{read_catalog_file, CatalogDescriptor, TableRole, ValidationError};
use crate::fetch::RemoteFetcher;
use crate::settings::Settings;

/// Global mapping handed to the dashboard: cluster name to cluster
pub type GlobalClusterMapping = ClusterMap;

/// Errors that abort a load run
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Catalog {catalog}: {role} table {table} not found (available: {})", .available.join(", "))]
    MissingTable {
        catalog: String,
        role: TableRole,
        table: String,
        available: Vec<String>,
    },
}

/// A cluster name published by more than one catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCollision {
    pub cluster: String,
    /// Catalog whose cluster was dropped from the global mapping
    pub replaced_catalog: String,
    /// Catalog whose cluster is now in the global mapping
    pub winning_catalog: String,
}

/// Result of a load run
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub clusters: GlobalClusterMapping,
    /// Every catalog, in configuration order
    pub catalogs: Vec<Catalog>,
    pub collisions: Vec<ClusterCollision>,
}

impl LoadOutcome {
    /// Number of member rows across all clusters in the global mapping
    pub fn total_members(&self) -> usize {
        self.clusters.values().map(|c| c.num_members()).sum()
    }
}

/// Drives validation output through the cache and cluster builder
#[derive(Debug)]
pub struct DataLoader<F> {
    cache: TableCache<F>,
}

impl<F: RemoteFetcher> DataLoader<F> {
    pub fn new(cache: TableCache<F>) -> Self {
        Self { cache }
    }

    /// Loader using the cache directory and row limit from `settings`
    pub fn from_settings(settings: &Settings, fetcher: F) -> Self {
        Self::new(TableCache::new(
            settings.raw_data_dir.clone(),
            fetcher,
            settings.row_limit,
        ))
    }

    pub fn cache(&self) -> &TableCache<F> {
        &self.cache
    }

    /// Resolve one catalog's tables and build its clusters.
    pub fn load_catalog(&self, descriptor: &CatalogDescriptor) -> Result<Catalog, LoadError> {
        let mut tables = self.cache.resolve(descriptor)?;

        let mut take = |role: TableRole| {
            let name = descriptor.table_name(role);
            tables.take(name).ok_or_else(|| LoadError::MissingTable {
                catalog: descriptor.name.clone(),
                role,
                table: name.to_string(),
                available: tables.names().map(str::to_string).collect(),
            })
        };
        let params = take(TableRole::ClustersParams)?;
        // One table may serve both roles
        let members = if descriptor.members_table_name() == descriptor.params_table_name() {
            params.clone()
        } else {
            take(TableRole::ClusterMembers)?
        };

        let mut catalog = Catalog::from_descriptor(descriptor, params, members);
        catalog.create_star_clusters()?;
        Ok(catalog)
    }

    /// Load every catalog in order and merge their clusters.
    pub fn run(&self, descriptors: &[CatalogDescriptor]) -> Result<LoadOutcome, LoadError> {
        let mut outcome = LoadOutcome::default();

        for descriptor in descriptors {
            let catalog = self.load_catalog(descriptor)?;
            info!(
                "Loaded {} ({}, {}): {} clusters",
                catalog.name,
                catalog.cds_id,
                catalog.author,
                catalog.star_clusters().len()
            );

            for (name, cluster) in catalog.star_clusters() {
                if let Some(replaced) = outcome.clusters.insert(name.clone(), Arc::clone(cluster)) {
                    warn!(
                        "Cluster {name} from {} replaces the one from {}",
                        catalog.name,
                        replaced.catalog()
                    );
                    outcome.collisions.push(ClusterCollision {
                        cluster: name.clone(),
                        replaced_catalog: replaced.catalog().to_string(),
                        winning_catalog: catalog.name.clone(),
                    });
                }
            }
            outcome.catalogs.push(catalog);
        }

        info!(
            "Loaded {} clusters from {} catalogs",
            outcome.clusters.len(),
            outcome.catalogs.len()
        );
        Ok(outcome)
    }

    /// Read and validate a catalog list file, then [`run`](Self::run) it.
    ///
    /// Validation completes before any cache or network access.
    pub fn run_config_file<P: AsRef<Path>>(&self, path: P) -> Result<LoadOutcome, LoadError> {
        let descriptors = read_catalog_file(path)?;
        self.run(&descriptors)
    }
}

/// Write the global mapping as a JSON object keyed by cluster name.
pub fn export_clusters_json<W: Write>(
    clusters: &GlobalClusterMapping,
    writer: W,
) -> serde_json::Result<()> {
    let object: serde_json::Map<String, serde_json::Value> = clusters
        .iter()
        .map(|(name, cluster)| (name.clone(), cluster.to_json()))
        .collect();
    serde_json::to_writer_pretty(writer, &object)
}

/// Look up one cluster by name
pub fn find_cluster<'a>(clusters: &'a GlobalClusterMapping, name: &str) -> Option<&'a StarCluster> {
    clusters.get(name).map(Arc::as_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_catalog_entries, validate_catalogs};
    use crate::settings::RowLimit;
    use crate::table::{Table, TableList, Value};
    use crate::test_util::{example_members, example_params, CountingFetcher};
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn tables_for(cds_id: &str, params: Table, members: Table) -> TableList {
        let mut tables = TableList::new();
        tables.insert(format!("{cds_id}/params"), params);
        tables.insert(format!("{cds_id}/members"), members);
        tables
    }

    fn descriptor(name: &str, cds_id: &str) -> CatalogDescriptor {
        CatalogDescriptor::new(name, cds_id, "Tester", "params", "members")
    }

    fn ngc_2360_tables(cds_id: &str, ra: f64, gaia: &[i64]) -> TableList {
        let params = Table::with_rows(
            ["Cluster", "RA_ICRS", "DE_ICRS"],
            vec![vec!["NGC_2360".into(), Value::Float(ra), Value::Float(-15.6)]],
        )
        .unwrap();
        let members = Table::with_rows(
            ["Cluster", "Gaia"],
            gaia.iter().map(|g| vec!["NGC_2360".into(), Value::Int(*g)]),
        )
        .unwrap();
        tables_for(cds_id, params, members)
    }

    fn loader(dir: &TempDir, fetcher: CountingFetcher) -> DataLoader<CountingFetcher> {
        DataLoader::new(TableCache::new(dir.path(), fetcher, RowLimit::Unbounded))
    }

    #[test]
    fn test_single_catalog() {
        let dir = TempDir::new().unwrap();
        let fetcher = CountingFetcher::default()
            .with_catalog("J/X/1", tables_for("J/X/1", example_params(), example_members()));
        let outcome = loader(&dir, fetcher).run(&[descriptor("One", "J/X/1")]).unwrap();

        assert_eq!(outcome.catalogs.len(), 1);
        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(outcome.total_members(), 3);
        assert!(outcome.collisions.is_empty());
    }

    #[test]
    fn test_collision_last_catalog_wins() {
        let dir = TempDir::new().unwrap();
        let fetcher = CountingFetcher::default()
            .with_catalog("J/X/1", ngc_2360_tables("J/X/1", 109.4, &[1, 2, 3]))
            .with_catalog("J/X/2", ngc_2360_tables("J/X/2", 109.5, &[4, 5]));
        let outcome = loader(&dir, fetcher)
            .run(&[descriptor("First", "J/X/1"), descriptor("Second", "J/X/2")])
            .unwrap();

        let winner = &outcome.clusters["NGC_2360"];
        let second = &outcome.catalogs[1].star_clusters()["NGC_2360"];
        assert_eq!(**winner, **second);
        assert_eq!(winner.num_members(), 2);
        assert_eq!(winner.catalog(), "Second");
        assert_relative_eq!(winner.anchor().single().unwrap().ra(), 109.5);

        assert_eq!(
            outcome.collisions,
            vec![ClusterCollision {
                cluster: "NGC_2360".into(),
                replaced_catalog: "First".into(),
                winning_catalog: "Second".into(),
            }]
        );
    }

    #[test]
    fn test_build_failure_aborts_run() {
        let dir = TempDir::new().unwrap();
        let no_ra = Table::with_rows(
            ["Cluster", "DE_ICRS"],
            vec![vec!["A".into(), Value::Float(20.0)]],
        )
        .unwrap();
        let fetcher = CountingFetcher::default()
            .with_catalog("J/X/1", tables_for("J/X/1", example_params(), example_members()))
            .with_catalog("J/X/2", tables_for("J/X/2", no_ra, example_members()))
            .with_catalog("J/X/3", tables_for("J/X/3", example_params(), example_members()));
        let loader = loader(&dir, fetcher);

        let err = loader
            .run(&[
                descriptor("Good", "J/X/1"),
                descriptor("NoRa", "J/X/2"),
                descriptor("Never", "J/X/3"),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Build(BuildError::MissingColumn { ref column, .. }) if column == "RA_ICRS"
        ));
        // The third catalog is never requested
        assert_eq!(loader.cache().fetcher().calls(), 2);
    }

    #[test]
    fn test_missing_table_in_collection() {
        let dir = TempDir::new().unwrap();
        let mut tables = TableList::new();
        tables.insert("J/X/1/params", example_params());
        let fetcher = CountingFetcher::default().with_catalog("J/X/1", tables);

        let err = loader(&dir, fetcher)
            .load_catalog(&descriptor("Half", "J/X/1"))
            .unwrap_err();
        match err {
            LoadError::MissingTable { role, table, available, .. } => {
                assert_eq!(role, TableRole::ClusterMembers);
                assert_eq!(table, "J/X/1/members");
                assert!(available.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_one_table_for_both_roles() {
        let dir = TempDir::new().unwrap();
        let yaml = r#"
- name: Shared
  cds_id: J/X/1
  author: Tester
  table_names:
    clusters_params: all
    cluster_members: all
"#;
        let descriptors = validate_catalogs(&parse_catalog_entries(yaml).unwrap()).unwrap();

        let combined = Table::with_rows(
            ["Cluster", "RA_ICRS", "DE_ICRS", "Gaia"],
            vec![
                vec!["A".into(), Value::Float(10.0), Value::Float(20.0), Value::Int(1)],
                vec!["B".into(), Value::Float(30.0), Value::Float(40.0), Value::Int(2)],
            ],
        )
        .unwrap();
        let mut tables = TableList::new();
        tables.insert("J/X/1/all", combined);
        let fetcher = CountingFetcher::default().with_catalog("J/X/1", tables);

        let outcome = loader(&dir, fetcher).run(&descriptors).unwrap();
        assert_eq!(outcome.clusters.len(), 2);
        let a = &outcome.clusters["A"];
        assert_eq!(a.num_members(), 1);
        let anchor = a.anchor().single().unwrap();
        assert_relative_eq!(anchor.ra(), 10.0);
        assert_relative_eq!(anchor.dec(), 20.0);
    }

    #[test]
    fn test_fetch_failure_aborts_run() {
        let dir = TempDir::new().unwrap();
        let err = loader(&dir, CountingFetcher::default())
            .run(&[descriptor("Unknown", "J/X/404")])
            .unwrap_err();
        assert!(matches!(err, LoadError::Cache(CacheError::Fetch(_))));
    }

    #[test]
    fn test_invalid_config_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("catalogs.yaml");
        std::fs::write(
            &config,
            "- name: Broken\n  cds_id: J/X/1\n  author: A\n  table_names:\n    clusters_params: params\n",
        )
        .unwrap();

        let cache_dir = dir.path().join("raw");
        let loader = DataLoader::new(TableCache::new(
            &cache_dir,
            CountingFetcher::new(tables_for("J/X/1", example_params(), example_members())),
            RowLimit::Unbounded,
        ));

        let err = loader.run_config_file(&config).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Validation(ValidationError::MissingTableRole {
                role: TableRole::ClusterMembers,
                ..
            })
        ));
        assert_eq!(loader.cache().fetcher().calls(), 0);
        assert!(!cache_dir.exists());
    }

    #[test]
    fn test_second_run_uses_cache() {
        let dir = TempDir::new().unwrap();
        let descriptors = validate_catalogs(
            &parse_catalog_entries(
                "- {name: S, cds_id: J/X/1, author: A, table_names: {clusters_params: params, cluster_members: members}}",
            )
            .unwrap(),
        )
        .unwrap();
        let loader = loader(
            &dir,
            CountingFetcher::new(tables_for("J/X/1", example_params(), example_members())),
        );

        let first = loader.run(&descriptors).unwrap();
        let second = loader.run(&descriptors).unwrap();
        assert_eq!(loader.cache().fetcher().calls(), 1);
        assert_eq!(first.clusters, second.clusters);
    }

    #[test]
    fn test_export_json() {
        let dir = TempDir::new().unwrap();
        let fetcher = CountingFetcher::new(tables_for("J/X/1", example_params(), example_members()));
        let outcome = loader(&dir, fetcher).run(&[descriptor("One", "J/X/1")]).unwrap();

        let mut buffer = Vec::new();
        export_clusters_json(&outcome.clusters, &mut buffer).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

        assert_eq!(json["A"]["members"].as_array().unwrap().len(), 2);
        assert_eq!(json["B"]["anchor"][0]["dec_deg"], 40.0);
        assert_eq!(
            find_cluster(&outcome.clusters, "B").map(StarCluster::num_members),
            Some(1)
        );
        assert!(find_cluster(&outcome.clusters, "C").is_none());
    }
}
