//! Grouping of membership tables into star clusters
//!
//! A [`Catalog`] owns one source's raw parameter and membership tables.
//! [`Catalog::create_star_clusters`] partitions the membership rows by
//! cluster name and pairs every group with the sky anchor taken from the
//! parameter rows of the same name.
//!
//! # Invariants
//! - Every membership row lands in exactly one [`StarCluster`]; the union of
//!   all member subsets is the input table.
//! - Member subsets are independent copies of the input rows, in input order.
//! - Anchors are never averaged: one position per matching parameter row.
//! - A failed build leaves the catalog's previous cluster map untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::config::{CatalogDescriptor, ClusterColumns, TableRole};
use crate::coords::{CoordinateAnchor, IcrsCoord};
use crate::table::{Table, Value};

/// Cluster name to cluster, in name order
pub type ClusterMap = BTreeMap<String, Arc<StarCluster>>;

/// Errors that can occur while building star clusters
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Catalog {catalog}: {role} table has no `{column}` column")]
    MissingColumn {
        catalog: String,
        role: TableRole,
        column: String,
    },

    #[error("Catalog {catalog}: membership row {row} has no cluster name")]
    MissingClusterName { catalog: String, row: usize },

    #[error("Catalog {catalog}: invalid position for cluster {cluster} in parameter row {row}: {reason}")]
    InvalidCoordinate {
        catalog: String,
        cluster: String,
        row: usize,
        reason: String,
    },
}

/// One named group of member stars with its sky anchor
#[derive(Debug, Clone, PartialEq)]
pub struct StarCluster {
    name: String,
    catalog: String,
    anchor: CoordinateAnchor,
    members: Table,
}

impl StarCluster {
    pub fn new(
        name: impl Into<String>,
        catalog: impl Into<String>,
        anchor: CoordinateAnchor,
        members: Table,
    ) -> Self {
        Self {
            name: name.into(),
            catalog: catalog.into(),
            anchor,
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the catalog whose membership table this cluster came from
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub fn anchor(&self) -> &CoordinateAnchor {
        &self.anchor
    }

    /// Membership rows of this cluster, with the source table's columns
    pub fn members(&self) -> &Table {
        &self.members
    }

    pub fn num_members(&self) -> usize {
        self.members.num_rows()
    }

    /// JSON rendering handed to the dashboard
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "catalog": self.catalog,
            "anchor": self.anchor,
            "members": self.members.to_json_records(),
        })
    }
}

/// One catalog source: its raw tables and the clusters derived from them
#[derive(Debug, Clone)]
pub struct Catalog {
    pub name: String,
    pub cds_id: String,
    pub author: String,
    params_table: Table,
    members_table: Table,
    columns: ClusterColumns,
    star_clusters: ClusterMap,
}

impl Catalog {
    /// Wrap raw tables. No clusters exist until
    /// [`create_star_clusters`](Self::create_star_clusters) is called.
    pub fn new(
        name: impl Into<String>,
        cds_id: impl Into<String>,
        author: impl Into<String>,
        params_table: Table,
        members_table: Table,
    ) -> Self {
        Self {
            name: name.into(),
            cds_id: cds_id.into(),
            author: author.into(),
            params_table,
            members_table,
            columns: ClusterColumns::default(),
            star_clusters: ClusterMap::new(),
        }
    }

    /// Wrap the raw tables of a configured catalog, using its column names
    pub fn from_descriptor(
        descriptor: &CatalogDescriptor,
        params_table: Table,
        members_table: Table,
    ) -> Self {
        Self::new(
            &descriptor.name,
            &descriptor.cds_id,
            &descriptor.author,
            params_table,
            members_table,
        )
        .with_columns(descriptor.columns.clone())
    }

    pub fn with_columns(mut self, columns: ClusterColumns) -> Self {
        self.columns = columns;
        self
    }

    /// Construct a catalog and build its clusters in one step.
    pub fn build(
        name: impl Into<String>,
        cds_id: impl Into<String>,
        author: impl Into<String>,
        params_table: Table,
        members_table: Table,
    ) -> Result<Self, BuildError> {
        let mut catalog = Self::new(name, cds_id, author, params_table, members_table);
        catalog.create_star_clusters()?;
        Ok(catalog)
    }

    pub fn params_table(&self) -> &Table {
        &self.params_table
    }

    pub fn members_table(&self) -> &Table {
        &self.members_table
    }

    pub fn columns(&self) -> &ClusterColumns {
        &self.columns
    }

    /// Clusters built by the last successful
    /// [`create_star_clusters`](Self::create_star_clusters)
    pub fn star_clusters(&self) -> &ClusterMap {
        &self.star_clusters
    }

    pub fn into_star_clusters(self) -> ClusterMap {
        self.star_clusters
    }

    fn require_column(&self, role: TableRole, column: &str) -> Result<usize, BuildError> {
        let table = match role {
            TableRole::ClustersParams => &self.params_table,
            TableRole::ClusterMembers => &self.members_table,
        };
        table
            .column_index(column)
            .ok_or_else(|| BuildError::MissingColumn {
                catalog: self.name.clone(),
                role,
                column: column.to_string(),
            })
    }

    /// Partition the membership table by cluster name and anchor each group.
    ///
    /// Either every cluster is built or none is: on error the previously
    /// built map is kept. A rebuild replaces the map with fresh clusters, so
    /// clusters handed out earlier are never modified.
    pub fn create_star_clusters(&mut self) -> Result<&ClusterMap, BuildError> {
        let cols = &self.columns;
        let member_cluster_idx = self.require_column(TableRole::ClusterMembers, &cols.cluster)?;
        let param_cluster_idx = self.require_column(TableRole::ClustersParams, &cols.cluster)?;
        let param_ra_idx = self.require_column(TableRole::ClustersParams, &cols.ra)?;
        let param_dec_idx = self.require_column(TableRole::ClustersParams, &cols.dec)?;

        // Distinct cluster names with the membership rows of each
        let mut member_groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (row_idx, row) in self.members_table.rows().enumerate() {
            let key = row
                .get(member_cluster_idx)
                .and_then(Value::as_key)
                .ok_or_else(|| BuildError::MissingClusterName {
                    catalog: self.name.clone(),
                    row: row_idx,
                })?;
            member_groups.entry(key).or_default().push(row_idx);
        }

        // Parameter rows per cluster name; rows without a name match nothing
        let mut param_groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (row_idx, row) in self.params_table.rows().enumerate() {
            if let Some(key) = row.get(param_cluster_idx).and_then(Value::as_key) {
                param_groups.entry(key).or_default().push(row_idx);
            }
        }

        let mut clusters = ClusterMap::new();
        for (cluster_name, member_rows) in member_groups {
            let param_rows = param_groups
                .get(&cluster_name)
                .map(Vec::as_slice)
                .unwrap_or_default();

            let mut coords = Vec::with_capacity(param_rows.len());
            for &row_idx in param_rows {
                let invalid = |reason: String| BuildError::InvalidCoordinate {
                    catalog: self.name.clone(),
                    cluster: cluster_name.clone(),
                    row: row_idx,
                    reason,
                };
                let Some(row) = self.params_table.row(row_idx) else {
                    continue;
                };
                let cell = |idx: usize| row.get(idx).cloned().unwrap_or_default();
                let ra = cell(param_ra_idx)
                    .as_f64()
                    .ok_or_else(|| invalid(format!("{} is {}", cols.ra, cell(param_ra_idx))))?;
                let dec = cell(param_dec_idx)
                    .as_f64()
                    .ok_or_else(|| invalid(format!("{} is {}", cols.dec, cell(param_dec_idx))))?;
                coords.push(IcrsCoord::new(ra, dec).map_err(|e| invalid(e.to_string()))?);
            }

            match coords.len() {
                1 => {}
                0 => warn!(
                    "Catalog {}: cluster {} has no parameter row, anchor is empty",
                    self.name, cluster_name
                ),
                n => warn!(
                    "Catalog {}: cluster {} has {} parameter rows, keeping all positions",
                    self.name, cluster_name, n
                ),
            }

            let members = self.members_table.select_indices(&member_rows);
            let cluster = StarCluster::new(
                cluster_name.clone(),
                self.name.clone(),
                CoordinateAnchor::new(coords),
                members,
            );
            clusters.insert(cluster_name, Arc::new(cluster));
        }

        debug!(
            "Catalog {}: built {} clusters from {} member rows",
            self.name,
            clusters.len(),
            self.members_table.num_rows()
        );
        self.star_clusters = clusters;
        Ok(&self.star_clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use crate::test_util::{example_members, example_params};
    use approx::assert_relative_eq;
    use std::collections::HashSet;

    fn example_catalog() -> Catalog {
        Catalog::build("Example", "J/X/1", "Tester", example_params(), example_members()).unwrap()
    }

    #[test]
    fn test_worked_example() {
        let catalog = example_catalog();
        let clusters = catalog.star_clusters();
        assert_eq!(clusters.keys().collect::<Vec<_>>(), vec!["A", "B"]);

        let a = &clusters["A"];
        assert_eq!(a.num_members(), 2);
        let anchor = a.anchor().single().unwrap();
        assert_relative_eq!(anchor.ra(), 10.0);
        assert_relative_eq!(anchor.dec(), 20.0);

        let b = &clusters["B"];
        assert_eq!(b.num_members(), 1);
        let anchor = b.anchor().single().unwrap();
        assert_relative_eq!(anchor.ra(), 30.0);
        assert_relative_eq!(anchor.dec(), 40.0);
    }

    #[test]
    fn test_member_rows_keep_input_order() {
        let catalog = example_catalog();
        let a = &catalog.star_clusters()["A"];
        let gaia: Vec<_> = a.members().column("Gaia").unwrap().cloned().collect();
        assert_eq!(gaia, vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(a.members().columns(), catalog.members_table().columns());
        assert_eq!(a.catalog(), "Example");
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let names = ["NGC_2360", "Alessi_1", "Melotte_22", "NGC_752"];
        let mut rows = Vec::new();
        for gaia in 0..97i64 {
            rows.push(vec![
                Value::from(names[(gaia * 7 % 4) as usize]),
                Value::Int(gaia),
            ]);
        }
        let members = Table::with_rows(["Cluster", "Gaia"], rows).unwrap();
        let params = Table::with_rows(
            ["Cluster", "RA_ICRS", "DE_ICRS"],
            names
                .iter()
                .enumerate()
                .map(|(i, n)| vec![Value::from(*n), Value::Float(i as f64), Value::Float(0.0)]),
        )
        .unwrap();

        let catalog = Catalog::build("Grid", "J/X/2", "Tester", params, members.clone()).unwrap();

        let mut seen = HashSet::new();
        let mut total = 0;
        for (name, cluster) in catalog.star_clusters() {
            for row in cluster.members().rows() {
                assert_eq!(row[0].as_key().as_deref(), Some(name.as_str()));
                assert!(seen.insert(row[1].as_key().unwrap()));
                total += 1;
            }
        }
        assert_eq!(total, members.num_rows());
        assert_eq!(seen.len(), 97);
    }

    #[test]
    fn test_multi_row_anchor_is_kept() {
        let params = Table::with_rows(
            ["Cluster", "RA_ICRS", "DE_ICRS"],
            vec![
                vec!["A".into(), Value::Float(10.0), Value::Float(20.0)],
                vec!["A".into(), Value::Float(10.2), Value::Float(20.2)],
                vec!["B".into(), Value::Float(30.0), Value::Float(40.0)],
            ],
        )
        .unwrap();
        let catalog = Catalog::build("Dup", "J/X/3", "Tester", params, example_members()).unwrap();

        let anchor = catalog.star_clusters()["A"].anchor();
        assert_eq!(anchor.len(), 2);
        assert_relative_eq!(anchor.coords()[1].ra(), 10.2);
    }

    #[test]
    fn test_cluster_without_params_has_empty_anchor() {
        let params = Table::with_rows(
            ["Cluster", "RA_ICRS", "DE_ICRS"],
            vec![vec!["A".into(), Value::Float(10.0), Value::Float(20.0)]],
        )
        .unwrap();
        let catalog = Catalog::build("Sparse", "J/X/4", "Tester", params, example_members()).unwrap();
        assert!(catalog.star_clusters()["B"].anchor().is_empty());
        assert_eq!(catalog.star_clusters()["B"].num_members(), 1);
    }

    #[test]
    fn test_missing_ra_column() {
        let params = Table::with_rows(
            ["Cluster", "DE_ICRS"],
            vec![vec!["A".into(), Value::Float(20.0)]],
        )
        .unwrap();
        let err = Catalog::build("NoRa", "J/X/5", "Tester", params, example_members()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::MissingColumn { role: TableRole::ClustersParams, ref column, .. }
                if column == "RA_ICRS"
        ));
    }

    #[test]
    fn test_missing_member_cluster_column() {
        let members = Table::with_rows(
            ["Name", "Gaia", "RA_ICRS", "DE_ICRS"],
            vec![vec!["A".into(), Value::Int(1), Value::Float(10.0), Value::Float(20.0)]],
        )
        .unwrap();
        let err = Catalog::build("NoCluster", "J/X/6", "Tester", example_params(), members).unwrap_err();
        assert!(matches!(
            err,
            BuildError::MissingColumn { role: TableRole::ClusterMembers, ref column, .. }
                if column == "Cluster"
        ));
    }

    #[test]
    fn test_column_overrides_are_used() {
        let members = Table::with_rows(
            ["Name", "Gaia", "ra", "dec"],
            vec![vec!["A".into(), Value::Int(1), Value::Float(10.0), Value::Float(20.0)]],
        )
        .unwrap();
        let params = Table::with_rows(
            ["Name", "ra", "dec"],
            vec![vec!["A".into(), Value::Float(10.0), Value::Float(20.0)]],
        )
        .unwrap();
        let columns = ClusterColumns {
            cluster: "Name".into(),
            ra: "ra".into(),
            dec: "dec".into(),
        };
        let mut catalog = Catalog::new("Hunt", "J/X/7", "Tester", params, members).with_columns(columns);
        let clusters = catalog.create_star_clusters().unwrap();
        assert_eq!(clusters["A"].num_members(), 1);
    }

    #[test]
    fn test_null_cluster_name_fails() {
        let members = Table::with_rows(
            ["Cluster", "Gaia", "RA_ICRS", "DE_ICRS"],
            vec![
                vec!["A".into(), Value::Int(1), Value::Float(10.0), Value::Float(20.0)],
                vec![Value::Null, Value::Int(2), Value::Float(10.0), Value::Float(20.0)],
            ],
        )
        .unwrap();
        let err = Catalog::build("Nulls", "J/X/8", "Tester", example_params(), members).unwrap_err();
        assert!(matches!(err, BuildError::MissingClusterName { row: 1, .. }));
    }

    #[test]
    fn test_non_numeric_coordinate_fails() {
        let params = Table::with_rows(
            ["Cluster", "RA_ICRS", "DE_ICRS"],
            vec![
                vec!["A".into(), "n/a".into(), Value::Float(20.0)],
                vec!["B".into(), Value::Float(30.0), Value::Float(40.0)],
            ],
        )
        .unwrap();
        let err = Catalog::build("BadRa", "J/X/9", "Tester", params, example_members()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::InvalidCoordinate { ref cluster, row: 0, .. } if cluster == "A"
        ));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_clusters() {
        let mut catalog = example_catalog();
        let before = catalog.star_clusters().clone();

        catalog.params_table = Table::with_rows(["Cluster"], vec![vec!["A".into()]]).unwrap();
        assert!(catalog.create_star_clusters().is_err());
        assert_eq!(catalog.star_clusters(), &before);
    }

    #[test]
    fn test_rebuild_does_not_touch_handed_out_clusters() {
        let mut catalog = example_catalog();
        let handed_out = Arc::clone(&catalog.star_clusters()["A"]);

        catalog.members_table = Table::with_rows(
            ["Cluster", "Gaia", "RA_ICRS", "DE_ICRS"],
            vec![vec!["A".into(), Value::Int(99), Value::Float(10.0), Value::Float(20.0)]],
        )
        .unwrap();
        catalog.create_star_clusters().unwrap();

        assert_eq!(handed_out.num_members(), 2);
        assert_eq!(catalog.star_clusters()["A"].num_members(), 1);
        assert!(!Arc::ptr_eq(&handed_out, &catalog.star_clusters()["A"]));
    }

    #[test]
    fn test_json_rendering() {
        let catalog = example_catalog();
        let json = catalog.star_clusters()["A"].to_json();
        assert_eq!(json["name"], "A");
        assert_eq!(json["catalog"], "Example");
        assert_eq!(json["anchor"][0]["ra_deg"], 10.0);
        assert_eq!(json["members"].as_array().unwrap().len(), 2);
    }
}
