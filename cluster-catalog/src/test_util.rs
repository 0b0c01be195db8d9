//! Fixtures shared by the unit tests.

use std::cell::Cell;
use std::collections::BTreeMap;

use crate::config::CatalogDescriptor;
use crate::fetch::{FetchError, RemoteFetcher};
use crate::settings::RowLimit;
use crate::table::{Table, TableList, Value};

/// Membership table `[(A, 1), (B, 2), (A, 3)]`
pub fn example_members() -> Table {
    Table::with_rows(
        ["Cluster", "Gaia"],
        vec![
            vec!["A".into(), Value::Int(1)],
            vec!["B".into(), Value::Int(2)],
            vec!["A".into(), Value::Int(3)],
        ],
    )
    .expect("fixture table is well formed")
}

/// Parameter table `[(A, 10, 20), (B, 30, 40)]`
pub fn example_params() -> Table {
    Table::with_rows(
        ["Cluster", "RA_ICRS", "DE_ICRS"],
        vec![
            vec!["A".into(), Value::Float(10.0), Value::Float(20.0)],
            vec!["B".into(), Value::Float(30.0), Value::Float(40.0)],
        ],
    )
    .expect("fixture table is well formed")
}

/// Descriptor for catalog `J/X/1` with tables `params` and `members`
pub fn sample_descriptor() -> CatalogDescriptor {
    CatalogDescriptor::new("Sample", "J/X/1", "Tester", "params", "members")
}

/// Tables served for [`sample_descriptor`]
pub fn sample_table_list() -> TableList {
    let mut tables = TableList::new();
    tables.insert("J/X/1/params", example_params());
    tables.insert("J/X/1/members", example_members());
    tables
}

/// In-memory fetcher that counts how often it is asked for data
#[derive(Debug, Default)]
pub struct CountingFetcher {
    catalogs: BTreeMap<String, TableList>,
    fallback: Option<TableList>,
    calls: Cell<usize>,
}

impl CountingFetcher {
    /// Serve `tables` for any catalog identifier
    pub fn new(tables: TableList) -> Self {
        Self {
            fallback: Some(tables),
            ..Self::default()
        }
    }

    /// Serve `tables` for `cds_id` only
    pub fn with_catalog(mut self, cds_id: &str, tables: TableList) -> Self {
        self.catalogs.insert(cds_id.to_string(), tables);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl RemoteFetcher for CountingFetcher {
    fn fetch(&self, cds_id: &str, _row_limit: RowLimit) -> Result<TableList, FetchError> {
        self.calls.set(self.calls.get() + 1);
        self.catalogs
            .get(cds_id)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                cds_id: cds_id.to_string(),
            })
    }
}
