//! Catalog list configuration
//!
//! The catalog list is a YAML sequence with one record per VizieR source:
//!
//! ```yaml
//! - name: CantatGaudin2020
//!   cds_id: J/A+A/640/A1
//!   author: Cantat-Gaudin et al. (2020)
//!   table_names:
//!     clusters_params: table1
//!     cluster_members: nodup
//! ```
//!
//! Records are first read into [`RawCatalogEntry`] values with every field
//! left untyped, then checked by [`validate_catalogs`]. Validation is a pure
//! transform: nothing touches the cache or the network until every record has
//! passed.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml_ng::Value as YamlValue;
use thiserror::Error;

/// Default name of the column holding the cluster identifier
pub const DEFAULT_CLUSTER_COLUMN: &str = "Cluster";
/// Default right ascension column (ICRS, degrees)
pub const DEFAULT_RA_COLUMN: &str = "RA_ICRS";
/// Default declination column (ICRS, degrees)
pub const DEFAULT_DEC_COLUMN: &str = "DE_ICRS";

/// Extension used for table cache files
pub const CACHE_EXTENSION: &str = "bin";

/// Logical purpose of a configured table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableRole {
    /// One row per cluster with its fitted parameters and position
    ClustersParams,
    /// One row per member star, tagged with its cluster
    ClusterMembers,
}

impl TableRole {
    pub const ALL: [TableRole; 2] = [TableRole::ClustersParams, TableRole::ClusterMembers];

    /// Key used for this role in the `table_names` mapping
    pub fn key(&self) -> &'static str {
        match self {
            TableRole::ClustersParams => "clusters_params",
            TableRole::ClusterMembers => "cluster_members",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.key() == key)
    }
}

impl fmt::Display for TableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Position of a record in the catalog list, used in error messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRef {
    /// Zero-based index in the list
    pub index: usize,
    /// Catalog name, when it could be read
    pub name: Option<String>,
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "catalog #{} ({name})", self.index + 1),
            None => write!(f, "catalog #{}", self.index + 1),
        }
    }
}

/// Errors produced while reading or validating the catalog list
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Failed to read catalog list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog list is not a valid YAML sequence of records: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    #[error("{entry}: missing required field `{field}`")]
    MissingField { entry: EntryRef, field: &'static str },

    #[error("{entry}: field `{field}` must be {expected}")]
    WrongType {
        entry: EntryRef,
        field: String,
        expected: &'static str,
    },

    #[error("{entry}: field `{field}` must not be empty")]
    EmptyField { entry: EntryRef, field: String },

    #[error("{entry}: table_names is missing required role `{role}`")]
    MissingTableRole { entry: EntryRef, role: TableRole },

    #[error("{entry}: table_names has unknown role `{role}`")]
    UnknownTableRole { entry: EntryRef, role: String },

    #[error("{entry}: unknown column override `{key}` (expected cluster, ra or dec)")]
    UnknownColumnOverride { entry: EntryRef, key: String },

    #[error("{entry}: name must not contain path separators or `..`")]
    UnsafeName { entry: EntryRef },

    #[error("{entry}: duplicates an earlier catalog (cache file {cache_file})")]
    DuplicateCatalog { entry: EntryRef, cache_file: String },
}

/// One record of the catalog list exactly as written in the file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCatalogEntry {
    #[serde(default)]
    pub name: Option<YamlValue>,
    #[serde(default)]
    pub cds_id: Option<YamlValue>,
    #[serde(default)]
    pub author: Option<YamlValue>,
    #[serde(default)]
    pub table_names: Option<YamlValue>,
    #[serde(default)]
    pub columns: Option<YamlValue>,
}

/// Column names the cluster builder reads from both tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterColumns {
    pub cluster: String,
    pub ra: String,
    pub dec: String,
}

impl Default for ClusterColumns {
    fn default() -> Self {
        Self {
            cluster: DEFAULT_CLUSTER_COLUMN.to_string(),
            ra: DEFAULT_RA_COLUMN.to_string(),
            dec: DEFAULT_DEC_COLUMN.to_string(),
        }
    }
}

/// A validated catalog record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDescriptor {
    pub name: String,
    /// VizieR/CDS catalog identifier, e.g. `J/A+A/640/A1`
    pub cds_id: String,
    pub author: String,
    /// Fully-qualified parameter table name (`<cds_id>/<suffix>`)
    params_table: String,
    /// Fully-qualified membership table name (`<cds_id>/<suffix>`)
    members_table: String,
    pub columns: ClusterColumns,
}

impl CatalogDescriptor {
    /// Build a descriptor from already-checked parts.
    ///
    /// Table suffixes are qualified with the catalog id here.
    pub fn new(
        name: impl Into<String>,
        cds_id: impl Into<String>,
        author: impl Into<String>,
        params_suffix: &str,
        members_suffix: &str,
    ) -> Self {
        let cds_id = cds_id.into();
        Self {
            name: name.into(),
            params_table: qualify_table_name(&cds_id, params_suffix),
            members_table: qualify_table_name(&cds_id, members_suffix),
            cds_id,
            author: author.into(),
            columns: ClusterColumns::default(),
        }
    }

    pub fn with_columns(mut self, columns: ClusterColumns) -> Self {
        self.columns = columns;
        self
    }

    /// Fully-qualified table name configured for `role`
    pub fn table_name(&self, role: TableRole) -> &str {
        match role {
            TableRole::ClustersParams => &self.params_table,
            TableRole::ClusterMembers => &self.members_table,
        }
    }

    pub fn params_table_name(&self) -> &str {
        &self.params_table
    }

    pub fn members_table_name(&self) -> &str {
        &self.members_table
    }

    /// Cache file name: catalog name followed by the catalog id with `/`
    /// replaced by `_`, e.g. `CantatGaudin2020J_A+A_640_A1.bin`
    pub fn cache_file_name(&self) -> String {
        format!(
            "{}{}.{CACHE_EXTENSION}",
            self.name,
            self.cds_id.replace('/', "_")
        )
    }

    /// Location of this catalog's cache file inside `raw_data_dir`
    pub fn cache_path(&self, raw_data_dir: &Path) -> PathBuf {
        raw_data_dir.join(self.cache_file_name())
    }
}

fn qualify_table_name(cds_id: &str, suffix: &str) -> String {
    format!("{cds_id}/{suffix}")
}

/// Parse the YAML text of a catalog list into raw records.
pub fn parse_catalog_entries(yaml: &str) -> Result<Vec<RawCatalogEntry>, ValidationError> {
    // An empty document is an empty list
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// Read, parse and validate a catalog list file.
pub fn read_catalog_file<P: AsRef<Path>>(path: P) -> Result<Vec<CatalogDescriptor>, ValidationError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let entries = parse_catalog_entries(&text)?;
    validate_catalogs(&entries)
}

/// Validate raw records in order.
///
/// Returns one descriptor per record, in the same order, or the error for the
/// first record that breaks a constraint.
pub fn validate_catalogs(entries: &[RawCatalogEntry]) -> Result<Vec<CatalogDescriptor>, ValidationError> {
    let mut seen_names = HashSet::new();
    let mut seen_cache_files = HashSet::new();
    let mut descriptors = Vec::with_capacity(entries.len());

    for (index, raw) in entries.iter().enumerate() {
        let descriptor = validate_entry(index, raw)?;

        let cache_file = descriptor.cache_file_name();
        let fresh_name = seen_names.insert(descriptor.name.clone());
        let fresh_cache = seen_cache_files.insert(cache_file.clone());
        if !fresh_name || !fresh_cache {
            return Err(ValidationError::DuplicateCatalog {
                entry: EntryRef {
                    index,
                    name: Some(descriptor.name),
                },
                cache_file,
            });
        }

        descriptors.push(descriptor);
    }

    Ok(descriptors)
}

fn validate_entry(index: usize, raw: &RawCatalogEntry) -> Result<CatalogDescriptor, ValidationError> {
    let mut entry = EntryRef { index, name: None };

    let name = required_string(&entry, "name", raw.name.as_ref())?;
    entry.name = Some(name.clone());
    // The name becomes part of the cache file name
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(ValidationError::UnsafeName { entry });
    }
    let cds_id = required_string(&entry, "cds_id", raw.cds_id.as_ref())?;
    let author = required_string(&entry, "author", raw.author.as_ref())?;

    let table_names = raw
        .table_names
        .as_ref()
        .filter(|v| !v.is_null())
        .ok_or_else(|| ValidationError::MissingField {
            entry: entry.clone(),
            field: "table_names",
        })?;
    let table_names = table_names
        .as_mapping()
        .ok_or_else(|| ValidationError::WrongType {
            entry: entry.clone(),
            field: "table_names".to_string(),
            expected: "a mapping of table role to table name",
        })?;

    let mut params_suffix = None;
    let mut members_suffix = None;
    for (key, value) in table_names {
        let key = key.as_str().ok_or_else(|| ValidationError::WrongType {
            entry: entry.clone(),
            field: "table_names".to_string(),
            expected: "keyed by strings",
        })?;
        let role = TableRole::from_key(key).ok_or_else(|| ValidationError::UnknownTableRole {
            entry: entry.clone(),
            role: key.to_string(),
        })?;
        let field = format!("table_names.{key}");
        let suffix = string_value(&entry, &field, value)?;
        match role {
            TableRole::ClustersParams => params_suffix = Some(suffix),
            TableRole::ClusterMembers => members_suffix = Some(suffix),
        }
    }

    let params_suffix = params_suffix.ok_or_else(|| ValidationError::MissingTableRole {
        entry: entry.clone(),
        role: TableRole::ClustersParams,
    })?;
    let members_suffix = members_suffix.ok_or_else(|| ValidationError::MissingTableRole {
        entry: entry.clone(),
        role: TableRole::ClusterMembers,
    })?;

    let columns = match raw.columns.as_ref().filter(|v| !v.is_null()) {
        Some(value) => column_overrides(&entry, value)?,
        None => ClusterColumns::default(),
    };

    Ok(
        CatalogDescriptor::new(name, cds_id, author, &params_suffix, &members_suffix)
            .with_columns(columns),
    )
}

fn column_overrides(entry: &EntryRef, value: &YamlValue) -> Result<ClusterColumns, ValidationError> {
    let mapping = value.as_mapping().ok_or_else(|| ValidationError::WrongType {
        entry: entry.clone(),
        field: "columns".to_string(),
        expected: "a mapping with cluster, ra and/or dec",
    })?;

    let mut columns = ClusterColumns::default();
    for (key, value) in mapping {
        let key = key.as_str().ok_or_else(|| ValidationError::WrongType {
            entry: entry.clone(),
            field: "columns".to_string(),
            expected: "keyed by strings",
        })?;
        let column = string_value(entry, &format!("columns.{key}"), value)?;
        match key {
            "cluster" => columns.cluster = column,
            "ra" => columns.ra = column,
            "dec" => columns.dec = column,
            other => {
                return Err(ValidationError::UnknownColumnOverride {
                    entry: entry.clone(),
                    key: other.to_string(),
                })
            }
        }
    }
    Ok(columns)
}

fn required_string(
    entry: &EntryRef,
    field: &'static str,
    value: Option<&YamlValue>,
) -> Result<String, ValidationError> {
    match value {
        None | Some(YamlValue::Null) => Err(ValidationError::MissingField {
            entry: entry.clone(),
            field,
        }),
        Some(value) => string_value(entry, field, value),
    }
}

fn string_value(entry: &EntryRef, field: &str, value: &YamlValue) -> Result<String, ValidationError> {
    let text = value.as_str().ok_or_else(|| ValidationError::WrongType {
        entry: entry.clone(),
        field: field.to_string(),
        expected: "a string",
    })?;
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyField {
            entry: entry.clone(),
            field: field.to_string(),
        });
    }
    Ok(text.to_string())
}
