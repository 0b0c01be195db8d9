//! VizieR ASU-TSV client.
//!
//! A request for a catalog identifier returns every table of the catalog in
//! one tab-separated document. Each table is announced by a `#Name:` comment
//! and laid out as a header line, a units line, a dashed separator and the
//! data rows, terminated by a blank line:
//!
//! ```text
//! #Name: J/A+A/640/A1/table1
//! #Title: Parameters for the 2017 clusters
//! Cluster	RA_ICRS	DE_ICRS
//! 	deg	deg
//! --------	-------	-------
//! Alessi_1	13.343	49.536
//! ```

use log::debug;

use super::{FetchError, RemoteFetcher};
use crate::settings::{RowLimit, DEFAULT_VIZIER_URL};
use crate::table::{Table, TableList, Value};

/// Blocking VizieR client
#[derive(Clone)]
pub struct VizierFetcher {
    base_url: String,
    agent: ureq::Agent,
}

impl std::fmt::Debug for VizierFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VizierFetcher")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl VizierFetcher {
    /// Client for the default CDS mirror
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_VIZIER_URL)
    }

    /// Client for a specific mirror (e.g. `https://vizier.cfa.harvard.edu`)
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/viz-bin/asu-tsv", self.base_url)
    }
}

impl Default for VizierFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteFetcher for VizierFetcher {
    fn fetch(&self, cds_id: &str, row_limit: RowLimit) -> Result<TableList, FetchError> {
        let endpoint = self.endpoint();
        debug!("Requesting {cds_id} from {endpoint} (row limit {row_limit})");

        let mut response = self
            .agent
            .get(&endpoint)
            .query("-source", cds_id)
            .query("-out.max", row_limit.to_string())
            .query("-out.all", "1")
            .query("-oc.form", "dec")
            .call()
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => FetchError::Status {
                    cds_id: cds_id.to_string(),
                    status,
                },
                other => FetchError::Http {
                    cds_id: cds_id.to_string(),
                    message: other.to_string(),
                },
            })?;

        // Membership tables run to tens of megabytes
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_string()
            .map_err(|e| FetchError::Http {
                cds_id: cds_id.to_string(),
                message: e.to_string(),
            })?;

        let tables = parse_vizier_tsv(cds_id, &body)?;
        debug!("Received {} tables for {cds_id}", tables.len());
        Ok(tables)
    }
}

enum ParseState {
    /// Between tables, waiting for a header line
    Idle,
    /// Header seen, units line or separator next
    Units,
    /// Units seen, separator next
    Separator,
    /// Inside the data block
    Rows,
}

fn is_separator(line: &str) -> bool {
    line.contains('-') && line.chars().all(|c| c == '-' || c == '\t' || c == ' ')
}

/// Parse a multi-table ASU-TSV document into named tables.
pub fn parse_vizier_tsv(cds_id: &str, text: &str) -> Result<TableList, FetchError> {
    let parse_error = |line: usize, message: String| FetchError::Parse {
        cds_id: cds_id.to_string(),
        line,
        message,
    };

    let mut tables = TableList::new();
    let mut name: Option<String> = None;
    let mut current: Option<Table> = None;
    let mut state = ParseState::Idle;

    let mut finish = |name: &mut Option<String>, current: &mut Option<Table>| {
        if let (Some(n), Some(t)) = (name.take(), current.take()) {
            tables.insert(n, t);
        }
    };

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim_end_matches('\r');

        if let Some(comment) = line.strip_prefix('#') {
            if let Some(table_name) = comment.strip_prefix("Name:") {
                finish(&mut name, &mut current);
                name = Some(table_name.trim().to_string());
                state = ParseState::Idle;
            }
            continue;
        }

        // A units line can be all tabs, so only a blank line outside the
        // header block ends a table
        if line.trim().is_empty() && !matches!(state, ParseState::Units) {
            finish(&mut name, &mut current);
            state = ParseState::Idle;
            continue;
        }

        match state {
            ParseState::Idle => {
                if name.is_none() {
                    return Err(parse_error(line_no, "data outside of a named table".into()));
                }
                let columns = line.split('\t').map(str::trim);
                let table = Table::new(columns).map_err(|e| parse_error(line_no, e.to_string()))?;
                current = Some(table);
                state = ParseState::Units;
            }
            ParseState::Units => {
                state = if is_separator(line) {
                    ParseState::Rows
                } else {
                    ParseState::Separator
                };
            }
            ParseState::Separator => {
                if !is_separator(line) {
                    return Err(parse_error(line_no, "expected dashed separator line".into()));
                }
                state = ParseState::Rows;
            }
            ParseState::Rows => {
                let Some(table) = current.as_mut() else {
                    return Err(parse_error(line_no, "row without header".into()));
                };
                let width = table.columns().len();
                let mut row: Vec<Value> = line.split('\t').map(Value::parse_cell).collect();
                if row.len() > width {
                    return Err(parse_error(
                        line_no,
                        format!("row has {} fields, header has {width}", row.len()),
                    ));
                }
                // Trailing empty cells are sometimes dropped
                row.resize(width, Value::Null);
                table
                    .push_row(row)
                    .map_err(|e| parse_error(line_no, e.to_string()))?;
            }
        }
    }
    finish(&mut name, &mut current);

    if tables.is_empty() {
        return Err(FetchError::NotFound {
            cds_id: cds_id.to_string(),
        });
    }
    Ok(tables)
}
