//! Assembly of all tables into indexed lookup structures.

use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::encoder::{EncodeError, TERMINATOR, encode_section};
use crate::table::{RouteId, TableSpec};

/// Per-table metadata as shown on the display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMeta {
    pub id: String,
    pub from: String,
    pub to: String,
    pub route: RouteId,
}

/// The compiled lookup structures, ready for rendering.
///
/// `tables` and `sections` define the index enumerations; `data` is indexed
/// `[table][section]` and holds one terminated byte string per cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub tables: Vec<TableMeta>,
    pub table_count: usize,
    pub sections: Vec<String>,
    #[serde(rename = "plan")]
    pub data: Vec<Vec<Vec<u8>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("no timetables to compile")]
    Empty,

    #[error("table id {0:?} is produced by more than one file")]
    DuplicateTable(String),

    #[error("table {table:?}, section {section:?}: {source}")]
    Encode {
        table: String,
        section: String,
        source: EncodeError,
    },
}

impl Plan {
    pub fn table_index(&self, id: &str) -> Option<usize> {
        self.tables.iter().position(|table| table.id == id)
    }

    pub fn section_index(&self, name: &str) -> Option<usize> {
        self.sections.binary_search_by(|s| s.as_str().cmp(name)).ok()
    }

    /// Encoded bytes for one cell of the lookup.
    pub fn entry(&self, table: usize, section: usize) -> Option<&[u8]> {
        self.data.get(table)?.get(section).map(Vec::as_slice)
    }

    pub fn encoded_len(&self) -> usize {
        self.data.iter().flatten().map(Vec::len).sum()
    }
}

/// Orders tables, indexes sections and encodes every table/section cell.
///
/// Tables are ordered by `(route, to)` with the id as final tie-break;
/// sections are ordered lexicographically. A table that lacks a section
/// gets a lone terminator in that cell.
///
/// # Errors
///
/// Fails on an empty input, duplicate table ids, or any section the
/// encoder rejects.
#[tracing::instrument(skip_all, fields(tables = tables.len()))]
pub fn assemble(tables: &[TableSpec]) -> Result<Plan, PlanError> {
    if tables.is_empty() {
        return Err(PlanError::Empty);
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = tables.iter().find(|table| !seen.insert(table.id.as_str())) {
        return Err(PlanError::DuplicateTable(duplicate.id.clone()));
    }

    let sections: Vec<String> = tables
        .iter()
        .flat_map(|table| table.sections.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect();

    let mut ordered: Vec<&TableSpec> = tables.iter().collect();
    ordered.sort_by(|a, b| (&a.route, &a.to, &a.id).cmp(&(&b.route, &b.to, &b.id)));

    let data = ordered
        .iter()
        .map(|table| encode_table(table, &sections))
        .collect::<Result<Vec<_>, _>>()?;

    let tables: Vec<TableMeta> = ordered
        .iter()
        .map(|table| TableMeta {
            id: table.id.clone(),
            from: table.from.to_uppercase(),
            to: table.to.to_uppercase(),
            route: table.route.clone(),
        })
        .collect();

    debug!(
        tables = tables.len(),
        sections = sections.len(),
        "Plan assembled"
    );

    Ok(Plan {
        table_count: tables.len(),
        tables,
        sections,
        data,
    })
}

fn encode_table(table: &TableSpec, sections: &[String]) -> Result<Vec<Vec<u8>>, PlanError> {
    sections
        .iter()
        .map(|section| match table.sections.get(section) {
            Some(departures) => encode_section(departures).map_err(|source| PlanError::Encode {
                table: table.id.clone(),
                section: section.clone(),
                source,
            }),
            None => Ok(vec![TERMINATOR]),
        })
        .collect()
}
