//! Discovery and loading of timetable files.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::CompileError;
use crate::table::TableSpec;
use crate::timetable::parse_timetable;

/// Lists `dir/*.extension` in sorted order, so every run sees the same
/// sequence regardless of directory iteration order.
pub fn discover_tables(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, CompileError> {
    let io_error = |source| CompileError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        return Err(CompileError::NoTables {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
        });
    }
    Ok(paths)
}

/// Reads and parses one timetable file. Its identity comes from the file stem.
#[tracing::instrument(skip(path), fields(path = %path.display()))]
pub fn load_table(path: &Path) -> Result<TableSpec, CompileError> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| CompileError::NonUtf8Name {
            path: path.to_path_buf(),
        })?;

    let content = fs::read_to_string(path).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let sections = parse_timetable(&content).map_err(|source| CompileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let table =
        TableSpec::from_stem(stem, sections).map_err(|source| CompileError::TableName {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(
        table = %table.id,
        sections = table.sections.len(),
        departures = table.departure_count(),
        "Table parsed"
    );
    Ok(table)
}

/// Loads every timetable in `dir`. Stops at the first failing file.
pub fn load_tables(dir: &Path, extension: &str) -> Result<Vec<TableSpec>, CompileError> {
    let tables = discover_tables(dir, extension)?
        .iter()
        .map(|path| load_table(path))
        .collect::<Result<Vec<_>, _>>()?;

    info!(dir = %dir.display(), tables = tables.len(), "Timetables loaded");
    Ok(tables)
}
