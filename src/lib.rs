pub mod encoder;
pub mod error;
pub mod output;
pub mod plan;
pub mod source;
pub mod stats;
pub mod table;
pub mod timetable;

use std::path::Path;

use crate::error::CompileError;
use crate::plan::{Plan, assemble};
use crate::source::load_tables;
use crate::table::TableSpec;

/// Loads every table in `dir` and assembles them into a [`Plan`].
///
/// Returns the parsed tables alongside the plan for reporting.
pub fn compile_dir(dir: &Path, extension: &str) -> Result<(Vec<TableSpec>, Plan), CompileError> {
    let tables = load_tables(dir, extension)?;
    let plan = assemble(&tables)?;
    Ok((tables, plan))
}
