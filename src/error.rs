//! Top-level compile error, tying each stage's failure to its input file.

use std::path::PathBuf;

use crate::output::RenderError;
use crate::plan::PlanError;
use crate::table::TableNameError;
use crate::timetable::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no `*.{extension}` timetables in {}", dir.display())]
    NoTables { dir: PathBuf, extension: String },

    #[error("{}: {source}", path.display())]
    Parse { path: PathBuf, source: ParseError },

    #[error("{}: {source}", path.display())]
    TableName {
        path: PathBuf,
        source: TableNameError,
    },

    #[error("{}: file name is not valid UTF-8", path.display())]
    NonUtf8Name { path: PathBuf },

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Render(#[from] RenderError),
}
