//! Table identity derived from `<from>_<route>_<to>` file stems.

use serde::Serialize;
use std::fmt;

use crate::timetable::SectionSet;

/// Route identifier. Numeric routes sort numerically and before any
/// non-numeric token, so route `2` comes before route `10`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum RouteId {
    Number(u32),
    Token(String),
}

impl RouteId {
    pub fn parse(token: &str) -> Self {
        match token.parse() {
            Ok(number) => RouteId::Number(number),
            Err(_) => RouteId::Token(token.to_string()),
        }
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteId::Number(number) => write!(f, "{number}"),
            RouteId::Token(token) => f.write_str(token),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableNameError {
    #[error("table name {stem:?} must be `<from>_<route>_<to>`, found {found} component(s)")]
    ComponentCount { stem: String, found: usize },

    #[error("table name {stem:?} has an empty `_`-separated component")]
    EmptyComponent { stem: String },
}

/// One timetable: its identity plus the parsed sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub id: String,
    pub from: String,
    pub route: RouteId,
    pub to: String,
    pub sections: SectionSet,
}

impl TableSpec {
    /// Builds a table from a file stem such as `bahnhof_3_messe`.
    ///
    /// # Errors
    ///
    /// Fails unless the stem splits on `_` into exactly three non-empty parts.
    pub fn from_stem(stem: &str, sections: SectionSet) -> Result<Self, TableNameError> {
        let parts: Vec<&str> = stem.split('_').collect();
        let [from, route, to] = parts.as_slice() else {
            return Err(TableNameError::ComponentCount {
                stem: stem.to_string(),
                found: parts.len(),
            });
        };
        if parts.iter().any(|part| part.is_empty()) {
            return Err(TableNameError::EmptyComponent {
                stem: stem.to_string(),
            });
        }

        Ok(Self {
            id: stem.chars().filter(|c| c.is_alphanumeric()).collect(),
            from: from.to_string(),
            route: RouteId::parse(route),
            to: to.to_string(),
            sections,
        })
    }

    /// Total departures across all sections.
    pub fn departure_count(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }
}
