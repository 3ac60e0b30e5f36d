//! Rendering of a [`Plan`] and persistence of the generated artifacts.
//!
//! Supports a C header (the firmware's static-data form), JSON, and CSV
//! append for compile statistics.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions, Permissions};
use std::io::Write as _;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::plan::Plan;
use crate::stats::TableStats;
use crate::table::RouteId;

/// Enumerator that closes `enum tables` and sizes the table dimension.
pub const TABLE_COUNT: &str = "table_count";

/// Names the header declares itself, plus C keywords.
const RESERVED: &[&str] = &[
    TABLE_COUNT, "plan", "meta_plan", "meta", "tables", "sections", "uint8_t",
    "BUSPLAN_DATA_H", "auto", "bool", "break", "case", "char", "const", "constexpr",
    "continue", "default", "do", "double", "else", "enum", "extern", "false", "float",
    "for", "goto", "if", "inline", "int", "long", "nullptr", "register", "restrict",
    "return", "short", "signed", "sizeof", "static", "struct", "switch", "true", "typedef",
    "typeof", "union", "unsigned", "void", "volatile", "while",
];

const C_PROLOGUE: &str = r#"/* Generated by busplan. Do not edit. */
#ifndef BUSPLAN_DATA_H
#define BUSPLAN_DATA_H

#include <stdint.h>

/*
 * Each plan entry is a byte string, read until the terminator:
 *
 *   0000.0000            end of section
 *   0nnn.nnnn            n > 0: next departure n minutes later
 *   1000.0000            add 128 minutes to the next single value
 *   1xxx.xxxx nnnn.nnnn  x > 0: x departures, each n minutes apart
 *
 * The first value counts from 04:00, every later one from the previous
 * departure.
 */
"#;

const C_META: &str = r#"
struct meta {
    char *from, *to;
    uint8_t route;
};
"#;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("{0:?} is not a valid C identifier")]
    InvalidIdentifier(String),

    #[error("{0:?} is a C keyword or a name the generated header declares")]
    ReservedIdentifier(String),

    #[error("identifier {0:?} is used more than once")]
    IdentifierClash(String),

    #[error("table {table:?}: route {route} does not fit in uint8_t")]
    RouteOutOfRange { table: String, route: RouteId },

    #[error("no sections defined in any table")]
    NoSections,
}

/// Renders the plan as a self-contained C header.
///
/// # Errors
///
/// Fails when a table id or section name is not a usable C identifier,
/// when identifiers collide, or when a route is not a number up to 255.
pub fn render_c_header(plan: &Plan) -> Result<String, RenderError> {
    check_identifiers(plan)?;
    if plan.sections.is_empty() {
        return Err(RenderError::NoSections);
    }
    let routes = plan
        .tables
        .iter()
        .map(|table| match &table.route {
            RouteId::Number(route) if *route <= u32::from(u8::MAX) => Ok(*route),
            route => Err(RenderError::RouteOutOfRange {
                table: table.id.clone(),
                route: route.clone(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let table_ids: Vec<&str> = plan
        .tables
        .iter()
        .map(|table| table.id.as_str())
        .chain([TABLE_COUNT])
        .collect();

    // Writing to a String cannot fail.
    let mut out = String::from(C_PROLOGUE);
    let _ = writeln!(out, "\nenum tables {{ {} }};", table_ids.join(", "));
    let _ = writeln!(out, "\nenum sections {{ {} }};", plan.sections.join(", "));
    out.push_str(C_META);

    out.push_str("\nconst struct meta meta_plan[] = {\n");
    for (table, route) in plan.tables.iter().zip(&routes) {
        let _ = writeln!(
            out,
            "    [{}] = {{ .from = {}, .to = {}, .route = {} }},",
            table.id,
            c_string(&table.from),
            c_string(&table.to),
            route
        );
    }
    out.push_str("};\n");

    let _ = writeln!(
        out,
        "\nconst uint8_t *plan[{}][{}] = {{",
        plan.table_count,
        plan.sections.len()
    );
    for (table, row) in plan.tables.iter().zip(&plan.data) {
        let _ = writeln!(out, "    [{}] = (const uint8_t*[]) {{", table.id);
        for (section, bytes) in plan.sections.iter().zip(row) {
            let bytes: Vec<String> = bytes.iter().map(u8::to_string).collect();
            let _ = writeln!(
                out,
                "        [{}] = (const uint8_t[]) {{ {} }},",
                section,
                bytes.join(", ")
            );
        }
        out.push_str("    },\n");
    }
    out.push_str("};\n\n#endif /* BUSPLAN_DATA_H */\n");

    Ok(out)
}

fn check_identifiers(plan: &Plan) -> Result<(), RenderError> {
    let mut seen = HashSet::new();
    let names = plan
        .tables
        .iter()
        .map(|table| table.id.as_str())
        .chain(plan.sections.iter().map(String::as_str));

    for name in names {
        let valid = name.chars().all(|c| c.is_ascii_alphanumeric())
            && name.chars().next().is_some_and(|c| !c.is_ascii_digit());
        if !valid {
            return Err(RenderError::InvalidIdentifier(name.to_string()));
        }
        if RESERVED.contains(&name) {
            return Err(RenderError::ReservedIdentifier(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(RenderError::IdentifierClash(name.to_string()));
        }
    }
    Ok(())
}

fn c_string(label: &str) -> String {
    let mut out = String::with_capacity(label.len() + 2);
    out.push('"');
    for c in label.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Renders the plan as pretty-printed JSON.
pub fn render_json(plan: &Plan) -> Result<String> {
    let mut out = serde_json::to_string_pretty(plan)?;
    out.push('\n');
    Ok(out)
}

/// Writes `contents` to `path` through a temporary file in the same
/// directory, so the target is either fully replaced or left untouched.
///
/// A replaced file keeps its permissions; a new one gets `0644` on Unix.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;

    let permissions = match fs::metadata(path) {
        Ok(metadata) => metadata.permissions(),
        Err(_) => new_file_permissions(file.as_file())?,
    };
    file.as_file().set_permissions(permissions)?;

    file.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;

    debug!(path = %path.display(), bytes = contents.len(), "Output written");
    Ok(())
}

#[cfg(unix)]
fn new_file_permissions(_: &fs::File) -> Result<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions(file: &fs::File) -> Result<Permissions> {
    Ok(file.metadata()?.permissions())
}

/// Appends [`TableStats`] rows to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records(path: &Path, records: &[TableStats]) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TableMeta;
    use tempfile::tempdir;

    fn sample_plan() -> Plan {
        Plan {
            tables: vec![
                TableMeta {
                    id: "hbf1messe".into(),
                    from: "HBF".into(),
                    to: "MESSE".into(),
                    route: RouteId::Number(1),
                },
                TableMeta {
                    id: "messe2hbf".into(),
                    from: "MESSE".into(),
                    to: "HBF".into(),
                    route: RouteId::Number(2),
                },
            ],
            table_count: 2,
            sections: vec!["Sonnabend".into(), "Werktag".into()],
            data: vec![
                vec![vec![0], vec![70, 0x85, 10, 0]],
                vec![vec![0x80, 67, 0], vec![0]],
            ],
        }
    }

    fn sample_stats() -> TableStats {
        TableStats {
            timestamp: chrono::Utc::now(),
            table_id: "hbf1messe".into(),
            route: "1".into(),
            sections: 1,
            departures: 6,
            encoded_bytes: 5,
        }
    }

    #[test]
    fn test_render_c_header() {
        let header = render_c_header(&sample_plan()).unwrap();

        assert!(header.starts_with("/* Generated by busplan. Do not edit. */\n"));
        assert!(header.contains("enum tables { hbf1messe, messe2hbf, table_count };"));
        assert!(header.contains("enum sections { Sonnabend, Werktag };"));
        assert!(header.contains(
            "    [hbf1messe] = { .from = \"HBF\", .to = \"MESSE\", .route = 1 },"
        ));
        assert!(header.contains("const uint8_t *plan[2][2] = {"));
        assert!(header.contains(
            "    [hbf1messe] = (const uint8_t*[]) {\n        [Sonnabend] = (const uint8_t[]) { 0 },\n        [Werktag] = (const uint8_t[]) { 70, 133, 10, 0 },\n    },"
        ));
        assert!(header.contains("        [Sonnabend] = (const uint8_t[]) { 128, 67, 0 },"));
        assert!(header.ends_with("#endif /* BUSPLAN_DATA_H */\n"));
    }

    #[test]
    fn test_render_c_header_escapes_labels() {
        assert_eq!(c_string(r#"A"B\C"#), r#""A\"B\\C""#);
    }

    #[test]
    fn test_render_c_header_rejects_bad_identifiers() {
        let mut plan = sample_plan();
        plan.sections[0] = "1Sonnabend".into();
        assert_eq!(
            render_c_header(&plan),
            Err(RenderError::InvalidIdentifier("1Sonnabend".into()))
        );

        let mut plan = sample_plan();
        plan.sections[0] = "Sonnabend\u{e4}".into();
        assert!(matches!(
            render_c_header(&plan),
            Err(RenderError::InvalidIdentifier(_))
        ));

        let mut plan = sample_plan();
        plan.sections[0] = "hbf1messe".into();
        assert_eq!(
            render_c_header(&plan),
            Err(RenderError::IdentifierClash("hbf1messe".into()))
        );

        let mut plan = sample_plan();
        plan.sections[1] = TABLE_COUNT.into();
        assert!(matches!(
            render_c_header(&plan),
            Err(RenderError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_render_c_header_rejects_reserved_names() {
        for name in ["plan", "meta_plan", "meta", "tables", "sections", "int", "for"] {
            let mut plan = sample_plan();
            plan.sections[0] = name.into();
            let err = render_c_header(&plan).unwrap_err();
            assert!(
                matches!(
                    err,
                    RenderError::ReservedIdentifier(_) | RenderError::InvalidIdentifier(_)
                ),
                "{name}: {err}"
            );
        }

        let mut plan = sample_plan();
        plan.tables[0].id = "plan".into();
        assert_eq!(
            render_c_header(&plan),
            Err(RenderError::ReservedIdentifier("plan".into()))
        );
    }

    #[test]
    fn test_render_c_header_rejects_wide_routes() {
        let mut plan = sample_plan();
        plan.tables[1].route = RouteId::Number(300);
        assert!(matches!(
            render_c_header(&plan),
            Err(RenderError::RouteOutOfRange { .. })
        ));

        let mut plan = sample_plan();
        plan.tables[1].route = RouteId::Token("N1".into());
        assert!(matches!(
            render_c_header(&plan),
            Err(RenderError::RouteOutOfRange { .. })
        ));
    }

    #[test]
    fn test_render_json() {
        let json = render_json(&sample_plan()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["table_count"], 2);
        assert_eq!(value["tables"][0]["id"], "hbf1messe");
        assert_eq!(value["tables"][1]["route"], 2);
        assert_eq!(value["sections"][1], "Werktag");
        assert_eq!(value["plan"][0][1], serde_json::json!([70, 133, 10, 0]));
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("busplan_data.h");

        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("busplan_data.h");

        write_atomic(&path, "first").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);

        fs::set_permissions(&path, Permissions::from_mode(0o664)).unwrap();
        write_atomic(&path, "second").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o664);
    }

    #[test]
    fn test_write_atomic_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("busplan_data.h");
        assert!(write_atomic(&path, "data").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_append_records_writes_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.csv");

        append_records(&path, &[sample_stats()]).unwrap();
        append_records(&path, &[sample_stats(), sample_stats()]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 4);
    }
}
