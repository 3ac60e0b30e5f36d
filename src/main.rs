//! CLI entry point for the busplan timetable compiler.
//!
//! Provides subcommands for compiling a directory of timetables into a
//! generated C header (or JSON), and for inspecting how a single table
//! encodes.

use anyhow::{Context, Result, bail};
use busplan::compile_dir;
use busplan::encoder::{decode_section, decodes_to, encode_section, timeline};
use busplan::output::{append_records, render_c_header, render_json, write_atomic};
use busplan::source::load_table;
use busplan::stats::TableStats;
use clap::{Parser, Subcommand, ValueEnum};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "busplan")]
#[command(about = "Compile plain-text timetables into compact firmware tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every timetable in a directory into one generated file
    Compile {
        /// Directory containing `<from>_<route>_<to>.<ext>` timetables
        #[arg(short, long, default_value = "tables")]
        input: PathBuf,

        /// File to generate
        #[arg(short, long, default_value = "busplan_data.h")]
        output: PathBuf,

        /// Extension of timetable files
        #[arg(short, long, default_value = "txt")]
        extension: String,

        /// Output representation
        #[arg(short, long, value_enum, default_value_t = Format::C)]
        format: Format,

        /// Optional: CSV file to append per-table size statistics to
        #[arg(long)]
        stats: Option<PathBuf>,
    },
    /// Encode one timetable and show its bytes and decoded departures
    Inspect {
        /// Timetable file to inspect
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// C header with enums, metadata and the plan array
    C,
    /// JSON document with the same structures
    Json,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr, plus a JSON rolling log file when LOG_FILE_PATH is set
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let (json_layer, _file_guard) = match std::env::var("LOG_FILE_PATH") {
        Ok(log_file_path) => {
            let log_dir = Path::new(&log_file_path)
                .parent()
                .unwrap_or(Path::new("logs"));
            let log_file_name = Path::new(&log_file_path)
                .file_name()
                .unwrap_or(OsStr::new("busplan.log"));

            let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(non_blocking_file)
                .with_filter(
                    EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?),
                );
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            input,
            output,
            extension,
            format,
            stats,
        } => {
            compile(&input, &output, &extension, format, stats.as_deref())?;
        }
        Commands::Inspect { file } => {
            inspect(&file)?;
        }
    }

    Ok(())
}

/// Compiles `input` and writes the rendered plan to `output` in one step;
/// on any error `output` is left untouched. Stats are a side report: failing
/// to append them is logged and does not fail the run.
#[tracing::instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
fn compile(
    input: &Path,
    output: &Path,
    extension: &str,
    format: Format,
    stats: Option<&Path>,
) -> Result<()> {
    let (tables, plan) = compile_dir(input, extension)?;

    let rendered = match format {
        Format::C => render_c_header(&plan)?,
        Format::Json => render_json(&plan)?,
    };
    write_atomic(output, &rendered)?;

    info!(
        tables = plan.table_count,
        sections = plan.sections.len(),
        encoded_bytes = plan.encoded_len(),
        "Plan written"
    );

    if let Some(stats_path) = stats {
        let records = TableStats::from_plan(&tables, &plan);
        for record in &records {
            debug!(
                table = %record.table_id,
                departures = record.departures,
                encoded_bytes = record.encoded_bytes,
                bytes_per_departure = record.bytes_per_departure(),
                "Table size"
            );
        }
        if let Err(e) = append_records(stats_path, &records) {
            warn!(path = %stats_path.display(), error = %e, "Failed to append stats");
        }
    }

    Ok(())
}

/// Encodes every section of one table, decodes it back and logs both forms.
#[tracing::instrument(skip_all, fields(file = %file.display()))]
fn inspect(file: &Path) -> Result<()> {
    let table = load_table(file)?;

    info!(
        table = %table.id,
        from = %table.from,
        route = %table.route,
        to = %table.to,
        "Table"
    );

    for (section, departures) in &table.sections {
        let bytes = encode_section(departures)
            .with_context(|| format!("section {section:?} of {}", file.display()))?;
        if !decodes_to(&bytes, departures) {
            bail!("section {section:?} does not survive an encode/decode round trip");
        }
        let decoded = timeline(&decode_section(&bytes)?)?;

        let times: Vec<String> = decoded
            .iter()
            .map(|minutes| format!("{:02}:{:02}", minutes / 60, minutes % 60))
            .collect();

        info!(
            section = %section,
            departures = departures.len(),
            bytes = ?bytes,
            "Section"
        );
        debug!(section = %section, times = %times.join(" "), "Decoded departures");
    }

    Ok(())
}
