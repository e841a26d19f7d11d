//! CLI binary for tablesift.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `IngestConfig` and prints the cleaned table.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tablesift::output::{self, OutputFormat};
use tablesift::{
    ingest_path, ingest_to_file, inspect, FileKind, IngestConfig, IngestError, StagingNaming,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # HTML preview on stdout
  tablesift vitals.csv

  # Clean a SAS dataset into CSV
  tablesift ae.sas7bdat --format csv -o ae.csv

  # Upload saved without an extension
  tablesift upload.bin --kind xpt --format json

  # Column names, types and row count only
  tablesift --inspect-only report.xlsx

  # CPORT libraries: point at the converter and give it more time
  tablesift lb.xpt --converter /opt/stattransfer/st --converter-timeout 900

SUPPORTED FILES:
  Extension          Reader        Notes
  ─────────          ──────────    ─────────────────────────────────────────
  .csv               csv           encoding and delimiter auto-detected
  .xlsx, .xls        excel         first worksheet
  .sas7bdat          sas7bdat      RLE / RDC compressed files supported
  .xpt               xpt           transport v5; CPORT via --converter

CLEANING (always applied):
  1. Columns with no values are dropped
  2. Missing cells become "N/A"
  3. Column names are trimmed, lowercased, spaces -> underscores
  4. Line breaks and repeated whitespace in text collapse to one space

EXIT CODES:
  0  success
  1  environment problem (staging, converter, output file)
  2  the file itself was rejected (unsupported type, unreadable content)

ENVIRONMENT VARIABLES:
  Every flag can be set with TABLESIFT_<FLAG>, e.g. TABLESIFT_STAGING_DIR.
  RUST_LOG overrides -v / -q.
"#;

/// Load CSV, Excel, SAS7BDAT and SAS transport files into clean tables.
#[derive(Parser, Debug)]
#[command(
    name = "tablesift",
    version,
    about = "Load CSV, Excel, SAS7BDAT and SAS transport files into clean tables",
    long_about = "Read an uploaded tabular file, pick the right decoder from its extension \
(or --kind), clean the result and print it as HTML, CSV or JSON. SAS transport files that \
turn out to be CPORT libraries are converted with an external tool and read again.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input file.
    input: PathBuf,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "TABLESIFT_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(long, env = "TABLESIFT_FORMAT", value_enum, default_value = "html")]
    format: FormatArg,

    /// Read as this kind instead of going by the extension.
    #[arg(long, env = "TABLESIFT_KIND", value_parser = parse_kind)]
    kind: Option<FileKind>,

    /// Directory for staging files (SAS formats only).
    #[arg(long, env = "TABLESIFT_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Staging file names: unique (uuid prefix) or filename (as uploaded).
    #[arg(long, env = "TABLESIFT_STAGING_NAMES", value_enum, default_value = "unique")]
    staging_names: NamingArg,

    /// CPORT converter executable.
    #[arg(long, env = "TABLESIFT_CONVERTER", default_value = "stattransfer")]
    converter: String,

    /// Seconds before the converter is killed; 0 waits forever.
    #[arg(long, env = "TABLESIFT_CONVERTER_TIMEOUT", default_value_t = 300)]
    converter_timeout: u64,

    /// Candidate CSV delimiters, best first (e.g. ";,|").
    #[arg(long, env = "TABLESIFT_DELIMITERS")]
    delimiters: Option<String>,

    /// Print column names, types and row count only, before cleaning.
    #[arg(long, env = "TABLESIFT_INSPECT_ONLY")]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TABLESIFT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TABLESIFT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Html,
    Csv,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Html => OutputFormat::Html,
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum NamingArg {
    Unique,
    Filename,
}

impl From<NamingArg> for StagingNaming {
    fn from(v: NamingArg) -> Self {
        match v {
            NamingArg::Unique => StagingNaming::Unique,
            NamingArg::Filename => StagingNaming::FromFilename,
        }
    }
}

fn parse_kind(s: &str) -> Result<FileKind, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            let user_facing = e
                .downcast_ref::<IngestError>()
                .is_some_and(IngestError::is_user_facing);
            ExitCode::from(if user_facing { 2 } else { 1 })
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = build_config(cli)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let summary = inspect(&cli.input, cli.kind, &config)
            .await
            .with_context(|| format!("Failed to inspect {}", cli.input.display()))?;

        if matches!(cli.format, FormatArg::Json) {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
            );
        } else {
            println!("File:     {}", cli.input.display());
            println!("Kind:     {}", summary.kind);
            println!("Rows:     {}", summary.rows);
            println!("Columns:  {}", summary.columns.len());
            for col in &summary.columns {
                println!(
                    "  {:<32} {:<6} {}",
                    col.name,
                    col.dtype,
                    dim(&format!("{} missing", col.missing))
                );
            }
        }
        return Ok(());
    }

    let progress = (!cli.quiet).then(|| spinner(&cli.input));
    let format = OutputFormat::from(cli.format);

    // ── Run ingestion ────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let result = ingest_to_file(&cli.input, output_path, format, cli.kind, &config).await;
        if let Some(ref bar) = progress {
            bar.finish_and_clear();
        }
        let stats = result.with_context(|| format!("Failed to ingest {}", cli.input.display()))?;

        if !cli.quiet {
            eprintln!(
                "{}  {} rows x {} columns  {}ms  →  {}",
                green("✔"),
                stats.rows,
                stats.columns,
                stats.duration_ms,
                bold(&output_path.display().to_string()),
            );
            report_dropped(&stats.dropped_columns);
        }
    } else {
        let result = ingest_path(&cli.input, cli.kind, &config).await;
        if let Some(ref bar) = progress {
            bar.finish_and_clear();
        }
        let out = result.with_context(|| format!("Failed to ingest {}", cli.input.display()))?;

        let rendered = output::render(&out.table, format).context("Failed to render table")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }

        if !cli.quiet {
            eprintln!(
                "{}  {} rows x {} columns from {} file in {}ms",
                green("✔"),
                out.stats.rows,
                out.stats.columns,
                out.kind,
                out.stats.duration_ms
            );
            report_dropped(&out.stats.dropped_columns);
        }
    }

    Ok(())
}

fn spinner(input: &std::path::Path) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Reading");
    bar.set_message(
        input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn report_dropped(dropped: &[String]) {
    if !dropped.is_empty() {
        eprintln!(
            "   {} dropped empty column(s): {}",
            cyan("⚠"),
            dim(&dropped.join(", "))
        );
    }
}

/// Map CLI args to `IngestConfig`.
fn build_config(cli: &Cli) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .staging_naming(cli.staging_names.into())
        .converter_program(cli.converter.clone())
        .converter_timeout_secs(match cli.converter_timeout {
            0 => None,
            secs => Some(secs),
        });

    if let Some(ref dir) = cli.staging_dir {
        builder = builder.staging_dir(dir.clone());
    }
    if let Some(ref delims) = cli.delimiters {
        let bytes = unescape_delimiters(delims);
        builder = builder.delimiter_candidates(bytes);
    }

    builder.build().context("Invalid configuration")
}

/// `\t` in the flag value means a tab.
fn unescape_delimiters(s: &str) -> Vec<u8> {
    s.replace("\\t", "\t").into_bytes()
}
