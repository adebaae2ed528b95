//! CLI binary for pdf-stitch.
//!
//! A thin shim over the library crate: loads files from disk, maps flags to
//! `ConversionConfig`, picks a render host and writes the resulting PDF.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_stitch::{
    convert_batch, load_source, merge_pdfs, write_result, BatchOutput, ConversionConfig,
    ConversionProgressCallback, ConversionResult, FileWarning, ProgressCallback, SourceFile,
    SourceKind, StyleMap,
};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    file_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            file_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.file_started
            .lock()
            .ok()
            .and_then(|mut g| g.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&TICKS),
        );
        self.bar.set_prefix("Converting");
    }

    fn on_file_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut started) = self.file_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, name: &str, page_count: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{page_count} page(s)")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} file(s) converted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if success_count == 0 { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge PDFs in the order given
  pdfstitch merge intro.pdf body.pdf appendix.pdf -o book.pdf

  # Convert a photo to a one-page PDF in the current directory
  pdfstitch convert photo.jpg

  # Convert several files into one PDF (DOCX needs the `headless` feature)
  pdfstitch convert cover.png report.docx -o report.pdf

  # Custom paragraph styles for DOCX
  pdfstitch convert --style-map styles.txt report.docx

  # Machine-readable summary
  pdfstitch --json convert a.jpg b.png > summary.json

STYLE MAP FILES:
  One rule per line, blank lines and # comments ignored:
    p[style-name='Quote'] => blockquote:fresh
    p[style-name='Code Block'] => pre.code
  Rules are tried before the built-in defaults (headings, Title, Subtitle).

ENVIRONMENT VARIABLES:
  PDFSTITCH_OUTPUT         Default for -o/--output
  PDFSTITCH_STYLE_MAP      Default for --style-map
  PDFSTITCH_JSON           Same as --json
  PDFSTITCH_NO_PROGRESS    Same as --no-progress
  RUST_LOG                 Overrides the log filter (e.g. pdf_stitch=debug)

NOTES:
  Legacy Word files (.doc) are not supported; save them as .docx first.
  DOCX pages are rendered images; text in them is not selectable.
"#;

/// Merge PDFs and convert images and Word documents to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "pdfstitch",
    version,
    about = "Merge PDFs and convert images and Word documents to PDF",
    long_about = "Merge PDF files and convert JPEG, PNG and DOCX files to PDF. \
Everything happens locally; file contents are never uploaded anywhere.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print a JSON summary to stdout instead of human-readable output.
    #[arg(long, global = true, env = "PDFSTITCH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDFSTITCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFSTITCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFSTITCH_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge two or more PDF files into one, in the order given.
    Merge(MergeArgs),
    /// Convert JPEG, PNG and DOCX files into a single PDF.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// PDF files to merge.
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Output file or directory. Default: current directory.
    #[arg(short, long, env = "PDFSTITCH_OUTPUT")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Files to convert.
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Output file or directory. Default: current directory.
    #[arg(short, long, env = "PDFSTITCH_OUTPUT")]
    output: Option<PathBuf>,

    /// File of extra paragraph-style rules for DOCX conversion.
    #[arg(long, env = "PDFSTITCH_STYLE_MAP")]
    style_map: Option<PathBuf>,

    /// Render attempts per DOCX file (1–3).
    #[arg(long, env = "PDFSTITCH_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(1..=3))]
    max_attempts: u8,
}

/// `--json` summary.
#[derive(Serialize)]
struct Summary<'a> {
    output: &'a Path,
    page_count: usize,
    files: Vec<String>,
    warnings: &'a [FileWarning],
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<&'a pdf_stitch::ConversionStats>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Merge(args) => run_merge(&cli, args).await,
        Command::Convert(args) => run_convert(&cli, args, show_progress).await,
    }
}

async fn run_merge(cli: &Cli, args: &MergeArgs) -> Result<()> {
    let mut pdfs = Vec::with_capacity(args.files.len());
    for source in load_all(&args.files, cli.quiet).await? {
        if source.kind == SourceKind::Pdf {
            pdfs.push(source);
        } else if !cli.quiet {
            eprintln!(
                "{} {} is not a PDF file and was left out",
                yellow("⚠"),
                source.name
            );
        }
    }
    if pdfs.len() < 2 {
        anyhow::bail!(
            "Merging needs at least 2 PDF files ({} given)",
            pdfs.len()
        );
    }

    let result = merge_pdfs(&pdfs).context("Merge failed")?;
    let names = pdfs.into_iter().map(|s| s.name).collect();
    finish(cli, args.output.as_deref(), &result, names, &[], None).await
}

async fn run_convert(cli: &Cli, args: &ConvertArgs, show_progress: bool) -> Result<()> {
    let sources = load_all(&args.files, cli.quiet).await?;
    if sources.is_empty() {
        anyhow::bail!("None of the given files can be converted");
    }

    let mut builder =
        ConversionConfig::builder().max_render_attempts(args.max_attempts as usize);
    if let Some(ref path) = args.style_map {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read style map from {:?}", path))?;
        let map = StyleMap::parse(&text)
            .with_context(|| format!("Invalid style map {:?}", path))?
            .with_defaults();
        builder = builder.style_map(map);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let output = run_batch(&sources, &config).await?;

    if !cli.quiet && !cli.json && !show_progress {
        for w in &output.warnings {
            eprintln!("{} {}", yellow("⚠"), w);
        }
    }
    finish(
        cli,
        args.output.as_deref(),
        &output.result,
        output.converted.clone(),
        &output.warnings,
        Some(&output.stats),
    )
    .await
}

/// Run the batch with Chrome when a DOCX file needs rendering.
#[cfg(feature = "headless")]
async fn run_batch(sources: &[SourceFile], config: &ConversionConfig) -> Result<BatchOutput> {
    if !sources.iter().any(|s| s.kind == SourceKind::Word) {
        return Ok(convert_batch(sources, &mut pdf_stitch::NoRenderHost, config).await?);
    }
    let mut host = pdf_stitch::ChromeHost::launch()
        .await
        .context("Failed to start headless Chrome")?;
    let output = convert_batch(sources, &mut host, config).await;
    if let Err(e) = host.close().await {
        tracing::warn!("Chrome did not shut down cleanly: {}", e);
    }
    Ok(output?)
}

#[cfg(not(feature = "headless"))]
async fn run_batch(sources: &[SourceFile], config: &ConversionConfig) -> Result<BatchOutput> {
    Ok(convert_batch(sources, &mut pdf_stitch::NoRenderHost, config).await?)
}

/// Read every path; files of unknown type are reported and skipped.
async fn load_all(paths: &[PathBuf], quiet: bool) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        match load_source(path).await? {
            Some(source) => sources.push(source),
            None => {
                if !quiet {
                    eprintln!(
                        "{} {} has an unsupported file type and was skipped",
                        yellow("⚠"),
                        path.display()
                    );
                }
            }
        }
    }
    Ok(sources)
}

async fn finish(
    cli: &Cli,
    output: Option<&Path>,
    result: &ConversionResult,
    files: Vec<String>,
    warnings: &[FileWarning],
    stats: Option<&pdf_stitch::ConversionStats>,
) -> Result<()> {
    let target = output.unwrap_or_else(|| Path::new("."));
    let written = write_result(result, target)
        .await
        .context("Failed to write output")?;

    if cli.json {
        let summary = Summary {
            output: &written,
            page_count: result.page_count,
            files,
            warnings,
            stats,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} page(s)  →  {}",
            if warnings.is_empty() { green("✔") } else { yellow("⚠") },
            result.page_count,
            bold(&written.display().to_string()),
        );
    }
    Ok(())
}
