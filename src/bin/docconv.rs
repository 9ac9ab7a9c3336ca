//! CLI binary for docconv.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, loads the backend chain, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use docconv::{
    workspace, ConversionAttempt, ConversionConfig, ConversionProgressCallback, ConversionRequest,
    ConversionResult, ConverterSettings, DocumentFormat, JobRunner, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar counting finished jobs, with a log
/// line for every rejected attempt. Jobs may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    failed_attempts: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total_jobs: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total_jobs as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed_attempts: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_backend_skipped(&self, backend: &str) {
        self.bar
            .println(format!("  {} {} not installed, skipped", dim("·"), dim(backend)));
    }

    fn on_attempt_start(&self, backend: &str, attempt: usize, available: usize) {
        self.bar
            .set_message(format!("{backend} ({attempt}/{available})"));
    }

    fn on_attempt_complete(&self, attempt: &ConversionAttempt) {
        if attempt.outcome.is_success() {
            return;
        }
        self.failed_attempts.fetch_add(1, Ordering::SeqCst);

        let reason = attempt.outcome.to_string();
        let msg = if reason.chars().count() > 80 {
            format!("{}\u{2026}", reason.chars().take(79).collect::<String>())
        } else {
            reason
        };
        self.bar.println(format!(
            "  {} {:<12} {}  {}",
            red("✗"),
            attempt.backend,
            red(&msg),
            dim(&format!("{:.1}s", attempt.duration_ms as f64 / 1000.0)),
        ));
    }

    fn on_job_complete(&self, source: &Path, succeeded: bool) {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mark = if succeeded { green("✓") } else { red("✘") };
        self.bar.println(format!("{mark} {name}"));
        self.bar.inc(1);
        if self.bar.position() >= self.bar.length().unwrap_or(0) {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Word document to PDF in the current directory
  docconv report.docx --output-dir .

  # Exact destination
  docconv report.docx -o /srv/share/report.pdf

  # Several files, two at a time, JSON report
  docconv *.docx *.odt --concurrency 2 --json > results.json

  # OCR a scan to text
  docconv scan.png --to txt

  # Which converters are installed?
  docconv --list-backends

  # Delete outputs older than a day, then exit
  docconv --sweep-hours 24 --output-dir /var/lib/docconv

BACKEND CONFIGURATION (--backends FILE):
  {
    "backends": [
      { "name": "libreoffice", "priority": 10, "program": "soffice",
        "program_env": "LIBREOFFICE_PATH",
        "args": ["--headless", "-env:UserInstallation=file://{profile_dir}",
                 "--convert-to", "pdf", "--outdir", "{output_dir}", "{input}"],
        "accepts": ["docx", "doc", "odt", "rtf"], "produces": "pdf",
        "output": "directory", "availability": { "kind": "probe" } }
    ],
    "validation": { "min_size_bytes": 100 }
  }

  Placeholders: {input} {input_stem} {output} {output_dir} {output_stem}
                {target_ext} {profile_dir}
  Output modes: file, directory, stem, stdout

ENVIRONMENT VARIABLES:
  LIBREOFFICE_PATH    Path to soffice (built-in chain)
  PANDOC_PATH         Path to pandoc (built-in chain)
  TESSERACT_PATH      Path to tesseract (built-in chain)
  RUST_LOG            Override log filter (e.g. docconv=debug)
"#;

/// Convert documents with a fallback chain of external converters.
#[derive(Parser, Debug)]
#[command(
    name = "docconv",
    version,
    about = "Convert documents to PDF (or text) through a fallback chain of external converters",
    long_about = "Convert office documents, HTML and images by trying LibreOffice, pandoc, \
wkhtmltopdf and Tesseract in priority order. Every attempt runs under a hard timeout and \
every output is validated before it is accepted.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files to convert.
    inputs: Vec<PathBuf>,

    /// Target format (pdf, txt, ...).
    #[arg(short, long, env = "DOCCONV_TO", default_value = "pdf",
          value_parser = parse_format)]
    to: DocumentFormat,

    /// Source format; inferred from each file's extension when omitted.
    #[arg(long, env = "DOCCONV_FROM", value_parser = parse_format)]
    from: Option<DocumentFormat>,

    /// Directory converted files are published into.
    #[arg(short = 'd', long, env = "DOCCONV_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Exact destination file (single input only).
    #[arg(short, long, env = "DOCCONV_OUTPUT")]
    output: Option<PathBuf>,

    /// JSON backend configuration file; the built-in chain when omitted.
    #[arg(short, long, env = "DOCCONV_BACKENDS")]
    backends: Option<PathBuf>,

    /// Per-backend timeout in seconds.
    #[arg(long, env = "DOCCONV_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Largest timeout a request may ask for.
    #[arg(long, env = "DOCCONV_MAX_TIMEOUT", default_value_t = 600)]
    max_timeout: u64,

    /// Minimum plausible output size in bytes.
    #[arg(long, env = "DOCCONV_MIN_SIZE")]
    min_size: Option<u64>,

    /// Files converted at once.
    #[arg(short, long, env = "DOCCONV_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Output a structured JSON report instead of text.
    #[arg(long, env = "DOCCONV_JSON")]
    json: bool,

    /// Print each backend's availability and exit.
    #[arg(long)]
    list_backends: bool,

    /// Delete files in the output directory older than this many hours.
    #[arg(long, env = "DOCCONV_SWEEP_HOURS")]
    sweep_hours: Option<u64>,

    /// Disable progress bar.
    #[arg(long, env = "DOCCONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCCONV_QUIET")]
    quiet: bool,
}

fn parse_format(s: &str) -> Result<DocumentFormat, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && !cli.list_backends && !cli.inputs.is_empty();
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

    // ── Backends ─────────────────────────────────────────────────────────
    let settings = match cli.backends {
        Some(ref path) => ConverterSettings::from_json_file(path)
            .with_context(|| format!("Failed to load backends from {}", path.display()))?,
        None => ConverterSettings::default(),
    };
    let backend_set = settings
        .backend_set()
        .context("Invalid backend configuration")?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new(cli.inputs.len());
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, &settings, progress_cb)?;
    let runner = JobRunner::new(config, backend_set);

    // ── List-backends mode ───────────────────────────────────────────────
    if cli.list_backends {
        let report = runner.available_backends().await;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else {
            for b in &report {
                let accepts = if b.accepts.is_empty() {
                    "*".to_string()
                } else {
                    b.accepts.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(",")
                };
                println!(
                    "{} {:<12} {:>4}  {:<22} -> {:<4}  {}",
                    if b.available { green("✓") } else { red("✗") },
                    b.name,
                    b.priority,
                    accepts,
                    b.produces,
                    dim(&b.program),
                );
            }
        }
        return Ok(());
    }

    // ── Sweep ────────────────────────────────────────────────────────────
    if let Some(hours) = cli.sweep_hours {
        let dir = &runner.config().output_dir;
        let removed = match workspace::sweep_stale(dir, Duration::from_secs(hours * 3600)) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to sweep {}", dir.display()))
            }
        };
        if !cli.quiet {
            eprintln!("Removed {removed} file(s) older than {hours}h from {}", dir.display());
        }
        if cli.inputs.is_empty() {
            return Ok(());
        }
    }

    if cli.inputs.is_empty() {
        anyhow::bail!("No input files given (see --help)");
    }
    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output takes a single input; use --output-dir for several");
    }

    // ── Run conversions ──────────────────────────────────────────────────
    let requests = cli
        .inputs
        .iter()
        .map(|input| build_request(&cli, input))
        .collect::<Result<Vec<_>>>()?;

    let results: Vec<ConversionResult> = match cli.output {
        Some(ref dest) => vec![runner.convert_to_file(&requests[0], dest).await],
        None => runner.convert_many(requests.clone()).await,
    };

    let failed = results.iter().filter(|r| r.is_err()).count();
    report(&cli, &requests, &results)?;

    if failed > 0 {
        anyhow::bail!("{failed} of {} conversion(s) failed", results.len());
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(
    cli: &Cli,
    settings: &ConverterSettings,
    progress: Option<ProgressCallback>,
) -> Result<ConversionConfig> {
    let mut validation = settings.validation.clone();
    if let Some(min) = cli.min_size {
        validation.min_size_bytes = min;
    }

    let mut builder = ConversionConfig::builder()
        .default_timeout_secs(cli.timeout)
        .max_timeout_secs(cli.max_timeout)
        .concurrency(cli.concurrency)
        .validation(validation);

    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    } else if let Some(parent) = cli
        .output
        .as_ref()
        .and_then(|o| o.parent())
        .filter(|p| !p.as_os_str().is_empty())
    {
        // Stage next to the destination so the final move is a rename.
        builder = builder.output_dir(parent);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_request(cli: &Cli, input: &Path) -> Result<ConversionRequest> {
    match cli.from {
        Some(from) => Ok(ConversionRequest::new(input, from, cli.to, cli.timeout)),
        None => ConversionRequest::for_file(input, cli.to, cli.timeout)
            .with_context(|| format!("Cannot convert {}", input.display())),
    }
}

/// Print per-job results as text (stderr) or JSON (stdout).
fn report(cli: &Cli, requests: &[ConversionRequest], results: &[ConversionResult]) -> Result<()> {
    if cli.json {
        let entries: Vec<serde_json::Value> = requests
            .iter()
            .zip(results)
            .map(|(req, result)| match result {
                Ok(out) => json!({
                    "input": req.source_path(),
                    "ok": true,
                    "output": out,
                }),
                Err(e) => json!({
                    "input": req.source_path(),
                    "ok": false,
                    "error": e.to_string(),
                    "kind": e.kind(),
                    "attempts": e.attempts(),
                }),
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to serialise output")?
        );
        return Ok(());
    }

    for (req, result) in requests.iter().zip(results) {
        match result {
            Ok(out) => {
                if !cli.quiet {
                    eprintln!(
                        "{}  {}  →  {}  {}",
                        green("✔"),
                        req.source_path().display(),
                        bold(&out.output_path.display().to_string()),
                        dim(&format!(
                            "{} · {} bytes · {}ms",
                            out.backend, out.size_bytes, out.stats.total_duration_ms
                        )),
                    );
                    if out.stats.failed_attempts > 0 {
                        eprintln!(
                            "   {} after {} failed attempt(s)",
                            cyan("⚠"),
                            out.stats.failed_attempts
                        );
                    }
                }
            }
            Err(e) => {
                eprintln!("{}  {}: {}", red("✘"), req.source_path().display(), e);
                for a in e.attempts() {
                    eprintln!(
                        "   {} {:<12} {}  {}",
                        dim("-"),
                        a.backend,
                        a.outcome,
                        dim(&format!("{}ms", a.duration_ms))
                    );
                }
            }
        }
    }
    Ok(())
}
