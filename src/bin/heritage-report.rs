//! CLI binary for heritage-report.
//!
//! A thin shim over the library crate that layers a JSON config file and
//! CLI flags onto `ReportConfig` and prints a run summary.

use anyhow::{Context, Result};
use clap::Parser;
use heritage_report::{
    default_output_path, FitPolicy, PageSize, ProgressCallback, ReportConfig, ReportGenerator,
    ReportOutput, ReportProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per image batch (primary, then
/// additional) plus a log line per image.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-image wall-clock start times, keyed by image number.
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading CSV…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, image_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&image_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ReportProgressCallback for CliProgressCallback {
    fn on_fetch_start(&self, total_images: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER_TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total_images as u64);
        self.bar.set_position(0);
        self.bar.set_prefix("Downloading");
        self.bar.reset_eta();
    }

    fn on_image_start(&self, image_num: usize, _total: usize, name_hint: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(image_num, Instant::now());
        }
        self.bar.set_message(name_hint.to_string());
    }

    fn on_image_complete(&self, image_num: usize, total: usize, byte_size: u64) {
        let secs = self.elapsed_secs(image_num);
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            image_num,
            total,
            dim(&format!("{:>6} KB", byte_size / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, image_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(image_num);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}  {}",
            red("✗"),
            image_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_fetch_complete(&self, total_images: usize, success_count: usize) {
        if total_images == 0 {
            return;
        }
        let failed = total_images.saturating_sub(success_count);
        self.bar.println(format!(
            "{} {}/{} images downloaded{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&success_count.to_string()),
            total_images,
            if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            },
        ));
        self.bar.set_prefix("Composing");
        self.bar.set_message("");
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Report for the latest row, written next to the CSV
  heritage-report assessments.csv

  # Choose the output file
  heritage-report assessments.csv -o old_souk.pdf

  # Keep the downloaded photos
  heritage-report assessments.csv --export-images photos/

  # Logos live somewhere else
  heritage-report assessments.csv --assets ./branding

  # Slow connection: more attempts, longer timeout
  heritage-report assessments.csv --max-attempts 5 --timeout 90

  # Machine-readable summary
  heritage-report assessments.csv --json > run.json

CONFIG FILE:
  --config takes a JSON file whose keys override the defaults; every key is
  optional. Flags given on the command line override the file.

    {
      "report_title": "Site Survey",
      "fetch":  { "max_attempts": 5, "timeout_secs": 60 },
      "layout": { "page_size": "letter", "fit_policy": "proportional" }
    }

LOGOS:
  "Biladi logo.png" and "CER Logo.png" are looked up in --assets (default:
  the CSV's directory). A missing logo is replaced by its name in text.

ENVIRONMENT VARIABLES:
  RUST_LOG                Full tracing filter; overrides --log-level
"#;

/// Generate a PDF heritage-site assessment report from a form-export CSV.
#[derive(Parser, Debug)]
#[command(
    name = "heritage-report",
    version,
    about = "Generate a PDF heritage-site assessment report from a form-export CSV",
    long_about = "Reads the most recent assessment from a form-export CSV, downloads the photos \
linked in it from Google Drive, and writes a paginated PDF report with all nine assessment \
sections and a photo grid.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the CSV export.
    csv: PathBuf,

    /// Output PDF path (default: <csv stem>_Report_<timestamp>.pdf next to the CSV).
    #[arg(short, long, env = "HERITAGE_REPORT_OUTPUT")]
    output: Option<PathBuf>,

    /// JSON file overriding the default configuration.
    #[arg(long, env = "HERITAGE_REPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Copy the downloaded images into this directory.
    #[arg(long)]
    export_images: Option<PathBuf>,

    /// Directory holding the header logo files.
    #[arg(long, env = "HERITAGE_REPORT_ASSETS")]
    assets: Option<PathBuf>,

    /// Download attempts per image.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=20))]
    max_attempts: Option<u32>,

    /// Per-attempt HTTP timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// How photos are scaled into grid cells.
    #[arg(long, value_enum)]
    fit_policy: Option<FitPolicyArg>,

    /// Output page size.
    #[arg(long, value_enum)]
    page_size: Option<PageSizeArg>,

    /// Log level (ignored when RUST_LOG is set).
    #[arg(short = 'l', long, value_enum)]
    log_level: Option<LogLevel>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print run statistics as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "HERITAGE_REPORT_NO_PROGRESS")]
    no_progress: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FitPolicyArg {
    TwoStep,
    Proportional,
}

impl From<FitPolicyArg> for FitPolicy {
    fn from(v: FitPolicyArg) -> Self {
        match v {
            FitPolicyArg::TwoStep => FitPolicy::TwoStepClamp,
            FitPolicyArg::Proportional => FitPolicy::Proportional,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageSizeArg {
    A4,
    Letter,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::Letter => PageSize::Letter,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs on stderr while the progress bar is
    // active; a log file always gets the requested level.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    init_logging(&cli, show_progress)?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ReportProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.csv));

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {}", cli.csv.display()))
        );
    }

    let mut generator = ReportGenerator::new(config);
    let result = generator.generate(&cli.csv, Some(&output_path)).await;
    let output = match result {
        Ok(output) => output,
        Err(e) => {
            generator.cleanup();
            return Err(e).context("Report generation failed");
        }
    };

    if let Some(ref dir) = cli.export_images {
        let prefix = export_prefix(&output);
        let copied = generator
            .export_images(dir, &prefix)
            .context("Image export failed")?;
        if !cli.quiet && !cli.json {
            eprintln!(
                "{} Exported {} images to {}",
                green("✔"),
                copied.len(),
                dir.display()
            );
        }
    }
    generator.cleanup();

    // ── Summary ──────────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, &output_path);
    }

    Ok(())
}

fn init_logging(cli: &Cli, show_progress: bool) -> Result<()> {
    let default_level = match cli.log_level {
        Some(level) => level.as_filter(),
        None if cli.quiet || (show_progress && cli.log_file.is_none()) => "error",
        None => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match cli.log_file {
        Some(ref path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Defaults ← JSON file ← flags.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ReportConfig> {
    let base = match cli.config {
        Some(ref path) => ReportConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ReportConfig::default(),
    };

    let mut builder = base.into_builder();
    if let Some(n) = cli.max_attempts {
        builder = builder.max_attempts(n);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.timeout_secs(secs);
    }
    if let Some(policy) = cli.fit_policy {
        builder = builder.fit_policy(policy.into());
    }
    if let Some(size) = cli.page_size {
        builder = builder.page_size(size.into());
    }
    if let Some(ref dir) = cli.assets {
        builder = builder.asset_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Monument name with spaces replaced, or "unknown".
fn export_prefix(output: &ReportOutput) -> String {
    match output.stats.monument_name.as_str() {
        "" | "N/A" => "unknown".to_string(),
        name => name.replace(' ', "_"),
    }
}

fn print_summary(output: &ReportOutput, path: &Path) {
    let stats = &output.stats;
    eprintln!(
        "{}  Report generated  →  {}",
        if stats.failed_images == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        bold(&path.display().to_string()),
    );
    eprintln!(
        "   File size:         {:.2} MB",
        stats.output_bytes as f64 / (1024.0 * 1024.0)
    );
    eprintln!("   Monument:          {}", stats.monument_name);
    eprintln!("   Assessment date:   {}", stats.assessment_date);
    eprintln!(
        "   Images downloaded: {}  {}",
        stats.total_downloaded,
        dim(&format!("({:.2} MB)", stats.total_image_size_mb))
    );
    if stats.failed_images > 0 {
        eprintln!("   Images failed:     {}", red(&stats.failed_images.to_string()));
        for failure in &output.failures {
            eprintln!("     {}", dim(&failure.to_string()));
        }
    }
    eprintln!("   {}", dim(&format!("{}ms total", stats.duration_ms)));
}
