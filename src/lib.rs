//! # heritage-report
//!
//! Turn the latest heritage-site assessment in a form-export CSV into a
//! paginated PDF report, photos included.
//!
//! ## Why this crate?
//!
//! Field teams fill in an assessment form on their phones; the form service
//! exports one CSV row per visit and stores every photo on a file-sharing
//! provider, leaving only share links in the CSV. Turning that into a
//! readable report by hand means downloading each photo, resizing it, and
//! copying forty-odd fields into a template. This crate does all of it in
//! one call and keeps going when some photos cannot be fetched.
//!
//! ## Pipeline Overview
//!
//! ```text
//! CSV
//!  │
//!  ├─ 1. Record   load, sniff delimiter, pick the most recent row
//!  ├─ 2. Links    split link cells, extract provider file ids
//!  ├─ 3. Fetch    download with retry/backoff into a run-scoped temp dir
//!  ├─ 4. Fit      scale photos into grid cells, logos into the header
//!  ├─ 5. Compose  header → 9 sections → dividers, 3-column photo grid
//!  └─ 6. Render   paginate and emit PDF (spawn_blocking)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heritage_report::{default_output_path, generate_report_to_file, ReportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let csv = "assessments.csv";
//!     let config = ReportConfig::default();
//!     let output = generate_report_to_file(csv, default_output_path(csv), &config).await?;
//!     eprintln!(
//!         "{}: {} images, {} failed",
//!         output.stats.monument_name,
//!         output.stats.total_downloaded,
//!         output.stats.failed_images
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `heritage-report` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! heritage-report = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod report;

#[cfg(test)]
mod test_util;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    FetchConfig, FieldMapping, FitPolicy, LayoutConfig, LogoSpec, Margins, PageSize, RecordConfig,
    ReportConfig, ReportConfigBuilder, SectionKind, SectionSpec,
};
pub use error::{FetchError, ReportError};
pub use output::{DownloadStats, RecordSelection, ReportOutput, ReportStats};
pub use pipeline::fetch::{FetchResult, FetchedImage, ImageFetcher, ImageKind};
pub use pipeline::fit::fit;
pub use pipeline::links::{resolve, Locator};
pub use progress::{NoopProgressCallback, ProgressCallback, ReportProgressCallback};
pub use record::{CsvTable, LatestEntry, Record};
pub use report::{
    default_output_path, generate_report, generate_report_sync, generate_report_to_file,
    ReportGenerator,
};
