//! Result types returned by report generation.

use crate::error::FetchError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a caller learns from one successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOutput {
    /// The rendered PDF.
    #[serde(skip)]
    pub pdf: Vec<u8>,

    /// Where the PDF was written, when written by the generator.
    pub output_path: Option<PathBuf>,

    /// How the reported row was chosen.
    pub selection: RecordSelection,

    /// Per-image failures that were absorbed into a degraded layout.
    pub failures: Vec<FetchError>,

    pub stats: ReportStats,
}

/// How the latest record was selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordSelection {
    /// The row with the greatest parseable assessment date.
    ByDate { date: NaiveDateTime },
    /// No usable date; the last row in file order was used.
    LastRow { reason: String },
}

/// Summary statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportStats {
    /// File name of the input CSV.
    pub csv_file: String,

    /// Display-formatted assessment date, or "N/A".
    pub assessment_date: String,

    /// Monument name of the reported row, or "N/A".
    pub monument_name: String,

    /// Primary photos downloaded and validated.
    pub primary_images: usize,

    /// Additional images downloaded and validated. A link repeated from the
    /// primary column counts in both.
    pub additional_images: usize,

    /// Locators that failed after every attempt.
    pub failed_images: usize,

    /// Distinct images downloaded and validated.
    pub total_downloaded: usize,

    /// Size of all downloads, in MiB.
    pub total_image_size_mb: f64,

    /// Size of the rendered PDF.
    pub output_bytes: u64,

    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

/// Download totals reported by the fetcher's run cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStats {
    pub total_downloaded: usize,
    pub total_failed: usize,
    pub total_bytes: u64,
}

impl DownloadStats {
    pub fn total_size_mb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0)
    }
}
