//! Report generation entry points.
//!
//! Every call to [`ReportGenerator::generate`] gets a fresh [`ImageFetcher`],
//! and with it a fresh temp directory and download cache. The fetcher of the
//! last successful run is kept until the next `generate` or `cleanup`, so its
//! downloads can still be exported (see [`ReportGenerator::export_images`]).
//! The free functions [`generate_report`] and [`generate_report_to_file`]
//! create and clean up a generator per call.

use crate::config::ReportConfig;
use crate::error::{FetchError, ReportError};
use crate::output::{ReportOutput, ReportStats};
use crate::pipeline::compose::{FieldRecord, ImageGroups, LayoutComposer};
use crate::pipeline::fetch::{FetchResult, ImageFetcher};
use crate::pipeline::links::{resolve_with_hosts, Locator};
use crate::pipeline::render;
use crate::record::{format_date, CsvTable, Record};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

const NOT_AVAILABLE: &str = "N/A";

/// Drives report runs, each over its own fetch cache.
pub struct ReportGenerator {
    config: ReportConfig,
    /// Downloads of the most recent successful run.
    last_run: Option<ImageFetcher>,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Self {
        Self {
            config,
            last_run: None,
        }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Generate a report for the latest row of `csv_path`.
    ///
    /// When `output_path` is given the PDF is written there atomically; a
    /// failed run leaves no file behind.
    ///
    /// # Returns
    /// `Ok(ReportOutput)` even if some images failed
    /// (check `output.stats.failed_images`).
    ///
    /// # Errors
    /// Only fatal errors: CSV missing or unreadable, no data rows, temp
    /// storage unavailable, render or write failure.
    ///
    /// The previous run's downloads are released first, whatever the outcome.
    pub async fn generate(
        &mut self,
        csv_path: impl AsRef<Path>,
        output_path: Option<&Path>,
    ) -> Result<ReportOutput, ReportError> {
        let start = Instant::now();
        let csv_path = csv_path.as_ref();
        info!("Starting report generation: {}", csv_path.display());
        self.cleanup();

        // ── Step 1: Load data and select the latest record ───────────────
        let table = CsvTable::load(csv_path)?;
        let latest = table.latest_entry(&self.config.record);
        let record = latest.record;

        // ── Step 2: Resolve image links ──────────────────────────────────
        let primary_locators = self.locators(&record, &self.config.primary_image_column);
        let additional_locators = self.locators(&record, &self.config.additional_images_column);
        info!(
            "Found {} primary and {} additional image links",
            primary_locators.len(),
            additional_locators.len()
        );

        // ── Step 3: Fetch images ─────────────────────────────────────────
        let mut fetcher =
            ImageFetcher::new(&self.config.fetch)?.with_progress(self.config.progress_callback.clone());
        let images = ImageGroups {
            primary: fetcher.fetch_all(&primary_locators, "primary").await,
            additional: fetcher.fetch_all(&additional_locators, "additional").await,
        };
        let failures: Vec<FetchError> = images
            .flatten()
            .filter_map(FetchResult::error)
            .cloned()
            .collect();
        if !failures.is_empty() {
            warn!("{} images could not be fetched", failures.len());
        }

        // ── Step 4: Compose ──────────────────────────────────────────────
        let fields = FieldRecord::from_record(&record, &self.config);
        let asset_dir = self.asset_dir(csv_path);
        debug!("Looking for logos in {}", asset_dir.display());
        let document = LayoutComposer::new(&self.config, asset_dir).compose(&fields, &images);

        // ── Step 5: Render ───────────────────────────────────────────────
        let layout = self.config.layout.clone();
        let pdf = tokio::task::spawn_blocking(move || render::render(document, &layout))
            .await
            .map_err(|e| ReportError::Internal(format!("Render task panicked: {}", e)))??;

        // ── Step 6: Write ────────────────────────────────────────────────
        if let Some(path) = output_path {
            write_atomic(path, &pdf).await?;
            info!("PDF written to {}", path.display());
        }

        let downloads = fetcher.stats();
        let succeeded = |results: &[FetchResult]| results.iter().filter(|r| r.is_success()).count();
        let stats = ReportStats {
            csv_file: csv_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            assessment_date: record
                .populated(&self.config.record.date_column)
                .map(|d| {
                    format_date(
                        d,
                        &self.config.record.date_formats,
                        &self.config.record.date_output_format,
                    )
                })
                .unwrap_or_else(|| NOT_AVAILABLE.into()),
            monument_name: record
                .populated(&self.config.monument_column)
                .unwrap_or(NOT_AVAILABLE)
                .to_string(),
            primary_images: succeeded(&images.primary),
            additional_images: succeeded(&images.additional),
            failed_images: failures.len(),
            total_downloaded: downloads.total_downloaded,
            total_image_size_mb: downloads.total_size_mb(),
            output_bytes: pdf.len() as u64,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Report complete: {} images placed, {} failed, {}ms",
            downloads.total_downloaded, stats.failed_images, stats.duration_ms
        );

        self.last_run = Some(fetcher);

        Ok(ReportOutput {
            pdf,
            output_path: output_path.map(Path::to_path_buf),
            selection: latest.selection,
            failures,
            stats,
        })
    }

    /// Copy every image downloaded by the last successful run into `dir`.
    ///
    /// # Errors
    /// [`ReportError::NoCompletedRun`] before the first run and after
    /// [`cleanup`](Self::cleanup).
    pub fn export_images(&self, dir: impl AsRef<Path>, prefix: &str) -> Result<Vec<PathBuf>, ReportError> {
        let dir = dir.as_ref();
        let fetcher = self.last_run.as_ref().ok_or(ReportError::NoCompletedRun)?;
        fetcher
            .export_to(dir, prefix)
            .map_err(|source| ReportError::ImageExportFailed {
                dir: dir.to_path_buf(),
                source,
            })
    }

    /// Release the last run's temporary storage. Also runs on drop.
    pub fn cleanup(&mut self) {
        if let Some(mut fetcher) = self.last_run.take() {
            fetcher.cleanup();
        }
    }

    fn locators(&self, record: &Record, column: &str) -> Vec<Locator> {
        match record.populated(column) {
            Some(raw) => resolve_with_hosts(raw, &self.config.fetch.provider_hosts),
            None => {
                debug!(column, "No image links in column");
                Vec::new()
            }
        }
    }

    fn asset_dir(&self, csv_path: &Path) -> PathBuf {
        self.config.asset_dir.clone().unwrap_or_else(|| {
            csv_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }
}

/// Generate a report in memory.
///
/// This is the primary entry point for the library.
pub async fn generate_report(
    csv_path: impl AsRef<Path>,
    config: &ReportConfig,
) -> Result<ReportOutput, ReportError> {
    let mut generator = ReportGenerator::new(config.clone());
    let result = generator.generate(csv_path, None).await;
    generator.cleanup();
    result
}

/// Generate a report and write it to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn generate_report_to_file(
    csv_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ReportConfig,
) -> Result<ReportOutput, ReportError> {
    let mut generator = ReportGenerator::new(config.clone());
    let result = generator.generate(csv_path, Some(output_path.as_ref())).await;
    generator.cleanup();
    result
}

/// Synchronous wrapper around [`generate_report_to_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_report_sync(
    csv_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ReportConfig,
) -> Result<ReportOutput, ReportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReportError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_report_to_file(csv_path, output_path, config))
}

/// `{stem}_Report_{YYYYmmdd_HHMMSS}.pdf` next to the CSV.
pub fn default_output_path(csv_path: impl AsRef<Path>) -> PathBuf {
    let csv_path = csv_path.as_ref();
    let stem = csv_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".into());
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let name = format!("{}_Report_{}.pdf", stem, stamp);
    match csv_path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Write to `{path}.tmp`, then rename over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    let write_err = |source| ReportError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordSelection;

    const HEADER: &str = "Date of Assessment,Monument Name ,Governorate,Primary Display Photo Upload,Additional images and files \n";

    fn write_csv(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("survey.csv");
        std::fs::write(&path, format!("{HEADER}{body}")).unwrap();
        path
    }

    #[test]
    fn default_output_path_is_next_to_csv() {
        let out = default_output_path("/data/exports/survey.csv");
        assert_eq!(out.parent(), Some(Path::new("/data/exports")));
        let name = out.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("survey_Report_"));
        assert!(name.ends_with(".pdf"));
        // survey_Report_YYYYmmdd_HHMMSS.pdf
        assert_eq!(name.len(), "survey_Report_".len() + 15 + 4);
    }

    #[tokio::test]
    async fn generates_pdf_without_images() {
        let dir = tempfile::TempDir::new().unwrap();
        let csv = write_csv(
            dir.path(),
            "2023/01/05,Citadel,Aleppo,,\n2024/06/30,Great Mosque,Damascus,,\n",
        );
        let out_path = dir.path().join("out").join("report.pdf");

        let output = generate_report_to_file(&csv, &out_path, &ReportConfig::default())
            .await
            .unwrap();

        assert!(output.pdf.starts_with(b"%PDF"));
        assert_eq!(std::fs::read(&out_path).unwrap(), output.pdf);
        assert!(!out_path.with_extension("pdf.tmp").exists());
        assert_eq!(output.stats.monument_name, "Great Mosque");
        assert_eq!(output.stats.assessment_date, "2024-06-30");
        assert_eq!(output.stats.csv_file, "survey.csv");
        assert_eq!(output.stats.primary_images, 0);
        assert_eq!(output.stats.failed_images, 0);
        assert!(matches!(output.selection, RecordSelection::ByDate { .. }));
    }

    #[tokio::test]
    async fn missing_csv_leaves_no_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let out_path = dir.path().join("report.pdf");
        let err = generate_report_to_file(dir.path().join("nope.csv"), &out_path, &ReportConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::CsvNotFound { .. }));
        assert!(!out_path.exists());
    }

    #[tokio::test]
    async fn header_only_csv_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let csv = write_csv(dir.path(), "");
        let out_path = dir.path().join("report.pdf");
        let err = generate_report_to_file(&csv, &out_path, &ReportConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::NoRecords { .. }));
        assert!(!out_path.exists());
    }

    #[tokio::test]
    async fn unparseable_dates_use_last_row() {
        let dir = tempfile::TempDir::new().unwrap();
        let csv = write_csv(dir.path(), "someday,First,,,\nlater,Second,,,\n");
        let output = generate_report(&csv, &ReportConfig::default()).await.unwrap();
        assert_eq!(output.stats.monument_name, "Second");
        assert_eq!(output.stats.assessment_date, "later");
        assert!(matches!(output.selection, RecordSelection::LastRow { .. }));
    }

    #[tokio::test]
    async fn cleanup_releases_last_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let csv = write_csv(dir.path(), "2024/01/01,Khan,Homs,,\n");
        let mut generator = ReportGenerator::new(ReportConfig::default());
        assert!(matches!(
            generator.export_images(dir.path().join("x"), "x"),
            Err(ReportError::NoCompletedRun)
        ));

        generator.generate(&csv, None).await.unwrap();
        let storage = generator
            .last_run
            .as_ref()
            .and_then(ImageFetcher::temp_dir)
            .unwrap()
            .to_path_buf();
        assert!(storage.exists());

        generator.cleanup();
        generator.cleanup();
        assert!(!storage.exists());
        assert!(matches!(
            generator.export_images(dir.path().join("x"), "x"),
            Err(ReportError::NoCompletedRun)
        ));
    }

    #[tokio::test]
    async fn each_run_gets_fresh_storage() {
        let dir = tempfile::TempDir::new().unwrap();
        let csv = write_csv(dir.path(), "2024/01/01,Khan,Homs,,\n");
        let mut generator = ReportGenerator::new(ReportConfig::default());

        generator.generate(&csv, None).await.unwrap();
        let first = generator.last_run.as_ref().and_then(ImageFetcher::temp_dir).unwrap().to_path_buf();
        generator.generate(&csv, None).await.unwrap();
        let second = generator.last_run.as_ref().and_then(ImageFetcher::temp_dir).unwrap().to_path_buf();

        assert_ne!(first, second);
        assert!(!first.exists(), "previous run's storage is released");
        assert!(second.exists());
    }

    #[tokio::test]
    async fn failed_run_keeps_nothing_to_export() {
        let dir = tempfile::TempDir::new().unwrap();
        let csv = write_csv(dir.path(), "2024/01/01,Khan,Homs,,\n");
        let mut generator = ReportGenerator::new(ReportConfig::default());
        generator.generate(&csv, None).await.unwrap();

        let err = generator.generate(dir.path().join("gone.csv"), None).await.unwrap_err();

        assert!(matches!(err, ReportError::CsvNotFound { .. }));
        assert!(generator.last_run.is_none());
    }

    #[test]
    fn sync_wrapper_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let csv = write_csv(dir.path(), "2024/01/01,Khan,Homs,,\n");
        let out_path = dir.path().join("sync.pdf");
        let output = generate_report_sync(&csv, &out_path, &ReportConfig::default()).unwrap();
        assert!(out_path.exists());
        assert_eq!(output.output_path.as_deref(), Some(out_path.as_path()));
    }
}
