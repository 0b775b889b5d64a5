//! Configuration types for report generation.
//!
//! All behaviour is controlled through [`ReportConfig`], built via its
//! [`ReportConfigBuilder`] or deserialised from a JSON override file. The
//! value is immutable once built and is handed by reference to every pipeline
//! stage, so two runs with equal configs lay out identical documents.
//!
//! # Layered overrides
//! Every field is `#[serde(default)]`, so an override file only needs the keys
//! it changes. Merging happens once, at startup, in the caller:
//! defaults ← JSON file ← command-line flags.
//!
//! All lengths are PDF points (1/72 inch).

use crate::error::ReportError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Points per inch; layout constants below are written in inches for readability.
pub const POINTS_PER_INCH: f32 = 72.0;

const fn inches(v: f32) -> f32 {
    v * POINTS_PER_INCH
}

/// Configuration for one report-generation run.
///
/// # Example
/// ```rust
/// use heritage_report::{FitPolicy, ReportConfig};
///
/// let config = ReportConfig::builder()
///     .max_attempts(5)
///     .timeout_secs(10)
///     .fit_policy(FitPolicy::Proportional)
///     .build()
///     .unwrap();
/// assert_eq!(config.fetch.max_attempts, 5);
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Remote image retrieval settings.
    pub fetch: FetchConfig,

    /// Page geometry, grid and fitting settings.
    pub layout: LayoutConfig,

    /// How the "latest" row is picked and how dates are displayed.
    pub record: RecordConfig,

    /// The report sections, in print order.
    pub sections: Vec<SectionSpec>,

    /// Column holding the primary display photo link(s).
    pub primary_image_column: String,

    /// Column holding additional image links.
    ///
    /// The trailing space is part of the form-export column name.
    pub additional_images_column: String,

    /// Column whose value names the monument in the run summary.
    pub monument_column: String,

    /// Title printed under the header logos.
    pub report_title: String,

    /// Header logos, left to right.
    pub logos: Vec<LogoSpec>,

    /// Directory searched for logo files. `None` means "next to the CSV".
    pub asset_dir: Option<PathBuf>,

    /// Per-image progress events. Never serialised.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            layout: LayoutConfig::default(),
            record: RecordConfig::default(),
            sections: default_sections(),
            primary_image_column: "Primary Display Photo Upload".into(),
            additional_images_column: "Additional images and files ".into(),
            monument_column: "Monument Name ".into(),
            report_title: "Heritage Site Assessment Report".into(),
            logos: default_logos(),
            asset_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfig")
            .field("fetch", &self.fetch)
            .field("layout", &self.layout)
            .field("record", &self.record)
            .field("sections", &self.sections.len())
            .field("primary_image_column", &self.primary_image_column)
            .field("additional_images_column", &self.additional_images_column)
            .field("report_title", &self.report_title)
            .field("logos", &self.logos)
            .field("asset_dir", &self.asset_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ReportProgressCallback>"),
            )
            .finish()
    }
}

impl ReportConfig {
    /// Create a new builder seeded with the defaults.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load a JSON override file on top of the defaults.
    ///
    /// Keys absent from the file keep their default value.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReportError::InvalidConfig(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let config: ReportConfig = serde_json::from_str(&text).map_err(|e| {
            ReportError::InvalidConfig(format!("'{}' is not valid config JSON: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Turn this config back into a builder for further overrides.
    pub fn into_builder(self) -> ReportConfigBuilder {
        ReportConfigBuilder { config: self }
    }

    fn validate(&self) -> Result<(), ReportError> {
        if self.fetch.max_attempts == 0 {
            return Err(ReportError::InvalidConfig("max_attempts must be ≥ 1".into()));
        }
        if self.fetch.chunk_size == 0 {
            return Err(ReportError::InvalidConfig("chunk_size must be ≥ 1".into()));
        }
        if self.layout.grid_columns == 0 {
            return Err(ReportError::InvalidConfig("grid_columns must be ≥ 1".into()));
        }
        if self.layout.grid_cell.width <= 0.0 || self.layout.grid_cell.height <= 0.0 {
            return Err(ReportError::InvalidConfig(format!(
                "grid cell must be positive, got {}x{}",
                self.layout.grid_cell.width, self.layout.grid_cell.height
            )));
        }
        let (page_w, page_h) = self.layout.page_size.dimensions();
        let m = &self.layout.margins;
        if m.left + m.right >= page_w || m.top + m.bottom >= page_h {
            return Err(ReportError::InvalidConfig(
                "margins leave no printable area".into(),
            ));
        }
        if self.record.date_formats.is_empty() {
            return Err(ReportError::InvalidConfig(
                "at least one date format is required".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ReportConfig`].
#[derive(Debug)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.fetch.max_attempts = n;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch.timeout_secs = secs;
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.fetch.chunk_size = bytes;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.fetch.retry_backoff_ms = ms;
        self
    }

    pub fn download_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.fetch.download_endpoint = url.into();
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.layout.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.config.layout.margins = margins;
        self
    }

    pub fn grid_columns(mut self, n: usize) -> Self {
        self.config.layout.grid_columns = n;
        self
    }

    pub fn grid_cell(mut self, width: f32, height: f32) -> Self {
        self.config.layout.grid_cell = BoxSize { width, height };
        self
    }

    pub fn fit_policy(mut self, policy: FitPolicy) -> Self {
        self.config.layout.fit_policy = policy;
        self
    }

    pub fn max_value_chars(mut self, n: Option<usize>) -> Self {
        self.config.layout.max_value_chars = n;
        self
    }

    pub fn date_column(mut self, column: impl Into<String>) -> Self {
        self.config.record.date_column = column.into();
        self
    }

    pub fn sections(mut self, sections: Vec<SectionSpec>) -> Self {
        self.config.sections = sections;
        self
    }

    pub fn report_title(mut self, title: impl Into<String>) -> Self {
        self.config.report_title = title.into();
        self
    }

    pub fn logos(mut self, logos: Vec<LogoSpec>) -> Self {
        self.config.logos = logos;
        self
    }

    pub fn asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.asset_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReportConfig, ReportError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Stage settings ───────────────────────────────────────────────────────

/// Settings for the resource fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Attempts per locator, including the first one. Default: 3.
    pub max_attempts: u32,

    /// Time budget of one attempt in seconds, interstitial hop included.
    /// Default: 30.
    ///
    /// Worst-case wall time for one locator is `max_attempts × timeout_secs`
    /// plus back-off.
    pub timeout_secs: u64,

    /// Write granularity when streaming a body to disk. Default: 8 KiB.
    pub chunk_size: usize,

    /// Initial retry delay in milliseconds, doubled after each failure. Default: 500.
    pub retry_backoff_ms: u64,

    /// Direct-download endpoint; `?export=download&id=<id>` is appended.
    pub download_endpoint: String,

    /// Host substrings that mark a candidate as a provider link.
    pub provider_hosts: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_secs: 30,
            chunk_size: 8192,
            retry_backoff_ms: 500,
            download_endpoint: "https://drive.google.com/uc".into(),
            provider_hosts: vec!["drive.google.com".into(), "docs.google.com".into()],
        }
    }
}

/// Settings for the layout composer and the PDF renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Output page size. Default: A4.
    pub page_size: PageSize,

    /// Page margins. Default: 0.75in all round.
    pub margins: Margins,

    /// Images per grid row. Default: 3.
    pub grid_columns: usize,

    /// Bounding box each grid image is fitted into. Default: 1.8in × 1.3in.
    pub grid_cell: BoxSize,

    /// Smallest side a fitted grid image may have. Default: 0.3in.
    pub min_image_side: f32,

    /// Aspect-preserving fitting strategy. Default: [`FitPolicy::TwoStepClamp`].
    pub fit_policy: FitPolicy,

    /// Field values longer than this are cut and end in "...". Default: 80.
    pub max_value_chars: Option<usize>,

    /// Longest edge, in pixels, of an image embedded in the PDF. Default: 1600.
    ///
    /// Phone photos are routinely 4000 px wide but print at under two inches;
    /// downscaling before embedding keeps the report small.
    pub max_embed_pixels: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            margins: Margins::uniform(inches(0.75)),
            grid_columns: 3,
            grid_cell: BoxSize {
                width: inches(1.8),
                height: inches(1.3),
            },
            min_image_side: inches(0.3),
            fit_policy: FitPolicy::default(),
            max_value_chars: Some(80),
            max_embed_pixels: 1600,
        }
    }
}

impl LayoutConfig {
    /// Width available between the left and right margins.
    pub fn content_width(&self) -> f32 {
        self.page_size.dimensions().0 - self.margins.left - self.margins.right
    }
}

/// Settings for picking the latest record out of the CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Column used to find the most recent row.
    pub date_column: String,

    /// `chrono` formats tried in order; the first is the form's native format.
    pub date_formats: Vec<String>,

    /// Format used when printing the assessment date.
    pub date_output_format: String,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            date_column: "Date of Assessment".into(),
            date_formats: [
                "%Y/%m/%d",
                "%Y-%m-%d",
                "%m/%d/%Y",
                "%d/%m/%Y",
                "%Y-%m-%d %H:%M:%S",
                "%m/%d/%Y %H:%M:%S",
                "%m-%d-%Y",
                "%d-%m-%Y",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            date_output_format: "%Y-%m-%d".into(),
        }
    }
}

// ── Value types ──────────────────────────────────────────────────────────

/// Output page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    /// 210 × 297 mm. (default)
    #[default]
    A4,
    /// 8.5 × 11 in.
    Letter,
}

impl PageSize {
    /// `(width, height)` in points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.276, 841.89),
            PageSize::Letter => (612.0, 792.0),
        }
    }
}

/// Page margins in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl Margins {
    pub fn uniform(v: f32) -> Self {
        Self {
            top: v,
            bottom: v,
            left: v,
            right: v,
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(inches(0.75))
    }
}

/// A width × height box in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSize {
    pub width: f32,
    pub height: f32,
}

/// How an image is scaled into a bounding box.
///
/// | Policy | Behaviour |
/// |--------|-----------|
/// | `TwoStepClamp` | Clamp width first, then height. Never upscales. Can under-fill the width for tall images in a wide box. |
/// | `Proportional` | One uniform scale `min(max_w / w, max_h / h, 1)`. |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitPolicy {
    /// Width-then-height clamp. (default)
    #[default]
    TwoStepClamp,
    /// Single min-scale fit.
    Proportional,
}

/// One printed section of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    /// Heading, including its number ("3. Preliminary Conditions").
    pub title: String,
    /// Whether the image grid is attached to this section.
    #[serde(default)]
    pub kind: SectionKind,
    /// Label → source-column pairs, in print order.
    pub fields: Vec<FieldMapping>,
}

/// Distinguishes the section that carries the photo grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    #[default]
    Standard,
    Documentation,
}

/// A printed label and the CSV column its value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub label: String,
    /// Exact column name, trailing spaces included.
    pub column: String,
}

impl FieldMapping {
    pub fn new(label: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            column: column.into(),
        }
    }
}

/// A header logo looked up by file name in the asset directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoSpec {
    pub file_name: String,
    /// Printed instead of the logo when the file is missing or unreadable.
    pub fallback_text: String,
    /// Height the logo is scaled to before clamping.
    pub target_height: f32,
    pub max_width: f32,
    pub max_height: f32,
}

fn default_logos() -> Vec<LogoSpec> {
    vec![
        LogoSpec {
            file_name: "Biladi logo.png".into(),
            fallback_text: "BILADI".into(),
            target_height: inches(1.5),
            max_width: inches(3.5),
            max_height: inches(1.8),
        },
        LogoSpec {
            file_name: "CER Logo.png".into(),
            fallback_text: "CER".into(),
            target_height: inches(0.85),
            max_width: inches(2.5),
            max_height: inches(1.0),
        },
    ]
}

fn section(title: &str, kind: SectionKind, fields: &[(&str, &str)]) -> SectionSpec {
    SectionSpec {
        title: title.into(),
        kind,
        fields: fields
            .iter()
            .map(|(label, column)| FieldMapping::new(*label, *column))
            .collect(),
    }
}

/// The nine sections of the heritage assessment form.
///
/// Column names reproduce the form export verbatim, typos and trailing
/// spaces included; lookups are exact.
pub fn default_sections() -> Vec<SectionSpec> {
    use SectionKind::{Documentation, Standard};
    vec![
        section(
            "1. General Information",
            Standard,
            &[
                ("Date of Assessment", "Date of Assessment"),
                ("Assessor's Name", "Assessor's Name "),
                ("Supervisor", "Supervisor "),
                ("Organization", "Organization"),
                ("Monument Reference", "Monument Reference "),
                ("Monument Name", "Monument Name "),
                ("Ownership", "Ownership "),
            ],
        ),
        section(
            "2. Location Information",
            Standard,
            &[
                ("Governorate", "Governorate"),
                ("District", "District"),
                ("City/Village", "City-Village"),
                ("Location", "Location"),
            ],
        ),
        section(
            "3. Preliminary Conditions",
            Standard,
            &[
                ("Observed Structural Conditions", "Observed structural conditions "),
                ("Exterior Walls Condition", "Exterior walls condition"),
                ("Roof Conditions", "Roof Conditions"),
                ("Major Architectural Failure", "Major Architectural Failure"),
                ("Location of Major Damage", "Location of Major Damage"),
            ],
        ),
        section(
            "4. Evidence of Conflict or Damage",
            Standard,
            &[
                ("Evidence of Armed Conflict", "Evidence of Armed Conflict"),
                ("Fire or Smoke Damage", "Fire or Smoke Damage"),
                ("Looting or Vandalism", "Looting or Vandalism"),
                ("Conflict-Specific Damage Indicator", "Conflict-Specific damage indicator "),
            ],
        ),
        section(
            "5. Visible Damage",
            Standard,
            &[
                (
                    "Significant Cultural/Religious Symbol Damage",
                    "Significant Cultural or Religous Symbol Damage ",
                ),
                (
                    "Visible Damage to Sculptures/Carvings",
                    "Visible Damage to Sculptures, Catvings and Facade ",
                ),
                ("Damage to Decorative Elements", "Damage to decorative elements "),
            ],
        ),
        section(
            "6. Environmental Concerns",
            Standard,
            &[
                (
                    "Water Infiltration and Weather Exposure",
                    "Water Infiltration and Weather Exposure ",
                ),
                ("Vegetation Overgrowth", "Vegetation Overgrowth "),
                ("Secondary Hazards Present", "Secondary Hazards present "),
            ],
        ),
        section(
            "7. Documentation and Evidence",
            Documentation,
            &[
                ("Satellite Imagery Observations", "Satellite Imagery Observations"),
                ("Eyewitness Report", "Eyewitness Report"),
                ("Testimonials", "Testimonials"),
            ],
        ),
        section(
            "8. Risk Assessment",
            Standard,
            &[
                (
                    "Potential Hazards to Public and Site",
                    "Potential Hazards to the public and site",
                ),
                ("Urgent Stabilization Required", "Urgent Stabilization Required"),
                ("Security Measures Needed", "Security measures needed"),
                ("Likelihood of Continued Damage", "Likelihood of continued damage"),
            ],
        ),
        section(
            "9. Historical or Cultural Significance",
            Standard,
            &[
                (
                    "Historical or Cultural Significance",
                    "Historical or Cultural Significance",
                ),
                ("Significance for Local Population", "Significance for local population"),
                ("Additional References", "Additional References"),
            ],
        ),
    ]
}
