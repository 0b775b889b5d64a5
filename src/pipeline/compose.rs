//! Layout composition: turn field values and fetched images into a [`Document`].
//!
//! The composer decides *what* goes on the page and in which order; the
//! renderer decides *where*. Everything here is a pure function of the
//! config, the record and the fetch results, so equal inputs always give
//! equal block sequences.
//!
//! Block order is fixed:
//!
//! ```text
//! Header
//! for each section:   SectionTitle → Fields | placeholder → Divider
//! documentation:      SectionTitle → [Fields] → Images + note | placeholder → Divider
//! ```

use crate::config::{LogoSpec, ReportConfig, SectionKind};
use crate::pipeline::fetch::{FetchResult, FetchedImage};
use crate::pipeline::fit::{fit_logo, DimensionFitter};
use crate::record::{format_date, Record};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const NO_DATA: &str = "(No data available)";
const NO_IMAGES: &str = "(No images available)";
const ELLIPSIS: &str = "...";

// ── Input model ──────────────────────────────────────────────────────────

/// One labelled value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: String,
    pub value: String,
}

/// The fields of one section, in print order.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionFields {
    pub title: String,
    pub kind: SectionKind,
    pub fields: Vec<Field>,
}

/// Section name → ordered (label, value) pairs for one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRecord {
    pub sections: Vec<SectionFields>,
}

impl FieldRecord {
    /// Project `record` through the configured section mappings.
    ///
    /// Missing columns become empty values; the assessment-date column is
    /// reformatted for display.
    pub fn from_record(record: &Record, config: &ReportConfig) -> Self {
        let sections = config
            .sections
            .iter()
            .map(|spec| SectionFields {
                title: spec.title.clone(),
                kind: spec.kind,
                fields: spec
                    .fields
                    .iter()
                    .map(|m| {
                        let raw = record.get(&m.column).unwrap_or("");
                        let value = if m.column == config.record.date_column {
                            format_date(
                                raw,
                                &config.record.date_formats,
                                &config.record.date_output_format,
                            )
                        } else {
                            raw.trim().to_string()
                        };
                        Field {
                            label: m.label.clone(),
                            value,
                        }
                    })
                    .collect(),
            })
            .collect();
        Self { sections }
    }
}

/// Fetch results for the two image-bearing columns.
#[derive(Debug, Clone, Default)]
pub struct ImageGroups {
    pub primary: Vec<FetchResult>,
    pub additional: Vec<FetchResult>,
}

impl ImageGroups {
    /// Primary results first, then additional, each in input order.
    pub fn flatten(&self) -> impl Iterator<Item = &FetchResult> {
        self.primary.iter().chain(self.additional.iter())
    }
}

// ── Output model ─────────────────────────────────────────────────────────

/// An ordered, append-only sequence of blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Images placed anywhere in the document.
    pub fn image_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| match b {
                Block::Images(grid) => grid.images().count(),
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Header(Header),
    SectionTitle(String),
    Fields(Vec<FieldRow>),
    Paragraph(Paragraph),
    Images(ImageGrid),
    Divider,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub title: String,
    pub logos: Vec<HeaderLogo>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderLogo {
    Image {
        path: PathBuf,
        width: f32,
        height: f32,
    },
    /// Stand-in text for a logo file that could not be used.
    Text(String),
}

/// One cell of the two-column field table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCell {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRow {
    pub left: FieldCell,
    pub right: Option<FieldCell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    Plain,
    Bold,
    Italic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub text: String,
    pub style: TextStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub spans: Vec<Span>,
}

impl Paragraph {
    pub fn italic(text: impl Into<String>) -> Self {
        Self {
            spans: vec![Span {
                text: text.into(),
                style: TextStyle::Italic,
            }],
        }
    }
}

/// A placed, fitted image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    pub path: PathBuf,
    pub width: f32,
    pub height: f32,
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridCell {
    Image(ImageBlock),
    Empty,
}

/// Fixed-column grid; every row holds exactly `columns` cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGrid {
    pub columns: usize,
    pub rows: Vec<Vec<GridCell>>,
}

impl ImageGrid {
    pub fn images(&self) -> impl Iterator<Item = &ImageBlock> {
        self.rows.iter().flatten().filter_map(|c| match c {
            GridCell::Image(b) => Some(b),
            GridCell::Empty => None,
        })
    }
}

// ── Layout functions ─────────────────────────────────────────────────────

/// Split cells into two balanced columns: left takes `[0, ceil(n/2))`.
pub fn two_column_rows(cells: Vec<FieldCell>) -> Vec<FieldRow> {
    let rows_needed = cells.len().div_ceil(2);
    let mut rest = cells.into_iter();
    let left: Vec<FieldCell> = rest.by_ref().take(rows_needed).collect();

    left.into_iter()
        .map(|l| FieldRow {
            left: l,
            right: rest.next(),
        })
        .collect()
}

/// Cut values longer than `max_chars` to `max_chars - 3` chars plus "...".
pub fn truncate_value(value: &str, max_chars: Option<usize>) -> String {
    match max_chars {
        Some(max) if value.chars().count() > max => {
            let keep = max.saturating_sub(ELLIPSIS.len());
            let mut cut: String = value.chars().take(keep).collect();
            cut.push_str(ELLIPSIS);
            cut
        }
        _ => value.to_string(),
    }
}

/// Pack successful fetches into rows of `columns`, skipping failures.
///
/// Failed entries do not reserve a cell; later images move up.
pub fn pack_grid<'a>(
    results: impl IntoIterator<Item = &'a FetchResult>,
    columns: usize,
    fitter: &DimensionFitter,
) -> ImageGrid {
    let columns = columns.max(1);
    let images: Vec<&FetchedImage> = results
        .into_iter()
        .filter_map(|r| match r {
            FetchResult::Success(img) => Some(img),
            FetchResult::Failure(e) => {
                warn!(id = %e.id(), "Leaving failed image out of the grid: {}", e);
                None
            }
        })
        .collect();

    let mut rows: Vec<Vec<GridCell>> = images
        .chunks(columns)
        .enumerate()
        .map(|(row, chunk)| {
            chunk
                .iter()
                .enumerate()
                .map(|(col, img)| {
                    let (width, height) = fitter.fit(img.width, img.height);
                    GridCell::Image(ImageBlock {
                        path: img.path.clone(),
                        width,
                        height,
                        row,
                        col,
                    })
                })
                .collect()
        })
        .collect();

    if let Some(last) = rows.last_mut() {
        last.resize(columns, GridCell::Empty);
    }
    ImageGrid { columns, rows }
}

// ── Composer ─────────────────────────────────────────────────────────────

/// Builds the document for one record.
pub struct LayoutComposer<'a> {
    config: &'a ReportConfig,
    asset_dir: PathBuf,
    fitter: DimensionFitter,
}

impl<'a> LayoutComposer<'a> {
    /// `asset_dir` is where header logos are looked up.
    pub fn new(config: &'a ReportConfig, asset_dir: impl Into<PathBuf>) -> Self {
        let layout = &config.layout;
        Self {
            config,
            asset_dir: asset_dir.into(),
            fitter: DimensionFitter::new(layout.fit_policy, layout.grid_cell, layout.min_image_side),
        }
    }

    pub fn compose(&self, record: &FieldRecord, images: &ImageGroups) -> Document {
        let mut doc = Document::new();
        doc.push(Block::Header(self.header()));

        for section in &record.sections {
            doc.push(Block::SectionTitle(section.title.clone()));
            let rows = self.field_rows(&section.fields);

            match section.kind {
                SectionKind::Standard => {
                    if rows.is_empty() {
                        debug!(section = %section.title, "Section has no populated fields");
                        doc.push(Block::Paragraph(Paragraph::italic(NO_DATA)));
                    } else {
                        doc.push(Block::Fields(rows));
                    }
                }
                SectionKind::Documentation => {
                    if !rows.is_empty() {
                        doc.push(Block::Fields(rows));
                    }
                    let grid = pack_grid(images.flatten(), self.config.layout.grid_columns, &self.fitter);
                    let placed = grid.images().count();
                    if placed > 0 {
                        info!("Placed {} images in a {}-column grid", placed, grid.columns);
                        doc.push(Block::Images(grid));
                        doc.push(Block::Paragraph(Paragraph::italic(format!(
                            "Total images: {}",
                            placed
                        ))));
                    } else {
                        doc.push(Block::Paragraph(Paragraph::italic(NO_IMAGES)));
                    }
                }
            }

            doc.push(Block::Divider);
        }

        doc
    }

    fn field_rows(&self, fields: &[Field]) -> Vec<FieldRow> {
        let max = self.config.layout.max_value_chars;
        let cells = fields
            .iter()
            .filter(|f| !f.value.trim().is_empty())
            .map(|f| FieldCell {
                label: f.label.clone(),
                value: truncate_value(f.value.trim(), max),
            })
            .collect();
        two_column_rows(cells)
    }

    fn header(&self) -> Header {
        Header {
            title: self.config.report_title.clone(),
            logos: self
                .config
                .logos
                .iter()
                .map(|spec| header_logo(&self.asset_dir, spec))
                .collect(),
        }
    }
}

fn header_logo(asset_dir: &Path, spec: &LogoSpec) -> HeaderLogo {
    let path = asset_dir.join(&spec.file_name);
    if !path.exists() {
        warn!("Logo not found: {}", path.display());
        return HeaderLogo::Text(spec.fallback_text.clone());
    }
    match image::image_dimensions(&path) {
        Ok((w, h)) => match fit_logo(w, h, spec) {
            Some((width, height)) => HeaderLogo::Image {
                path,
                width,
                height,
            },
            None => HeaderLogo::Text(spec.fallback_text.clone()),
        },
        Err(e) => {
            warn!("Unreadable logo {}: {}", path.display(), e);
            HeaderLogo::Text(spec.fallback_text.clone())
        }
    }
}
