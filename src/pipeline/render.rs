//! PDF emission: lay a finished [`Document`] out on pages and serialise it.
//!
//! ## Why the base-14 Helvetica family?
//!
//! The report is mostly short label/value text. The three built-in Helvetica
//! faces need no font embedding, which keeps a text-only report at a few
//! kilobytes. Text is written in WinAnsi; characters outside it print as `?`.
//!
//! ## Flow model
//!
//! Blocks are placed top to bottom with a single cursor. A block row (a
//! field row, an image row, a title with its first line) never splits across
//! pages: if it does not fit in the space left, a new page starts first.
//!
//! Rendering is CPU-bound (image decoding, deflate). Async callers should run
//! it under `spawn_blocking`.

use crate::config::LayoutConfig;
use crate::error::ReportError;
use crate::pipeline::compose::{
    Block, Document, FieldCell, FieldRow, GridCell, Header, HeaderLogo, ImageGrid, Paragraph,
    TextStyle,
};
use image::DynamicImage;
use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref, Str};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TITLE_SIZE: f32 = 18.0;
const SECTION_TITLE_SIZE: f32 = 14.0;
const FIELD_SIZE: f32 = 9.0;
const PARAGRAPH_SIZE: f32 = 10.0;
const LOGO_TEXT_SIZE: f32 = 14.0;
const LEADING: f32 = 1.2;
const DIVIDER_THICKNESS: f32 = 2.0;
const CELL_PADDING_RIGHT: f32 = 8.0;

const SECTION_TITLE_COLOR: [f32; 3] = rgb(0xff5c28);
const LABEL_COLOR: [f32; 3] = rgb(0x333333);
const VALUE_COLOR: [f32; 3] = rgb(0x000000);
const DIVIDER_COLOR: [f32; 3] = rgb(0x59b4a6);

const fn rgb(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

// ── Fonts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Oblique,
}

/// Advance widths (1/1000 em) for ASCII 32..=126.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

impl Font {
    const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Oblique];

    fn resource_name(self) -> Name<'static> {
        let name: &'static [u8] = match self {
            Font::Regular => b"F1",
            Font::Bold => b"F2",
            Font::Oblique => b"F3",
        };
        Name(name)
    }

    fn base_font(self) -> Name<'static> {
        let name: &'static [u8] = match self {
            Font::Regular => b"Helvetica",
            Font::Bold => b"Helvetica-Bold",
            Font::Oblique => b"Helvetica-Oblique",
        };
        Name(name)
    }

    fn from_style(style: TextStyle) -> Self {
        match style {
            TextStyle::Plain => Font::Regular,
            TextStyle::Bold => Font::Bold,
            TextStyle::Italic => Font::Oblique,
        }
    }

    fn text_width(self, text: &str, size: f32) -> f32 {
        let table = match self {
            Font::Bold => &HELVETICA_BOLD_WIDTHS,
            Font::Regular | Font::Oblique => &HELVETICA_WIDTHS,
        };
        let units: u32 = text
            .chars()
            .map(|c| match c as u32 {
                cp @ 32..=126 => table[(cp - 32) as usize] as u32,
                _ => 556,
            })
            .sum();
        units as f32 * size / 1000.0
    }
}

/// Encode text as WinAnsi bytes; unmappable characters become `?`.
pub fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' | '\n' | '\r' => b' ',
            c if (c as u32) < 0x20 => b'?',
            c if (c as u32) < 0x80 => c as u8,
            c if (0xa0..=0xff).contains(&(c as u32)) => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8a,
            '‹' => 0x8b,
            'Œ' => 0x8c,
            'Ž' => 0x8e,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9a,
            '›' => 0x9b,
            'œ' => 0x9c,
            'ž' => 0x9e,
            'Ÿ' => 0x9f,
            _ => b'?',
        })
        .collect()
}

/// Greedy word wrap. Explicit line breaks are kept; words wider than the
/// line are broken between characters.
fn wrap(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if font.text_width(&candidate, size) <= max_width {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            for c in word.chars() {
                line.push(c);
                if font.text_width(&line, size) > max_width && line.chars().count() > 1 {
                    line.pop();
                    lines.push(std::mem::take(&mut line));
                    line.push(c);
                }
            }
        }
        if !line.is_empty() || lines.is_empty() {
            lines.push(line);
        }
    }
    lines
}

// ── Resources ────────────────────────────────────────────────────────────

#[derive(Default)]
struct RefAllocator {
    last: i32,
}

impl RefAllocator {
    fn next(&mut self) -> Ref {
        self.last += 1;
        Ref::new(self.last)
    }
}

/// Images embedded once and addressed by their source path.
#[derive(Default)]
struct ImageRegistry {
    by_path: HashMap<PathBuf, String>,
    xobjects: Vec<(String, Ref)>,
}

impl ImageRegistry {
    fn name(&self, path: &Path) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    fn embed(&mut self, pdf: &mut Pdf, refs: &mut RefAllocator, path: &Path, max_pixels: u32) {
        if self.by_path.contains_key(path) {
            return;
        }
        let img = match decode(path) {
            Ok(img) => img,
            Err(e) => {
                warn!("Skipping image that no longer decodes: {}: {}", path.display(), e);
                return;
            }
        };
        let img = if max_pixels > 0 && img.width().max(img.height()) > max_pixels {
            img.thumbnail(max_pixels, max_pixels)
        } else {
            img
        };

        let (w, h) = (img.width() as i32, img.height() as i32);
        let s_mask = if img.color().has_alpha() {
            let rgba = img.to_rgba8();
            let alpha: Vec<u8> = rgba.pixels().map(|p| p.0[3]).collect();
            if alpha.iter().any(|&a| a < 255) {
                let mask_ref = refs.next();
                let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&alpha, 6);
                let mut mask = pdf.image_xobject(mask_ref, &compressed);
                mask.filter(Filter::FlateDecode);
                mask.width(w);
                mask.height(h);
                mask.color_space().device_gray();
                mask.bits_per_component(8);
                Some(mask_ref)
            } else {
                None
            }
        } else {
            None
        };

        let rgb = img.to_rgb8();
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(rgb.as_raw(), 6);
        let id = refs.next();
        let mut xobj = pdf.image_xobject(id, &compressed);
        xobj.filter(Filter::FlateDecode);
        xobj.width(w);
        xobj.height(h);
        xobj.color_space().device_rgb();
        xobj.bits_per_component(8);
        if let Some(mask_ref) = s_mask {
            xobj.s_mask(mask_ref);
        }

        let name = format!("Im{}", self.xobjects.len() + 1);
        debug!("Embedded {} as {} ({}x{} px)", path.display(), name, w, h);
        self.by_path.insert(path.to_path_buf(), name.clone());
        self.xobjects.push((name, id));
    }
}

fn decode(path: &Path) -> Result<DynamicImage, image::ImageError> {
    Ok(image::ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

fn image_paths(blocks: &[Block]) -> Vec<&Path> {
    let mut paths = Vec::new();
    for block in blocks {
        match block {
            Block::Header(h) => paths.extend(h.logos.iter().filter_map(|l| match l {
                HeaderLogo::Image { path, .. } => Some(path.as_path()),
                HeaderLogo::Text(_) => None,
            })),
            Block::Images(grid) => paths.extend(grid.images().map(|b| b.path.as_path())),
            _ => {}
        }
    }
    paths
}

// ── Page flow ────────────────────────────────────────────────────────────

struct PageFlow<'a> {
    images: &'a ImageRegistry,
    left: f32,
    width: f32,
    top: f32,
    bottom: f32,
    y: f32,
    pages: Vec<Content>,
    current: Content,
}

impl<'a> PageFlow<'a> {
    fn new(layout: &LayoutConfig, images: &'a ImageRegistry) -> Self {
        let (_, page_h) = layout.page_size.dimensions();
        let top = page_h - layout.margins.top;
        Self {
            images,
            left: layout.margins.left,
            width: layout.content_width(),
            top,
            bottom: layout.margins.bottom,
            y: top,
            pages: Vec::new(),
            current: Content::new(),
        }
    }

    fn new_page(&mut self) {
        let done = std::mem::replace(&mut self.current, Content::new());
        self.pages.push(done);
        self.y = self.top;
    }

    /// Start a new page unless `height` still fits. A fresh page always accepts.
    fn ensure(&mut self, height: f32) {
        if self.y - height < self.bottom && self.y < self.top {
            self.new_page();
        }
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn text(&mut self, font: Font, size: f32, color: [f32; 3], x: f32, baseline: f32, text: &str) {
        let bytes = win_ansi(text);
        self.current.set_fill_rgb(color[0], color[1], color[2]);
        self.current
            .begin_text()
            .set_font(font.resource_name(), size)
            .next_line(x, baseline)
            .show(Str(&bytes))
            .end_text();
    }

    fn image(&mut self, path: &Path, x: f32, y: f32, width: f32, height: f32) {
        let Some(name) = self.images.name(path) else {
            return;
        };
        self.current.save_state();
        self.current.transform([width, 0.0, 0.0, height, x, y]);
        self.current.x_object(Name(name.as_bytes()));
        self.current.restore_state();
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Header(h) => self.header(h),
            Block::SectionTitle(t) => self.section_title(t),
            Block::Fields(rows) => self.fields(rows),
            Block::Paragraph(p) => self.paragraph(p),
            Block::Images(grid) => self.grid(grid),
            Block::Divider => self.divider(),
        }
    }

    fn header(&mut self, header: &Header) {
        let widths: Vec<f32> = header
            .logos
            .iter()
            .map(|l| match l {
                HeaderLogo::Image { width, .. } => *width,
                HeaderLogo::Text(t) => Font::Bold.text_width(t, LOGO_TEXT_SIZE),
            })
            .collect();
        let row_height = header
            .logos
            .iter()
            .map(|l| match l {
                HeaderLogo::Image { height, .. } => *height,
                HeaderLogo::Text(_) => LOGO_TEXT_SIZE * LEADING,
            })
            .fold(0.0_f32, f32::max);

        if row_height > 0.0 {
            self.ensure(row_height);
            let top = self.y;
            let n = header.logos.len();
            for (i, (logo, w)) in header.logos.iter().zip(&widths).enumerate() {
                let x = if n == 1 {
                    self.left + (self.width - w) / 2.0
                } else {
                    self.left + (self.width - w) * i as f32 / (n - 1) as f32
                };
                match logo {
                    HeaderLogo::Image {
                        path,
                        width,
                        height,
                    } => {
                        let y = top - (row_height + height) / 2.0;
                        self.image(path, x, y, *width, *height);
                    }
                    HeaderLogo::Text(t) => {
                        let baseline = top - (row_height + LOGO_TEXT_SIZE) / 2.0;
                        self.text(Font::Bold, LOGO_TEXT_SIZE, VALUE_COLOR, x, baseline, t);
                    }
                }
            }
            self.y = top - row_height;
            self.gap(6.0);
        }

        for line in wrap(&header.title, Font::Bold, TITLE_SIZE, self.width) {
            self.ensure(TITLE_SIZE * LEADING);
            let x = self.left + (self.width - Font::Bold.text_width(&line, TITLE_SIZE)) / 2.0;
            self.text(Font::Bold, TITLE_SIZE, VALUE_COLOR, x, self.y - TITLE_SIZE, &line);
            self.gap(TITLE_SIZE * LEADING);
        }
        self.gap(10.0);
    }

    fn section_title(&mut self, title: &str) {
        self.gap(8.0);
        let line_height = SECTION_TITLE_SIZE * LEADING;
        // keep the title with at least one following row
        self.ensure(line_height + 3.0 * FIELD_SIZE * LEADING);
        for line in wrap(title, Font::Bold, SECTION_TITLE_SIZE, self.width) {
            let baseline = self.y - SECTION_TITLE_SIZE;
            self.text(Font::Bold, SECTION_TITLE_SIZE, SECTION_TITLE_COLOR, self.left, baseline, &line);
            self.gap(line_height);
        }
        self.gap(6.0);
    }

    fn cell_lines(cell: &FieldCell, width: f32) -> Vec<(Font, String)> {
        let mut lines: Vec<(Font, String)> = wrap(&format!("{}:", cell.label), Font::Bold, FIELD_SIZE, width)
            .into_iter()
            .map(|l| (Font::Bold, l))
            .collect();
        lines.extend(
            wrap(&cell.value, Font::Regular, FIELD_SIZE, width)
                .into_iter()
                .map(|l| (Font::Regular, l)),
        );
        lines
    }

    fn fields(&mut self, rows: &[FieldRow]) {
        let column = self.width / 2.0;
        let inner = column - CELL_PADDING_RIGHT;
        let line_height = FIELD_SIZE * LEADING;

        for row in rows {
            let left = Self::cell_lines(&row.left, inner);
            let right = row
                .right
                .as_ref()
                .map(|c| Self::cell_lines(c, inner))
                .unwrap_or_default();
            let row_height = left.len().max(right.len()) as f32 * line_height + 4.0;
            self.ensure(row_height);

            let top = self.y - 1.0;
            for (col, lines) in [left, right].into_iter().enumerate() {
                let x = self.left + col as f32 * column;
                for (i, (font, line)) in lines.iter().enumerate() {
                    let color = if *font == Font::Bold { LABEL_COLOR } else { VALUE_COLOR };
                    let baseline = top - FIELD_SIZE - i as f32 * line_height;
                    self.text(*font, FIELD_SIZE, color, x, baseline, line);
                }
            }
            self.gap(row_height);
        }
    }

    fn paragraph(&mut self, paragraph: &Paragraph) {
        let line_height = PARAGRAPH_SIZE * LEADING;
        for span in &paragraph.spans {
            let font = Font::from_style(span.style);
            for line in wrap(&span.text, font, PARAGRAPH_SIZE, self.width) {
                self.ensure(line_height);
                let baseline = self.y - PARAGRAPH_SIZE;
                self.text(font, PARAGRAPH_SIZE, VALUE_COLOR, self.left, baseline, &line);
                self.gap(line_height);
            }
        }
        self.gap(3.0);
    }

    fn grid(&mut self, grid: &ImageGrid) {
        let column = self.width / grid.columns.max(1) as f32;
        for row in &grid.rows {
            let inner = row
                .iter()
                .filter_map(|c| match c {
                    GridCell::Image(b) => Some(b.height),
                    GridCell::Empty => None,
                })
                .fold(0.0_f32, f32::max);
            if inner <= 0.0 {
                continue;
            }
            let row_height = inner + 4.0;
            self.ensure(row_height);

            let top = self.y - 1.0;
            for cell in row {
                if let GridCell::Image(b) = cell {
                    let x = self.left + b.col as f32 * column + (column - b.width) / 2.0;
                    let y = top - (inner + b.height) / 2.0;
                    self.image(&b.path, x, y, b.width, b.height);
                }
            }
            self.gap(row_height + 3.0);
        }
    }

    fn divider(&mut self) {
        self.gap(10.0);
        self.ensure(DIVIDER_THICKNESS);
        let [r, g, b] = DIVIDER_COLOR;
        self.current.set_fill_rgb(r, g, b);
        self.current
            .rect(self.left, self.y - DIVIDER_THICKNESS, self.width, DIVIDER_THICKNESS);
        self.current.fill_nonzero();
        self.gap(DIVIDER_THICKNESS + 8.0);
    }

    fn finish(mut self) -> Vec<Content> {
        self.pages.push(self.current);
        self.pages
    }
}

fn layout_pages(blocks: &[Block], layout: &LayoutConfig, images: &ImageRegistry) -> Vec<Content> {
    let mut flow = PageFlow::new(layout, images);
    for block in blocks {
        flow.block(block);
    }
    flow.finish()
}

/// Render a composed document to PDF bytes.
///
/// The document is consumed: it is finalised exactly once.
///
/// # Errors
/// [`ReportError::RenderFailed`] if the document has no blocks.
pub fn render(document: Document, layout: &LayoutConfig) -> Result<Vec<u8>, ReportError> {
    let blocks = document.into_blocks();
    if blocks.is_empty() {
        return Err(ReportError::RenderFailed {
            detail: "document has no content".into(),
        });
    }

    let mut pdf = Pdf::new();
    let mut refs = RefAllocator::default();
    let catalog_id = refs.next();
    let pages_id = refs.next();

    let fonts: Vec<(Font, Ref)> = Font::ALL.iter().map(|f| (*f, refs.next())).collect();
    for (font, id) in &fonts {
        pdf.type1_font(*id)
            .base_font(font.base_font())
            .encoding_predefined(Name(b"WinAnsiEncoding"));
    }

    let mut images = ImageRegistry::default();
    for path in image_paths(&blocks) {
        images.embed(&mut pdf, &mut refs, path, layout.max_embed_pixels);
    }

    let contents = layout_pages(&blocks, layout, &images);
    let page_ids: Vec<Ref> = contents.iter().map(|_| refs.next()).collect();
    let content_ids: Vec<Ref> = contents.iter().map(|_| refs.next()).collect();

    for (content, id) in contents.into_iter().zip(&content_ids) {
        let raw = content.finish();
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&raw, 6);
        pdf.stream(*id, &compressed).filter(Filter::FlateDecode);
    }

    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id)
        .kids(page_ids.iter().copied())
        .count(page_ids.len() as i32);

    let (page_w, page_h) = layout.page_size.dimensions();
    for (page_id, content_id) in page_ids.iter().zip(&content_ids) {
        let mut page = pdf.page(*page_id);
        page.media_box(Rect::new(0.0, 0.0, page_w, page_h))
            .parent(pages_id)
            .contents(*content_id);
        let mut resources = page.resources();
        {
            let mut font_dict = resources.fonts();
            for (font, id) in &fonts {
                font_dict.pair(font.resource_name(), *id);
            }
        }
        if !images.xobjects.is_empty() {
            let mut xobjects = resources.x_objects();
            for (name, id) in &images.xobjects {
                xobjects.pair(Name(name.as_bytes()), *id);
            }
        }
    }

    info!(
        "Rendered {} pages with {} embedded images",
        page_ids.len(),
        images.xobjects.len()
    );
    Ok(pdf.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::compose::{ImageBlock, Span};

    fn field_row(n: usize) -> FieldRow {
        FieldRow {
            left: FieldCell {
                label: format!("Label {n}"),
                value: "value".into(),
            },
            right: None,
        }
    }

    #[test]
    fn win_ansi_maps_latin1_and_punctuation() {
        assert_eq!(win_ansi("Café"), b"Caf\xe9".to_vec());
        assert_eq!(win_ansi("“a” – b…"), vec![0x93, b'a', 0x94, b' ', 0x96, b' ', b'b', 0x85]);
        assert_eq!(win_ansi("حلب"), b"???".to_vec());
        assert_eq!(win_ansi("a\tb"), b"a b".to_vec());
    }

    #[test]
    fn text_width_uses_metrics() {
        // "i" is narrow, "W" is wide
        assert!(Font::Regular.text_width("iiii", 10.0) < Font::Regular.text_width("WWWW", 10.0));
        assert!((Font::Regular.text_width("a", 1000.0) - 556.0).abs() < 1e-3);
        assert!(Font::Bold.text_width("abc", 10.0) > Font::Regular.text_width("abc", 10.0));
    }

    #[test]
    fn wrap_respects_width_and_breaks() {
        let lines = wrap("one two three four five six", Font::Regular, 10.0, 60.0);
        assert!(lines.len() > 1);
        for l in &lines {
            assert!(Font::Regular.text_width(l, 10.0) <= 60.0, "{l:?}");
        }
        assert_eq!(lines.join(" "), "one two three four five six");

        assert_eq!(wrap("a\nb", Font::Regular, 10.0, 500.0), vec!["a", "b"]);
        assert_eq!(wrap("", Font::Regular, 10.0, 500.0), vec![""]);

        let long = "x".repeat(200);
        let broken = wrap(&long, Font::Regular, 10.0, 50.0);
        assert!(broken.len() > 1);
        assert_eq!(broken.concat(), long);
    }

    #[test]
    fn long_documents_break_pages() {
        let layout = LayoutConfig::default();
        let registry = ImageRegistry::default();

        let short = vec![Block::SectionTitle("1. Short".into()), Block::Fields(vec![field_row(0)])];
        assert_eq!(layout_pages(&short, &layout, &registry).len(), 1);

        let long = vec![Block::Fields((0..200).map(field_row).collect())];
        assert!(layout_pages(&long, &layout, &registry).len() > 1);
    }

    #[test]
    fn empty_document_is_a_render_failure() {
        let err = render(Document::new(), &LayoutConfig::default()).unwrap_err();
        assert!(matches!(err, ReportError::RenderFailed { .. }));
    }

    #[test]
    fn renders_text_and_images() {
        let dir = tempfile::TempDir::new().unwrap();
        let photo = dir.path().join("photo.png");
        image::RgbaImage::from_pixel(40, 20, image::Rgba([200, 10, 10, 128]))
            .save(&photo)
            .unwrap();

        let mut doc = Document::new();
        doc.push(Block::Header(Header {
            title: "Heritage Site Assessment Report".into(),
            logos: vec![HeaderLogo::Text("BILADI".into()), HeaderLogo::Text("CER".into())],
        }));
        doc.push(Block::SectionTitle("7. Documentation and Evidence".into()));
        doc.push(Block::Images(ImageGrid {
            columns: 3,
            rows: vec![vec![
                GridCell::Image(ImageBlock {
                    path: photo.clone(),
                    width: 80.0,
                    height: 40.0,
                    row: 0,
                    col: 0,
                }),
                GridCell::Empty,
                GridCell::Empty,
            ]],
        }));
        doc.push(Block::Paragraph(Paragraph {
            spans: vec![Span {
                text: "Total images: 1".into(),
                style: TextStyle::Italic,
            }],
        }));
        doc.push(Block::Divider);

        let bytes = render(doc, &LayoutConfig::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Helvetica-Oblique"));
        assert!(text.contains("/Im1"));
        assert!(text.contains("/SMask"));
    }

    #[test]
    fn missing_image_file_is_skipped() {
        let mut doc = Document::new();
        doc.push(Block::Images(ImageGrid {
            columns: 1,
            rows: vec![vec![GridCell::Image(ImageBlock {
                path: PathBuf::from("/no/such/image.jpg"),
                width: 10.0,
                height: 10.0,
                row: 0,
                col: 0,
            })]],
        }));
        let bytes = render(doc, &LayoutConfig::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(!String::from_utf8_lossy(&bytes).contains("/Im1"));
    }
}
