//! Tabular input: load a form-export CSV and pick the most recent assessment.
//!
//! Exports arrive from several tools, so the loader is lenient about the
//! container and strict about names:
//!
//! - UTF-8 (with or without BOM) is preferred; anything else is read as Latin-1.
//! - The delimiter is whichever of `, ; \t |` splits the header into the most
//!   columns.
//! - Column names are kept byte-for-byte, trailing spaces included, because the
//!   section mappings reference them verbatim.

use crate::config::RecordConfig;
use crate::error::ReportError;
use crate::output::RecordSelection;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// One data row, addressed by exact column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: HashMap<String, String>,
}

impl Record {
    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Raw cell value; `None` when the column does not exist.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    /// Trimmed cell value, `None` when absent or blank.
    pub fn populated(&self, column: &str) -> Option<&str> {
        self.get(column).map(str::trim).filter(|v| !v.is_empty())
    }
}

/// A parsed CSV file.
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

/// The row chosen for the report and how it was chosen.
#[derive(Debug, Clone)]
pub struct LatestEntry {
    pub record: Record,
    pub selection: RecordSelection,
}

impl CsvTable {
    /// Read and parse `path`.
    ///
    /// # Errors
    /// - [`ReportError::CsvNotFound`] if the file does not exist.
    /// - [`ReportError::CsvLoadFailed`] if it cannot be read or parsed.
    /// - [`ReportError::NoRecords`] if it has a header but no data rows.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReportError::CsvNotFound {
                path: path.to_path_buf(),
            });
        }
        info!("Loading CSV file: {}", path.display());
        let bytes = std::fs::read(path).map_err(|e| ReportError::CsvLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let table = Self::from_bytes(path, &bytes)?;
        info!(
            "Loaded {} records, {} columns",
            table.rows.len(),
            table.headers.len()
        );
        Ok(table)
    }

    /// Parse CSV bytes; `path` is only used in error messages.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self, ReportError> {
        let load_err = |reason: String| ReportError::CsvLoadFailed {
            path: path.to_path_buf(),
            reason,
        };

        let text = decode_text(bytes);
        let delimiter = sniff_delimiter(&text);
        debug!(delimiter = %(delimiter as char).escape_default(), "Detected CSV delimiter");

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::None)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| load_err(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(load_err("CSV file has no header row".into()));
        }

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| load_err(e.to_string()))?;
            let values = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string()))
                .collect();
            rows.push(Record { values });
        }

        if rows.is_empty() {
            return Err(ReportError::NoRecords {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    /// Pick the row with the greatest parseable date in `config.date_column`.
    ///
    /// Ties go to the earlier row. When the column is missing or no value
    /// parses, the last row in file order is returned and the fallback is
    /// recorded in [`RecordSelection::LastRow`].
    pub fn latest_entry(&self, config: &RecordConfig) -> LatestEntry {
        let fallback = |reason: String| {
            warn!("{}, using last row", reason);
            LatestEntry {
                record: self.rows.last().cloned().unwrap_or_default(),
                selection: RecordSelection::LastRow { reason },
            }
        };

        if !self.headers.iter().any(|h| h == &config.date_column) {
            return fallback(format!("date column '{}' not found", config.date_column));
        }

        let mut best: Option<(NaiveDateTime, &Record)> = None;
        for row in &self.rows {
            let Some(raw) = row.populated(&config.date_column) else {
                continue;
            };
            match parse_date(raw, &config.date_formats) {
                Some(date) => {
                    if best.as_ref().map_or(true, |(b, _)| date > *b) {
                        best = Some((date, row));
                    }
                }
                None => debug!(value = raw, "Unparseable assessment date"),
            }
        }

        match best {
            Some((date, row)) => {
                info!("Selected entry from: {}", date);
                LatestEntry {
                    record: row.clone(),
                    selection: RecordSelection::ByDate { date },
                }
            }
            None => fallback("no valid dates found".into()),
        }
    }
}

/// Try each format as a date-time, then as a bare date at midnight.
pub fn parse_date<S: AsRef<str>>(value: &str, formats: &[S]) -> Option<NaiveDateTime> {
    let value = value.trim();
    formats.iter().find_map(|fmt| {
        let fmt = fmt.as_ref();
        NaiveDateTime::parse_from_str(value, fmt).ok().or_else(|| {
            NaiveDate::parse_from_str(value, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
    })
}

/// Reformat a date for display; unparseable input is returned trimmed.
pub fn format_date<S: AsRef<str>>(value: &str, formats: &[S], output_format: &str) -> String {
    match parse_date(value, formats) {
        Some(date) => date.format(output_format).to_string(),
        None => value.trim().to_string(),
    }
}

fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.strip_prefix('\u{feff}').unwrap_or(text).to_string(),
        Err(_) => {
            warn!("CSV is not valid UTF-8; reading it as Latin-1");
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

/// The delimiter that splits the header line into the most fields.
fn sniff_delimiter(text: &str) -> u8 {
    let mut best = (b',', 0usize);
    for delim in DELIMITERS {
        let columns = csv::ReaderBuilder::new()
            .delimiter(delim)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes())
            .records()
            .next()
            .and_then(Result::ok)
            .map_or(0, |r| r.len());
        if columns > best.1 {
            best = (delim, columns);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::capture_warnings;

    fn table(csv: &str) -> CsvTable {
        CsvTable::from_bytes(Path::new("test.csv"), csv.as_bytes()).unwrap()
    }

    #[test]
    fn headers_keep_trailing_spaces() {
        let t = table("Monument Name ,Date of Assessment\nOld Fort,2024/01/02\n");
        assert_eq!(t.headers, vec!["Monument Name ", "Date of Assessment"]);
        assert_eq!(t.rows[0].get("Monument Name "), Some("Old Fort"));
        assert_eq!(t.rows[0].get("Monument Name"), None);
    }

    #[test]
    fn semicolon_and_tab_delimiters_are_detected() {
        let t = table("a;b;c\n1;2;3\n");
        assert_eq!(t.headers.len(), 3);
        assert_eq!(t.rows[0].get("c"), Some("3"));

        let t = table("a\tb\n1\t2\n");
        assert_eq!(t.rows[0].get("b"), Some("2"));
    }

    #[test]
    fn bom_is_stripped_and_latin1_is_accepted() {
        let t = CsvTable::from_bytes(Path::new("x.csv"), b"\xef\xbb\xbfName,Town\nA,B\n").unwrap();
        assert_eq!(t.headers[0], "Name");

        let t = CsvTable::from_bytes(Path::new("x.csv"), b"Name,Town\nCaf\xe9,B\n").unwrap();
        assert_eq!(t.rows[0].get("Name"), Some("Café"));
    }

    #[test]
    fn short_rows_are_padded() {
        let t = table("a,b,c\n1\n");
        assert_eq!(t.rows[0].get("c"), Some(""));
    }

    #[test]
    fn header_only_file_has_no_records() {
        let err = CsvTable::from_bytes(Path::new("empty.csv"), b"a,b\n").unwrap_err();
        assert!(matches!(err, ReportError::NoRecords { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = CsvTable::load("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, ReportError::CsvNotFound { .. }));
    }

    #[test]
    fn latest_entry_picks_greatest_date() {
        let t = table(
            "Date of Assessment,Site\n2023/05/01,A\n2024/02/10,B\n2023/12/31,C\n",
        );
        let entry = t.latest_entry(&RecordConfig::default());
        assert_eq!(entry.record.get("Site"), Some("B"));
        assert!(matches!(entry.selection, RecordSelection::ByDate { .. }));
    }

    #[test]
    fn latest_entry_ties_keep_first_row() {
        let t = table("Date of Assessment,Site\n2024/02/10,first\n2024-02-10,second\n");
        let entry = t.latest_entry(&RecordConfig::default());
        assert_eq!(entry.record.get("Site"), Some("first"));
    }

    #[test]
    fn unparseable_dates_fall_back_to_last_row() {
        let t = table("Date of Assessment,Site\nyesterday,A\nsoon,B\n,C\n");
        let (entry, logs) = capture_warnings(|| t.latest_entry(&RecordConfig::default()));
        assert_eq!(entry.record.get("Site"), Some("C"));
        assert!(logs.contains("WARN"), "fallback not logged: {logs:?}");
        assert!(logs.contains("no valid dates found, using last row"));
        match entry.selection {
            RecordSelection::LastRow { reason } => assert!(reason.contains("no valid dates")),
            other => panic!("unexpected selection {other:?}"),
        }
    }

    #[test]
    fn missing_date_column_falls_back_to_last_row() {
        let t = table("Site\nA\nB\n");
        let (entry, logs) = capture_warnings(|| t.latest_entry(&RecordConfig::default()));
        assert_eq!(entry.record.get("Site"), Some("B"));
        assert!(logs.contains("date column 'Date of Assessment' not found"), "got {logs:?}");
        assert!(matches!(entry.selection, RecordSelection::LastRow { .. }));
    }

    #[test]
    fn dates_are_reformatted_for_display() {
        let formats = RecordConfig::default().date_formats;
        assert_eq!(format_date("2024/03/07", &formats, "%Y-%m-%d"), "2024-03-07");
        assert_eq!(format_date("12/25/2023", &formats, "%Y-%m-%d"), "2023-12-25");
        assert_eq!(
            format_date("2024-03-07 14:30:00", &formats, "%Y-%m-%d"),
            "2024-03-07"
        );
        assert_eq!(format_date("  spring 2024 ", &formats, "%Y-%m-%d"), "spring 2024");
    }
}
