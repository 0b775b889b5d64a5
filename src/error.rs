//! Error types for the heritage-report library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReportError`]: **Fatal**: the report cannot be produced at all
//!   (CSV missing or unreadable, no data rows, PDF emission failed). Returned
//!   as `Err(ReportError)` from the top-level `generate*` functions. No output
//!   file is left behind when one of these is returned.
//!
//! * [`FetchError`]: **Non-fatal**: a single image could not be retrieved
//!   (timeout, bad status, payload is not an image). Stored inside
//!   [`crate::pipeline::fetch::FetchResult::Failure`] so the report degrades
//!   to fewer photos instead of failing outright.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the heritage-report library.
///
/// Per-image failures use [`FetchError`] and are absorbed by the layout
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum ReportError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The CSV file was not found at the given path.
    #[error("CSV file not found: '{path}'\nCheck the path exists and is readable.")]
    CsvNotFound { path: PathBuf },

    /// The CSV exists but could not be read or parsed.
    #[error("Failed to load CSV '{path}': {reason}")]
    CsvLoadFailed { path: PathBuf, reason: String },

    /// The CSV has a header but no data rows.
    #[error("CSV '{path}' contains no data rows\nExport at least one form response first.")]
    NoRecords { path: PathBuf },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The document could not be turned into PDF bytes.
    #[error("PDF rendering failed: {detail}")]
    RenderFailed { detail: String },

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Copying downloaded images to the export directory failed.
    #[error("Failed to export images to '{dir}': {source}")]
    ImageExportFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Images were requested before any run completed, or after cleanup.
    #[error("No completed report run to export images from\nCall generate() first; cleanup() releases the downloads.")]
    NoCompletedRun,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image locator.
///
/// Every variant carries the provider identifier so the failure can be traced
/// back to a cell in the CSV after the run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FetchError {
    /// The request did not complete within the per-attempt timeout.
    #[error("image {id}: timed out after {secs}s")]
    Timeout { id: String, secs: u64 },

    /// The provider answered with something other than 200.
    #[error("image {id}: HTTP {status}")]
    HttpStatus { id: String, status: u16 },

    /// Connection, TLS or body-read failure.
    #[error("image {id}: transport error: {detail}")]
    Transport { id: String, detail: String },

    /// The payload was written but does not decode as an image.
    #[error("image {id}: downloaded content is not a valid image: {detail}")]
    InvalidImage { id: String, detail: String },

    /// Writing the temporary file failed.
    #[error("image {id}: i/o error: {detail}")]
    Io { id: String, detail: String },

    /// The fetcher's temporary storage was already released by `cleanup()`.
    #[error("image {id}: temporary storage already released")]
    StorageReleased { id: String },
}

impl FetchError {
    /// The provider identifier this failure belongs to.
    pub fn id(&self) -> &str {
        match self {
            FetchError::Timeout { id, .. }
            | FetchError::HttpStatus { id, .. }
            | FetchError::Transport { id, .. }
            | FetchError::InvalidImage { id, .. }
            | FetchError::Io { id, .. }
            | FetchError::StorageReleased { id } => id,
        }
    }
}
