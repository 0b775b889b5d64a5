//! Resource fetching: download each image locator into run-scoped temp storage.
//!
//! ## Why a run-scoped `TempDir`?
//!
//! The renderer needs file paths it can decode, and nothing downloaded here
//! should outlive one report. Every file lands in a single `TempDir` owned by
//! the [`ImageFetcher`]; [`ImageFetcher::cleanup`] (also run on drop) removes
//! it in one step, whether the run succeeded or not.
//!
//! ## Retry Strategy
//!
//! Each locator gets up to `max_attempts` tries. A timeout, transport error,
//! non-200 status or undecodable payload all count as a failed attempt.
//! Between attempts the fetcher sleeps `retry_backoff_ms * 2^(attempt-1)`.
//! After the last attempt the locator resolves to [`FetchResult::Failure`];
//! nothing is propagated to the caller.
//!
//! ## Interstitial pages
//!
//! For large files the provider answers the direct-download URL with an HTML
//! "can't scan this file for viruses" page instead of the bytes. When the
//! first kilobyte of a response contains `confirm=`, the token is lifted from
//! the page and the request is reissued with `&confirm=<token>`.

use crate::config::FetchConfig;
use crate::error::{FetchError, ReportError};
use crate::output::DownloadStats;
use crate::pipeline::links::Locator;
use crate::progress::ProgressCallback;
use futures::{Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Marker found in the provider's virus-scan interstitial page.
const INTERSTITIAL_MARKER: &[u8] = b"confirm=";

/// How much of a response body is inspected for the marker.
const SNIFF_LEN: usize = 1000;

static RE_CONFIRM_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"confirm=([0-9A-Za-z_\-]+)").unwrap());

/// Image formats recognised from the `Content-Type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    /// Map a `Content-Type` value by substring; anything unknown is JPEG.
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("image/png") {
            ImageKind::Png
        } else if ct.contains("image/gif") {
            ImageKind::Gif
        } else if ct.contains("image/webp") {
            ImageKind::Webp
        } else {
            ImageKind::Jpeg
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
            ImageKind::Webp => "webp",
        }
    }
}

/// A downloaded, validated image in the fetcher's temp storage.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    pub id: String,
    pub path: PathBuf,
    pub byte_size: u64,
    pub kind: ImageKind,
    /// Intrinsic pixel width, read while validating.
    pub width: u32,
    pub height: u32,
}

/// Outcome of retrieving one locator.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Success(FetchedImage),
    Failure(FetchError),
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success(_))
    }

    pub fn image(&self) -> Option<&FetchedImage> {
        match self {
            FetchResult::Success(img) => Some(img),
            FetchResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchResult::Success(_) => None,
            FetchResult::Failure(e) => Some(e),
        }
    }
}

/// Downloads image locators with bounded retry and a per-run cache.
///
/// Methods that touch the cache take `&mut self`; a fetcher is meant to be
/// driven by one report run at a time.
pub struct ImageFetcher {
    config: FetchConfig,
    client: Option<reqwest::Client>,
    temp_dir: Option<TempDir>,
    cache: HashMap<String, FetchResult>,
    /// Cache keys in first-fetch order.
    order: Vec<String>,
    progress: Option<ProgressCallback>,
}

impl ImageFetcher {
    /// Create the HTTP session and the temporary storage area.
    pub fn new(config: &FetchConfig) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .user_agent(concat!("heritage-report/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReportError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let temp_dir = tempfile::Builder::new()
            .prefix("heritage-report-")
            .tempdir()
            .map_err(|e| ReportError::Internal(format!("Failed to create temp directory: {}", e)))?;
        info!("Created temporary directory: {}", temp_dir.path().display());

        Ok(Self {
            config: config.clone(),
            client: Some(client),
            temp_dir: Some(temp_dir),
            cache: HashMap::new(),
            order: Vec::new(),
            progress: None,
        })
    }

    /// Attach a progress callback used by [`fetch_all`](Self::fetch_all).
    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Location of the temporary storage, `None` after cleanup.
    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(|d| d.path())
    }

    /// Fetch one locator, serving repeated ids from the run cache.
    pub async fn fetch(&mut self, locator: &Locator, name_hint: &str) -> FetchResult {
        if let Some(hit) = self.cache.get(&locator.id) {
            debug!(id = %locator.id, "Image already fetched in this run");
            return hit.clone();
        }

        let (client, dir) = match (self.client.as_ref(), self.temp_dir.as_ref()) {
            (Some(c), Some(d)) => (c.clone(), d.path().to_path_buf()),
            _ => {
                warn!(id = %locator.id, "Fetch requested after cleanup");
                return FetchResult::Failure(FetchError::StorageReleased {
                    id: locator.id.clone(),
                });
            }
        };

        let result = self.fetch_with_retries(&client, &dir, locator, name_hint).await;
        self.cache.insert(locator.id.clone(), result.clone());
        self.order.push(locator.id.clone());
        result
    }

    /// Fetch every locator in order. One result per input, same order.
    pub async fn fetch_all(&mut self, locators: &[Locator], name_hint: &str) -> Vec<FetchResult> {
        let total = locators.len();
        let progress = self.progress.clone();
        if let Some(cb) = &progress {
            cb.on_fetch_start(total);
        }

        let mut results = Vec::with_capacity(total);
        for (i, locator) in locators.iter().enumerate() {
            let hint = format!("{}_{}", name_hint, i + 1);
            if let Some(cb) = &progress {
                cb.on_image_start(i + 1, total, &hint);
            }

            let result = self.fetch(locator, &hint).await;

            if let Some(cb) = &progress {
                match &result {
                    FetchResult::Success(img) => cb.on_image_complete(i + 1, total, img.byte_size),
                    FetchResult::Failure(e) => cb.on_image_error(i + 1, total, &e.to_string()),
                }
            }
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!("Fetched {}/{} images for {}", succeeded, total, name_hint);
        if let Some(cb) = &progress {
            cb.on_fetch_complete(total, succeeded);
        }
        results
    }

    /// Totals over every successful download of this run.
    pub fn stats(&self) -> DownloadStats {
        let total_bytes: u64 = self.successes().map(|img| img.byte_size).sum();
        DownloadStats {
            total_downloaded: self.successes().count(),
            total_failed: self.cache.values().filter(|r| !r.is_success()).count(),
            total_bytes,
        }
    }

    /// Copy every successful download to `dir` as `{prefix}_{n}_{id[..8]}.{ext}`.
    pub fn export_to(&self, dir: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut copied = Vec::new();
        for (i, img) in self.successes().enumerate() {
            let short_id: String = img.id.chars().take(8).collect();
            let target = dir.join(format!(
                "{}_{}_{}.{}",
                sanitize_file_stem(prefix),
                i + 1,
                short_id,
                img.kind.extension()
            ));
            std::fs::copy(&img.path, &target)?;
            copied.push(target);
        }
        info!("Copied {} images to {}", copied.len(), dir.display());
        Ok(copied)
    }

    /// Release the temporary storage and the HTTP session.
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn cleanup(&mut self) {
        self.client.take();
        self.cache.clear();
        self.order.clear();
        if let Some(dir) = self.temp_dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => info!("Cleaned up temporary directory: {}", path.display()),
                Err(e) => error!("Error during cleanup of {}: {}", path.display(), e),
            }
        }
    }

    fn successes(&self) -> impl Iterator<Item = &FetchedImage> {
        self.order
            .iter()
            .filter_map(|id| self.cache.get(id))
            .filter_map(FetchResult::image)
    }

    async fn fetch_with_retries(
        &self,
        client: &reqwest::Client,
        dir: &Path,
        locator: &Locator,
        name_hint: &str,
    ) -> FetchResult {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_err: Option<FetchError> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let backoff = self
                    .config
                    .retry_backoff_ms
                    .saturating_mul(2u64.saturating_pow(attempt - 1));
                warn!(
                    id = %locator.id,
                    "retry {}/{} after {}ms",
                    attempt,
                    max_attempts - 1,
                    backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            info!(
                "Downloading image: {} (attempt {}/{})",
                name_hint,
                attempt + 1,
                max_attempts
            );
            // One budget for the whole attempt, interstitial hop included. A
            // partial file left by a cancelled attempt goes with the temp dir.
            let budget = Duration::from_secs(self.config.timeout_secs);
            let outcome = match timeout(budget, self.attempt(client, dir, locator, name_hint)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FetchError::Timeout {
                    id: locator.id.clone(),
                    secs: self.config.timeout_secs,
                }),
            };
            match outcome {
                Ok(image) => {
                    info!(
                        id = %locator.id,
                        bytes = image.byte_size,
                        "Downloaded {} ({}x{})",
                        name_hint,
                        image.width,
                        image.height
                    );
                    return FetchResult::Success(image);
                }
                Err(e) => {
                    warn!(id = %locator.id, attempt = attempt + 1, "attempt failed: {}", e);
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.unwrap_or_else(|| FetchError::Transport {
            id: locator.id.clone(),
            detail: "no attempt was made".into(),
        });
        error!(id = %locator.id, source = %locator.source, "Giving up on image: {}", err);
        FetchResult::Failure(err)
    }

    /// One download attempt: request, interstitial hop, stream to disk, validate.
    async fn attempt(
        &self,
        client: &reqwest::Client,
        dir: &Path,
        locator: &Locator,
        name_hint: &str,
    ) -> Result<FetchedImage, FetchError> {
        let id = locator.id.as_str();
        let endpoint = &self.config.download_endpoint;

        let response = self.send(client, &locator.download_url(endpoint), id).await?;
        let (status, kind) = response_meta(&response);
        let mut stream = Box::pin(response.bytes_stream());
        let head = self.read_head(&mut stream, id).await?;

        if is_interstitial(&head) {
            let mut page = head;
            self.drain(&mut stream, &mut page, id).await?;
            match extract_confirm_token(&String::from_utf8_lossy(&page)) {
                Some(token) => {
                    debug!(id, token = %token, "Following virus-scan interstitial");
                    let url = locator.confirmed_download_url(endpoint, &token);
                    let response = self.send(client, &url, id).await?;
                    let (status, kind) = response_meta(&response);
                    check_status(status, id)?;
                    let mut stream = Box::pin(response.bytes_stream());
                    return self
                        .store(dir, name_hint, kind, Vec::new(), &mut stream, id)
                        .await;
                }
                None => {
                    check_status(status, id)?;
                    return self.store(dir, name_hint, kind, page, &mut stream, id).await;
                }
            }
        }

        check_status(status, id)?;
        self.store(dir, name_hint, kind, head, &mut stream, id).await
    }

    async fn send(
        &self,
        client: &reqwest::Client,
        url: &str,
        id: &str,
    ) -> Result<reqwest::Response, FetchError> {
        debug!(id, url, "GET");
        client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e, id))
    }

    /// Read at least [`SNIFF_LEN`] bytes (or the whole body if shorter).
    async fn read_head<S, B>(&self, stream: &mut S, id: &str) -> Result<Vec<u8>, FetchError>
    where
        S: Stream<Item = reqwest::Result<B>> + Unpin,
        B: AsRef<[u8]>,
    {
        let mut head = Vec::with_capacity(SNIFF_LEN);
        while head.len() < SNIFF_LEN {
            match stream.next().await {
                Some(chunk) => head.extend_from_slice(chunk.map_err(|e| self.map_reqwest(e, id))?.as_ref()),
                None => break,
            }
        }
        Ok(head)
    }

    async fn drain<S, B>(&self, stream: &mut S, buf: &mut Vec<u8>, id: &str) -> Result<(), FetchError>
    where
        S: Stream<Item = reqwest::Result<B>> + Unpin,
        B: AsRef<[u8]>,
    {
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(chunk.map_err(|e| self.map_reqwest(e, id))?.as_ref());
        }
        Ok(())
    }

    /// Stream `head` + the rest of the body to a fresh temp file, then validate.
    async fn store<S, B>(
        &self,
        dir: &Path,
        name_hint: &str,
        kind: ImageKind,
        head: Vec<u8>,
        stream: &mut S,
        id: &str,
    ) -> Result<FetchedImage, FetchError>
    where
        S: Stream<Item = reqwest::Result<B>> + Unpin,
        B: AsRef<[u8]>,
    {
        let path = unique_temp_path(dir, name_hint, kind.extension());
        let written = match self.write_body(&path, &head, stream, id).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        };

        match validate_image(&path) {
            Ok((width, height)) => Ok(FetchedImage {
                id: id.to_string(),
                path,
                byte_size: written,
                kind,
                width,
                height,
            }),
            Err(detail) => {
                let _ = tokio::fs::remove_file(&path).await;
                warn!(id, "Downloaded file is not a valid image: {}", name_hint);
                Err(FetchError::InvalidImage {
                    id: id.to_string(),
                    detail,
                })
            }
        }
    }

    async fn write_body<S, B>(
        &self,
        path: &Path,
        head: &[u8],
        stream: &mut S,
        id: &str,
    ) -> Result<u64, FetchError>
    where
        S: Stream<Item = reqwest::Result<B>> + Unpin,
        B: AsRef<[u8]>,
    {
        let io_err = |e: std::io::Error| FetchError::Io {
            id: id.to_string(),
            detail: format!("{}: {}", path.display(), e),
        };
        let chunk_size = self.config.chunk_size.max(1);

        let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
        let mut written = 0u64;

        for piece in head.chunks(chunk_size) {
            file.write_all(piece).await.map_err(io_err)?;
            written += piece.len() as u64;
        }
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_reqwest(e, id))?;
            for piece in chunk.as_ref().chunks(chunk_size) {
                file.write_all(piece).await.map_err(io_err)?;
                written += piece.len() as u64;
            }
        }
        file.flush().await.map_err(io_err)?;
        Ok(written)
    }

    fn map_reqwest(&self, e: reqwest::Error, id: &str) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                id: id.to_string(),
                secs: self.config.timeout_secs,
            }
        } else {
            FetchError::Transport {
                id: id.to_string(),
                detail: e.to_string(),
            }
        }
    }
}

impl Drop for ImageFetcher {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn response_meta(response: &reqwest::Response) -> (reqwest::StatusCode, ImageKind) {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    (response.status(), ImageKind::from_content_type(content_type))
}

fn check_status(status: reqwest::StatusCode, id: &str) -> Result<(), FetchError> {
    if status == reqwest::StatusCode::OK {
        Ok(())
    } else {
        Err(FetchError::HttpStatus {
            id: id.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Whether the leading bytes of a body carry the interstitial marker.
pub fn is_interstitial(head: &[u8]) -> bool {
    let window = &head[..head.len().min(SNIFF_LEN)];
    window
        .windows(INTERSTITIAL_MARKER.len())
        .any(|w| w == INTERSTITIAL_MARKER)
}

/// Lift the confirmation token out of an interstitial page.
pub fn extract_confirm_token(html: &str) -> Option<String> {
    RE_CONFIRM_TOKEN
        .captures(html)
        .map(|caps| caps[1].to_string())
}

/// Decode the whole file; returns its pixel dimensions.
fn validate_image(path: &Path) -> Result<(u32, u32), String> {
    let img = image::ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())?;
    Ok((img.width(), img.height()))
}

/// Replace characters that are invalid in file names and trim dots/spaces.
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `{hint}_{YYYYmmdd_HHMMSS_micros}.{ext}` inside `dir`, never an existing file.
pub fn unique_temp_path(dir: &Path, name_hint: &str, extension: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%6f");
    let stem = format!("{}_{}", sanitize_file_stem(name_hint), stamp);
    let mut path = dir.join(format!("{stem}.{extension}"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{stem}_{n}.{extension}"));
        n += 1;
    }
    path
}
