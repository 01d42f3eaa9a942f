//! Image source resolution.
//!
//! Sources arrive as untyped strings and are classified by shape: base64
//! data URIs are decoded in place, http(s) URLs are fetched with reqwest,
//! anything else is treated as a local path and read with tokio. A batch of
//! sources resolves concurrently and always settles every entry, so the
//! caller sees the complete set of outcomes rather than the first failure.

use crate::docx::error::SourceError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Upper bound on in-flight resolutions within one batch.
const MAX_CONCURRENT_RESOLUTIONS: usize = 8;

/// A classified image source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// `data:image/...;base64,` URI carrying the bytes inline
    DataUri(String),

    /// http(s) URL fetched over the network
    Remote(String),

    /// Local filesystem path
    Local(String),
}

impl SourceLocator {
    /// Classify a source string by its shape.
    pub fn classify<S: Into<String>>(locator: S) -> Self {
        let locator = locator.into();
        if locator.starts_with("data:image/") {
            Self::DataUri(locator)
        } else if locator.starts_with("http://") || locator.starts_with("https://") {
            Self::Remote(locator)
        } else {
            Self::Local(locator)
        }
    }

    /// Resolve this source to its image bytes.
    pub async fn resolve(&self) -> Result<Vec<u8>, SourceError> {
        match self {
            Self::DataUri(uri) => decode_data_uri(uri),
            Self::Remote(url) => fetch_remote(url).await,
            Self::Local(path) => tokio::fs::read(path)
                .await
                .map_err(|e| SourceError::NotFound(format!("{}: {}", path, e))),
        }
    }
}

fn decode_data_uri(uri: &str) -> Result<Vec<u8>, SourceError> {
    let payload = uri
        .split_once(";base64,")
        .map(|(_, payload)| payload)
        .ok_or_else(|| {
            SourceError::MalformedDataUri("missing ';base64,' separator".to_string())
        })?;

    STANDARD
        .decode(payload.trim())
        .map_err(|e| SourceError::MalformedDataUri(e.to_string()))
}

async fn fetch_remote(url: &str) -> Result<Vec<u8>, SourceError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| SourceError::Fetch(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Fetch(format!("{}: status {}", url, status)));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| SourceError::Fetch(e.to_string()))?;
    Ok(body.to_vec())
}

/// Resolve a batch of named sources concurrently.
///
/// Every entry settles; per-name failures are reported in the result rather
/// than aborting the batch. Output preserves input order.
pub async fn resolve_batch(
    entries: Vec<(String, String)>,
) -> Vec<(String, Result<Vec<u8>, SourceError>)> {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_RESOLUTIONS));
    let mut tasks = JoinSet::new();

    for (idx, (name, locator)) in entries.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            // The semaphore is never closed, so a failed acquire can only
            // mean we run unthrottled.
            let _permit = semaphore.acquire().await.ok();
            let outcome = SourceLocator::classify(locator.as_str()).resolve().await;
            debug!(name = name.as_str(), ok = outcome.is_ok(), "source settled");
            (idx, name, outcome)
        });
    }

    let mut settled = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(item) => settled.push(item),
            Err(e) => warn!("source resolution task failed to join: {}", e),
        }
    }

    settled.sort_by_key(|(idx, ..)| *idx);
    settled
        .into_iter()
        .map(|(_, name, outcome)| (name, outcome))
        .collect()
}

/// Image format detection from byte signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
}

impl ImageFormat {
    /// Detect image format from byte signature.
    pub fn detect_from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }

        // PNG signature
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG signature
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // GIF signature
        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        // BMP signature
        if data.starts_with(b"BM") {
            return Some(Self::Bmp);
        }

        // TIFF signature (little-endian and big-endian)
        if data.starts_with(&[0x49, 0x49, 0x2A, 0x00])
            || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
        {
            return Some(Self::Tiff);
        }

        None
    }

    /// Get file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    /// Check whether a declared type token (extension form) names this
    /// format. "jpg" and "jpeg" are the same format.
    pub fn matches_declared(&self, declared: &str) -> bool {
        match self {
            Self::Jpeg => declared.eq_ignore_ascii_case("jpeg") || declared.eq_ignore_ascii_case("jpg"),
            other => declared.eq_ignore_ascii_case(other.extension()),
        }
    }
}
