//! Input resolution: load raw OCR text from a path or URL.
//!
//! Unlike a binary-document pipeline there is no temp file to manage; the
//! text lands directly in memory as a `String`. Validation happens here so
//! callers get a specific error (missing file, permission, encoding) before
//! any backend resolution or cost projection runs on garbage input.

use crate::error::RefineError;
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to raw text.
///
/// If the input is a URL, download the body. If the input is a local file,
/// read it, validating existence, readability, and UTF-8.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<String, RefineError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input)
    }
}

/// Read a local text file, mapping I/O failures to specific errors.
fn read_local(path_str: &str) -> Result<String, RefineError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(RefineError::FileNotFound { path });
    }

    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(RefineError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(RefineError::FileNotFound { path });
        }
    };

    let text = String::from_utf8(bytes).map_err(|_| RefineError::NotUtf8 { path: path.clone() })?;

    debug!("Resolved local text file: {} ({} bytes)", path.display(), text.len());
    Ok(text)
}

/// Download a URL and return the response body as text.
async fn download_url(url: &str, timeout_secs: u64) -> Result<String, RefineError> {
    info!("Downloading text from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RefineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            RefineError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            RefineError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(RefineError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| RefineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", text.len());
    Ok(text)
}
