//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! pdfium loads documents straight from memory, so a URL is downloaded into
//! a buffer and never touches the file system. The `%PDF` magic bytes are
//! checked up front so callers get [`StatementError::MalformedDocument`]
//! instead of an opaque pdfium failure.

use crate::error::StatementError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Fail with `MalformedDocument` unless `bytes` starts with `%PDF`.
pub fn ensure_pdf_header(bytes: &[u8]) -> Result<(), StatementError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let head: Vec<u8> = bytes.iter().take(4).copied().collect();
    Err(StatementError::MalformedDocument {
        detail: format!("missing %PDF header (first bytes: {:?})", head),
    })
}

/// Read the PDF named by `input` (local path or HTTP/HTTPS URL).
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, StatementError> {
    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    ensure_pdf_header(&bytes)?;
    Ok(bytes)
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, StatementError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(StatementError::PermissionDenied { path })
        }
        Err(_) => Err(StatementError::FileNotFound { path }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, StatementError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| StatementError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
