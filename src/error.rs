//! Error types for the edgequake-statement library.
//!
//! Extraction is all-or-nothing: either the whole pipeline succeeds and a
//! complete [`crate::record::RecordSet`] is returned, or the operation fails
//! with a [`StatementError`] and nothing is shown. There is no
//! page-level error type here; one model request covers the whole document.
//!
//! Malformed table lines are *not* errors. They are reported through
//! [`crate::pipeline::table::DroppedRow`] alongside the parsed records.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-statement library.
#[derive(Debug, Error)]
pub enum StatementError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The bytes are not a PDF pdfium can parse.
    #[error("Malformed PDF document: {detail}")]
    MalformedDocument { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// The page selection does not cover any page of the document.
    #[error("Page selection {selection} matches no page (document has {total} pages)")]
    PageOutOfRange { selection: String, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or point PDFIUM_LIB_PATH at the\n\
directory that contains it (e.g. from bblanchon/pdfium-binaries).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Extraction service errors ─────────────────────────────────────────
    /// No extraction client could be built from the configuration.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The service rejected the credential (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The service returned HTTP 429. Nothing is retried automatically.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Any other failure reported by the service or the transport.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The service answered without any text content.
    #[error("LLM reply contained no text content")]
    EmptyReply,

    // ── Table errors ──────────────────────────────────────────────────────
    /// The reply had no header row and the caller asked for a strict parse.
    #[error("No transaction table found in the model reply (no header row containing 'Date')")]
    TableNotFound,

    /// A kept row's amount is not numeric after removing thousands separators.
    #[error("Amount '{value}' on reply line {line} is not a number")]
    AmountParseError { line: usize, value: String },

    // ── Export / output errors ────────────────────────────────────────────
    /// The spreadsheet writer failed.
    #[error("Failed to export records as {format}: {detail}")]
    ExportFailed { format: String, detail: String },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
