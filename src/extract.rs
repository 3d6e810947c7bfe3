//! Statement extraction entry points.
//!
//! One PDF in, one [`StatementOutput`] out. The whole selected page range is
//! sent in a single request; there is no per-page fan-out and no retry, so
//! any failure before parsing fails the extraction.

use crate::client::{resolve_client, ExtractionClient};
use crate::config::ExtractionConfig;
use crate::error::StatementError;
use crate::export::{export_to_file, ExportFormat};
use crate::pipeline::render::{self, DocumentInfo, PageImage};
use crate::pipeline::table::{self, DroppedRow};
use crate::pipeline::input;
use crate::prompts::build_request;
use crate::record::RecordSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Result of extracting one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementOutput {
    /// Transactions in reply order.
    pub records: RecordSet,
    /// Table lines that did not become records, with the reason.
    pub dropped: Vec<DroppedRow>,
    /// Whether the reply contained a header line.
    pub header_found: bool,
    /// Model reply exactly as received.
    pub raw_reply: String,
    pub stats: ExtractionStats,
}

impl StatementOutput {
    /// Dropped rows that looked like data, such as a row with three cells.
    pub fn malformed_rows(&self) -> impl Iterator<Item = &DroppedRow> {
        self.dropped.iter().filter(|d| d.reason.is_malformed())
    }
}

/// Timing and token accounting for one extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages attached to the request.
    pub sent_pages: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Extract transactions from a PDF file or URL.
///
/// This is the primary entry point for the library.
///
/// # Example
/// ```rust,no_run
/// use edgequake_statement::{extract, ExtractionConfig, PageSelection};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder()
///     .api_key(std::env::var("ANTHROPIC_API_KEY")?)
///     .pages(PageSelection::Trim { leading: 2, trailing: 2 })
///     .build()?;
/// let output = extract("estado_de_cuenta.pdf", &config).await?;
/// let summary = output.records.summary();
/// println!("balance: {:.2}", summary.balance);
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<StatementOutput, StatementError> {
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);
    let bytes = input::resolve_input(input_str, config.download_timeout_secs).await?;
    extract_from_bytes(bytes, config).await
}

/// Extract transactions from PDF bytes already in memory.
pub async fn extract_from_bytes(
    bytes: impl Into<Vec<u8>>,
    config: &ExtractionConfig,
) -> Result<StatementOutput, StatementError> {
    // Resolve before rendering so a missing key fails fast.
    let client = resolve_client(config)?;
    extract_with_client(bytes, config, &client).await
}

/// Like [`extract_from_bytes`] with a caller-supplied client.
pub async fn extract_with_client<C: ExtractionClient>(
    bytes: impl Into<Vec<u8>>,
    config: &ExtractionConfig,
    client: &C,
) -> Result<StatementOutput, StatementError> {
    let total_start = Instant::now();
    let bytes: Vec<u8> = bytes.into();
    input::ensure_pdf_header(&bytes)?;

    let render_start = Instant::now();
    let (pages, total_pages) = render::render_pages(Arc::new(bytes), config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {}/{} pages in {}ms",
        pages.len(),
        total_pages,
        render_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_render_complete(pages.len(), render_duration_ms);
    }

    let mut output = run_extraction(&pages, total_pages, config, client).await?;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Run the request and parse stages on pages that are already rendered.
///
/// Useful when the caller rasterises pages itself, and in tests that run
/// without a pdfium library.
pub async fn extract_from_pages<C: ExtractionClient>(
    pages: &[PageImage],
    total_pages: usize,
    config: &ExtractionConfig,
    client: &C,
) -> Result<StatementOutput, StatementError> {
    let start = Instant::now();
    let mut output = run_extraction(pages, total_pages, config, client).await?;
    output.stats.total_duration_ms = start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Extract and write the records to `output_path` in `format`.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    format: ExportFormat,
    config: &ExtractionConfig,
) -> Result<StatementOutput, StatementError> {
    let output = extract(input_str, config).await?;
    export_to_file(output.records.records(), output_path, format).await?;
    Ok(output)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<StatementOutput, StatementError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| StatementError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// Page count and metadata, without rendering or any model call.
///
/// Does not require an API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<DocumentInfo, StatementError> {
    let bytes = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    render::document_info(Arc::new(bytes), config).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_extraction<C: ExtractionClient>(
    pages: &[PageImage],
    total_pages: usize,
    config: &ExtractionConfig,
    client: &C,
) -> Result<StatementOutput, StatementError> {
    if pages.is_empty() {
        return Err(StatementError::PageOutOfRange {
            selection: config.pages.to_string(),
            total: total_pages,
        });
    }

    let request = build_request(pages, config);
    debug!(
        "Sending {} page images to {} (model {})",
        request.images.len(),
        client.name(),
        request.model
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_request_start(request.images.len());
    }

    let llm_start = Instant::now();
    let completion = client.complete(&request).await?;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;
    if let Some(ref cb) = config.progress_callback {
        cb.on_request_complete(completion.text.len(), llm_duration_ms);
    }

    let parsed = table::parse_reply(&completion.text)?;
    if config.require_table && !parsed.header_found {
        return Err(StatementError::TableNotFound);
    }
    info!(
        "Parsed {} transactions ({} lines dropped) in reply from {}",
        parsed.records.len(),
        parsed.dropped.len(),
        client.name()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_parse_complete(parsed.records.len(), parsed.dropped.len());
    }

    Ok(StatementOutput {
        records: parsed.records,
        dropped: parsed.dropped,
        header_found: parsed.header_found,
        raw_reply: completion.text,
        stats: ExtractionStats {
            total_pages,
            sent_pages: pages.len(),
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            llm_duration_ms,
            ..Default::default()
        },
    })
}
