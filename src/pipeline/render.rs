//! PDF rasterisation: render selected pages to PNG via pdfium.
//!
//! pdfium wraps a C++ library with thread-local state, so all work runs in
//! `tokio::task::spawn_blocking`. The document is loaded straight from the
//! byte buffer; nothing is written to disk.

use crate::config::{ExtractionConfig, PageSelection};
use crate::error::StatementError;
use crate::pipeline::encode::encode_png;
use crate::pipeline::input::ensure_pdf_header;
use crate::progress::ProgressCallback;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One rendered page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-indexed page number in the source document.
    pub page_num: usize,
    /// PNG-encoded bitmap.
    pub png: Vec<u8>,
}

/// Basic document facts, available without any model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub title: Option<String>,
    pub producer: Option<String>,
    pub pdf_version: String,
}

/// Render the pages chosen by `config.pages`, in document order.
///
/// # Errors
/// - [`StatementError::MalformedDocument`] if pdfium cannot parse the bytes
/// - [`StatementError::PageOutOfRange`] if the selection matches no page
pub async fn render_pages(
    pdf: Arc<Vec<u8>>,
    config: &ExtractionConfig,
) -> Result<(Vec<PageImage>, usize), StatementError> {
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();
    let lib_path = config.pdfium_lib_path.clone();
    let selection = config.pages.clone();
    let progress = config.progress_callback.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(
            &pdf,
            max_pixels,
            password.as_deref(),
            lib_path.as_deref(),
            &selection,
            progress.as_ref(),
        )
    })
    .await
    .map_err(|e| StatementError::Internal(format!("Render task panicked: {}", e)))?
}

/// Read page count and metadata without rendering.
pub async fn document_info(
    pdf: Arc<Vec<u8>>,
    config: &ExtractionConfig,
) -> Result<DocumentInfo, StatementError> {
    let password = config.password.clone();
    let lib_path = config.pdfium_lib_path.clone();

    tokio::task::spawn_blocking(move || -> Result<DocumentInfo, StatementError> {
        let pdfium = bind_pdfium(lib_path.as_deref())?;
        let document = load_document(&pdfium, &pdf, password.as_deref())?;
        let metadata = document.metadata();
        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata
                .get(tag)
                .map(|t| t.value().to_string())
                .filter(|v| !v.is_empty())
        };
        Ok(DocumentInfo {
            page_count: document.pages().len() as usize,
            title: get_meta(PdfDocumentMetadataTagType::Title),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
            pdf_version: format!("{:?}", document.version()),
        })
    })
    .await
    .map_err(|e| StatementError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// Blocking implementation of page rendering. Returns the rendered pages and
/// the document's total page count.
fn render_pages_blocking(
    pdf: &[u8],
    max_pixels: u32,
    password: Option<&str>,
    lib_path: Option<&Path>,
    selection: &PageSelection,
    progress: Option<&ProgressCallback>,
) -> Result<(Vec<PageImage>, usize), StatementError> {
    let pdfium = bind_pdfium(lib_path)?;
    let document = load_document(&pdfium, pdf, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        return Err(StatementError::PageOutOfRange {
            selection: selection.to_string(),
            total: total_pages,
        });
    }
    if let Some(cb) = progress {
        cb.on_render_start(indices.len(), total_pages);
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(indices.len());
    for idx in indices {
        let page = pages
            .get(idx as u16)
            .map_err(|e| StatementError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            StatementError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        let png = encode_png(&image).map_err(|e| StatementError::RasterisationFailed {
            page: idx + 1,
            detail: format!("PNG encoding failed: {}", e),
        })?;
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push(PageImage {
            page_num: idx + 1,
            png,
        });
    }

    Ok((results, total_pages))
}

fn load_document<'a>(
    pdfium: &'a Pdfium,
    pdf: &'a [u8],
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, StatementError> {
    ensure_pdf_header(pdf)?;

    pdfium.load_pdf_from_byte_slice(pdf, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                StatementError::WrongPassword
            } else {
                StatementError::PasswordRequired
            }
        } else {
            StatementError::MalformedDocument { detail: err_str }
        }
    })
}

/// Bind to pdfium: explicit path first, then the working directory, then the
/// system library search path.
fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, StatementError> {
    let explicit: Option<PathBuf> = lib_path.map(|p| {
        if p.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(p)
        } else {
            p.to_path_buf()
        }
    });

    let bindings = match explicit {
        Some(path) => Pdfium::bind_to_library(&path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| StatementError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}
