//! # edgequake-statement
//!
//! Extract bank-statement transactions from PDFs with a vision model and
//! export them to a spreadsheet.
//!
//! Statement PDFs vary too much between banks for a text extractor to find
//! the transaction table reliably. This crate rasterises the pages that hold
//! transactions, sends them to a vision model in one request asking for a
//! fixed four-column pipe table, and parses that table into typed records.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    local file or URL → bytes
//!  ├─ 2. Render   selected pages → PNG via pdfium (spawn_blocking)
//!  ├─ 3. Prompt   fixed instruction + base64 page images
//!  ├─ 4. Request  one call to the model (Anthropic or any edgequake-llm provider)
//!  ├─ 5. Parse    pipe table → TransactionRecord (Date, Concept, Amount, Type)
//!  ├─ 6. Analyse  filter by category/date, income/expense/balance, counts
//!  └─ 7. Export   XLSX or CSV
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_statement::{extract, export_records, ExportFormat, ExtractionConfig, RecordFilter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .api_key(std::env::var("ANTHROPIC_API_KEY")?)
//!         .build()?;
//!     let output = extract("statement.pdf", &config).await?;
//!
//!     let expenses = output
//!         .records
//!         .filter(&RecordFilter::all().with_categories(["Expense"]));
//!     println!("spent {:.2}", expenses.summary().total_expense);
//!
//!     let xlsx = export_records(expenses.records(), ExportFormat::Xlsx)?;
//!     std::fs::write("expenses.xlsx", xlsx)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `statement2xlsx` binary (clap, anyhow, indicatif, comfy-table) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-statement = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analysis;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analysis::{RecordFilter, Summary, EXPENSE, INCOME};
pub use client::{
    resolve_client, AnthropicClient, Completion, ExtractionClient, ProviderClient, ResolvedClient,
};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection};
pub use error::StatementError;
pub use export::{export_records, export_to_file, ExportFormat};
pub use extract::{
    extract, extract_from_bytes, extract_from_pages, extract_sync, extract_to_file,
    extract_with_client, inspect, ExtractionStats, StatementOutput,
};
pub use pipeline::render::{DocumentInfo, PageImage};
pub use pipeline::table::{parse_reply, DropReason, DroppedRow, ParsedTable};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{build_request, ExtractionRequest, ImagePart};
pub use record::{RecordSet, TransactionRecord, COLUMNS};
