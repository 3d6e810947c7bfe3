//! Spreadsheet export of a record set.
//!
//! Both formats carry a header row with [`COLUMNS`] followed by one row per
//! record, in record order. XLSX is produced by `rust_xlsxwriter` through a
//! temporary file that is removed when this module returns, whatever the
//! outcome.

use crate::error::StatementError;
use crate::record::{TransactionRecord, COLUMNS};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Worksheet name used for XLSX output.
pub const SHEET_NAME: &str = "Transactions";

/// Excel number format applied to the amount column.
pub const AMOUNT_FORMAT: &str = "$#,##0.00";

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }

    /// Guess the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = StatementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(StatementError::InvalidConfig(format!(
                "unknown export format '{other}' (expected xlsx or csv)"
            ))),
        }
    }
}

/// Serialise `records` into an in-memory file of the given format.
pub fn export_records(
    records: &[TransactionRecord],
    format: ExportFormat,
) -> Result<Vec<u8>, StatementError> {
    let bytes = match format {
        ExportFormat::Xlsx => write_xlsx(records)?,
        ExportFormat::Csv => write_csv(records)?,
    };
    debug!(
        "Exported {} records as {} ({} bytes)",
        records.len(),
        format,
        bytes.len()
    );
    Ok(bytes)
}

/// Export and write to `path` atomically (temp file in the same directory,
/// then rename).
pub async fn export_to_file(
    records: &[TransactionRecord],
    path: impl AsRef<Path>,
    format: ExportFormat,
) -> Result<(), StatementError> {
    let path = path.as_ref();
    let bytes = export_records(records, format)?;
    let write_failed = |e: std::io::Error| StatementError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(write_failed)?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", format.extension()));
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(write_failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }

    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

fn xlsx_failed(e: XlsxError) -> StatementError {
    StatementError::ExportFailed {
        format: "xlsx".into(),
        detail: e.to_string(),
    }
}

fn write_xlsx(records: &[TransactionRecord]) -> Result<Vec<u8>, StatementError> {
    write_xlsx_in(records, SHEET_NAME, &std::env::temp_dir())
}

/// Build the workbook in a temp file under `tmp_dir` and return its bytes.
/// The temp file exists before any fallible step and is removed on drop.
fn write_xlsx_in(
    records: &[TransactionRecord],
    sheet_name: &str,
    tmp_dir: &Path,
) -> Result<Vec<u8>, StatementError> {
    let tmp = tempfile::Builder::new()
        .prefix("statement-")
        .suffix(".xlsx")
        .tempfile_in(tmp_dir)
        .map_err(|e| StatementError::Internal(format!("tempfile: {e}")))?;

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let amount = Format::new().set_num_format(AMOUNT_FORMAT);

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name).map_err(xlsx_failed)?;

        for (col, title) in COLUMNS.iter().enumerate() {
            sheet
                .write_string_with_format(0, col as u16, *title, &header)
                .map_err(xlsx_failed)?;
        }

        for (i, record) in records.iter().enumerate() {
            let row = (i + 1) as u32;
            sheet
                .write_string(row, 0, &record.date)
                .map_err(xlsx_failed)?;
            sheet
                .write_string(row, 1, &record.concept)
                .map_err(xlsx_failed)?;
            sheet
                .write_number_with_format(row, 2, record.amount, &amount)
                .map_err(xlsx_failed)?;
            sheet
                .write_string(row, 3, &record.category)
                .map_err(xlsx_failed)?;
        }

        sheet.set_column_width(0, 12).map_err(xlsx_failed)?;
        sheet.set_column_width(1, 48).map_err(xlsx_failed)?;
        sheet.set_column_width(2, 16).map_err(xlsx_failed)?;
        sheet.set_column_width(3, 10).map_err(xlsx_failed)?;
    }

    workbook.save(tmp.path()).map_err(xlsx_failed)?;

    std::fs::read(tmp.path()).map_err(|e| StatementError::ExportFailed {
        format: "xlsx".into(),
        detail: format!("reading back temp file: {e}"),
    })
}

fn write_csv(records: &[TransactionRecord]) -> Result<Vec<u8>, StatementError> {
    let failed = |detail: String| StatementError::ExportFailed {
        format: "csv".into(),
        detail,
    };

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(COLUMNS).map_err(|e| failed(e.to_string()))?;
    for r in records {
        let amount = r.amount.to_string();
        wtr.write_record([
            r.date.as_str(),
            r.concept.as_str(),
            amount.as_str(),
            r.category.as_str(),
        ])
        .map_err(|e| failed(e.to_string()))?;
    }
    wtr.into_inner().map_err(|e| failed(e.to_string()))
}
