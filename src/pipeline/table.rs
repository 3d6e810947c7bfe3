//! Table parsing: turn the model's pipe-delimited reply into records.
//!
//! The reply is free-form text that is *expected* to contain a table like
//!
//! ```text
//! Here are the transactions:
//!
//! | Date       | Concept                 | Amount (MXN) | Type    |
//! |------------|-------------------------|--------------|---------|
//! | 2024-11-01 | RENTA DEPTO CHAPULTEPEC | 12,345.00    | Expense |
//! ```
//!
//! Parsing is line based. Prose before the header row is ignored, decoration
//! lines are skipped, and any row that does not split into exactly four
//! non-empty cells is dropped. Dropped rows never fail the parse; they are
//! returned in [`ParsedTable::dropped`] so callers can see what vanished.
//! The only hard failure is an amount that is not a number.

use crate::error::StatementError;
use crate::record::{RecordSet, TransactionRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DELIMITER: char = '|';
const HEADER_TOKEN: &str = "Date";
const EXPECTED_CELLS: usize = 4;

/// Why a candidate row after the header was not turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// Decoration such as `|---|---|` or `| :--- | ---: |`.
    Separator,
    /// The header row repeated further down (multi-page tables).
    RepeatedHeader,
    /// The row split into this many non-empty cells instead of four.
    WrongCellCount(usize),
}

impl DropReason {
    /// True for rows that looked like data, not decoration.
    pub fn is_malformed(&self) -> bool {
        matches!(self, DropReason::WrongCellCount(_))
    }
}

/// A candidate row that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedRow {
    /// 1-based line number in the reply.
    pub line: usize,
    pub text: String,
    pub reason: DropReason,
}

/// Result of parsing one reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTable {
    pub records: RecordSet,
    /// Whether a header row (candidate containing `Date`) was seen.
    pub header_found: bool,
    pub dropped: Vec<DroppedRow>,
}

/// Parse a model reply into records.
///
/// # Errors
/// [`StatementError::AmountParseError`] if a kept row's amount is not numeric
/// after removing thousands separators. No partial result is returned.
pub fn parse_reply(reply: &str) -> Result<ParsedTable, StatementError> {
    let reply = normalise_reply(reply);
    let mut table = ParsedTable::default();
    let mut records = Vec::new();

    for (i, line) in reply.lines().enumerate() {
        let line_no = i + 1;
        if !line.contains(DELIMITER) {
            continue;
        }

        if !table.header_found {
            if line.contains(HEADER_TOKEN) {
                debug!("Table header found on reply line {}", line_no);
                table.header_found = true;
            }
            continue;
        }

        let skipped = |reason: DropReason| DroppedRow {
            line: line_no,
            text: line.to_string(),
            reason,
        };

        if is_separator(line) {
            table.dropped.push(skipped(DropReason::Separator));
            continue;
        }

        let cells = split_cells(line);
        if cells.len() != EXPECTED_CELLS {
            warn!(
                "Dropping reply line {}: {} cells instead of {}: {:?}",
                line_no,
                cells.len(),
                EXPECTED_CELLS,
                line
            );
            table.dropped.push(skipped(DropReason::WrongCellCount(cells.len())));
            continue;
        }

        if cells[0].eq_ignore_ascii_case(HEADER_TOKEN) {
            table.dropped.push(skipped(DropReason::RepeatedHeader));
            continue;
        }

        let amount = parse_amount(cells[2]).ok_or_else(|| StatementError::AmountParseError {
            line: line_no,
            value: cells[2].to_string(),
        })?;

        records.push(TransactionRecord::new(cells[0], cells[1], amount, cells[3]));
    }

    debug!(
        "Parsed {} records, dropped {} lines",
        records.len(),
        table.dropped.len()
    );
    table.records = RecordSet::new(records);
    Ok(table)
}

/// Parse an amount cell: strip thousands separators, then read a float.
///
/// Returns `None` for anything that is not a finite number.
pub fn parse_amount(cell: &str) -> Option<f64> {
    let cleaned: String = cell.trim().chars().filter(|&c| c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Split a row on the delimiter, trimming cells and discarding empty ones.
fn split_cells(line: &str) -> Vec<&str> {
    line.split(DELIMITER)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

/// A line is decoration when stripping `|`, `-` and spaces from its ends
/// leaves nothing, or when it is a GFM alignment row.
fn is_separator(line: &str) -> bool {
    let stripped = line.trim_matches(|c: char| c == DELIMITER || c == '-' || c == ' ');
    stripped.is_empty()
        || line
            .chars()
            .all(|c| c == DELIMITER || c == '-' || c == ':' || c.is_whitespace())
}

/// Normalise line endings and remove invisible characters that would hide
/// the header token or the delimiter from the line scan.
fn normalise_reply(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'))
        .collect()
}
