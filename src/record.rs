//! Transaction records extracted from a statement.
//!
//! Records are plain values created fresh on every parse. Nothing here is
//! persisted; a new upload replaces the whole [`RecordSet`].

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical column names, in export order.
pub const COLUMNS: [&str; 4] = ["Date", "Concept", "Amount (MXN)", "Type"];

/// One extracted financial transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Date exactly as the model wrote it.
    pub date: String,
    /// Description; the model already cut it down to the text after `CONCEPTO`.
    pub concept: String,
    /// Signed amount with thousands separators removed.
    pub amount: f64,
    /// Free-text label such as `Income` or `Expense`.
    pub category: String,
}

impl TransactionRecord {
    pub fn new(
        date: impl Into<String>,
        concept: impl Into<String>,
        amount: f64,
        category: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            concept: concept.into(),
            amount,
            category: category.into(),
        }
    }

    /// Interpret [`Self::date`] as a calendar date, if its format is recognised.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_statement_date(&self.date)
    }
}

/// All records extracted from one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: Vec<TransactionRecord>,
}

impl RecordSet {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TransactionRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<TransactionRecord> {
        self.records
    }
}

impl From<Vec<TransactionRecord>> for RecordSet {
    fn from(records: Vec<TransactionRecord>) -> Self {
        Self::new(records)
    }
}

impl FromIterator<TransactionRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = TransactionRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a TransactionRecord;
    type IntoIter = std::slice::Iter<'a, TransactionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// ── Date parsing ─────────────────────────────────────────────────────────

// Two-digit years first: chrono's %Y happily reads "24" as year 24.
const NUMERIC_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y",
];

// 01/NOV/2024, 01-nov-24, 1 NOV 2024
static RE_MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[\s/.\-]+([A-Za-z]{3})[A-Za-z]*\.?[\s/.\-]+(\d{2}|\d{4})$").unwrap()
});

/// Parse the date formats seen in Mexican bank statements.
///
/// Month abbreviations are accepted in Spanish (`ENE`, `ABR`, `AGO`, `DIC`)
/// and English. Two-digit years are taken as 20xx.
pub fn parse_statement_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    for fmt in NUMERIC_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            if (1900..=2100).contains(&d.year()) {
                return Some(d);
            }
        }
    }

    let caps = RE_MONTH_NAME.captures(s)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = month_from_abbrev(&caps[2])?;
    let year: i32 = match caps[3].len() {
        2 => 2000 + caps[3].parse::<i32>().ok()?,
        _ => caps[3].parse().ok()?,
    };
    if !(1900..=2100).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    let m = match abbrev.to_ascii_uppercase().as_str() {
        "ENE" | "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "ABR" | "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AGO" | "AUG" => 8,
        "SEP" | "SET" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DIC" | "DEC" => 12,
        _ => return None,
    };
    Some(m)
}
