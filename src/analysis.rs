//! Filtering and aggregation over an extracted [`RecordSet`].
//!
//! The category domain is discovered from the data of each statement; there
//! is no fixed enumeration. Every operation here is total: an empty record
//! set yields empty lists, `None` bounds and zero sums rather than panics.

use crate::record::{RecordSet, TransactionRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Category label counted as inflow.
pub const INCOME: &str = "Income";
/// Category label counted as outflow.
pub const EXPENSE: &str = "Expense";

/// Record filter: category membership ∧ inclusive date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Categories to keep. `None` keeps every category.
    pub categories: Option<BTreeSet<String>>,
    /// Inclusive `(from, to)` bounds. Records whose date cannot be parsed
    /// are excluded while a range is active.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl RecordFilter {
    /// A filter that keeps everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_date_range(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_range = Some((from, to));
        self
    }

    /// True when `record` passes both conditions.
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if let Some(ref cats) = self.categories {
            if !cats.contains(&record.category) {
                return false;
            }
        }
        match self.date_range {
            None => true,
            Some((from, to)) => record
                .parsed_date()
                .is_some_and(|d| d >= from && d <= to),
        }
    }
}

/// Income / expense / balance metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_income: f64,
    pub total_expense: f64,
    /// `total_income - total_expense`.
    pub balance: f64,
}

impl RecordSet {
    /// Distinct category values in first-appearance order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.iter()
            .filter(|r| seen.insert(r.category.as_str()))
            .map(|r| r.category.clone())
            .collect()
    }

    /// Earliest and latest parseable dates, or `None` when there are none.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.iter()
            .filter_map(TransactionRecord::parsed_date)
            .fold(None, |acc, d| match acc {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
    }

    /// Records that pass `filter`, in their original order.
    pub fn filter(&self, filter: &RecordFilter) -> RecordSet {
        self.iter().filter(|r| filter.matches(r)).cloned().collect()
    }

    /// Totals for the `Income` and `Expense` categories (ASCII case-insensitive).
    pub fn summary(&self) -> Summary {
        let sum_of = |label: &str| -> f64 {
            self.iter()
                .filter(|r| r.category.trim().eq_ignore_ascii_case(label))
                .fold(0.0, |acc, r| acc + r.amount)
        };
        let total_income = sum_of(INCOME);
        let total_expense = sum_of(EXPENSE);
        Summary {
            total_income,
            total_expense,
            balance: total_income - total_expense,
        }
    }

    /// Records per category, highest count first; ties keep first-appearance order.
    pub fn category_counts(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for r in self.iter() {
            *counts.entry(r.category.as_str()).or_default() += 1;
        }
        let mut out: Vec<(String, usize)> = self
            .categories()
            .into_iter()
            .map(|c| {
                let n = counts.get(c.as_str()).copied().unwrap_or(0);
                (c, n)
            })
            .collect();
        // stable sort keeps first-appearance order among equal counts
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordSet {
        RecordSet::new(vec![
            TransactionRecord::new("2024-11-01", "RENTA DEPTO CHAPULTEPEC", 12345.0, "Expense"),
            TransactionRecord::new("2024-11-03", "NOMINA", 30000.0, "Income"),
            TransactionRecord::new("2024-11-05", "SUPERMERCADO", 1500.5, "Expense"),
            TransactionRecord::new("sin fecha", "AJUSTE", 10.0, "Adjustment"),
            TransactionRecord::new("2024-10-28", "REEMBOLSO", 200.0, "Income"),
            TransactionRecord::new("2024-11-07", "LUZ", 480.0, "Expense"),
        ])
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn categories_in_first_appearance_order() {
        assert_eq!(sample().categories(), vec!["Expense", "Income", "Adjustment"]);
    }

    #[test]
    fn date_bounds_skip_unparseable() {
        assert_eq!(
            sample().date_bounds(),
            Some((ymd(2024, 10, 28), ymd(2024, 11, 7)))
        );
    }

    #[test]
    fn empty_set_is_total() {
        let empty = RecordSet::default();
        assert!(empty.categories().is_empty());
        assert_eq!(empty.date_bounds(), None);
        assert!(empty.category_counts().is_empty());
        let s = empty.summary();
        assert_eq!(s.total_income, 0.0);
        assert_eq!(s.total_expense, 0.0);
        assert_eq!(s.balance, 0.0);
        assert!(s.total_income.is_sign_positive());
        assert!(s.total_expense.is_sign_positive());
        assert!(s.balance.is_sign_positive());
        assert_eq!(
            serde_json::to_string(&s).unwrap(),
            r#"{"total_income":0.0,"total_expense":0.0,"balance":0.0}"#
        );
        assert!(empty.filter(&RecordFilter::all().with_date_range(ymd(2024, 1, 1), ymd(2024, 12, 31))).is_empty());
    }

    #[test]
    fn summary_totals_and_balance() {
        let s = sample().summary();
        assert_eq!(s.total_income, 30200.0);
        assert_eq!(s.total_expense, 14325.5);
        assert_eq!(s.balance, 30200.0 - 14325.5);
    }

    #[test]
    fn summary_ignores_label_case() {
        let set = RecordSet::new(vec![
            TransactionRecord::new("2024-11-01", "A", 10.0, "income"),
            TransactionRecord::new("2024-11-01", "B", 4.0, " EXPENSE "),
        ]);
        let s = set.summary();
        assert_eq!(s.total_income, 10.0);
        assert_eq!(s.total_expense, 4.0);
        assert_eq!(s.balance, 6.0);
    }

    #[test]
    fn filter_by_category() {
        let out = sample().filter(&RecordFilter::all().with_categories(["Income"]));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.category == "Income"));
    }

    #[test]
    fn filter_by_date_range_is_inclusive() {
        let out = sample().filter(
            &RecordFilter::all().with_date_range(ymd(2024, 11, 1), ymd(2024, 11, 5)),
        );
        let concepts: Vec<&str> = out.iter().map(|r| r.concept.as_str()).collect();
        assert_eq!(concepts, vec!["RENTA DEPTO CHAPULTEPEC", "NOMINA", "SUPERMERCADO"]);
    }

    #[test]
    fn unfiltered_keeps_unparseable_dates() {
        let out = sample().filter(&RecordFilter::all());
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn combined_filter() {
        let out = sample().filter(
            &RecordFilter::all()
                .with_categories(["Expense", "Adjustment"])
                .with_date_range(ymd(2024, 11, 4), ymd(2024, 11, 30)),
        );
        let concepts: Vec<&str> = out.iter().map(|r| r.concept.as_str()).collect();
        assert_eq!(concepts, vec!["SUPERMERCADO", "LUZ"]);
    }

    #[test]
    fn category_counts_descending() {
        assert_eq!(
            sample().category_counts(),
            vec![
                ("Expense".to_string(), 3),
                ("Income".to_string(), 2),
                ("Adjustment".to_string(), 1),
            ]
        );
    }
}
