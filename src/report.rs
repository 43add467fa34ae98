//! Sorted, one-decimal rendering of the final table.

use std::fmt;

use rayon::prelude::*;

use crate::aggregate::{PartialTable, StationAggregate};
use crate::config::Rounding;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub key: String,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub count: u64,
}

impl ReportRow {
    fn new(key: &[u8], stats: &StationAggregate) -> Self {
        Self {
            // Keys were validated as UTF-8 when first parsed.
            key: String::from_utf8_lossy(key).into_owned(),
            min: stats.min,
            mean: stats.mean(),
            max: stats.max,
            count: stats.count,
        }
    }
}

/// Final aggregates sorted by key in byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    rows: Vec<ReportRow>,
    rounding: Rounding,
}

impl Report {
    pub fn from_table(table: &PartialTable, rounding: Rounding) -> Self {
        let mut rows: Vec<ReportRow> = table
            .iter()
            .map(|(key, stats)| ReportRow::new(key, stats))
            .collect();
        rows.par_sort_unstable_by(|a, b| a.key.as_bytes().cmp(b.key.as_bytes()));
        Self { rows, rounding }
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn get(&self, key: &str) -> Option<&ReportRow> {
        self.rows
            .binary_search_by(|row| row.key.as_bytes().cmp(key.as_bytes()))
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        for row in &self.rows {
            writeln!(
                f,
                "{}={}/{}/{}",
                row.key,
                Tenths(row.min, self.rounding),
                Tenths(row.mean, self.rounding),
                Tenths(row.max, self.rounding),
            )?;
        }
        writeln!(f, "}}")
    }
}

/// A value rendered with exactly one fractional digit.
#[derive(Debug, Clone, Copy)]
pub struct Tenths(pub f64, pub Rounding);

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.1 {
            Rounding::HalfEven => write!(f, "{:.1}", self.0),
            Rounding::HalfUp => {
                let rounded = (self.0 * 10.0 + 0.5).floor() / 10.0;
                // Adding zero turns -0.0 into 0.0.
                write!(f, "{:.1}", rounded + 0.0)
            }
        }
    }
}
