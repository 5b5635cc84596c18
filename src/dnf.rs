//! Did-not-finish detection.
//!
//! A DNF is recorded in the source data as a sentinel speed figure, not
//! as a separate flag. Only the exact sentinel counts; nearby values are
//! legitimate (if implausible) figures and pass through untouched.

use serde::Serialize;

use crate::types::RaceEntry;

/// True when a speed figure is the DNF sentinel. Exact match only.
pub fn is_dnf(speed_figure: f64, sentinel: f64) -> bool {
    speed_figure == sentinel
}

/// True when an entry carries a DNF speed figure. A missing figure is
/// not a DNF.
pub fn entry_is_dnf(entry: &RaceEntry, sentinel: f64) -> bool {
    match entry.speed_figure {
        Some(figure) => is_dnf(figure, sentinel),
        None => false,
    }
}

/// DNF counts over a table, reported in the validation summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DnfSummary {
    pub rows_with_figure: usize,
    pub dnf_rows: usize,
}

pub fn summarize(entries: &[RaceEntry], sentinel: f64) -> DnfSummary {
    let mut summary = DnfSummary::default();
    for entry in entries {
        if entry.speed_figure.is_some() {
            summary.rows_with_figure += 1;
        }
        if entry_is_dnf(entry, sentinel) {
            summary.dnf_rows += 1;
        }
    }
    summary
}
