//! Table cleaning: turn any reader's [`RawTable`] into a [`CleanedTable`].
//!
//! ## Why a fixed rule order?
//!
//! Readers disagree on what "empty" looks like (CSV `NA` tokens, SAS
//! missing codes, blank spreadsheet cells). By the time a table gets here
//! they are all [`Cell::Missing`], and the rules below run in this order:
//!
//! 1. Drop columns that hold nothing but missing values
//! 2. Fill the remaining missing cells with `"N/A"`
//! 3. Rename columns: trim, spaces to underscores, lowercase
//! 4. Normalise text cells: line breaks to spaces, collapse whitespace, trim
//!
//! Filling before dropping would keep every column alive, so rule 1 must
//! come first. Every rule is a no-op on its own output, which makes
//! `clean` idempotent.

use crate::table::{Cell, CleanedTable, Column, RawTable};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Replacement for missing cells.
pub const MISSING_FILL: &str = "N/A";

/// Clean a table. Pure and deterministic.
pub fn clean(table: &RawTable) -> CleanedTable {
    clean_with_report(table).0
}

/// Clean a table and also return the (original) names of dropped columns.
pub fn clean_with_report(table: &RawTable) -> (CleanedTable, Vec<String>) {
    let (kept, dropped) = drop_empty_columns(table.columns());
    if !dropped.is_empty() {
        debug!("Dropped {} all-missing column(s): {:?}", dropped.len(), dropped);
    }

    let columns = kept
        .into_iter()
        .map(|col| Column {
            name: normalise_column_name(&col.name),
            values: col
                .values
                .iter()
                .map(fill_missing)
                .map(normalise_cell)
                .collect(),
        })
        .collect();

    (CleanedTable::from_cleaned(RawTable::from_columns_unchecked(columns)), dropped)
}

// ── Rule 1: Drop all-missing columns ─────────────────────────────────────────

fn drop_empty_columns(columns: &[Column]) -> (Vec<&Column>, Vec<String>) {
    let mut kept = Vec::with_capacity(columns.len());
    let mut dropped = Vec::new();
    for col in columns {
        if col.is_all_missing() {
            dropped.push(col.name.clone());
        } else {
            kept.push(col);
        }
    }
    (kept, dropped)
}

// ── Rule 2: Fill missing cells ───────────────────────────────────────────────

fn fill_missing(cell: &Cell) -> Cell {
    if cell.is_missing() {
        Cell::Text(MISSING_FILL.to_string())
    } else {
        cell.clone()
    }
}

// ── Rule 3: Rename columns ───────────────────────────────────────────────────

/// `"  Col 1 "` → `"col_1"`. Only the space character is replaced; other
/// interior whitespace is kept.
pub fn normalise_column_name(name: &str) -> String {
    name.trim().replace(' ', "_").to_lowercase()
}

// ── Rule 4: Normalise text ───────────────────────────────────────────────────

static RE_LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n]+").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn normalise_cell(cell: Cell) -> Cell {
    match cell {
        Cell::Text(s) => Cell::Text(normalise_text(&s)),
        other => other,
    }
}

/// Collapse line breaks and whitespace runs to single spaces, then trim.
pub fn normalise_text(input: &str) -> String {
    let s = RE_LINE_BREAKS.replace_all(input, " ");
    RE_WHITESPACE.replace_all(&s, " ").trim().to_string()
}
