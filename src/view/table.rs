// Read-only table model: sort order over row indices + formatted cells.
// Rows are never reordered or modified here.

use std::cmp::Ordering;
use std::io::Write;

use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::engine::types::{FieldValue, RowRecord};
use crate::view::columns::{CellClass, ColumnSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub column: usize,
    pub direction: Direction,
}

fn compare(a: FieldValue<'_>, b: FieldValue<'_>) -> Ordering {
    match (a, b) {
        (FieldValue::Number(x), FieldValue::Number(y)) => OrderedFloat(x).cmp(&OrderedFloat(y)),
        (FieldValue::Text(x), FieldValue::Text(y)) => x.cmp(y),
        // numbers before text
        (FieldValue::Number(_), FieldValue::Text(_)) => Ordering::Less,
        (FieldValue::Text(_), FieldValue::Number(_)) => Ordering::Greater,
    }
}

/// Row indices in display order. Ties keep transformer order.
pub fn display_order(rows: &[RowRecord], columns: &ColumnSpec, sort: Option<SortState>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    let Some(sort) = sort else { return order };
    let Some(col) = columns.get(sort.column).filter(|c| c.sortable) else { return order };

    order.sort_by(|&i, &j| {
        let ord = compare(rows[i].get(col.key), rows[j].get(col.key));
        match sort.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    });
    order
}

/// Next sort state after the user picks `column`: same column flips direction,
/// a new one starts ascending, non-sortable columns leave things as they are.
pub fn toggle_sort(current: Option<SortState>, columns: &ColumnSpec, column: usize) -> Option<SortState> {
    match columns.get(column) {
        Some(c) if c.sortable => {}
        _ => return current,
    }
    let direction = match current {
        Some(s) if s.column == column && s.direction == Direction::Ascending => Direction::Descending,
        _ => Direction::Ascending,
    };
    Some(SortState { column, direction })
}

pub fn cell_grid(rows: &[RowRecord], columns: &ColumnSpec, order: &[usize]) -> Vec<Vec<String>> {
    order
        .iter()
        .map(|&i| {
            let row = &rows[i];
            columns.columns().iter().map(|c| c.format(row.get(c.key))).collect()
        })
        .collect()
}

/// Aligned text table, numeric columns right-aligned.
pub fn write_plain<W: Write>(
    out: &mut W,
    rows: &[RowRecord],
    columns: &ColumnSpec,
    order: &[usize],
) -> std::io::Result<()> {
    let grid = cell_grid(rows, columns, order);
    let widths: Vec<usize> = columns
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| grid.iter().map(|r| r[i].len()).chain([c.header.len()]).max().unwrap_or(0))
        .collect();

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(columns.columns())
            .zip(&widths)
            .map(|((cell, col), &w)| match col.class {
                CellClass::Numeric => format!("{cell:>w$}"),
                CellClass::Symbol => format!("{cell:<w$}"),
            })
            .join("  ")
    };

    let header: Vec<String> = columns.columns().iter().map(|c| c.header.to_string()).collect();
    writeln!(out, "{}", line(&header).trim_end())?;
    writeln!(out, "{}", widths.iter().map(|&w| "-".repeat(w)).join("  "))?;
    for r in &grid {
        writeln!(out, "{}", line(r).trim_end())?;
    }
    Ok(())
}

pub fn write_csv<W: Write>(
    out: W,
    rows: &[RowRecord],
    columns: &ColumnSpec,
    order: &[usize],
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(columns.columns().iter().map(|c| c.header))?;
    for r in cell_grid(rows, columns, order) {
        wtr.write_record(&r)?;
    }
    wtr.flush()?;
    Ok(())
}
