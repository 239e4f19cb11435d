//! Row filtering and coercion against a [`TableSchema`].
//!
//! Provides [`accept_and_coerce()`] which keeps the cells of one raw CSV row
//! that satisfy their column spec and converts them into a [`TypedRow`].
//! Cells are matched to columns by position; a row in which no cell survives
//! is treated as a blank or repeated header line and discarded.

use crate::{
    data::{TypedRow, coerce_value},
    schema::TableSchema,
};

/// Returns `None` when no cell of the row is accepted.
///
/// A cell is accepted when a column exists at its position, its text is not
/// that column's header label, and its text fully matches the column pattern.
/// Rejected cells are simply absent from the returned row.
pub fn accept_and_coerce<'a, I>(cells: I, schema: &TableSchema) -> Option<TypedRow>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut row = TypedRow::new();
    for (column, cell) in schema.columns.iter().zip(cells) {
        if column.accepts(cell) {
            row.push(column.name.as_str(), coerce_value(cell, &column.column_type));
        }
    }
    if row.is_empty() { None } else { Some(row) }
}
