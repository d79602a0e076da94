// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The column-oriented [`IdTable`] and its non-owning views.
//!
//! Storage is column-major: `columns: Vec<Vec<ValueId>>`, one `Vec` per
//! column, all of equal length. Column count never changes after
//! construction; rows may be appended, resized in
//! bulk, or truncated, but are never deleted at random positions.

mod row;
mod view;

pub use row::{RowMut, RowRef};
pub use view::{IdTableView, IdTableViewMut, StaticIdTableView};

use crate::error::{Error, ErrorContext};
use crate::value_id::ValueId;

/// An owning, column-major table of [`ValueId`]s.
#[derive(Clone, Default)]
pub struct IdTable {
    columns: Vec<Vec<ValueId>>,
}

impl std::fmt::Debug for IdTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTable")
            .field("num_columns", &self.num_columns())
            .field("num_rows", &self.num_rows())
            .finish()
    }
}

impl IdTable {
    /// Creates an empty table with `num_columns` columns and zero rows.
    #[must_use]
    pub fn new(num_columns: usize) -> Self {
        Self {
            columns: (0..num_columns).map(|_| Vec::new()).collect(),
        }
    }

    /// Number of columns. Fixed for the lifetime of the table.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows currently stored.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// `true` if the table has zero rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Appends one row to the end of the table.
    ///
    /// May reallocate the backing columns; any [`IdTableView`] created
    /// before this call borrows `&self` and so cannot coexist with this
    /// `&mut self` call, per the borrow checker — the classic "stale view
    /// after reallocation" hazard is a compile error here rather than a
    /// runtime bug.
    ///
    /// # Panics
    ///
    /// Panics if `row.len() != self.num_columns()`.
    pub fn push_row(&mut self, row: &[ValueId]) {
        assert_eq!(row.len(), self.columns.len(), "row width mismatch");
        for (col, value) in self.columns.iter_mut().zip(row) {
            col.push(*value);
        }
    }

    /// Bulk-resizes every column to `num_rows`, padding new rows with
    /// `ValueId::UNDEF` or truncating as needed.
    pub fn resize(&mut self, num_rows: usize) {
        for col in &mut self.columns {
            col.resize(num_rows, ValueId::UNDEF);
        }
    }

    /// Reserves capacity for at least `additional` more rows in every
    /// column.
    pub fn reserve(&mut self, additional: usize) {
        for col in &mut self.columns {
            col.reserve(additional);
        }
    }

    /// Removes all rows, keeping the column count.
    pub fn clear(&mut self) {
        for col in &mut self.columns {
            col.clear();
        }
    }

    /// Removes column `index`, shifting later columns down by one and
    /// decreasing `num_columns` by one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn erase_column(&mut self, index: usize) {
        assert!(index < self.columns.len(), "column index out of bounds");
        self.columns.remove(index);
    }

    /// Read-only access to one column.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn column(&self, index: usize) -> &[ValueId] {
        &self.columns[index]
    }

    /// Mutable access to one column.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn column_mut(&mut self, index: usize) -> &mut [ValueId] {
        &mut self.columns[index]
    }

    /// Direct access to the backing column storage (used by block writers
    /// that split a column into fixed-size chunks).
    #[must_use]
    pub(crate) fn columns(&self) -> &[Vec<ValueId>] {
        &self.columns
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Vec<ValueId>] {
        &mut self.columns
    }

    /// Returns a read-only reference to row `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn row(&self, index: usize) -> RowRef<'_> {
        assert!(index < self.num_rows(), "row index out of bounds");
        RowRef::new(&self.columns, index)
    }

    /// Returns a mutable reference to row `index`; assigning through it
    /// writes into the backing columns.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn row_mut(&mut self, index: usize) -> RowMut<'_> {
        let num_rows = self.num_rows();
        assert!(index < num_rows, "row index out of bounds");
        RowMut::new(&mut self.columns, index)
    }

    /// Iterates over all rows, in order, as [`RowRef`]s.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = RowRef<'_>> + '_ {
        (0..self.num_rows()).map(move |i| RowRef::new(&self.columns, i))
    }

    /// Borrows the whole table as a non-owning [`IdTableView`] over
    /// `[0, num_rows)`.
    #[must_use]
    pub fn as_view(&self) -> IdTableView<'_> {
        IdTableView::full(self)
    }

    /// Borrows a `[first_row, last_row)` sub-range of the table without
    /// copying.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds or `first_row > last_row`.
    #[must_use]
    pub fn slice(&self, first_row: usize, last_row: usize) -> IdTableView<'_> {
        IdTableView::range(self, first_row, last_row)
    }

    /// Attempts to view this table as having a compile-time-known column
    /// count `N`. A no-op check when the table already has `N` columns;
    /// fails otherwise.
    pub fn as_static_view<const N: usize>(&self) -> crate::error::Result<StaticIdTableView<'_, N>> {
        if self.num_columns() == N {
            Ok(StaticIdTableView::new(self))
        } else {
            Err(Error::RuntimeTypeError(
                ErrorContext::new("IdTable::as_static_view").with_detail(format!(
                    "requested {N} static columns, table has {}",
                    self.num_columns()
                )),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn int(v: i64) -> ValueId {
        ValueId::make_int(v)
    }

    #[test]
    fn push_row_and_read_back() {
        let mut table = IdTable::new(2);
        table.push_row(&[int(1), int(2)]);
        table.push_row(&[int(3), int(4)]);

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.row(0).to_vec(), vec![int(1), int(2)]);
        assert_eq!(table.row(1).to_vec(), vec![int(3), int(4)]);
    }

    #[test]
    fn row_mut_writes_through() {
        let mut table = IdTable::new(1);
        table.push_row(&[int(0)]);
        table.row_mut(0).set(0, int(42));
        assert_eq!(table.column(0), &[int(42)]);
    }

    #[test]
    fn resize_pads_with_undef() {
        let mut table = IdTable::new(1);
        table.push_row(&[int(1)]);
        table.resize(3);
        assert_eq!(table.num_rows(), 3);
        assert!(table.row(1).get(0).is_undefined());
        assert!(table.row(2).get(0).is_undefined());
    }

    #[test]
    fn erase_column_shrinks_width() {
        let mut table = IdTable::new(3);
        table.push_row(&[int(1), int(2), int(3)]);
        table.erase_column(1);
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.row(0).to_vec(), vec![int(1), int(3)]);
    }

    #[test]
    fn static_view_checks_column_count() {
        let table = IdTable::new(2);
        assert!(table.as_static_view::<2>().is_ok());
        assert!(table.as_static_view::<3>().is_err());
    }

    #[test]
    #[should_panic(expected = "row width mismatch")]
    fn push_row_wrong_width_panics() {
        let mut table = IdTable::new(2);
        table.push_row(&[int(1)]);
    }
}
