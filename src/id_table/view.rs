// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Non-owning views over an [`IdTable`]: row-range slices and/or column
//! subsets, without copying.

use super::IdTable;
use crate::value_id::ValueId;
use std::sync::Arc;

/// A read-only reference to one row of an [`IdTableView`], after the
/// view's row-range and column-subset mapping has been applied.
#[derive(Clone)]
pub struct ViewRow<'a> {
    table: &'a IdTable,
    row: usize,
    columns: Option<Arc<[usize]>>,
}

impl<'a> ViewRow<'a> {
    /// Number of columns visible through this row (the view's column
    /// subset, or the table's full width).
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns
            .as_ref()
            .map_or_else(|| self.table.num_columns(), |c| c.len())
    }

    /// `true` if this row is zero-width.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the value at logical column `col` (an index into the view's
    /// column subset, not necessarily the underlying table).
    ///
    /// # Panics
    ///
    /// Panics if `col` is out of bounds.
    #[must_use]
    pub fn get(&self, col: usize) -> ValueId {
        let physical = self.columns.as_ref().map_or(col, |c| c[col]);
        self.table.column(physical)[self.row]
    }

    /// Iterates over the row's values in logical column order.
    pub fn iter(&self) -> impl Iterator<Item = ValueId> + '_ {
        (0..self.len()).map(move |c| self.get(c))
    }

    /// Materializes into an owned `Vec<ValueId>`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ValueId> {
        self.iter().collect()
    }
}

impl std::fmt::Debug for ViewRow<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for ViewRow<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

/// A non-owning, read-only `[first_row, last_row)` slice of an [`IdTable`],
/// optionally restricted to a subset of columns.
///
/// The dynamic-column-count view used pervasively by the join drivers.
#[derive(Clone)]
pub struct IdTableView<'a> {
    table: &'a IdTable,
    first_row: usize,
    last_row: usize,
    columns: Option<Arc<[usize]>>,
}

impl<'a> IdTableView<'a> {
    /// A view over the whole table.
    #[must_use]
    pub fn full(table: &'a IdTable) -> Self {
        Self {
            table,
            first_row: 0,
            last_row: table.num_rows(),
            columns: None,
        }
    }

    /// A view over `[first_row, last_row)` of the table, all columns.
    ///
    /// # Panics
    ///
    /// Panics if `first_row > last_row` or `last_row > table.num_rows()`.
    #[must_use]
    pub fn range(table: &'a IdTable, first_row: usize, last_row: usize) -> Self {
        assert!(first_row <= last_row, "empty range must still have first <= last");
        assert!(last_row <= table.num_rows(), "range exceeds table bounds");
        Self {
            table,
            first_row,
            last_row,
            columns: None,
        }
    }

    /// Restricts this view to the given column subset (indices into the
    /// underlying table), preserving the current row range.
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<usize>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    /// Number of rows visible through this view.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.last_row - self.first_row
    }

    /// Number of columns visible through this view.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns
            .as_ref()
            .map_or_else(|| self.table.num_columns(), |c| c.len())
    }

    /// `true` if this view has zero rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Returns logical row `index` (0-based within the view).
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds for this view.
    #[must_use]
    pub fn row(&self, index: usize) -> ViewRow<'a> {
        assert!(index < self.num_rows(), "row index out of bounds");
        ViewRow {
            table: self.table,
            row: self.first_row + index,
            columns: self.columns.clone(),
        }
    }

    /// Re-slices this view to `[first, last)` within its own index space.
    ///
    /// # Panics
    ///
    /// Panics if the sub-range is out of bounds.
    #[must_use]
    pub fn slice(&self, first: usize, last: usize) -> Self {
        assert!(first <= last && last <= self.num_rows(), "slice out of bounds");
        Self {
            table: self.table,
            first_row: self.first_row + first,
            last_row: self.first_row + last,
            columns: self.columns.clone(),
        }
    }

    /// Iterates over all rows in the view, in order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = ViewRow<'a>> + '_ {
        (0..self.num_rows()).map(move |i| self.row(i))
    }
}

/// A non-owning, mutable `[first_row, last_row)` slice of an [`IdTable`].
///
/// Unlike [`IdTableView`] this does not support a column subset: writers
/// always address physical columns directly (per-column
/// flush loop), so a column-subset mutable view has no caller in this
/// crate.
pub struct IdTableViewMut<'a> {
    table: &'a mut IdTable,
    first_row: usize,
    last_row: usize,
}

impl<'a> IdTableViewMut<'a> {
    /// A mutable view over `[first_row, last_row)` of `table`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn range(table: &'a mut IdTable, first_row: usize, last_row: usize) -> Self {
        assert!(first_row <= last_row && last_row <= table.num_rows());
        Self {
            table,
            first_row,
            last_row,
        }
    }

    /// Number of rows visible through this view.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.last_row - self.first_row
    }

    /// Writes `value` at (`row`, `col`), `row` relative to this view.
    ///
    /// # Panics
    ///
    /// Panics if out of bounds.
    pub fn set(&mut self, row: usize, col: usize, value: ValueId) {
        assert!(row < self.num_rows());
        self.table.column_mut(col)[self.first_row + row] = value;
    }
}

/// A compile-time-checked, fixed-width view produced by
/// [`IdTable::as_static_view`]. Carries no extra runtime state over
/// [`IdTableView`] beyond the const-generic width `N`, which callers can
/// use to build `[ValueId; N]` arrays without bounds-checking every access.
#[derive(Clone)]
pub struct StaticIdTableView<'a, const N: usize> {
    table: &'a IdTable,
}

impl<'a, const N: usize> StaticIdTableView<'a, N> {
    pub(crate) fn new(table: &'a IdTable) -> Self {
        debug_assert_eq!(table.num_columns(), N);
        Self { table }
    }

    /// Number of rows in the underlying table.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    /// Reads row `index` as a fixed-size array.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn row(&self, index: usize) -> [ValueId; N] {
        let row = self.table.row(index);
        std::array::from_fn(|c| row.get(c))
    }

    /// Borrows the underlying dynamic-width table.
    #[must_use]
    pub fn as_dynamic(&self) -> IdTableView<'a> {
        IdTableView::full(self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_id::ValueId;
    use test_log::test;

    fn make_table() -> IdTable {
        let mut t = IdTable::new(3);
        t.push_row(&[ValueId::make_int(1), ValueId::make_int(2), ValueId::make_int(3)]);
        t.push_row(&[ValueId::make_int(4), ValueId::make_int(5), ValueId::make_int(6)]);
        t.push_row(&[ValueId::make_int(7), ValueId::make_int(8), ValueId::make_int(9)]);
        t
    }

    #[test]
    fn range_view_is_zero_copy_slice() {
        let table = make_table();
        let view = table.slice(1, 3);
        assert_eq!(view.num_rows(), 2);
        assert_eq!(view.row(0).to_vec(), vec![ValueId::make_int(4), ValueId::make_int(5), ValueId::make_int(6)]);
    }

    #[test]
    fn column_subset_reindexes() {
        let table = make_table();
        let view = table.as_view().with_columns(vec![2, 0]);
        assert_eq!(view.num_columns(), 2);
        assert_eq!(view.row(0).to_vec(), vec![ValueId::make_int(3), ValueId::make_int(1)]);
    }

    #[test]
    fn static_view_row_access() {
        let table = make_table();
        let view: StaticIdTableView<'_, 3> = table.as_static_view::<3>().unwrap();
        assert_eq!(view.row(2), [ValueId::make_int(7), ValueId::make_int(8), ValueId::make_int(9)]);
    }

    #[test]
    fn mutable_view_writes_through() {
        let mut table = make_table();
        {
            let mut view = IdTableViewMut::range(&mut table, 1, 3);
            view.set(0, 0, ValueId::UNDEF);
        }
        assert!(table.row(1).get(0).is_undefined());
    }
}
