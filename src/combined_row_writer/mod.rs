// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Buffered, column-major materialization of join results.
//!
//! A [`CombinedRowWriter`] never touches the result table per-row; join
//! drivers only call `add_row`/`add_optional_row`, which push index pairs
//! into a buffer, and `flush` materializes the whole buffer column by
//! column once it fills.
//!
//! This writer merges each input's vocabulary into the output vocabulary
//! eagerly in `set_input` rather than keeping a pointer pair to re-derive
//! the merged vocabulary lazily after a result table has been moved out
//! from under a still-open writer; see `DESIGN.md` for the tradeoff this
//! makes against lazy, block-streamed join chains that reuse backing
//! tables.

pub mod minus_exists;

use crate::cancellation::CancellationHandle;
use crate::error::{Error, ErrorContext, Result};
use crate::id_table::{IdTable, IdTableView};
use crate::local_vocab::LocalVocab;
use crate::value_id::ValueId;

/// Callback invoked once per `flush`, with the (partial) result table and
/// its merged vocabulary so far. Used to stream out rows as they are
/// produced instead of waiting for the whole join to complete.
pub type BlockwiseCallback<'a> = Box<dyn FnMut(&mut IdTable, &mut LocalVocab) + 'a>;

struct MatchRecord {
    target_index: usize,
    left_index: usize,
    right_index: usize,
}

struct OptionalRecord {
    target_index: usize,
    left_index: usize,
}

/// Buffers matching row indices from a left/right join and materializes
/// them into a column-major [`IdTable`] in chunks.
pub struct CombinedRowWriter<'a> {
    num_join_columns: usize,
    keep_join_columns: bool,
    input_left: Option<IdTableView<'a>>,
    input_right: Option<IdTableView<'a>>,
    only_left_mode: bool,
    result: IdTable,
    merged_vocab: LocalVocab,
    num_undefined_per_column: Vec<usize>,
    match_records: Vec<MatchRecord>,
    optional_records: Vec<OptionalRecord>,
    next_index: usize,
    buffer_size: usize,
    blockwise_callback: Option<BlockwiseCallback<'a>>,
    cancellation: CancellationHandle,
}

impl<'a> CombinedRowWriter<'a> {
    /// Creates a writer with no input bound yet; `set_input` or
    /// `set_only_left_input_for_optional_join` must be called before any
    /// `add_row`/`add_optional_row`.
    #[must_use]
    pub fn new(
        num_join_columns: usize,
        output: IdTable,
        cancellation: CancellationHandle,
        keep_join_columns: bool,
        buffer_size: usize,
    ) -> Self {
        let num_columns = output.num_columns();
        Self {
            num_join_columns,
            keep_join_columns,
            input_left: None,
            input_right: None,
            only_left_mode: false,
            result: output,
            merged_vocab: LocalVocab::new(),
            num_undefined_per_column: vec![0; num_columns],
            match_records: Vec::new(),
            optional_records: Vec::new(),
            next_index: 0,
            buffer_size: buffer_size.max(1),
            blockwise_callback: None,
            cancellation,
        }
    }

    /// Installs a callback invoked with the result table and merged
    /// vocabulary at the end of every `flush`.
    #[must_use]
    pub fn with_blockwise_callback(mut self, callback: BlockwiseCallback<'a>) -> Self {
        self.blockwise_callback = Some(callback);
        self
    }

    fn check_num_columns(&self) -> Result<()> {
        let left = self.input_left.as_ref().expect("input must be set");
        let right = self.input_right.as_ref().expect("input must be set");
        if left.num_columns() < self.num_join_columns || right.num_columns() < self.num_join_columns {
            return Err(Error::RuntimeTypeError(
                ErrorContext::new("CombinedRowWriter::set_input")
                    .with_detail("input has fewer columns than the configured join-column count"),
            ));
        }
        let expected = self.num_non_join_output_columns_left() + self.num_non_join_output_columns_right()
            + usize::from(self.keep_join_columns) * self.num_join_columns;
        if self.result.num_columns() != expected {
            return Err(Error::RuntimeTypeError(
                ErrorContext::new("CombinedRowWriter::set_input").with_detail(format!(
                    "result has {} columns, expected {expected}",
                    self.result.num_columns()
                )),
            ));
        }
        Ok(())
    }

    fn num_non_join_output_columns_left(&self) -> usize {
        self.input_left.as_ref().map_or(0, |v| v.num_columns() - self.num_join_columns)
    }

    fn num_non_join_output_columns_right(&self) -> usize {
        self.input_right.as_ref().map_or(0, |v| v.num_columns() - self.num_join_columns)
    }

    fn flush_before_input_change(&mut self) -> Result<()> {
        if self.next_index != 0 {
            self.flush()?;
        }
        Ok(())
    }

    /// Binds new left/right inputs, flushing any pending rows from the
    /// previous input first and merging both inputs' vocabularies into the
    /// output vocabulary.
    pub fn set_input(
        &mut self,
        left: IdTableView<'a>,
        left_vocab: Option<&LocalVocab>,
        right: IdTableView<'a>,
        right_vocab: Option<&LocalVocab>,
    ) -> Result<()> {
        self.flush_before_input_change()?;
        self.merged_vocab.merge(left_vocab);
        self.merged_vocab.merge(right_vocab);
        self.input_left = Some(left);
        self.input_right = Some(right);
        self.only_left_mode = false;
        self.check_num_columns()
    }

    /// Binds only a left input; subsequent calls must use
    /// `add_optional_row`, not `add_row`.
    pub fn set_only_left_input_for_optional_join(
        &mut self,
        left: IdTableView<'a>,
        left_vocab: Option<&LocalVocab>,
    ) -> Result<()> {
        self.flush_before_input_change()?;
        self.merged_vocab.merge(left_vocab);
        self.input_left = Some(left);
        self.input_right = None;
        self.only_left_mode = true;
        Ok(())
    }

    /// Buffers a match between `left_idx` and `right_idx`; flushes if the
    /// buffer has reached its configured size.
    ///
    /// # Panics
    ///
    /// Panics if no input is bound, or if only a left input is bound
    /// (`set_only_left_input_for_optional_join` was used).
    pub fn add_row(&mut self, left_idx: usize, right_idx: usize) -> Result<()> {
        assert!(!self.only_left_mode, "addRow is illegal after setOnlyLeftInputForOptionalJoin");
        assert!(self.input_left.is_some(), "input must be set before addRow");
        self.match_records.push(MatchRecord {
            target_index: self.next_index,
            left_index: left_idx,
            right_index: right_idx,
        });
        self.next_index += 1;
        if self.next_index >= self.buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Buffers the Cartesian product of `left_indices` and `right_indices`.
    /// Specialized to only advance the row counter when the result has zero
    /// columns.
    pub fn add_rows(&mut self, left_indices: &[usize], right_indices: &[usize]) -> Result<()> {
        if self.result.num_columns() == 0 {
            let mut total = left_indices.len() * right_indices.len();
            while total > 0 {
                let chunk = (self.buffer_size - self.next_index).min(total);
                self.next_index += chunk;
                total -= chunk;
                if self.next_index >= self.buffer_size {
                    self.flush()?;
                }
            }
            return Ok(());
        }
        for &a in left_indices {
            for &b in right_indices {
                self.add_row(a, b)?;
            }
        }
        Ok(())
    }

    /// Buffers a left-only row; its right-side columns will be UNDEF.
    ///
    /// # Panics
    ///
    /// Panics if no input is bound.
    pub fn add_optional_row(&mut self, left_idx: usize) -> Result<()> {
        assert!(self.input_left.is_some(), "input must be set before addOptionalRow");
        self.optional_records.push(OptionalRecord {
            target_index: self.next_index,
            left_index: left_idx,
        });
        self.next_index += 1;
        if self.next_index >= self.buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Materializes all buffered records into the result table, invokes
    /// the blockwise callback if any, and clears the buffers.
    pub fn flush(&mut self) -> Result<()> {
        self.cancellation.check()?;
        if self.next_index == 0 {
            return Ok(());
        }
        let old_size = self.result.num_rows();
        self.result.resize(old_size + self.next_index);

        let input_left = self.input_left.clone().expect("input must be set");
        let input_right = self.input_right.clone();

        let mut next_result_col = 0usize;

        if self.keep_join_columns {
            for col in 0..self.num_join_columns {
                self.write_join_column(col, next_result_col, old_size, &input_left, input_right.as_ref());
                next_result_col += 1;
            }
        }
        for col in self.num_join_columns..input_left.num_columns() {
            self.write_left_column(col, next_result_col, old_size, &input_left);
            next_result_col += 1;
        }
        if let Some(right) = input_right.as_ref() {
            for col in self.num_join_columns..right.num_columns() {
                self.write_right_column(col, next_result_col, old_size, right);
                next_result_col += 1;
            }
        }

        self.match_records.clear();
        self.optional_records.clear();
        self.next_index = 0;

        if let Some(callback) = self.blockwise_callback.as_mut() {
            callback(&mut self.result, &mut self.merged_vocab);
        }
        Ok(())
    }

    fn write_join_column(
        &mut self,
        col: usize,
        result_col: usize,
        old_size: usize,
        input_left: &IdTableView<'a>,
        input_right: Option<&IdTableView<'a>>,
    ) {
        let mut undef = 0usize;
        for record in &self.match_records {
            let left_val = input_left.row(record.left_index).get(col);
            let right_val = input_right.expect("matches require a right input").row(record.right_index).get(col);
            let value = if left_val.is_undefined() { right_val } else { left_val };
            if value.is_undefined() {
                undef += 1;
            }
            self.result.row_mut(old_size + record.target_index).set(result_col, value);
        }
        for record in &self.optional_records {
            let value = input_left.row(record.left_index).get(col);
            if value.is_undefined() {
                undef += 1;
            }
            self.result.row_mut(old_size + record.target_index).set(result_col, value);
        }
        self.num_undefined_per_column[result_col] += undef;
    }

    fn write_left_column(&mut self, col: usize, result_col: usize, old_size: usize, input_left: &IdTableView<'a>) {
        let mut undef = 0usize;
        for record in &self.match_records {
            let value = input_left.row(record.left_index).get(col);
            if value.is_undefined() {
                undef += 1;
            }
            self.result.row_mut(old_size + record.target_index).set(result_col, value);
        }
        for record in &self.optional_records {
            let value = input_left.row(record.left_index).get(col);
            if value.is_undefined() {
                undef += 1;
            }
            self.result.row_mut(old_size + record.target_index).set(result_col, value);
        }
        self.num_undefined_per_column[result_col] += undef;
    }

    fn write_right_column(&mut self, col: usize, result_col: usize, old_size: usize, input_right: &IdTableView<'a>) {
        let mut undef = 0usize;
        for record in &self.match_records {
            let value = input_right.row(record.right_index).get(col);
            if value.is_undefined() {
                undef += 1;
            }
            self.result.row_mut(old_size + record.target_index).set(result_col, value);
        }
        // Optional rows have no right-hand counterpart: the column is UNDEF.
        for record in &self.optional_records {
            self.result.row_mut(old_size + record.target_index).set(result_col, ValueId::UNDEF);
            undef += 1;
        }
        self.num_undefined_per_column[result_col] += undef;
    }

    /// Flushes, then returns per-output-column UNDEF counts.
    pub fn num_undefined_per_column(&mut self) -> Result<&[usize]> {
        self.flush()?;
        Ok(&self.num_undefined_per_column)
    }

    /// Flushes, then consumes the writer and returns the completed table
    /// together with its merged vocabulary.
    pub fn into_result(mut self) -> Result<(IdTable, LocalVocab)> {
        self.flush()?;
        Ok((self.result, self.merged_vocab))
    }

    /// Number of rows materialized so far, not counting buffered-but-not-yet-flushed rows.
    #[must_use]
    pub fn num_rows_flushed(&self) -> usize {
        self.result.num_rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_table::IdTable;
    use test_log::test;

    fn int(v: i64) -> ValueId {
        ValueId::make_int(v)
    }

    fn make_table(rows: &[&[ValueId]]) -> IdTable {
        let num_cols = rows.first().map_or(0, |r| r.len());
        let mut table = IdTable::new(num_cols);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    #[test]
    fn add_row_materializes_join_and_payload_columns() {
        // left: [joinCol, payloadL], right: [joinCol, payloadR]
        let left = make_table(&[&[int(1), int(10)], &[int(2), int(20)]]);
        let right = make_table(&[&[int(1), int(100)], &[int(2), int(200)]]);
        let output = IdTable::new(3); // joinCol, payloadL, payloadR
        let mut writer = CombinedRowWriter::new(1, output, CancellationHandle::new(), true, 100_000);
        writer.set_input(left.as_view(), None, right.as_view(), None).unwrap();
        writer.add_row(0, 0).unwrap();
        writer.add_row(1, 1).unwrap();
        let (result, _) = writer.into_result().unwrap();
        assert_eq!(result.num_rows(), 2);
        assert_eq!(result.row(0).to_vec(), vec![int(1), int(10), int(100)]);
        assert_eq!(result.row(1).to_vec(), vec![int(2), int(20), int(200)]);
    }

    #[test]
    fn optional_row_sets_right_columns_undef() {
        let left = make_table(&[&[int(1), int(10)]]);
        let right = make_table(&[&[int(1), int(100)]]);
        let output = IdTable::new(3);
        let mut writer = CombinedRowWriter::new(1, output, CancellationHandle::new(), true, 100_000);
        writer.set_input(left.as_view(), None, right.as_view(), None).unwrap();
        writer.add_optional_row(0).unwrap();
        let (result, _) = writer.into_result().unwrap();
        assert_eq!(result.num_rows(), 1);
        assert_eq!(result.row(0).get(0), int(1));
        assert_eq!(result.row(0).get(1), int(10));
        assert!(result.row(0).get(2).is_undefined());
    }

    #[test]
    fn undef_join_column_takes_defined_side() {
        let left = make_table(&[&[ValueId::UNDEF]]);
        let right = make_table(&[&[int(7)]]);
        let output = IdTable::new(1);
        let mut writer = CombinedRowWriter::new(1, output, CancellationHandle::new(), true, 100_000);
        writer.set_input(left.as_view(), None, right.as_view(), None).unwrap();
        writer.add_row(0, 0).unwrap();
        let (result, _) = writer.into_result().unwrap();
        assert_eq!(result.row(0).get(0), int(7));
    }

    #[test]
    fn add_rows_cartesian_on_zero_columns_only_advances_counter() {
        let left = make_table(&[&[int(1)], &[int(1)], &[int(1)]]);
        let right = make_table(&[&[int(1)], &[int(1)]]);
        let output = IdTable::new(0);
        let mut writer = CombinedRowWriter::new(1, output, CancellationHandle::new(), false, 100_000);
        writer.set_input(left.as_view(), None, right.as_view(), None).unwrap();
        writer.add_rows(&[0, 1, 2], &[0, 1]).unwrap();
        let (result, _) = writer.into_result().unwrap();
        assert_eq!(result.num_rows(), 6);
        assert_eq!(result.num_columns(), 0);
    }

    #[test]
    fn flush_raises_cancelled_and_buffer_stays_valid() {
        let left = make_table(&[&[int(1)]; 50]);
        let right = make_table(&[&[int(1)]]);
        let output = IdTable::new(1);
        let handle = CancellationHandle::new();
        let mut writer = CombinedRowWriter::new(1, output, handle.clone(), true, 10);
        writer.set_input(left.as_view(), None, right.as_view(), None).unwrap();
        for i in 0..9 {
            writer.add_row(i, 0).unwrap();
        }
        handle.cancel();
        let err = writer.flush().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
