// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! MINUS and EXISTS both reduce to "copy a contiguous range of the left
//! input, skipping or annotating rows that had a join partner" — this
//! module shares that buffered, chunked copy primitive between the two.
//!
//! Unlike [`super::CombinedRowWriter`], there is no right-hand output: MINUS
//! keeps the left input's columns unchanged and simply drops matching rows;
//! EXISTS keeps them and appends one boolean column recording whether each
//! row had a join partner.

use crate::cancellation::CancellationHandle;
use crate::error::Result;
use crate::id_table::IdTable;
use crate::id_table::IdTableView;
use crate::local_vocab::LocalVocab;
use crate::value_id::ValueId;

const CHUNK_SIZE: usize = 100_000;

/// Copies `src` into `dst` in chunks of [`CHUNK_SIZE`], polling
/// `cancellation` once per chunk so a long copy can still be interrupted
/// promptly.
fn chunked_copy(dst: &mut [ValueId], src: &[ValueId], cancellation: &CancellationHandle) -> Result<()> {
    debug_assert_eq!(dst.len(), src.len());
    for (chunk_dst, chunk_src) in dst.chunks_mut(CHUNK_SIZE).zip(src.chunks(CHUNK_SIZE)) {
        cancellation.check()?;
        chunk_dst.copy_from_slice(chunk_src);
    }
    Ok(())
}

/// Whether a [`MinusExistsRowWriter`] drops matched rows (MINUS) or keeps
/// every row and tags it with a boolean "matched" column (EXISTS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowWriterMode {
    /// Output has the same columns as the left input; matching rows are
    /// omitted.
    Minus,
    /// Output has the left input's columns plus one boolean column; every
    /// row is kept, and the extra column records whether it matched.
    Exists,
}

/// Buffers row indices of a left input that did or did not find a partner in
/// a right input, and materializes MINUS/EXISTS output in chunks.
pub struct MinusExistsRowWriter<'a> {
    mode: RowWriterMode,
    input_left: Option<IdTableView<'a>>,
    result: IdTable,
    merged_vocab: LocalVocab,
    num_undefined_per_column: Vec<usize>,
    /// Strictly increasing row indices that found a join partner.
    matching_indices: Vec<usize>,
    start_index: Option<usize>,
    end_index: usize,
    cancellation: CancellationHandle,
}

impl<'a> MinusExistsRowWriter<'a> {
    /// Creates a writer with no input bound yet. `output` must already have
    /// the right column count for `mode` (left input width, or left input
    /// width + 1 for [`RowWriterMode::Exists`]) once the input is set.
    #[must_use]
    pub fn new(mode: RowWriterMode, output: IdTable, cancellation: CancellationHandle) -> Self {
        let num_columns = output.num_columns();
        Self {
            mode,
            input_left: None,
            result: output,
            merged_vocab: LocalVocab::new(),
            num_undefined_per_column: vec![0; num_columns],
            matching_indices: Vec::new(),
            start_index: None,
            end_index: 0,
            cancellation,
        }
    }

    fn flush_before_input_change(&mut self) -> Result<()> {
        if self.start_index.is_some() {
            self.flush()?;
        } else if self.result.is_empty() {
            self.merged_vocab.reset();
        }
        Ok(())
    }

    /// Binds the left input for subsequent `add_row`/`add_row_unmatched`
    /// calls, flushing any pending rows from the previous input first.
    pub fn set_input(&mut self, left: IdTableView<'a>, left_vocab: Option<&LocalVocab>) -> Result<()> {
        self.flush_before_input_change()?;
        self.merged_vocab.merge(left_vocab);
        self.input_left = Some(left);
        Ok(())
    }

    /// Records that row `index` of the left input found a join partner (and
    /// so should be dropped by MINUS, or tagged `false`-then-overridden in
    /// EXISTS — see [`RowWriterMode`]). Indices passed across successive
    /// calls must be non-decreasing.
    ///
    /// # Panics
    ///
    /// Panics if no input is bound, or if `index` is smaller than a
    /// previously recorded index (other than an exact duplicate).
    pub fn add_matching_row(&mut self, index: usize) {
        assert!(self.input_left.is_some(), "input must be set before add_matching_row");
        match self.matching_indices.last() {
            Some(&last) if last < index => self.matching_indices.push(index),
            Some(&last) if last == index => {}
            Some(_) => panic!("matching row indices must be non-decreasing"),
            None => self.matching_indices.push(index),
        }
        self.extend_range(index);
    }

    /// Records that row `index` of the left input found no join partner.
    /// Mirrors [`super::CombinedRowWriter::add_optional_row`]'s naming:
    /// EXISTS and MINUS both derive "no match" from the complement of
    /// `matching_indices` within `[start_index, end_index)`, so this only
    /// needs to extend that range.
    pub fn add_unmatched_row(&mut self, index: usize) {
        assert!(self.input_left.is_some(), "input must be set before add_unmatched_row");
        self.extend_range(index);
    }

    fn extend_range(&mut self, index: usize) {
        self.start_index.get_or_insert(index);
        self.end_index = self.end_index.max(index + 1);
    }

    /// Materializes all rows in `[start_index, end_index)` into the result
    /// table, dropping or tagging matches per [`RowWriterMode`], and clears
    /// the buffers.
    pub fn flush(&mut self) -> Result<()> {
        self.cancellation.check()?;
        let Some(start) = self.start_index else {
            return Ok(());
        };
        let end = self.end_index;
        let input = self.input_left.as_ref().expect("input must be set").clone();

        match self.mode {
            RowWriterMode::Minus => self.flush_minus(start, end, &input)?,
            RowWriterMode::Exists => self.flush_exists(start, end, &input)?,
        }

        self.matching_indices.clear();
        self.start_index = None;
        self.end_index = 0;
        Ok(())
    }

    fn flush_minus(&mut self, start: usize, end: usize, input: &IdTableView<'a>) -> Result<()> {
        let num_matching = self.matching_indices.len();
        debug_assert!(end - start >= num_matching);
        let old_size = self.result.num_rows();
        self.result.resize(old_size + (end - start - num_matching));
        let matching_indices = self.matching_indices.clone();

        for col in 0..input.num_columns() {
            let source: Vec<ValueId> = (start..end).map(|i| input.row(i).get(col)).collect();
            let mut dest_row = old_size;
            let mut last_index = start;
            for &matched in &matching_indices {
                let run = &source[(last_index - start)..(matched - start)];
                self.copy_run(col, dest_row, run)?;
                dest_row += run.len();
                last_index = matched + 1;
            }
            let run = &source[(last_index - start)..(end - start)];
            self.copy_run(col, dest_row, run)?;
            dest_row += run.len();
            debug_assert_eq!(dest_row, old_size + (end - start - num_matching));
        }
        Ok(())
    }

    fn copy_run(&mut self, col: usize, dest_row: usize, run: &[ValueId]) -> Result<()> {
        let undef = run.iter().filter(|v| v.is_undefined()).count();
        self.num_undefined_per_column[col] += undef;
        let dest = &mut self.result.column_mut(col)[dest_row..dest_row + run.len()];
        chunked_copy(dest, run, &self.cancellation)
    }

    fn flush_exists(&mut self, start: usize, end: usize, input: &IdTableView<'a>) -> Result<()> {
        let old_size = self.result.num_rows();
        self.result.resize(old_size + (end - start));
        let last_column = input.num_columns();

        for col in 0..input.num_columns() {
            let source: Vec<ValueId> = (start..end).map(|i| input.row(i).get(col)).collect();
            self.copy_run(col, old_size, &source)?;
        }

        for i in start..end {
            self.cancellation.check()?;
            let matched = self.matching_indices.binary_search(&i).is_ok();
            self.result.row_mut(old_size + (i - start)).set(last_column, ValueId::make_bool(matched));
        }
        Ok(())
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn int(v: i64) -> ValueId {
        ValueId::make_int(v)
    }

    fn make_table(rows: &[i64]) -> IdTable {
        let mut table = IdTable::new(1);
        for &v in rows {
            table.push_row(&[int(v)]);
        }
        table
    }

    #[test]
    fn minus_drops_matching_rows() {
        let left = make_table(&[10, 20, 30, 40]);
        let output = IdTable::new(1);
        let mut writer = MinusExistsRowWriter::new(RowWriterMode::Minus, output, CancellationHandle::new());
        writer.set_input(left.as_view(), None).unwrap();
        writer.add_unmatched_row(0);
        writer.add_matching_row(1);
        writer.add_unmatched_row(2);
        writer.add_unmatched_row(3);
        let (result, _) = writer.into_result().unwrap();
        assert_eq!(result.num_rows(), 3);
        assert_eq!(result.column(0), &[int(10), int(30), int(40)]);
    }

    #[test]
    fn exists_keeps_every_row_and_tags_matches() {
        let left = make_table(&[1, 2, 3]);
        let output = IdTable::new(2);
        let mut writer = MinusExistsRowWriter::new(RowWriterMode::Exists, output, CancellationHandle::new());
        writer.set_input(left.as_view(), None).unwrap();
        writer.add_unmatched_row(0);
        writer.add_matching_row(1);
        writer.add_unmatched_row(2);
        let (result, _) = writer.into_result().unwrap();
        assert_eq!(result.num_rows(), 3);
        assert_eq!(result.row(0).to_vec(), vec![int(1), ValueId::make_bool(false)]);
        assert_eq!(result.row(1).to_vec(), vec![int(2), ValueId::make_bool(true)]);
        assert_eq!(result.row(2).to_vec(), vec![int(3), ValueId::make_bool(false)]);
    }

    #[test]
    fn duplicate_matching_index_is_a_no_op() {
        let left = make_table(&[1, 2]);
        let output = IdTable::new(1);
        let mut writer = MinusExistsRowWriter::new(RowWriterMode::Minus, output, CancellationHandle::new());
        writer.set_input(left.as_view(), None).unwrap();
        writer.add_matching_row(0);
        writer.add_matching_row(0);
        writer.add_unmatched_row(1);
        let (result, _) = writer.into_result().unwrap();
        assert_eq!(result.num_rows(), 1);
        assert_eq!(result.column(0), &[int(2)]);
    }
}
