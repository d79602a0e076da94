// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! External (disk-backed) sort of an [`IdTable`] too large to sort
//! in memory: a push/spill phase followed by a k-way merge of the spilled
//! blocks built on `interval_heap`.
//!
//! Push phase: rows accumulate into an in-RAM block sized from the memory
//! budget (half of it, so one block can sort while a second one is being
//! filled and a third copy is in flight as a write buffer never needs to
//! exist at the same time as the first two). A full block is sorted in
//! place and handed to a background writer thread; at most one write is
//! ever in flight, so [`ExternalIdTableSorter::push`] blocks until the
//! previous spill completed before starting a new one. If nothing was ever
//! spilled, [`ExternalIdTableSorter::into_sorted`] skips the file entirely
//! and sorts the buffered rows in memory.

use super::writer::{CompressedExternalIdTableWriter, RowGenerator};
use crate::cancellation::CancellationHandle;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::id_table::IdTable;
use crate::value_id::ValueId;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

/// A row comparator: total order over join/sort-key rows. Implemented for
/// any `Fn(&[ValueId], &[ValueId]) -> Ordering` that is safely shareable
/// across the background spill-writer thread.
pub trait RowComparator: Fn(&[ValueId], &[ValueId]) -> Ordering + Send + Sync + 'static {}

impl<T> RowComparator for T where T: Fn(&[ValueId], &[ValueId]) -> Ordering + Send + Sync + 'static {}

fn sort_rows(rows: &mut [Vec<ValueId>], cmp: &impl RowComparator) {
    rows.sort_by(|a, b| cmp(a, b));
}

enum PendingSpill {
    None,
    InFlight(JoinHandle<Result<()>>),
}

/// Accumulates rows via repeated [`Self::push`] and yields them back in
/// sorted order via [`Self::into_sorted`]. `Cmp` is the total order to sort
/// by; callers typically project a subset of columns (the join or ORDER BY
/// keys) before comparing.
pub struct ExternalIdTableSorter<Cmp: RowComparator> {
    cmp: Arc<Cmp>,
    num_columns: usize,
    block_size_rows: usize,
    memory_limit_bytes: u64,
    min_output_block_rows: usize,
    buffer: Vec<Vec<ValueId>>,
    writer: CompressedExternalIdTableWriter,
    pending_spill: PendingSpill,
    num_spilled_blocks: usize,
    cancellation: CancellationHandle,
}

impl<Cmp: RowComparator> ExternalIdTableSorter<Cmp> {
    /// Creates a sorter for rows of `num_columns` columns, comparing with
    /// `cmp`, spilling to private temp files under `config`'s temp
    /// directory once the in-RAM buffer reaches half of
    /// `config.memory_limit_bytes()`.
    pub fn new(config: &Config, num_columns: usize, cmp: Cmp, cancellation: CancellationHandle) -> Result<Self> {
        Self::new_in(
            &config.temp_dir,
            config.memory_limit_bytes,
            config.compression,
            config.sorter_min_output_block_rows,
            num_columns,
            cmp,
            cancellation,
        )
    }

    /// As [`Self::new`], but with the temp directory, memory budget, and
    /// compression codec given explicitly rather than through a
    /// [`Config`].
    #[allow(clippy::too_many_arguments)]
    pub fn new_in(
        temp_dir: &Path,
        memory_limit_bytes: u64,
        compression: super::block::CompressionType,
        min_output_block_rows: usize,
        num_columns: usize,
        cmp: Cmp,
        cancellation: CancellationHandle,
    ) -> Result<Self> {
        let row_bytes = (num_columns * 8).max(1) as u64;
        let block_size_bytes = (memory_limit_bytes / 2).max(row_bytes);
        let block_size_rows = (block_size_bytes / row_bytes).max(1) as usize;
        let writer = CompressedExternalIdTableWriter::new(temp_dir, num_columns, compression, block_size_bytes)?;
        Ok(Self {
            cmp: Arc::new(cmp),
            num_columns,
            block_size_rows,
            memory_limit_bytes,
            min_output_block_rows,
            buffer: Vec::new(),
            writer,
            pending_spill: PendingSpill::None,
            num_spilled_blocks: 0,
            cancellation,
        })
    }

    /// Number of columns every pushed row must have.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Buffers one row, spilling the current buffer to disk once it
    /// reaches the configured block size.
    ///
    /// # Panics
    ///
    /// Panics if `row.len() != self.num_columns()`.
    pub fn push(&mut self, row: Vec<ValueId>) -> Result<()> {
        assert_eq!(row.len(), self.num_columns, "row width mismatch");
        self.cancellation.check()?;
        self.buffer.push(row);
        if self.buffer.len() >= self.block_size_rows {
            self.spill_buffer()?;
        }
        Ok(())
    }

    /// Buffers every row of `table`, an ergonomic shorthand over repeated
    /// [`Self::push`].
    pub fn push_table(&mut self, table: &IdTable) -> Result<()> {
        assert_eq!(table.num_columns(), self.num_columns, "column count mismatch");
        for row in table.rows() {
            self.push(row.to_vec())?;
        }
        Ok(())
    }

    fn spill_buffer(&mut self) -> Result<()> {
        self.wait_for_pending_spill()?;

        let mut rows = std::mem::take(&mut self.buffer);
        let cmp = Arc::clone(&self.cmp);
        sort_rows(&mut rows, &*cmp);

        let num_columns = self.num_columns;
        let mut table = IdTable::new(num_columns);
        for row in rows {
            table.push_row(&row);
        }

        let writer = self.writer.clone();
        self.num_spilled_blocks += 1;
        self.pending_spill = PendingSpill::InFlight(std::thread::spawn(move || writer.write_id_table(&table)));
        Ok(())
    }

    fn wait_for_pending_spill(&mut self) -> Result<()> {
        if let PendingSpill::InFlight(handle) = std::mem::replace(&mut self.pending_spill, PendingSpill::None) {
            handle.join().expect("spill-writer thread panicked")?;
        }
        Ok(())
    }

    /// Finishes accumulation and returns the fully sorted result as a
    /// lazily pulled row stream. If nothing was ever spilled to disk, this
    /// sorts and returns the in-RAM buffer directly without touching the
    /// filesystem (the small-input fast path).
    pub fn into_sorted(mut self) -> Result<SortedRows> {
        self.wait_for_pending_spill()?;

        if self.num_spilled_blocks == 0 {
            let mut rows = self.buffer;
            sort_rows(&mut rows, &*self.cmp);
            return Ok(SortedRows::InMemory(rows.into_iter()));
        }

        if !self.buffer.is_empty() {
            let mut rows = std::mem::take(&mut self.buffer);
            sort_rows(&mut rows, &*self.cmp);
            let mut table = IdTable::new(self.num_columns);
            for row in rows {
                table.push_row(&row);
            }
            self.writer.write_id_table(&table)?;
        }

        let generators = self.writer.all_row_generators();
        let output_block_rows =
            output_block_rows(self.memory_limit_bytes, self.num_columns, generators.len(), self.min_output_block_rows)?;
        Ok(SortedRows::Merging(MergingRows::new(generators, self.cmp, output_block_rows).into()))
    }
}

fn output_block_rows(memory_limit_bytes: u64, num_columns: usize, num_sources: usize, min_output_block_rows: usize) -> Result<usize> {
    let row_bytes = (num_columns * 8).max(1) as u64;
    let input_reservation = row_bytes * num_sources.max(1) as u64;
    let remaining = memory_limit_bytes.saturating_sub(input_reservation);
    let rows = remaining / row_bytes;
    if rows < min_output_block_rows as u64 {
        return Err(Error::MemoryLimit {
            requested: min_output_block_rows as u64 * row_bytes,
            available: remaining,
        });
    }
    Ok(rows as usize)
}

struct HeapEntry<Cmp: RowComparator> {
    source: usize,
    row: Vec<ValueId>,
    cmp_fn: Arc<Cmp>,
}

impl<Cmp: RowComparator> PartialEq for HeapEntry<Cmp> {
    fn eq(&self, other: &Self) -> bool {
        (self.cmp_fn)(&self.row, &other.row) == Ordering::Equal
    }
}

impl<Cmp: RowComparator> Eq for HeapEntry<Cmp> {}

impl<Cmp: RowComparator> PartialOrd for HeapEntry<Cmp> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Cmp: RowComparator> Ord for HeapEntry<Cmp> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.cmp_fn)(&self.row, &other.row)
    }
}

/// The k-way merge over every spilled sub-table, driven by an
/// `interval_heap::IntervalHeap` (only its min side is used here).
struct MergingRows<Cmp: RowComparator> {
    sources: Vec<RowGenerator>,
    heap: interval_heap::IntervalHeap<HeapEntry<Cmp>>,
    cmp: Arc<Cmp>,
    initialized: bool,
    output_block_rows: usize,
    error: Option<Error>,
}

impl<Cmp: RowComparator> MergingRows<Cmp> {
    fn new(sources: Vec<RowGenerator>, cmp: Arc<Cmp>, output_block_rows: usize) -> Self {
        let heap = interval_heap::IntervalHeap::with_capacity(sources.len().max(1));
        Self {
            sources,
            heap,
            cmp,
            initialized: false,
            output_block_rows,
            error: None,
        }
    }

    fn initialize(&mut self) {
        for (idx, source) in self.sources.iter_mut().enumerate() {
            match source.next_row() {
                Some(Ok(row)) => self.heap.push(HeapEntry {
                    source: idx,
                    row,
                    cmp_fn: Arc::clone(&self.cmp),
                }),
                Some(Err(e)) => self.error = Some(e),
                None => {}
            }
        }
        self.initialized = true;
    }
}

impl<Cmp: RowComparator> Iterator for MergingRows<Cmp> {
    type Item = Result<Vec<ValueId>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.initialized {
            self.initialize();
        }
        if let Some(e) = self.error.take() {
            return Some(Err(e));
        }

        let min = self.heap.pop_min()?;
        match self.sources[min.source].next_row() {
            Some(Ok(row)) => self.heap.push(HeapEntry {
                source: min.source,
                row,
                cmp_fn: Arc::clone(&self.cmp),
            }),
            Some(Err(e)) => self.error = Some(e),
            None => {}
        }
        Some(Ok(min.row))
    }
}

/// Lazily pulled, fully sorted output of an [`ExternalIdTableSorter`].
pub enum SortedRows {
    /// Nothing was ever spilled; rows are sorted in memory.
    InMemory(std::vec::IntoIter<Vec<ValueId>>),
    /// One or more blocks were spilled; rows are produced by a k-way merge
    /// read lazily from disk.
    Merging(MergingRowsDyn),
}

/// Type-erased wrapper so [`SortedRows`] does not need to be generic over
/// the comparator.
pub struct MergingRowsDyn {
    inner: Box<dyn Iterator<Item = Result<Vec<ValueId>>>>,
    output_block_rows: usize,
}

impl<Cmp: RowComparator> From<MergingRows<Cmp>> for MergingRowsDyn {
    fn from(value: MergingRows<Cmp>) -> Self {
        let output_block_rows = value.output_block_rows;
        Self {
            inner: Box::new(value),
            output_block_rows,
        }
    }
}

impl SortedRows {
    /// Pulls the next row, or `None` once every input is exhausted.
    pub fn next_row(&mut self) -> Option<Result<Vec<ValueId>>> {
        match self {
            Self::InMemory(iter) => iter.next().map(Ok),
            Self::Merging(merging) => merging.inner.next(),
        }
    }

    /// Pulls the next block of up to the merge phase's output block size,
    /// or `None` once exhausted.
    pub fn next_block(&mut self) -> Option<Result<Vec<Vec<ValueId>>>> {
        let block_size = match self {
            Self::InMemory(_) => usize::MAX,
            Self::Merging(merging) => merging.output_block_rows,
        };
        let mut block = Vec::new();
        for _ in 0..block_size {
            match self.next_row() {
                Some(Ok(row)) => block.push(row),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        if block.is_empty() {
            None
        } else {
            Some(Ok(block))
        }
    }
}

impl Iterator for SortedRows {
    type Item = Result<Vec<ValueId>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row()
    }
}

impl crate::join::BlockSource for SortedRows {
    fn next_block(&mut self) -> Option<Result<Vec<Vec<ValueId>>>> {
        SortedRows::next_block(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use test_log::test;

    fn int(v: i64) -> ValueId {
        ValueId::make_int(v)
    }

    fn by_first_column(a: &[ValueId], b: &[ValueId]) -> Ordering {
        a[0].cmp(&b[0])
    }

    fn sorter(config: &Config, num_columns: usize) -> ExternalIdTableSorter<impl RowComparator> {
        ExternalIdTableSorter::new(config, num_columns, by_first_column, CancellationHandle::new()).unwrap()
    }

    #[test]
    fn small_input_never_spills() {
        let config = Config::default();
        let mut sorter = sorter(&config, 1);
        for v in [5, 1, 3, 2, 4] {
            sorter.push(vec![int(v)]).unwrap();
        }
        let rows: Vec<_> = sorter.into_sorted().unwrap().map(|r| r.unwrap()[0]).collect();
        assert_eq!(rows, vec![int(1), int(2), int(3), int(4), int(5)]);
    }

    #[test]
    fn large_input_spills_and_merges() {
        let mut config = Config::new(std::env::temp_dir()).memory_limit_bytes(4_000);
        config.sorter_min_output_block_rows = 1;
        let mut sorter = sorter(&config, 1);
        let mut rng = StdRng::seed_from_u64(42);
        let mut expected: Vec<i64> = (0..2_000).map(|_| rng.random_range(-10_000..10_000)).collect();
        for &v in &expected {
            sorter.push(vec![int(v)]).unwrap();
        }
        expected.sort_unstable();

        let rows: Vec<_> = sorter.into_sorted().unwrap().map(|r| r.unwrap()[0].as_int()).collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn merge_is_stable_across_many_small_blocks() {
        let mut config = Config::new(std::env::temp_dir()).memory_limit_bytes(200);
        config.sorter_min_output_block_rows = 1;
        let mut sorter = sorter(&config, 2);
        for i in 0..50i64 {
            sorter.push(vec![int(i % 5), int(i)]).unwrap();
        }
        let rows: Vec<_> = sorter.into_sorted().unwrap().map(|r| r.unwrap()).collect();
        for pair in rows.windows(2) {
            assert!(pair[0][0].as_int() <= pair[1][0].as_int());
        }
        assert_eq!(rows.len(), 50);
    }
}
