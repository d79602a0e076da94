// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`CompressedExternalIdTableWriter`]: append-only, per-column
//! block-compressed storage of a sequence of [`IdTable`]s in one file.
//!
//! Blocks are written with `pwrite`/`pread`-style positional I/O
//! (`std::os::{unix,windows}::fs::FileExt`) rather than a shared seek
//! cursor, so that [`Self::write_id_table`]'s per-column threads can append
//! concurrently and a [`RowGenerator`] can decompress a block without
//! coordinating a cursor with anyone else; the file's
//! [`std::sync::RwLock`] exists so writers take the write lock briefly per
//! block while readers hold read locks for the decompression I/O, not
//! because positional I/O itself needs it.

use super::block::{BlockMetadata, CompressionType};
use super::temp_file::TempTableFile;
use crate::error::{Error, ErrorContext, Result};
use crate::id_table::IdTable;
use crate::join::BlockSource;
use crate::value_id::ValueId;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

const VALUE_ID_BYTES: u64 = 8;

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_read(buf, offset)?;
        offset += n as u64;
        buf = &mut buf[n..];
    }
    Ok(())
}

#[cfg(windows)]
fn pwrite(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_write(buf, offset)?;
        offset += n as u64;
        buf = &buf[n..];
    }
    Ok(())
}

struct WriterState {
    /// One block-metadata sequence per column, the concatenation of every
    /// stored sub-table's blocks for that column.
    blocks_per_column: Vec<Vec<BlockMetadata>>,
    /// For each stored sub-table, the index into `blocks_per_column[_]`
    /// where its blocks begin.
    start_of_tables: Vec<usize>,
    /// Current end-of-file offset; the next appended block is written here.
    file_len: u64,
}

struct WriterInner {
    _temp_file: TempTableFile,
    file: RwLock<File>,
    num_columns: usize,
    block_size_rows: usize,
    compression: CompressionType,
    state: Mutex<WriterState>,
    num_active_generators: AtomicUsize,
}

/// Append-only, per-column block-compressed storage for a sequence of
/// [`IdTable`]s, all sharing `num_columns`. Cheaply cloneable: clones share
/// the same backing file and metadata (an `Arc` handle), which is what lets
/// [`RowGenerator`]s outlive the call that created them.
#[derive(Clone)]
pub struct CompressedExternalIdTableWriter {
    inner: Arc<WriterInner>,
}

impl CompressedExternalIdTableWriter {
    /// Creates a writer backed by a fresh private temp file under
    /// `temp_dir`. `block_size_bytes` is the uncompressed per-block byte
    /// budget (the configured default is 500 kB).
    pub fn new(temp_dir: &Path, num_columns: usize, compression: CompressionType, block_size_bytes: u64) -> Result<Self> {
        let block_size_rows = (block_size_bytes / VALUE_ID_BYTES).max(1) as usize;
        let temp_file = TempTableFile::new(temp_dir)?;
        let file = temp_file.reopen()?;
        Ok(Self {
            inner: Arc::new(WriterInner {
                _temp_file: temp_file,
                file: RwLock::new(file),
                num_columns,
                block_size_rows,
                compression,
                state: Mutex::new(WriterState {
                    blocks_per_column: (0..num_columns).map(|_| Vec::new()).collect(),
                    start_of_tables: Vec::new(),
                    file_len: 0,
                }),
                num_active_generators: AtomicUsize::new(0),
            }),
        })
    }

    /// Number of columns every stored [`IdTable`] must have.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.inner.num_columns
    }

    /// Number of sub-tables stored so far.
    #[must_use]
    pub fn num_tables(&self) -> usize {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).start_of_tables.len()
    }

    fn check_not_iterated(&self, operator: &str) -> Result<()> {
        if self.inner.num_active_generators.load(Ordering::Acquire) != 0 {
            return Err(Error::RuntimeTypeError(
                ErrorContext::new(operator).with_detail("writer is currently being iterated over"),
            ));
        }
        Ok(())
    }

    /// Splits each column of `table` into blocks of the configured
    /// uncompressed size, compresses columns **in parallel**, appends them
    /// to the backing file, and records the new sub-table's block-metadata
    /// offsets.
    ///
    /// # Errors
    ///
    /// Fails if a [`RowGenerator`]/[`BlockGenerator`] produced by this
    /// writer is still alive: writing while a generator is iterating the
    /// file would invalidate the offsets it is reading from.
    pub fn write_id_table(&self, table: &IdTable) -> Result<()> {
        self.check_not_iterated("CompressedExternalIdTableWriter::write_id_table")?;
        assert_eq!(table.num_columns(), self.inner.num_columns, "column count mismatch");

        let block_size = self.inner.block_size_rows;
        let num_columns = self.inner.num_columns;
        let compression = self.inner.compression;

        let per_column_blocks: Vec<Vec<(BlockMetadata, Vec<u8>)>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..num_columns)
                .map(|col| {
                    let column = table.column(col);
                    scope.spawn(move || compress_column_blocks(column, block_size, compression))
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("compression thread panicked")).collect::<Result<Vec<_>>>()
        })?;

        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state.start_of_tables.push(state.blocks_per_column.first().map_or(0, Vec::len));
        for (col, blocks) in per_column_blocks.into_iter().enumerate() {
            for (mut metadata, payload) in blocks {
                let file = self.inner.file.write().unwrap_or_else(|e| e.into_inner());
                let offset = state.file_len;
                pwrite(&file, &payload, offset)?;
                metadata.offset = offset;
                state.file_len += payload.len() as u64;
                state.blocks_per_column[col].push(metadata);
            }
        }
        log::trace!(
            "wrote sub-table {} ({} rows) to external storage",
            state.start_of_tables.len() - 1,
            table.num_rows()
        );
        Ok(())
    }

    /// Returns one [`BlockGenerator`] per stored sub-table, in storage
    /// order. Each generator holds a read handle on the file and keeps
    /// [`Self::write_id_table`] from succeeding until it (and every other
    /// live generator) is dropped.
    pub fn all_block_generators(&self) -> Vec<BlockGenerator> {
        let state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        (0..state.start_of_tables.len()).map(|i| self.block_generator_for(&state, i)).collect()
    }

    /// Returns one [`RowGenerator`] per stored sub-table; rows are the
    /// flattening of that sub-table's blocks.
    pub fn all_row_generators(&self) -> Vec<RowGenerator> {
        self.all_block_generators().into_iter().map(RowGenerator::new).collect()
    }

    fn block_generator_for(&self, state: &WriterState, table_index: usize) -> BlockGenerator {
        let first_block = state.start_of_tables[table_index];
        let last_block = state
            .start_of_tables
            .get(table_index + 1)
            .copied()
            .unwrap_or_else(|| state.blocks_per_column.first().map_or(0, Vec::len));
        self.inner.num_active_generators.fetch_add(1, Ordering::AcqRel);
        BlockGenerator {
            inner: Arc::clone(&self.inner),
            next_block: first_block,
            last_block,
        }
    }

    /// Deletes the underlying file's contents and resets all metadata so
    /// the writer can be reused.
    ///
    /// # Errors
    ///
    /// Fails while any generator is still alive, for the same reason as
    /// [`Self::write_id_table`].
    pub fn clear(&self) -> Result<()> {
        self.check_not_iterated("CompressedExternalIdTableWriter::clear")?;
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        let file = self.inner.file.write().unwrap_or_else(|e| e.into_inner());
        file.set_len(0)?;
        for column in &mut state.blocks_per_column {
            column.clear();
        }
        state.start_of_tables.clear();
        state.file_len = 0;
        Ok(())
    }
}

fn compress_column_blocks(
    column: &[ValueId],
    block_size_rows: usize,
    compression: CompressionType,
) -> Result<Vec<(BlockMetadata, Vec<u8>)>> {
    let mut out = Vec::new();
    for chunk in column.chunks(block_size_rows.max(1)) {
        let mut raw = Vec::with_capacity(chunk.len() * VALUE_ID_BYTES as usize);
        for id in chunk {
            crate::coding::Encode::encode_into(id, &mut raw)?;
        }
        let compressed = compression.compress(&raw)?;
        out.push((
            BlockMetadata {
                compressed_size: compressed.len() as u64,
                uncompressed_size: raw.len() as u64,
                offset: 0, // filled in by the caller under the state lock
                checksum: BlockMetadata::checksum_of(&compressed),
            },
            compressed,
        ));
    }
    Ok(out)
}

/// A lazy pull source over one stored sub-table's blocks, yielded as
/// decompressed [`IdTable`]s. Columns within a block are decompressed in
/// parallel. Input-only: not restartable; [`RowGenerator`] is the row-level
/// flattening of this block-level generator.
pub struct BlockGenerator {
    inner: Arc<WriterInner>,
    next_block: usize,
    last_block: usize,
}

impl BlockGenerator {
    /// Pulls the next block, or `None` once this sub-table is exhausted.
    pub fn next_block(&mut self) -> Option<Result<IdTable>> {
        if self.next_block >= self.last_block {
            return None;
        }
        let result = self.read_block(self.next_block);
        self.next_block += 1;
        Some(result)
    }

    fn read_block(&self, block_index: usize) -> Result<IdTable> {
        let (metadata, uncompressed_size, compression): (Vec<BlockMetadata>, u64, CompressionType) = {
            let state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            let metadata: Vec<BlockMetadata> =
                (0..self.inner.num_columns).map(|col| state.blocks_per_column[col][block_index]).collect();
            let uncompressed_size = metadata[0].uncompressed_size;
            (metadata, uncompressed_size, self.inner.compression)
        };
        let num_rows = (uncompressed_size / VALUE_ID_BYTES) as usize;
        let num_columns = self.inner.num_columns;

        let columns: Vec<Vec<ValueId>> = std::thread::scope(|scope| {
            let file = self.inner.file.read().unwrap_or_else(|e| e.into_inner());
            let handles: Vec<_> = metadata
                .iter()
                .map(|meta| {
                    let file = &*file;
                    scope.spawn(move || decompress_column(file, *meta, compression, num_rows))
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("decompression thread panicked")).collect::<Result<Vec<_>>>()
        })?;

        let mut table = IdTable::new(num_columns);
        table.resize(num_rows);
        for (col, values) in columns.into_iter().enumerate() {
            table.column_mut(col).copy_from_slice(&values);
        }
        Ok(table)
    }
}

impl Drop for BlockGenerator {
    fn drop(&mut self) {
        self.inner.num_active_generators.fetch_sub(1, Ordering::AcqRel);
    }
}

fn decompress_column(file: &File, metadata: BlockMetadata, compression: CompressionType, num_rows: usize) -> Result<Vec<ValueId>> {
    let mut compressed = vec![0u8; metadata.compressed_size as usize];
    pread(file, &mut compressed, metadata.offset)?;
    metadata.verify(&compressed)?;
    let raw = compression.decompress(&compressed, metadata.uncompressed_size as usize)?;
    let mut reader = std::io::Cursor::new(raw);
    (0..num_rows).map(|_| Ok(crate::coding::Decode::decode_from(&mut reader)?)).collect()
}

/// The row-by-row flattening of a [`BlockGenerator`]'s blocks. Implements
/// [`BlockSource`] so it can feed
/// [`crate::join::block_at_a_time_join`] directly.
pub struct RowGenerator {
    blocks: BlockGenerator,
    current: Option<IdTable>,
    row_in_current: usize,
}

impl RowGenerator {
    fn new(blocks: BlockGenerator) -> Self {
        Self {
            blocks,
            current: None,
            row_in_current: 0,
        }
    }

    /// Pulls the next row, or `None` once every block is exhausted.
    pub fn next_row(&mut self) -> Option<Result<Vec<ValueId>>> {
        loop {
            if let Some(table) = &self.current {
                if self.row_in_current < table.num_rows() {
                    let row = table.row(self.row_in_current).to_vec();
                    self.row_in_current += 1;
                    return Some(Ok(row));
                }
            }
            match self.blocks.next_block() {
                Some(Ok(table)) => {
                    self.current = Some(table);
                    self.row_in_current = 0;
                }
                Some(Err(e)) => return Some(Err(e)),
                None => return None,
            }
        }
    }
}

impl Iterator for RowGenerator {
    type Item = Result<Vec<ValueId>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row()
    }
}

impl BlockSource for RowGenerator {
    fn next_block(&mut self) -> Option<Result<Vec<Vec<ValueId>>>> {
        self.blocks.next_block().map(|r| r.map(|table| table.rows().map(|row| row.to_vec()).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn int(v: i64) -> ValueId {
        ValueId::make_int(v)
    }

    fn make_table(rows: &[&[i64]]) -> IdTable {
        let num_cols = rows.first().map_or(0, |r| r.len());
        let mut table = IdTable::new(num_cols);
        for row in rows {
            table.push_row(&row.iter().map(|&v| int(v)).collect::<Vec<_>>());
        }
        table
    }

    #[test]
    fn write_and_read_back_single_table() {
        let writer =
            CompressedExternalIdTableWriter::new(&std::env::temp_dir(), 2, CompressionType::Zstd(3), 1_000).unwrap();
        let table = make_table(&[&[1, 2], &[3, 4], &[5, 6]]);
        writer.write_id_table(&table).unwrap();

        let mut generators = writer.all_row_generators();
        assert_eq!(generators.len(), 1);
        let rows: Vec<_> = generators.remove(0).map(|r| r.unwrap()).collect();
        assert_eq!(rows, vec![vec![int(1), int(2)], vec![int(3), int(4)], vec![int(5), int(6)]]);
    }

    #[test]
    fn write_splits_into_multiple_blocks() {
        // block size 8 bytes == 1 row per block.
        let writer = CompressedExternalIdTableWriter::new(&std::env::temp_dir(), 1, CompressionType::None, 8).unwrap();
        let table = make_table(&[&[1], &[2], &[3], &[4]]);
        writer.write_id_table(&table).unwrap();

        let mut generators = writer.all_row_generators();
        let rows: Vec<_> = generators.remove(0).map(|r| r.unwrap()).collect();
        assert_eq!(rows, vec![vec![int(1)], vec![int(2)], vec![int(3)], vec![int(4)]]);
    }

    #[test]
    fn multiple_subtables_get_independent_generators() {
        let writer = CompressedExternalIdTableWriter::new(&std::env::temp_dir(), 1, CompressionType::Zstd(1), 1_000).unwrap();
        writer.write_id_table(&make_table(&[&[1], &[2]])).unwrap();
        writer.write_id_table(&make_table(&[&[3]])).unwrap();

        let generators = writer.all_row_generators();
        assert_eq!(generators.len(), 2);
        let all: Vec<Vec<_>> = generators.into_iter().map(|g| g.map(|r| r.unwrap()).collect()).collect();
        assert_eq!(all, vec![vec![vec![int(1)], vec![int(2)]], vec![vec![int(3)]]]);
    }

    #[test]
    fn write_fails_while_a_generator_is_alive() {
        let writer = CompressedExternalIdTableWriter::new(&std::env::temp_dir(), 1, CompressionType::None, 1_000).unwrap();
        writer.write_id_table(&make_table(&[&[1]])).unwrap();
        let generator = writer.all_row_generators();
        let err = writer.write_id_table(&make_table(&[&[2]])).unwrap_err();
        assert!(matches!(err, Error::RuntimeTypeError(_)));
        drop(generator);
        assert!(writer.write_id_table(&make_table(&[&[2]])).is_ok());
    }

    #[test]
    fn clear_resets_state() {
        let writer = CompressedExternalIdTableWriter::new(&std::env::temp_dir(), 1, CompressionType::None, 1_000).unwrap();
        writer.write_id_table(&make_table(&[&[1]])).unwrap();
        writer.clear().unwrap();
        assert_eq!(writer.num_tables(), 0);
        writer.write_id_table(&make_table(&[&[9]])).unwrap();
        let mut generators = writer.all_row_generators();
        let rows: Vec<_> = generators.remove(0).map(|r| r.unwrap()).collect();
        assert_eq!(rows, vec![vec![int(9)]]);
    }
}
