// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::external::CompressionType;
use std::path::{Path, PathBuf};

/// Execution-wide configuration, built with a consuming-builder API.
///
/// Defaults: a 500 kB uncompressed block size, a 100,000-row
/// combined-row-writer buffer, and zstd level 3 for on-disk blocks (every
/// spilled block is compressed; callers who never spill can still opt
/// into `CompressionType::None` explicitly).
#[derive(Clone, Debug)]
pub struct Config {
    /// Folder used for external (on-disk) table and sorter temp files.
    pub temp_dir: PathBuf,

    /// Compression algorithm used for on-disk column blocks.
    pub compression: CompressionType,

    /// Uncompressed byte budget per on-disk block (default
    /// 500 kB).
    pub block_size_bytes: u64,

    /// Number of buffered `(leftIdx, rightIdx)` records before a
    /// [`crate::combined_row_writer::CombinedRowWriter`] auto-flushes.
    pub join_buffer_size: usize,

    /// Process-wide memory budget enforced by [`crate::allocator::MemoryLimit`].
    pub memory_limit_bytes: u64,

    /// Byte capacity of the query-result cache.
    pub cache_capacity_bytes: u64,

    /// Maximum number of entries the query-result cache may hold.
    pub cache_capacity_entries: u64,

    /// An entry larger than this many bytes is never cached (a per-entry
    /// byte budget).
    pub cache_max_entry_size_bytes: u64,

    /// Minimum output block size, in rows, the external sorter's merge
    /// phase will accept before failing with a memory-limit error.
    pub sorter_min_output_block_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            compression: CompressionType::Zstd(3),
            block_size_bytes: /* 500 kB */ 500_000,
            join_buffer_size: 100_000,
            memory_limit_bytes: /* 4 GiB */ 4 * 1_024 * 1_024 * 1_024,
            cache_capacity_bytes: /* 1 GiB */ 1_024 * 1_024 * 1_024,
            cache_capacity_entries: 1_000,
            cache_max_entry_size_bytes: /* 100 MiB */ 100 * 1_024 * 1_024,
            sorter_min_output_block_rows: 10_000,
        }
    }
}

impl Config {
    /// Initializes a new config rooted at `temp_dir` for external storage.
    #[must_use]
    pub fn new<P: AsRef<Path>>(temp_dir: P) -> Self {
        Self {
            temp_dir: temp_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Sets the compression algorithm used for on-disk column blocks.
    #[must_use]
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the uncompressed block size, in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is 0.
    #[must_use]
    pub fn block_size_bytes(mut self, bytes: u64) -> Self {
        assert!(bytes > 0, "block size must be positive");
        self.block_size_bytes = bytes;
        self
    }

    /// Sets the combined-row-writer flush buffer size, in rows.
    ///
    /// # Panics
    ///
    /// Panics if `rows` is 0.
    #[must_use]
    pub fn join_buffer_size(mut self, rows: usize) -> Self {
        assert!(rows > 0, "join buffer size must be positive");
        self.join_buffer_size = rows;
        self
    }

    /// Sets the process-wide memory budget, in bytes.
    #[must_use]
    pub fn memory_limit_bytes(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    /// Sets the query-result cache's byte capacity.
    #[must_use]
    pub fn cache_capacity_bytes(mut self, bytes: u64) -> Self {
        self.cache_capacity_bytes = bytes;
        self
    }

    /// Sets the query-result cache's entry-count capacity.
    #[must_use]
    pub fn cache_capacity_entries(mut self, entries: u64) -> Self {
        self.cache_capacity_entries = entries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn default_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.block_size_bytes, 500_000);
        assert_eq!(config.join_buffer_size, 100_000);
    }

    #[test]
    fn builder_overrides_apply() {
        let config = Config::new(std::env::temp_dir())
            .block_size_bytes(1_000)
            .join_buffer_size(7);
        assert_eq!(config.block_size_bytes, 1_000);
        assert_eq!(config.join_buffer_size, 7);
    }

    #[test]
    #[should_panic(expected = "block size must be positive")]
    fn zero_block_size_panics() {
        let _ = Config::default().block_size_bytes(0);
    }
}
