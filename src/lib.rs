// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Column-oriented result tables, block-wise joins under SPARQL's
//! three-valued OPTIONAL/UNDEF logic, and external (disk-backed)
//! compressed sorting, for use as the execution core beneath a SPARQL
//! query engine.
//!
//! ##### NOTE
//!
//! > This crate provides the execution primitives a query engine's
//! > operators are built from: a result table, join drivers, a combined
//! > row writer, external storage and sort, and a deduplicating result
//! > cache. It does not parse SPARQL, plan queries, or talk to a global
//! > RDF vocabulary; those concerns live in the engine that embeds this
//! > crate.
//!
//! ##### About
//!
//! A query result is an [`id_table::IdTable`]: a column-major table of
//! 64-bit tagged [`value_id::ValueId`]s, where each column holds either a
//! vocabulary reference, an inlined literal (int/double/bool/date), or the
//! distinguished `UNDEF` value OPTIONAL joins produce for unmatched
//! columns. Operators that introduce literal strings not already in the
//! global vocabulary (e.g. `BIND`/`CONCAT`) register them in a
//! [`local_vocab::LocalVocab`] carried alongside the table.
//!
//! Joins are implemented as standalone functions over sorted join-key rows
//! rather than as methods on any one type:
//! [`join::zipper_join_with_undef`] (the general case, correct for UNDEF
//! in any column), [`join::galloping_join`] (for UNDEF-free inputs of very
//! different sizes), and [`join::block_at_a_time_join`] (for lazily
//! produced, block-streamed inputs). Operators turn a join driver's
//! `(left_index, right_index)` callback into an actual result table via a
//! [`combined_row_writer::CombinedRowWriter`] (inner joins and OPTIONAL)
//! or a [`combined_row_writer::minus_exists::MinusExistsRowWriter`] (MINUS
//! and EXISTS).
//!
//! When a result would not fit in memory, [`external::ExternalIdTableSorter`]
//! spills sorted runs to private, block-compressed temp files and merges
//! them back into a single sorted row stream; the same file format backs
//! [`external::CompressedExternalIdTableWriter`] for plain (non-sorting)
//! spilling. [`cache::CacheAdapter`] wraps both of these so that
//! concurrent requests for the same cached query result dedup onto a
//! single computation rather than recomputing or racing.
//!
//! # Example usage
//!
//! ```
//! use qlever_exec_core::id_table::IdTable;
//! use qlever_exec_core::value_id::ValueId;
//! use qlever_exec_core::join::zipper_join_with_undef;
//! use qlever_exec_core::cancellation::CancellationHandle;
//!
//! let mut left = IdTable::new(1);
//! left.push_row(&[ValueId::make_int(1)]);
//! left.push_row(&[ValueId::make_int(2)]);
//!
//! let mut right = IdTable::new(1);
//! right.push_row(&[ValueId::make_int(2)]);
//! right.push_row(&[ValueId::make_int(3)]);
//!
//! let left_rows: Vec<_> = left.rows().map(|r| r.to_vec()).collect();
//! let right_rows: Vec<_> = right.rows().map(|r| r.to_vec()).collect();
//!
//! let mut matches = Vec::new();
//! zipper_join_with_undef(
//!     &left_rows,
//!     &right_rows,
//!     false,
//!     false,
//!     |l, r| matches.push((l, r)),
//!     None,
//!     &CancellationHandle::new(),
//! )?;
//! assert_eq!(matches, vec![(1, 0)]);
//! # Ok::<(), qlever_exec_core::error::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

pub mod allocator;
pub mod cache;
pub mod cancellation;
pub mod combined_row_writer;
pub mod config;

#[doc(hidden)]
pub mod coding;

pub mod error;
pub mod external;
pub mod id_table;
pub mod join;
pub mod local_vocab;
pub mod value_id;

pub use allocator::{MemoryLimit, ReservationGuard};
pub use cache::{CacheAdapter, ResultAndCacheStatus, UnitWeighter};
pub use cancellation::CancellationHandle;
pub use combined_row_writer::CombinedRowWriter;
pub use config::Config;
pub use error::{Error, ErrorContext, Result};
pub use id_table::IdTable;
pub use local_vocab::LocalVocab;
pub use value_id::{Datatype, ValueId};
