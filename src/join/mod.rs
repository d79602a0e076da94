// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Block-wise join algorithms over sorted join-key rows, all correct in
//! the presence of SPARQL OPTIONAL/UNDEF three-valued logic. These
//! drivers work over `&[Vec<ValueId>]` (the projected
//! join-column values of a result), not over [`crate::id_table::IdTable`]
//! directly: operators extract the join columns, run a driver here, and
//! materialize matched `(left_row, right_row)` pairs through
//! [`crate::combined_row_writer::CombinedRowWriter`].

pub mod block_at_a_time;
pub mod find_undef_ranges;
pub mod galloping;
pub mod zipper;

pub use block_at_a_time::{block_at_a_time_join, BlockSource, VecBlockSource};
pub use find_undef_ranges::find_smaller_undef_ranges;
pub use galloping::galloping_join;
pub use zipper::zipper_join_with_undef;

/// Whether a join driver's output is fully ordered by the caller's
/// less-than relation, or contains one or more out-of-order runs caused by
/// UNDEF values matching across columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSortedness {
    /// Every emitted row is consistent with the input ordering.
    Sorted,
    /// The output consists of two sorted runs; the second one is `k` rows
    /// long and sits at the end (produced by OPTIONAL/MINUS rows with no
    /// match, appended after the main merge).
    TrailingUnsorted(usize),
    /// UNDEF values in different columns caused rows to be emitted out of
    /// order throughout the output, not just in a trailing run. The
    /// caller must re-sort if order matters.
    FullyUnsorted,
}

impl JoinSortedness {
    /// `true` if no re-sort is required.
    #[must_use]
    pub fn is_sorted(self) -> bool {
        matches!(self, Self::Sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn sortedness_is_sorted_only_for_sorted_variant() {
        assert!(JoinSortedness::Sorted.is_sorted());
        assert!(!JoinSortedness::TrailingUnsorted(3).is_sorted());
        assert!(!JoinSortedness::FullyUnsorted.is_sorted());
    }
}
