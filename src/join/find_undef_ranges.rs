// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! For a single sorted range of join-key rows, find every row strictly
//! smaller than a given probe row that is nonetheless *compatible* with it
//! because of UNDEF.
//!
//! Three variants trade generality for speed; [`find_smaller_undef_ranges`]
//! inspects the probe row once and dispatches to the cheapest applicable
//! one.
//!
//! Each variant returns `(matches, result_might_be_unsorted)` instead of
//! writing through an output parameter, since there is no natural Rust
//! analogue for a borrowed out-flag threaded through what would otherwise
//! be a generator callback.

use crate::value_id::{rows_compatible, ValueId};

fn lower_bound(rows: &[Vec<ValueId>], begin: usize, end: usize, key: &[ValueId]) -> usize {
    begin + rows[begin..end].partition_point(|row| row.as_slice() < key)
}

fn upper_bound(rows: &[Vec<ValueId>], begin: usize, end: usize, key: &[ValueId]) -> usize {
    begin + rows[begin..end].partition_point(|row| row.as_slice() <= key)
}

fn lower_bound_by_prefix(rows: &[Vec<ValueId>], begin: usize, end: usize, prefix: &[ValueId]) -> usize {
    let n = prefix.len();
    begin + rows[begin..end].partition_point(|row| row[..n] < *prefix)
}

fn upper_bound_by_prefix(rows: &[Vec<ValueId>], begin: usize, end: usize, prefix: &[ValueId]) -> usize {
    let n = prefix.len();
    begin + rows[begin..end].partition_point(|row| row[..n] <= *prefix)
}

/// Precondition: `row` contains no UNDEF value anywhere.
///
/// Runs in `O(2^C log N)`: enumerates every mask of `row`'s columns
/// replaced by `UNDEF` and finds rows that are *bitwise equal* to the
/// masked row (which is exactly the set of rows compatible with `row` via
/// that particular subset of UNDEF columns).
#[must_use]
pub fn find_smaller_undef_ranges_for_rows_without_undef(
    row: &[ValueId],
    rows: &[Vec<ValueId>],
    begin: usize,
    end: usize,
) -> Vec<usize> {
    debug_assert!(row.iter().all(|id| !id.is_undefined()));
    let num_cols = row.len();
    let mut matches = Vec::new();
    let upper_mask = 1usize << num_cols;
    // Skip the all-ones mask: that reproduces `row` itself, which is an
    // exact match, not a strictly-smaller compatible one.
    for mask in 0..upper_mask - 1 {
        let masked: Vec<ValueId> = (0..num_cols)
            .map(|j| {
                let bit = (mask >> (num_cols - j - 1)) & 1;
                if bit == 1 {
                    row[j]
                } else {
                    ValueId::UNDEF
                }
            })
            .collect();
        let lo = lower_bound(rows, begin, end, &masked);
        let hi = upper_bound(rows, begin, end, &masked);
        matches.extend(lo..hi);
    }
    matches
}

/// Precondition: `row`'s last `num_last_undefined` columns are `UNDEF` and
/// every other column is defined.
///
/// Runs in `O(2^(C-k) log N)`, `k = num_last_undefined`: masks only the
/// defined prefix, then widens each binary-search hit to cover every
/// possible value of the trailing `k` columns (which are compatible with
/// `row`'s UNDEF tail regardless of their actual contents).
#[must_use]
pub fn find_smaller_undef_ranges_for_rows_with_undef_in_last_columns(
    row: &[ValueId],
    num_last_undefined: usize,
    rows: &[Vec<ValueId>],
    begin: usize,
    end: usize,
    result_might_be_unsorted: &mut bool,
) -> Vec<usize> {
    let num_cols = row.len();
    debug_assert!(num_cols >= num_last_undefined);
    let num_defined = num_cols - num_last_undefined;
    debug_assert!(row[..num_defined].iter().all(|id| !id.is_undefined()));
    debug_assert!(row[num_defined..].iter().all(|id| id.is_undefined()));

    // If every column is UNDEF, `row` is already the smallest possible row:
    // nothing can be strictly smaller.
    if num_last_undefined == num_cols {
        return Vec::new();
    }

    let mut matches = Vec::new();
    let upper_mask = 1usize << num_defined;
    for mask in 0..upper_mask - 1 {
        let prefix: Vec<ValueId> = (0..num_defined)
            .map(|j| {
                let bit = (mask >> (num_defined - j - 1)) & 1;
                if bit == 1 {
                    row[j]
                } else {
                    ValueId::UNDEF
                }
            })
            .collect();
        let lo = lower_bound_by_prefix(rows, begin, end, &prefix);
        let hi = upper_bound_by_prefix(rows, begin, end, &prefix);
        if lo < hi {
            *result_might_be_unsorted = true;
            matches.extend(lo..hi);
        }
    }
    matches
}

/// No precondition on `row`'s UNDEF pattern. Runs in `O(N * C)`: a linear
/// compatibility scan bounded above by `row` itself.
#[must_use]
pub fn find_smaller_undef_ranges_arbitrary(
    row: &[ValueId],
    rows: &[Vec<ValueId>],
    begin: usize,
    end: usize,
    result_might_be_unsorted: &mut bool,
) -> Vec<usize> {
    let bounded_end = lower_bound(rows, begin, end, row);
    let mut matches = Vec::new();
    for i in begin..bounded_end {
        if rows_compatible(row, &rows[i]) {
            *result_might_be_unsorted = true;
            matches.push(i);
        }
    }
    matches
}

/// Inspects `row`'s trailing UNDEF pattern once and calls the cheapest
/// applicable variant above. Always correct; callers with extra knowledge
/// (e.g. "this column never contains UNDEF") should call a specific variant
/// directly instead.
#[must_use]
pub fn find_smaller_undef_ranges(
    row: &[ValueId],
    rows: &[Vec<ValueId>],
    begin: usize,
    end: usize,
) -> (Vec<usize>, bool) {
    assert!(!row.is_empty());
    let mut num_last_undefined = 0;
    for id in row.iter().rev() {
        if id.is_undefined() {
            num_last_undefined += 1;
        } else {
            break;
        }
    }
    let num_defined = row.len() - num_last_undefined;
    if row[..num_defined].iter().any(|id| id.is_undefined()) {
        let mut unsorted = false;
        let matches = find_smaller_undef_ranges_arbitrary(row, rows, begin, end, &mut unsorted);
        return (matches, unsorted);
    }
    if num_last_undefined == 0 {
        let matches = find_smaller_undef_ranges_for_rows_without_undef(row, rows, begin, end);
        (matches, false)
    } else {
        let mut unsorted = false;
        let matches = find_smaller_undef_ranges_for_rows_with_undef_in_last_columns(
            row,
            num_last_undefined,
            rows,
            begin,
            end,
            &mut unsorted,
        );
        (matches, unsorted)
    }
}
