// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Galloping join: the smaller input is walked linearly, the larger one by
//! exponential-then-binary search. Neither input may
//! contain UNDEF.

use crate::cancellation::CancellationHandle;
use crate::error::Result;
use crate::value_id::ValueId;

/// Exponential search for the first element of `larger[from..]` that is
/// `>= probe`, returning `(lower, upper)` such that the answer lies in
/// `larger[lower..upper]`. If the whole remaining range is `< probe`,
/// returns `upper == larger.len()`.
fn exponential_search(larger: &[Vec<ValueId>], from: usize, probe: &[ValueId]) -> (usize, usize) {
    let mut step = 1usize;
    let mut lower = from;
    let mut cursor = from;
    while cursor < larger.len() && larger[cursor].as_slice() < probe {
        lower = cursor;
        cursor += step;
        step *= 2;
    }
    let upper = (cursor + 1).min(larger.len());
    (lower, upper)
}

/// Runs the galloping join of `smaller` against `larger`, both sorted and
/// UNDEF-free, calling `action(smaller_idx, larger_idx)` for every matching
/// pair in ascending order. `not_found_action`, if given, is called once
/// for every row of `smaller` with no match in `larger` (OPTIONAL/MINUS
/// with the smaller side on the left).
///
/// # Panics
///
/// Debug-asserts that neither input contains UNDEF; behavior is undefined
/// (silently wrong results, never memory-unsafe) in release builds if this
/// precondition is violated, matching the original's documented contract.
pub fn galloping_join(
    smaller: &[Vec<ValueId>],
    larger: &[Vec<ValueId>],
    mut action: impl FnMut(usize, usize),
    mut not_found_action: Option<&mut dyn FnMut(usize)>,
    cancellation: &CancellationHandle,
) -> Result<()> {
    debug_assert!(smaller.iter().all(|r| !r.iter().any(ValueId::is_undefined)));
    debug_assert!(larger.iter().all(|r| !r.iter().any(ValueId::is_undefined)));

    let mut it_small = 0usize;
    let mut it_large = 0usize;

    while it_small < smaller.len() && it_large < larger.len() {
        cancellation.check()?;
        let probe = &larger[it_large];
        while smaller[it_small].as_slice() < probe.as_slice() {
            if let Some(action) = not_found_action.as_mut() {
                action(it_small);
            }
            it_small += 1;
            if it_small >= smaller.len() {
                return Ok(());
            }
        }

        let (lower, upper) = exponential_search(larger, it_large, &smaller[it_small]);
        let found = larger[lower..upper].partition_point(|row| row.as_slice() < smaller[it_small].as_slice()) + lower;

        if found < upper && larger[found] == smaller[it_small] {
            let mut end_large = found;
            while end_large < larger.len() && larger[end_large] == smaller[it_small] {
                action(it_small, end_large);
                end_large += 1;
            }
            // Re-probe the same equal-run for a following duplicate key on
            // the smaller side instead of skipping past it: `smaller` may
            // repeat a join key, and each repeat must produce the full
            // Cartesian product with this run, not just the first one.
            it_large = found;
        } else if let Some(not_found) = not_found_action.as_mut() {
            not_found(it_small);
            it_large = found;
        } else {
            it_large = found;
        }
        it_small += 1;
    }

    if let Some(not_found) = not_found_action.as_mut() {
        for i in it_small..smaller.len() {
            not_found(i);
        }
    }
    Ok(())
}
