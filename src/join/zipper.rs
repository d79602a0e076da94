// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Merge/zipper join that accounts for UNDEF-induced compatibility, and
//! optionally drives OPTIONAL/MINUS via a not-found callback.

use super::find_undef_ranges::find_smaller_undef_ranges;
use super::JoinSortedness;
use crate::cancellation::CancellationHandle;
use crate::error::Result;
use crate::value_id::ValueId;

fn merge_with_undef_left(
    right_row: &[ValueId],
    left: &[Vec<ValueId>],
    left_begin: usize,
    left_end: usize,
    right_idx: usize,
    covered: &mut [bool],
    compatible_row_action: &mut dyn FnMut(usize, usize),
) -> bool {
    let (matches, unsorted) = find_smaller_undef_ranges(right_row, left, left_begin, left_end);
    for left_idx in matches {
        compatible_row_action(left_idx, right_idx);
        if !covered.is_empty() {
            covered[left_idx] = true;
        }
    }
    unsorted
}

#[allow(clippy::too_many_arguments)]
fn merge_with_undef_right(
    left_row: &[ValueId],
    left_idx: usize,
    right: &[Vec<ValueId>],
    right_begin: usize,
    right_end: usize,
    has_no_match: bool,
    covered: &mut [bool],
    compatible_row_action: &mut dyn FnMut(usize, usize),
    not_found_action: &mut Option<&mut dyn FnMut(usize)>,
) -> bool {
    let (matches, unsorted) = find_smaller_undef_ranges(left_row, right, right_begin, right_end);
    let compatible_found = !matches.is_empty();
    for right_idx in matches {
        compatible_row_action(left_idx, right_idx);
    }
    if compatible_found {
        if !covered.is_empty() {
            covered[left_idx] = true;
        }
    } else if has_no_match && !left_row.iter().any(ValueId::is_undefined) {
        if let Some(action) = not_found_action.as_mut() {
            action(left_idx);
        }
        if !covered.is_empty() {
            covered[left_idx] = true;
        }
    }
    unsorted
}

fn merge_with_undef_right_noop(
    left_row: &[ValueId],
    left_idx: usize,
    has_no_match: bool,
    covered: &mut [bool],
    not_found_action: &mut Option<&mut dyn FnMut(usize)>,
) {
    if has_no_match && !left_row.iter().any(ValueId::is_undefined) {
        if let Some(action) = not_found_action.as_mut() {
            action(left_idx);
        }
        if !covered.is_empty() {
            covered[left_idx] = true;
        }
    }
}

/// Runs a merge/zipper join over two sorted ranges of join-key rows.
///
/// `left_has_undef`/`right_has_undef` tell the driver whether either side
/// can contain UNDEF values at all; set both to `false` for a UNDEF-free
/// join to skip the compatible-smaller-element search entirely (the
/// "no UNDEF" fast path).
///
/// `not_found_action`, when given, is invoked once for every row of `left`
/// that matched nothing in `right` — the mechanism OPTIONAL and MINUS are
/// built on. `compatible_row_action` is called once per matching
/// `(left_idx, right_idx)` pair; calls are ordered consistently with `<`
/// except where the returned [`JoinSortedness`] says otherwise.
pub fn zipper_join_with_undef(
    left: &[Vec<ValueId>],
    right: &[Vec<ValueId>],
    left_has_undef: bool,
    right_has_undef: bool,
    mut compatible_row_action: impl FnMut(usize, usize),
    mut not_found_action: Option<&mut dyn FnMut(usize)>,
    cancellation: &CancellationHandle,
) -> Result<JoinSortedness> {
    let end1 = left.len();
    let end2 = right.len();
    let has_not_found_action = not_found_action.is_some();
    let mut covered = vec![false; if has_not_found_action { end1 } else { 0 }];
    let mut out_of_order_found = false;

    let mut it1 = 0usize;
    let mut it2 = 0usize;

    'main: while it1 < end1 && it2 < end2 {
        while left[it1] < right[it2] {
            cancellation.check()?;
            if right_has_undef {
                out_of_order_found |= merge_with_undef_right(
                    &left[it1], it1, right, 0, it2, true, &mut covered, &mut compatible_row_action, &mut not_found_action,
                );
            } else {
                merge_with_undef_right_noop(&left[it1], it1, true, &mut covered, &mut not_found_action);
            }
            it1 += 1;
            if it1 >= end1 {
                break 'main;
            }
        }
        while right[it2] < left[it1] {
            cancellation.check()?;
            if left_has_undef {
                out_of_order_found |=
                    merge_with_undef_left(&right[it2], left, 0, it1, it2, &mut covered, &mut compatible_row_action);
            }
            it2 += 1;
            if it2 >= end2 {
                break 'main;
            }
        }
        cancellation.check()?;

        let mut end_same1 = it1;
        while end_same1 < end1 && left[end_same1] == right[it2] {
            end_same1 += 1;
        }
        let mut end_same2 = it2;
        while end_same2 < end2 && left[it1] == right[end_same2] {
            end_same2 += 1;
        }
        cancellation.check()?;

        for i in it1..end_same1 {
            if right_has_undef {
                out_of_order_found |= merge_with_undef_right(
                    &left[i], i, right, 0, it2, false, &mut covered, &mut compatible_row_action, &mut not_found_action,
                );
            }
        }
        for j in it2..end_same2 {
            if left_has_undef {
                out_of_order_found |=
                    merge_with_undef_left(&right[j], left, 0, it1, j, &mut covered, &mut compatible_row_action);
            }
        }

        for i in it1..end_same1 {
            cancellation.check()?;
            if !covered.is_empty() {
                covered[i] = true;
            }
            for j in it2..end_same2 {
                compatible_row_action(i, j);
            }
        }
        it1 = end_same1;
        it2 = end_same2;
    }
    cancellation.check()?;

    for j in it2..end2 {
        if left_has_undef {
            out_of_order_found |=
                merge_with_undef_left(&right[j], left, 0, end1, j, &mut covered, &mut compatible_row_action);
        }
    }
    for i in it1..end1 {
        if right_has_undef {
            out_of_order_found |= merge_with_undef_right(
                &left[i], i, right, 0, end2, true, &mut covered, &mut compatible_row_action, &mut not_found_action,
            );
        } else {
            merge_with_undef_right_noop(&left[i], i, true, &mut covered, &mut not_found_action);
        }
    }

    let mut num_out_of_order_at_end = 0usize;
    if has_not_found_action {
        for (i, &is_covered) in covered.iter().enumerate() {
            if !is_covered {
                cancellation.check()?;
                if let Some(action) = not_found_action.as_mut() {
                    action(i);
                }
                num_out_of_order_at_end += 1;
            }
        }
    }

    Ok(if out_of_order_found {
        JoinSortedness::FullyUnsorted
    } else if num_out_of_order_at_end > 0 {
        JoinSortedness::TrailingUnsorted(num_out_of_order_at_end)
    } else {
        JoinSortedness::Sorted
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn id(v: i64) -> ValueId {
        ValueId::make_int(v)
    }
    fn u() -> ValueId {
        ValueId::UNDEF
    }

    #[test]
    fn inner_join_no_undef() {
        let left = vec![vec![id(1)], vec![id(2)], vec![id(3)]];
        let right = vec![vec![id(2)], vec![id(3)], vec![id(4)]];
        let mut matches = Vec::new();
        let sortedness = zipper_join_with_undef(
            &left,
            &right,
            false,
            false,
            |l, r| matches.push((l, r)),
            None,
            &CancellationHandle::new(),
        )
        .unwrap();
        assert_eq!(matches, vec![(1, 0), (2, 1)]);
        assert!(matches!(sortedness, JoinSortedness::Sorted));
    }

    #[test]
    fn right_undef_matches_every_left_row() {
        let left = vec![vec![id(1)], vec![id(2)]];
        let right = vec![vec![u()], vec![id(2)]];
        let mut matches = Vec::new();
        zipper_join_with_undef(&left, &right, false, true, |l, r| matches.push((l, r)), None, &CancellationHandle::new())
            .unwrap();
        matches.sort();
        assert_eq!(matches, vec![(0, 0), (1, 0), (1, 1)]);
    }

    #[test]
    fn optional_join_calls_not_found_for_unmatched_left() {
        let left = vec![vec![id(1)], vec![id(2)], vec![id(3)]];
        let right = vec![vec![id(2)]];
        let mut matches = Vec::new();
        let mut missing = Vec::new();
        let mut not_found = |l: usize| missing.push(l);
        zipper_join_with_undef(
            &left,
            &right,
            false,
            false,
            |l, r| matches.push((l, r)),
            Some(&mut not_found),
            &CancellationHandle::new(),
        )
        .unwrap();
        assert_eq!(matches, vec![(1, 0)]);
        assert_eq!(missing, vec![0, 2]);
    }

    #[test]
    fn cancellation_propagates() {
        let left = vec![vec![id(1)]];
        let right = vec![vec![id(1)]];
        let handle = CancellationHandle::new();
        handle.cancel();
        let err = zipper_join_with_undef(&left, &right, false, false, |_, _| {}, None, &handle).unwrap_err();
        assert!(matches!(err, crate::error::Error::Cancelled));
    }
}
