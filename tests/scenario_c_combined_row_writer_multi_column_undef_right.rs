// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use qlever_exec_core::cancellation::CancellationHandle;
use qlever_exec_core::combined_row_writer::CombinedRowWriter;
use qlever_exec_core::id_table::IdTable;
use qlever_exec_core::value_id::ValueId;

fn int(v: i64) -> ValueId {
    ValueId::make_int(v)
}

const U: fn() -> ValueId = || ValueId::UNDEF;

#[test_log::test]
fn multi_column_join_with_undef_only_on_right() {
    let mut left = IdTable::new(2);
    left.push_row(&[int(3), int(4)]);
    left.push_row(&[int(7), int(8)]);
    left.push_row(&[int(11), int(10)]);
    left.push_row(&[int(14), U()]);

    let mut right = IdTable::new(3);
    right.push_row(&[U(), int(8), int(0)]);
    right.push_row(&[int(9), int(10), int(1)]);
    right.push_row(&[int(14), int(11), int(2)]);
    right.push_row(&[int(33), int(5), int(3)]);

    let output = IdTable::new(3); // join col 0, join col 1, right payload
    let mut writer = CombinedRowWriter::new(2, output, CancellationHandle::new(), true, 100_000);
    writer.set_input(left.as_view(), None, right.as_view(), None).unwrap();

    writer.add_row(1, 0).unwrap();
    writer.add_optional_row(2).unwrap();
    writer.add_row(3, 2).unwrap();

    let undef_counts = writer.num_undefined_per_column().unwrap().to_vec();
    let (result, _vocab) = writer.into_result().unwrap();

    assert_eq!(result.num_rows(), 3);
    assert_eq!(result.row(0).to_vec(), vec![int(7), int(8), int(0)]);
    assert_eq!(result.row(1).get(0), int(11));
    assert_eq!(result.row(1).get(1), int(10));
    assert!(result.row(1).get(2).is_undefined());
    assert_eq!(result.row(2).to_vec(), vec![int(14), int(11), int(2)]);

    assert_eq!(undef_counts, vec![0, 0, 1]);
}
