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

fn make_table(rows: &[&[i64]]) -> IdTable {
    let num_cols = rows.first().map_or(0, |r| r.len());
    let mut table = IdTable::new(num_cols);
    for row in rows {
        table.push_row(&row.iter().map(|&v| int(v)).collect::<Vec<_>>());
    }
    table
}

#[test_log::test]
fn zipper_join_scenario_with_one_undef_column() {
    let left = make_table(&[&[3, 4], &[7, 8], &[11, 10], &[14, 11]]);
    let right = make_table(&[&[7, 14, 0], &[9, 10, 1], &[14, 8, 2], &[33, 5, 3]]);

    let output = IdTable::new(4); // join col, left payload, right payload x2
    let mut writer = CombinedRowWriter::new(1, output, CancellationHandle::new(), true, 100_000);

    writer.set_input(left.as_view(), None, right.as_view(), None).unwrap();
    writer.add_row(1, 0).unwrap();

    writer.set_only_left_input_for_optional_join(left.as_view(), None).unwrap();
    writer.add_optional_row(2).unwrap();

    writer.set_input(left.as_view(), None, right.as_view(), None).unwrap();
    writer.add_row(3, 2).unwrap();

    let undef_counts = writer.num_undefined_per_column().unwrap().to_vec();
    let (result, _vocab) = writer.into_result().unwrap();

    assert_eq!(result.num_rows(), 3);
    assert_eq!(result.row(0).to_vec(), vec![int(7), int(8), int(14), int(0)]);
    assert_eq!(result.row(1).get(0), int(11));
    assert_eq!(result.row(1).get(1), int(10));
    assert!(result.row(1).get(2).is_undefined());
    assert!(result.row(1).get(3).is_undefined());
    assert_eq!(result.row(2).to_vec(), vec![int(14), int(11), int(8), int(2)]);

    assert_eq!(undef_counts, vec![0, 0, 1, 1]);
}
