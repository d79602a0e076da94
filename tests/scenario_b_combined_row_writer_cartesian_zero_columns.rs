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

fn make_table(num_rows: usize) -> IdTable {
    let mut table = IdTable::new(1);
    for i in 0..num_rows {
        table.push_row(&[int(i as i64)]);
    }
    table
}

#[test_log::test]
fn add_rows_cartesian_product_on_zero_column_result() {
    let left = make_table(4);
    let right = make_table(4);

    let output = IdTable::new(0);
    let mut writer = CombinedRowWriter::new(1, output, CancellationHandle::new(), false, 100_000);
    writer.set_input(left.as_view(), None, right.as_view(), None).unwrap();

    writer.add_rows(&[0, 1, 2], &[1, 2]).unwrap();
    writer.add_optional_row(3).unwrap();

    let (result, _vocab) = writer.into_result().unwrap();
    assert_eq!(result.num_rows(), 7);
    assert_eq!(result.num_columns(), 0);
}
