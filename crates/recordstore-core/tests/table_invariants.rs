#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use recordstore_core::{
    builder::Value,
    mapper::ObjectMapper,
    schema::TypeMap,
    table::{DynamicTable, TableError},
};

fn assert_invariants(table: &DynamicTable) {
    table.check_consistency().unwrap();
    for column in table.columns() {
        assert_eq!(column.len(), table.len(), "{}", column.name());
        if let Some(offsets) = column.offsets() {
            assert!(offsets.windows(2).all(|w| w[0] <= w[1]), "{}", column.name());
            assert_eq!(offsets.last().copied(), Some(column.values().rows()));
        }
    }
}

fn trials() -> DynamicTable {
    let mut t = DynamicTable::new("trials", "behavioral trials");
    t.add_column("start", "trial start in seconds", false, None)
        .unwrap();
    t.add_column("licks", "lick times in seconds", true, None)
        .unwrap();
    t.add_column("tags", "free-form labels", true, None).unwrap();
    t
}

fn row(start: f64, licks: Vec<f64>, tags: &[&str]) -> [(&'static str, Value); 3] {
    [
        ("start", Value::from(start)),
        ("licks", Value::from(licks)),
        ("tags", Value::from(tags.to_vec())),
    ]
}

#[test]
fn rejected_rows_leave_every_column_aligned() {
    let mut t = trials();
    t.add_row(None, row(0.0, vec![0.1, 0.4], &["warmup"])).unwrap();
    assert_invariants(&t);

    let missing = t.add_row(None, [("start", Value::from(1.0))]);
    assert!(matches!(missing, Err(TableError::MissingColumnValue { .. })));
    assert_invariants(&t);

    let duplicate = t.add_row(Some(0), row(1.0, vec![], &[]));
    assert!(matches!(duplicate, Err(TableError::DuplicateRowId { id: 0, .. })));
    assert_invariants(&t);

    let wrong_type = t.add_row(
        None,
        [
            ("start", Value::from(1.0)),
            ("licks", Value::from(vec!["early"])),
            ("tags", Value::from(vec!["x"])),
        ],
    );
    assert!(matches!(wrong_type, Err(TableError::TypeMismatch { .. })));
    assert_invariants(&t);

    t.add_row(Some(10), row(1.0, vec![], &[])).unwrap();
    t.add_row(None, row(2.0, vec![2.2, 2.3, 2.9], &["rewarded", "late"]))
        .unwrap();
    assert_invariants(&t);
    assert_eq!(t.ids(), &[0, 10, 11]);

    let unknown = t.add_row(None, [("start", Value::from(3.0)), ("speed", Value::from(1.0))]);
    assert!(matches!(unknown, Err(TableError::UnknownColumn { .. })));
    assert_eq!(t.len(), 3);
}

#[test]
fn tables_keep_rows_through_the_mapper() {
    let mut t = trials();
    t.add_row(None, row(0.0, vec![0.1, 0.4], &["warmup"])).unwrap();
    t.add_row(None, row(1.0, vec![], &[])).unwrap();
    t.add_row(None, row(2.0, vec![2.2], &["rewarded", "late"]))
        .unwrap();

    let map = TypeMap::core();
    let mapper = ObjectMapper::new(&map);
    let group = mapper.to_builder(&t).unwrap();
    assert_eq!(
        group.dataset("licks_index").unwrap().array().as_ints(),
        Some(&[2, 2, 3][..])
    );

    let back = mapper.from_builder(&group, None).unwrap();
    let back = back.downcast_ref::<DynamicTable>().unwrap();
    assert_invariants(back);
    assert_eq!(back.description(), "behavioral trials");
    assert_eq!(back.colnames().collect::<Vec<_>>(), ["start", "licks", "tags"]);
    for i in 0..t.len() {
        assert_eq!(back.get_row(i).unwrap().values(), t.get_row(i).unwrap().values());
    }
}
