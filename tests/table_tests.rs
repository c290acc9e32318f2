use stock_data::{RawRow, SearchMode, Table, TableError, TableOptions};

fn rows(pairs: &[(f64, f64)]) -> Vec<RawRow> {
    pairs
        .iter()
        .map(|&(key, value)| RawRow::new(key, vec![value]))
        .collect()
}

fn keys_of(table: &Table) -> Vec<f64> {
    table.storage().iter().map(|row| row.key).collect()
}

#[test]
fn test_add_rows_commits_outside_transaction() {
    let mut table = Table::new();
    let accepted = table.add_rows(rows(&[(2.0, 20.0), (1.0, 10.0), (3.0, 30.0)]));
    assert_eq!(accepted, 3);
    assert_eq!(table.rows_count(), 3);
    assert_eq!(keys_of(&table), vec![1.0, 2.0, 3.0]);
    assert_eq!(table.row(0).unwrap().values, vec![10.0]);
    assert!(!table.is_in_transaction());
}

#[test]
fn test_transaction_hides_pending_rows() {
    let mut table = Table::new();
    table.start_transaction();
    table.add_rows(rows(&[(1.0, 1.0), (2.0, 2.0)]));
    assert_eq!(table.rows_count(), 0);
    assert!(table.is_in_transaction());
    table.commit();
    assert_eq!(table.rows_count(), 2);
    assert!(!table.is_in_transaction());
}

#[test]
fn test_rollback_discards_pending() {
    let mut table = Table::new();
    table.add_rows(rows(&[(1.0, 1.0)]));
    table.start_transaction();
    table.add_rows(rows(&[(2.0, 2.0), (3.0, 3.0)]));
    table.remove_range(None, None);
    table.rollback();
    assert_eq!(keys_of(&table), vec![1.0]);

    table.add_rows(rows(&[(5.0, 5.0)]));
    assert_eq!(keys_of(&table), vec![1.0, 5.0]);
}

#[test]
fn test_duplicate_keys_in_one_batch_last_wins() {
    let mut table = Table::new();
    table.add_rows(rows(&[(1.0, 1.0), (2.0, 2.0), (1.0, 9.0)]));
    assert_eq!(keys_of(&table), vec![1.0, 2.0]);
    assert_eq!(table.row(0).unwrap().values, vec![9.0]);
}

#[test]
fn test_later_commit_replaces_equal_keys() {
    let mut table = Table::new();
    table.add_rows(rows(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]));
    table.add_rows(rows(&[(2.0, 20.0)]));
    assert_eq!(keys_of(&table), vec![1.0, 2.0, 3.0]);
    assert_eq!(table.row(1).unwrap().values, vec![20.0]);
}

#[test]
fn test_descending_and_assorted_batches_normalize() {
    let mut desc = Table::new();
    desc.add_rows(rows(&[(3.0, 3.0), (2.0, 2.0), (1.0, 1.0)]));
    assert_eq!(keys_of(&desc), vec![1.0, 2.0, 3.0]);
    assert_eq!(desc.row(0).unwrap().values, vec![1.0]);

    let mut assorted = Table::new();
    assorted.add_rows(rows(&[(2.0, 2.0), (1.0, 1.0), (3.0, 3.0)]));
    assert_eq!(keys_of(&assorted), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_remove_first_counts_distinct_keys() {
    let mut table = Table::new();
    table.add_rows(rows(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 4.0)]));
    table.remove_first(2);
    assert_eq!(keys_of(&table), vec![3.0, 4.0]);

    table.remove_first(0);
    assert_eq!(keys_of(&table), vec![3.0, 4.0]);
}

#[test]
fn test_remove_first_spares_pending_twin_of_the_counted_key() {
    let mut table = Table::new();
    table.add_rows(rows(&[(2.0, 2.0), (3.0, 3.0)]));
    table.start_transaction();
    table.add_rows(rows(&[(2.0, 20.0)]));
    table.remove_first(1);
    table.commit();
    // the committed row at key 2 is gone, its pending twin takes over
    assert_eq!(keys_of(&table), vec![2.0, 3.0]);
    assert_eq!(table.row(0).unwrap().values, vec![20.0]);
}

#[test]
fn test_remove_range_bounds() {
    let mut table = Table::new();
    table.add_rows(rows(&[
        (1.0, 1.0),
        (2.0, 2.0),
        (3.0, 3.0),
        (4.0, 4.0),
        (5.0, 5.0),
    ]));
    table.remove_range(Some(2.0), Some(4.0));
    assert_eq!(keys_of(&table), vec![1.0, 5.0]);

    table.remove_range(None, Some(1.0));
    assert_eq!(keys_of(&table), vec![5.0]);

    table.remove_range(Some(5.0), None);
    assert_eq!(keys_of(&table), Vec::<f64>::new());
}

#[test]
fn test_remove_range_covers_pending_rows() {
    let mut table = Table::new();
    table.add_rows(rows(&[(1.0, 1.0), (4.0, 4.0)]));
    table.start_transaction();
    table.add_rows(rows(&[(2.0, 2.0), (3.0, 3.0)]));
    table.remove_range(Some(2.0), Some(3.0));
    table.commit();
    assert_eq!(keys_of(&table), vec![1.0, 4.0]);
}

#[test]
fn test_add_rows_rolling_keeps_a_window() {
    let mut table = Table::new();
    table.add_rows(rows(&[
        (1.0, 1.0),
        (2.0, 2.0),
        (3.0, 3.0),
        (4.0, 4.0),
        (5.0, 5.0),
    ]));
    let accepted = table.add_rows_rolling(rows(&[(6.0, 6.0), (7.0, 7.0)]));
    assert_eq!(accepted, 2);
    assert_eq!(keys_of(&table), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
}

#[test]
fn test_add_json_rows() {
    let mut table = Table::new();
    let accepted = table
        .add_json(r#"[[1000, 1.5, true], ["2024-01-02", 2.5, "3.5"], [null, 9.9], [2000, "bad"]]"#)
        .unwrap();
    assert_eq!(accepted, 3);
    assert_eq!(table.rows_count(), 3);
    assert_eq!(table.row(0).unwrap().values, vec![1.5, 1.0]);
    assert!(table.row(1).unwrap().values[0].is_nan());
    assert_eq!(table.known_fields(), 2);

    // "2024-01-02" parses as UTC midnight
    let parsed = table.search(1_704_153_600_000.0, SearchMode::Exact);
    assert_eq!(parsed.unwrap().values, vec![2.5, 3.5]);
}

#[test]
fn test_add_json_rejects_malformed_documents() {
    let mut table = Table::new();
    assert!(matches!(
        table.add_json("not json"),
        Err(TableError::InvalidJson(_))
    ));
    assert!(matches!(
        table.add_json(r#"{"rows": []}"#),
        Err(TableError::InvalidJson(_))
    ));
}

#[test]
fn test_text_keys_with_custom_pattern() {
    let options = TableOptions {
        date_time_pattern: Some("%d.%m.%Y".to_string()),
        time_offset_hours: 0.0,
    };
    let mut table = Table::with_options(options).unwrap();
    let accepted = table.add_rows(vec![
        RawRow::with_text_key("02.01.2024", vec![1.0]),
        RawRow::with_text_key("2024-01-03T00:00:00Z", vec![2.0]),
        RawRow::with_text_key("garbage", vec![3.0]),
    ]);
    assert_eq!(accepted, 2);
    assert_eq!(
        keys_of(&table),
        vec![1_704_153_600_000.0, 1_704_240_000_000.0]
    );
}

#[test]
fn test_invalid_pattern_is_rejected() {
    let options = TableOptions {
        date_time_pattern: Some("%Q-nope".to_string()),
        time_offset_hours: 0.0,
    };
    assert!(matches!(
        Table::with_options(options),
        Err(TableError::InvalidDateTimePattern(_))
    ));
}

#[test]
fn test_time_offset_shifts_keys() {
    let options = TableOptions {
        date_time_pattern: None,
        time_offset_hours: 2.0,
    };
    let mut table = Table::with_options(options).unwrap();
    table.add_rows(rows(&[(1000.0, 1.0)]));
    assert_eq!(keys_of(&table), vec![1000.0 + 7_200_000.0]);
}

#[test]
fn test_search_modes() {
    let mut table = Table::new();
    table.add_rows(rows(&[(10.0, 1.0), (20.0, 2.0), (30.0, 3.0)]));

    assert_eq!(table.search_index(20.0, SearchMode::Exact), Some(1));
    assert_eq!(table.search_index(21.0, SearchMode::Exact), None);
    assert_eq!(table.search_index(21.0, SearchMode::ExactOrPrev), Some(1));
    assert_eq!(table.search_index(21.0, SearchMode::ExactOrNext), Some(2));
    assert_eq!(table.search_index(5.0, SearchMode::ExactOrPrev), None);
    assert_eq!(table.search_index(35.0, SearchMode::ExactOrNext), None);
    assert_eq!(table.search_index(f64::NAN, SearchMode::Nearest), None);

    assert_eq!(table.search_index(12.0, SearchMode::Nearest), Some(0));
    assert_eq!(table.search_index(28.0, SearchMode::Nearest), Some(2));
    // equidistant: the later row wins
    assert_eq!(table.search_index(25.0, SearchMode::Nearest), Some(2));
    assert_eq!(table.search_index(5.0, SearchMode::Nearest), Some(0));
    assert_eq!(table.search_index(95.0, SearchMode::Nearest), Some(2));

    let row = table.search(30.0, SearchMode::Exact).unwrap();
    assert_eq!(row.values, vec![3.0]);
}

#[test]
fn test_select_spans_and_column_ranges() {
    let mut table = Table::new();
    table.add_rows(rows(&[(10.0, 1.0), (20.0, 5.0), (30.0, 2.0), (40.0, 4.0)]));
    let selection = table.select(Some(15.0), Some(35.0));
    assert_eq!(selection.first_index, Some(1));
    assert_eq!(selection.last_index, Some(2));
    assert_eq!(selection.pre_first_index, Some(0));
    assert_eq!(selection.post_last_index, Some(3));
    // neighbor rows join the value range scan
    assert_eq!(selection.column_ranges, vec![Some((1.0, 5.0))]);
}

#[test]
fn test_select_outside_the_storage() {
    let mut table = Table::new();
    table.add_rows(rows(&[(10.0, 1.0), (20.0, 2.0)]));

    let before = table.select(Some(0.0), Some(5.0));
    assert_eq!(before.first_index, None);
    assert_eq!(before.pre_first_index, None);
    assert_eq!(before.post_last_index, Some(0));

    let after = table.select(Some(25.0), Some(30.0));
    assert_eq!(after.first_index, None);
    assert_eq!(after.pre_first_index, Some(1));
    assert_eq!(after.post_last_index, None);

    let between = table.select(Some(12.0), Some(18.0));
    assert_eq!(between.first_index, None);
    assert_eq!(between.pre_first_index, Some(0));
    assert_eq!(between.post_last_index, Some(1));
    assert_eq!(between.column_ranges, vec![Some((1.0, 2.0))]);

    let mut empty = Table::new();
    let selection = empty.select(Some(0.0), Some(1.0));
    assert_eq!(selection.first_index, None);
    assert_eq!(selection.column_ranges, Vec::new());
}

#[test]
fn test_select_all_covers_the_storage() {
    let mut table = Table::new();
    table.add_rows(rows(&[(10.0, 3.0), (20.0, 1.0), (30.0, 2.0)]));
    let selection = table.select_all();
    assert_eq!(selection.first_index, Some(0));
    assert_eq!(selection.last_index, Some(2));
    assert_eq!(selection.pre_first_index, None);
    assert_eq!(selection.post_last_index, None);
    assert_eq!(selection.column_ranges, vec![Some((1.0, 3.0))]);

    // same answer through the cache
    let again = table.select_all();
    assert_eq!(again.column_ranges, vec![Some((1.0, 3.0))]);
}

#[test]
fn test_commit_refreshes_query_results() {
    let mut table = Table::new();
    table.add_rows(rows(&[(10.0, 1.0), (20.0, 2.0)]));
    assert_eq!(table.search_index(15.0, SearchMode::ExactOrNext), Some(1));

    table.add_rows(rows(&[(15.0, 1.5)]));
    assert_eq!(table.search_index(15.0, SearchMode::ExactOrNext), Some(1));
    assert_eq!(table.search(15.0, SearchMode::Exact).unwrap().values, vec![1.5]);
}
