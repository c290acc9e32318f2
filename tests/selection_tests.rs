use stock_data::{IntervalUnit, RawRow, Registry, Table};

const HOUR: f64 = 3_600_000.0;
const DAY: f64 = 86_400_000.0;

fn registry_with_keys(keys: &[f64]) -> Registry {
    let mut table = Table::new();
    table.add_rows(keys.iter().map(|&key| RawRow::new(key, vec![key])));
    let mut registry = Registry::new();
    registry.add_source(table.as_source());
    registry
}

#[test]
fn test_selection_inside_range() {
    // merged space 1..=5 built from two overlapping sources
    let mut a = Table::new();
    a.add_rows([1.0, 2.0, 3.0, 5.0].map(|k| RawRow::new(k, vec![k])));
    let mut b = Table::new();
    b.add_rows([2.0, 3.0, 4.0].map(|k| RawRow::new(k, vec![k])));
    let mut registry = Registry::new();
    registry.add_source(a.as_source());
    registry.add_source(b.as_source());

    let selection = registry.select(2.0, 4.0);
    assert_eq!(selection.start_index, Some(1.0));
    assert_eq!(selection.end_index, Some(3.0));
    assert_eq!(selection.first_index, Some(1));
    assert_eq!(selection.last_index, Some(3));
    assert_eq!(selection.pre_first_index, Some(0));
    assert_eq!(selection.post_last_index, Some(4));
    assert_eq!(selection.min_distance, Some(1.0));
}

#[test]
fn test_selection_fractional_bounds() {
    let mut registry = registry_with_keys(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let selection = registry.select(1.5, 4.5);
    assert_eq!(selection.start_index, Some(0.5));
    assert_eq!(selection.end_index, Some(3.5));
    assert_eq!(selection.first_index, Some(1));
    assert_eq!(selection.last_index, Some(3));
    assert_eq!(selection.pre_first_index, Some(0));
    assert_eq!(selection.post_last_index, Some(4));
}

#[test]
fn test_selection_between_two_keys() {
    let mut registry = registry_with_keys(&[1.0, 2.0, 3.0]);
    let selection = registry.select(1.2, 1.8);
    assert_eq!(selection.first_index, None);
    assert_eq!(selection.last_index, None);
    assert_eq!(selection.pre_first_index, Some(0));
    assert_eq!(selection.post_last_index, Some(1));
    assert_eq!(selection.min_distance, Some(1.0));
}

#[test]
fn test_selection_beyond_the_end() {
    let mut registry = registry_with_keys(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let selection = registry.select(10.0, 20.0);
    assert_eq!(selection.start_index, Some(9.0));
    assert_eq!(selection.first_index, None);
    assert_eq!(selection.last_index, None);
    assert_eq!(selection.pre_first_index, Some(4));
    assert_eq!(selection.post_last_index, None);
    assert_eq!(selection.min_distance, None);
    assert!(selection.intervals.is_empty());
}

#[test]
fn test_selection_before_the_start() {
    let mut registry = registry_with_keys(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let selection = registry.select(-5.0, 0.0);
    assert_eq!(selection.first_index, None);
    assert_eq!(selection.last_index, None);
    assert_eq!(selection.pre_first_index, None);
    assert_eq!(selection.post_last_index, Some(0));
    assert_eq!(selection.min_distance, None);
    assert!(selection.intervals.is_empty());
}

#[test]
fn test_selection_covering_everything() {
    let mut registry = registry_with_keys(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let selection = registry.select(0.0, 10.0);
    assert_eq!(selection.first_index, Some(0));
    assert_eq!(selection.last_index, Some(4));
    assert_eq!(selection.pre_first_index, None);
    assert_eq!(selection.post_last_index, None);
    assert_eq!(selection.min_distance, Some(1.0));
}

#[test]
fn test_empty_registry_selection() {
    let mut registry = Registry::new();
    let selection = registry.select(1.0, 2.0);
    assert_eq!(selection.start_key, 1.0);
    assert_eq!(selection.end_key, 2.0);
    assert_eq!(selection.start_index, None);
    assert_eq!(selection.end_index, None);
    assert_eq!(selection.first_index, None);
    assert_eq!(selection.min_distance, None);
    assert!(selection.intervals.is_empty());
}

#[test]
fn test_single_key_selection_intervals() {
    let mut registry = registry_with_keys(&[100.0]);
    let selection = registry.select(99.0, 101.0);
    assert_eq!(selection.first_index, Some(0));
    assert_eq!(selection.last_index, Some(0));
    assert_eq!(selection.pre_first_index, None);
    assert_eq!(selection.post_last_index, None);
    assert_eq!(selection.min_distance, None);

    // both partial gaps around the only key land in the histogram
    let stat = selection
        .intervals
        .get(&IntervalUnit::Millisecond)
        .copied()
        .unwrap();
    assert_eq!(stat.count, 2);
    assert_eq!(stat.range, 2.0);
}

#[test]
fn test_daily_gap_histogram() {
    let keys: Vec<f64> = (0..4).map(|i| i as f64 * DAY).collect();
    let mut registry = registry_with_keys(&keys);
    let selection = registry.select(0.0, 3.0 * DAY);
    assert_eq!(selection.intervals.len(), 1);
    let stat = selection.intervals.get(&IntervalUnit::Day).copied().unwrap();
    assert_eq!(stat.count, 3);
    assert_eq!(stat.range, 3.0 * DAY);
}

#[test]
fn test_partial_edge_gap_lands_in_histogram() {
    let keys: Vec<f64> = (0..4).map(|i| i as f64 * DAY).collect();
    let mut registry = registry_with_keys(&keys);
    let selection = registry.select(12.0 * HOUR, 3.0 * DAY);
    assert_eq!(selection.first_index, Some(1));
    assert_eq!(selection.pre_first_index, Some(0));
    assert_eq!(selection.min_distance, Some(DAY));

    let hours = selection.intervals.get(&IntervalUnit::Hour).copied().unwrap();
    assert_eq!(hours.count, 1);
    assert_eq!(hours.range, 12.0 * HOUR);
    let days = selection.intervals.get(&IntervalUnit::Day).copied().unwrap();
    assert_eq!(days.count, 2);
    assert_eq!(days.range, 2.0 * DAY);
}

#[test]
fn test_selection_is_cached() {
    let mut registry = registry_with_keys(&[1.0, 2.0, 3.0]);
    let first = registry.select(1.0, 3.0);
    let second = registry.select(1.0, 3.0);
    assert_eq!(second.first_index, first.first_index);
    assert_eq!(second.last_index, first.last_index);
    assert_eq!(second.intervals, first.intervals);

    // a rebuild clears the cache but the answer stays the same
    registry.set_dirty();
    let third = registry.select(1.0, 3.0);
    assert_eq!(third.first_index, first.first_index);
}

#[test]
fn test_min_distance_is_smallest_neighbor_gap() {
    let mut registry = registry_with_keys(&[0.0, 10.0, 15.0, 30.0]);
    let selection = registry.select(10.0, 15.0);
    assert_eq!(selection.first_index, Some(1));
    assert_eq!(selection.last_index, Some(2));
    assert_eq!(selection.min_distance, Some(5.0));
}
