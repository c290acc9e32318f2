use chrono::Utc;
use rand::Rng;
use stock_data::{RawRow, Registry, SearchMode, Table};

const MINUTE: f64 = 60_000.0;

fn main() {
    let now = Utc::now().timestamp_millis() as f64;
    let mut rng = rand::rng();

    // a dense minute feed with OHLC columns
    let mut fast = Table::new();
    let mut price: f64 = 100.0;
    let mut bars = Vec::new();
    for i in 0..240 {
        let key = now - (240 - i) as f64 * MINUTE;
        let open = price;
        let close = price + rng.random_range(-0.8..0.8);
        let high = open.max(close) + rng.random_range(0.0..0.3);
        let low = open.min(close) - rng.random_range(0.0..0.3);
        bars.push(RawRow::new(key, vec![open, high, low, close]));
        price = close;
    }
    fast.add_rows(bars);

    // a sparse 5-minute volume feed over the same span
    let mut slow = Table::new();
    slow.add_rows((0..48).map(|i| {
        let key = now - (48 - i) as f64 * 5.0 * MINUTE;
        RawRow::new(key, vec![rng.random_range(1_000.0..5_000.0)])
    }));

    let mut registry = Registry::new();
    registry.add_source(fast.as_source());
    registry.add_source(slow.as_source());

    println!("merged keys: {}", registry.keys_count());
    println!("first key:   {:?}", registry.first_key());
    println!("last key:    {:?}", registry.last_key());
    println!("sync mode:   {}", registry.is_in_sync_mode());

    // select the last hour of the merged space
    let selection = registry.select(now - 60.0 * MINUTE, now);
    println!(
        "last hour: rows {:?}..={:?}, min gap {:?} ms",
        selection.start_index, selection.end_index, selection.min_distance
    );
    for (unit, stat) in &selection.intervals {
        println!("  {unit:?} x{} over {} ms", stat.count, stat.range);
    }

    // walk the final ten minutes and look the bars up in the fast table
    let mut iter = registry.iter_range(now - 10.0 * MINUTE, now);
    while iter.advance() {
        if let (Some(key), Some(index)) = (iter.current_key(), iter.current_index()) {
            let bar = fast.search(key, SearchMode::Exact);
            println!("#{index:>5.1}  {key:.0}  {:?}", bar.map(|row| row.values));
        }
    }
}
