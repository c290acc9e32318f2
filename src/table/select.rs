use serde::Serialize;

use super::Table;
use crate::table::storage::TableRow;

/// Row lookup modes for key searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
    /// Exact key only.
    Exact,
    /// Exact key, else the closest row before it.
    ExactOrPrev,
    /// Exact key, else the closest row after it.
    ExactOrNext,
    /// Closest row by key distance, the later row on ties.
    Nearest,
}

/// Cached key search result.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchHit {
    pub(crate) key: f64,
    pub(crate) mode: SearchMode,
    pub(crate) index: Option<usize>,
}

/// Storage range selection: the rows spanning a key range, their immediate
/// neighbors outside it, and per-column value ranges over all of them.
#[derive(Debug, Clone, Serialize)]
pub struct TableSelection {
    /// Queried start key, `None` for an open start.
    pub start_key: Option<f64>,
    /// Queried end key, `None` for an open end.
    pub end_key: Option<f64>,
    /// Row just before the range, when one exists.
    pub pre_first_index: Option<usize>,
    /// First row inside the range, `None` for an empty selection.
    pub first_index: Option<usize>,
    /// Last row inside the range, `None` for an empty selection.
    pub last_index: Option<usize>,
    /// Row just after the range, when one exists.
    pub post_last_index: Option<usize>,
    /// `(min, max)` per value column over the scanned rows, `None` where no
    /// finite cell was seen. Neighbor rows are included in the scan.
    pub column_ranges: Vec<Option<(f64, f64)>>,
}

impl Table {
    /// Index of the row matching `key` under `mode`, `None` on a miss.
    pub fn search_index(&mut self, key: f64, mode: SearchMode) -> Option<usize> {
        if key.is_nan() {
            return None;
        }
        if let Some(hit) = self
            .search_cache
            .find(|h| h.key == key && h.mode == mode)
        {
            return hit.index;
        }
        let rows = self.committed();
        let len = rows.len();
        let index = match rows.binary_search_by(|row| row.key.total_cmp(&key)) {
            Ok(found) => Some(found),
            Err(insert) => match mode {
                SearchMode::Exact => None,
                SearchMode::ExactOrNext => (insert < len).then_some(insert),
                SearchMode::ExactOrPrev => insert.checked_sub(1),
                SearchMode::Nearest => {
                    // nearest misses are position dependent, not worth caching
                    return if insert == 0 {
                        (len > 0).then_some(0)
                    } else if insert < len {
                        if key - rows[insert - 1].key < rows[insert].key - key {
                            Some(insert - 1)
                        } else {
                            Some(insert)
                        }
                    } else {
                        (len > 0).then(|| len - 1)
                    };
                }
            },
        };
        self.search_cache.push(SearchHit { key, mode, index });
        index
    }

    /// Row matching `key` under `mode`.
    pub fn search(&mut self, key: f64, mode: SearchMode) -> Option<TableRow> {
        let index = self.search_index(key, mode)?;
        let rows = self.committed();
        rows.get(index).cloned()
    }

    /// Selects the rows spanning `[start_key, end_key]`; either side `None`
    /// means unbounded. The neighbor rows just outside the range land in
    /// `pre_first_index`/`post_last_index` and join the column range scan.
    pub fn select(&mut self, start_key: Option<f64>, end_key: Option<f64>) -> TableSelection {
        let rows = self.committed();
        let len = rows.len();
        let mut pre_first = None;
        let mut post_last = None;
        if len > 0 {
            let first = match start_key {
                Some(key) => self.search_index(key, SearchMode::ExactOrNext),
                None => Some(0),
            };
            match first {
                None => {
                    // selection lies after all data
                    pre_first = Some(len - 1);
                }
                Some(first) => {
                    let last = match end_key {
                        Some(key) => self.search_index(key, SearchMode::ExactOrPrev),
                        None => Some(len - 1),
                    };
                    match last {
                        None => {
                            // selection lies before all data
                            post_last = Some(0);
                        }
                        Some(last) if first <= last => {
                            pre_first = (first > 0).then(|| first - 1);
                            post_last = (last < len - 1).then(|| last + 1);
                        }
                        Some(last) => {
                            // empty selection between two rows
                            pre_first = Some(last);
                            post_last = Some(first);
                        }
                    }
                }
            }
        }
        self.select_resolved(start_key, end_key, pre_first, post_last, &rows)
    }

    /// Selects the whole storage.
    pub fn select_all(&mut self) -> TableSelection {
        let rows = self.committed();
        match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => {
                let (first_key, last_key) = (first.key, last.key);
                self.select_resolved(Some(first_key), Some(last_key), None, None, &rows)
            }
            _ => self.select_resolved(None, None, None, None, &rows),
        }
    }

    fn select_resolved(
        &mut self,
        start_key: Option<f64>,
        end_key: Option<f64>,
        pre_first: Option<usize>,
        post_last: Option<usize>,
        rows: &[TableRow],
    ) -> TableSelection {
        let len = rows.len();
        let (first, last) = if len == 0 {
            (None, None)
        } else {
            if let Some(hit) = self
                .selection_cache
                .find(|s| s.start_key == start_key && s.end_key == end_key)
            {
                return hit.clone();
            }
            match (pre_first, post_last) {
                // full range
                (None, None) => (Some(0), Some(len - 1)),
                // everything lies before the first row
                (None, Some(0)) => (None, None),
                (None, Some(post)) => (Some(0), Some(post - 1)),
                // everything lies after the last row
                (Some(pre), None) if pre == len - 1 => (None, None),
                (Some(pre), None) => (Some(pre + 1), Some(len - 1)),
                // empty range between two adjacent rows
                (Some(pre), Some(post)) if post - pre == 1 => (None, None),
                (Some(pre), Some(post)) => (Some(pre + 1), Some(post - 1)),
            }
        };

        let fields = self.largest_row_len;
        let mut column_ranges: Vec<Option<(f64, f64)>> = vec![None; fields];
        let scan_start = pre_first.or(first).or(post_last);
        if let Some(start) = scan_start {
            let full_range = pre_first.is_none() && post_last.is_none();
            match &self.full_range_ranges {
                Some(cached) if full_range => column_ranges.clone_from(cached),
                _ => {
                    let stop = post_last.map_or(len, |post| post + 1);
                    let mut mins = vec![f64::INFINITY; fields];
                    let mut maxs = vec![f64::NEG_INFINITY; fields];
                    for row in &rows[start..stop] {
                        let width = row.values.len().min(fields);
                        for column in 0..width {
                            let val = row.values[column];
                            // NaN cells fail both comparisons
                            if val < mins[column] {
                                mins[column] = val;
                            }
                            if val > maxs[column] {
                                maxs[column] = val;
                            }
                        }
                    }
                    for column in 0..fields {
                        if mins[column] != f64::INFINITY {
                            column_ranges[column] = Some((mins[column], maxs[column]));
                        }
                    }
                    if full_range {
                        self.full_range_ranges = Some(column_ranges.clone());
                    }
                }
            }
        }

        let selection = TableSelection {
            start_key,
            end_key,
            pre_first_index: pre_first,
            first_index: first,
            last_index: last,
            post_last_index: post_last,
            column_ranges,
        };
        if len > 0 {
            self.selection_cache.push(selection.clone());
        }
        selection
    }
}
