use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::cache::RingCache;
use crate::interval::{estimate_interval, IntervalUnit};
use crate::keys::{merge_keyed, KeyItem};
use crate::table::{RowStorage, TableRow};

/// Most recent key translations kept per registry.
const SEARCH_CACHE_SIZE: usize = 2;
/// Most recent selections kept per registry.
const SELECTION_CACHE_SIZE: usize = 4;

/// Merged key sequence of a registry: empty, a zero-copy alias of a lone
/// source's rows, or an owned merge over several sources.
///
/// Clones are pointer bumps, so iterators snapshot the sequence they were
/// built from and a later rebuild does not shift them.
#[derive(Debug, Clone)]
enum KeySlice {
    Empty,
    Rows(Arc<Vec<TableRow>>),
    Merged(Arc<Vec<KeyItem>>),
}

impl KeySlice {
    fn len(&self) -> usize {
        match self {
            KeySlice::Empty => 0,
            KeySlice::Rows(rows) => rows.len(),
            KeySlice::Merged(items) => items.len(),
        }
    }

    /// Key at `index`; callers bound the index by `len()`.
    fn key(&self, index: usize) -> f64 {
        match self {
            KeySlice::Empty => f64::NAN,
            KeySlice::Rows(rows) => rows[index].key,
            KeySlice::Merged(items) => items[index].key,
        }
    }

    fn next(&self, index: usize) -> Option<usize> {
        match self {
            KeySlice::Empty => None,
            KeySlice::Rows(rows) => rows[index].next,
            KeySlice::Merged(items) => items[index].next,
        }
    }

    fn binary_search(&self, key: f64) -> Result<usize, usize> {
        match self {
            KeySlice::Empty => Err(0),
            KeySlice::Rows(rows) => rows.binary_search_by(|row| row.key.total_cmp(&key)),
            KeySlice::Merged(items) => items.binary_search_by(|item| item.key.total_cmp(&key)),
        }
    }
}

/// Cached key <-> index translation.
#[derive(Debug, Clone, Copy)]
struct KeySearch {
    key: f64,
    index: f64,
}

/// Occurrence stats for one estimated interval unit inside a selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntervalStat {
    /// Number of gaps attributed to the unit.
    pub count: u32,
    /// Total milliseconds covered by those gaps.
    pub range: f64,
}

/// Range selection over the merged key space.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    /// Queried start key, echoed back.
    pub start_key: f64,
    /// Queried end key, echoed back.
    pub end_key: f64,
    /// Fractional index of `start_key`.
    pub start_index: Option<f64>,
    /// Fractional index of `end_key`.
    pub end_index: Option<f64>,
    /// First key inside the range, `None` for an empty selection.
    pub first_index: Option<usize>,
    /// Key just before the range, when one exists.
    pub pre_first_index: Option<usize>,
    /// Last key inside the range, `None` for an empty selection.
    pub last_index: Option<usize>,
    /// Key just after the range, when one exists.
    pub post_last_index: Option<usize>,
    /// Smallest gap between neighboring keys across the padded range.
    pub min_distance: Option<f64>,
    /// Histogram of estimated calendar units over the range's gaps.
    pub intervals: BTreeMap<IntervalUnit, IntervalStat>,
}

impl Selection {
    fn empty(start_key: f64, end_key: f64) -> Self {
        Self {
            start_key,
            end_key,
            start_index: None,
            end_index: None,
            first_index: None,
            pre_first_index: None,
            last_index: None,
            post_last_index: None,
            min_distance: None,
            intervals: BTreeMap::new(),
        }
    }
}

/// First and last merged keys plus half-gap extrapolated outer bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Boundaries {
    pub first_key: f64,
    pub last_key: f64,
    /// First key pushed left by half the leading gap.
    pub aligned_first_key: f64,
    /// Last key pushed right by half the trailing gap.
    pub aligned_last_key: f64,
}

/// Merge-sorted index over the key columns of several row sources.
///
/// The registry is lazy: mutations only flag it dirty and every query
/// rebuilds the merged key space first when needed, so reads between data
/// changes cost nothing extra.
pub struct Registry {
    sources: Vec<Arc<dyn RowStorage>>,
    dirty: bool,
    keys: KeySlice,
    sync_mode: bool,
    search_cache: RingCache<KeySearch>,
    selection_cache: RingCache<Selection>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            dirty: true,
            keys: KeySlice::Empty,
            sync_mode: false,
            search_cache: RingCache::new(SEARCH_CACHE_SIZE),
            selection_cache: RingCache::new(SELECTION_CACHE_SIZE),
        }
    }

    /// Attaches a source. The registry does not go dirty on its own; call
    /// [`set_dirty`](Self::set_dirty) when source contents change.
    pub fn add_source(&mut self, source: Arc<dyn RowStorage>) {
        self.sources.push(source);
    }

    /// Detaches all sources and flags the registry for rebuild.
    pub fn reset_sources(&mut self) {
        self.sources.clear();
        self.dirty = true;
    }

    /// Flags the merged key space as stale; the next query rebuilds it.
    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True when every source's row count equals the merged key count, so
    /// source row indexes line up with key indexes one to one.
    pub fn is_in_sync_mode(&self) -> bool {
        self.sync_mode
    }

    /// Rebuilds the merged key space if dirty: one source aliases its rows
    /// without copying, several sources fold through the two-way merge.
    pub fn update(&mut self) {
        if !self.dirty {
            return;
        }
        self.search_cache.clear();
        self.selection_cache.clear();
        self.keys = match self.sources.len() {
            0 => KeySlice::Empty,
            1 => KeySlice::Rows(self.sources[0].rows()),
            _ => {
                let first = self.sources[0].rows();
                let second = self.sources[1].rows();
                let mut merged = merge_keyed(&first, &second);
                for source in &self.sources[2..] {
                    let rows = source.rows();
                    merged = merge_keyed(&merged, &rows);
                }
                KeySlice::Merged(Arc::new(merged))
            }
        };
        self.dirty = false;
        let len = self.keys.len();
        self.sync_mode = true;
        for source in &self.sources {
            if source.rows_count() != len {
                self.sync_mode = false;
                break;
            }
        }
        debug!(
            sources = self.sources.len(),
            keys = len,
            sync = self.sync_mode,
            "registry keys rebuilt"
        );
    }

    /// Number of keys in the merged space.
    pub fn keys_count(&mut self) -> usize {
        self.update();
        self.keys.len()
    }

    pub fn first_key(&mut self) -> Option<f64> {
        self.update();
        (self.keys.len() > 0).then(|| self.keys.key(0))
    }

    pub fn last_key(&mut self) -> Option<f64> {
        self.update();
        let len = self.keys.len();
        (len > 0).then(|| self.keys.key(len - 1))
    }

    pub fn first_index(&mut self) -> Option<f64> {
        self.update();
        (self.keys.len() > 0).then_some(0.0)
    }

    pub fn last_index(&mut self) -> Option<f64> {
        self.update();
        let len = self.keys.len();
        (len > 0).then(|| (len - 1) as f64)
    }

    /// Key at a possibly fractional index of the merged space. Interpolates
    /// between neighbors and extrapolates past the ends by the edge gap.
    pub fn key_by_index(&mut self, index: f64) -> Option<f64> {
        self.update();
        self.key_by_index_inner(index)
    }

    /// Fractional index of a key in the merged space. Interpolates between
    /// the bracketing keys and extrapolates outside by the edge gap.
    pub fn index_by_key(&mut self, key: f64) -> Option<f64> {
        self.update();
        self.index_by_key_inner(key)
    }

    /// Snaps a key onto the closest existing key of the merged space.
    pub fn align_key(&mut self, key: f64) -> Option<f64> {
        self.update();
        let len = self.keys.len();
        match len {
            0 => None,
            1 => Some(self.keys.key(0)),
            _ => {
                let index = self.index_by_key_inner(key)?;
                let clamped = round_half_up(index).clamp(0.0, (len - 1) as f64);
                self.key_by_index_inner(clamped)
            }
        }
    }

    /// First and last merged keys with half-gap extrapolated outer bounds.
    pub fn boundaries_info(&mut self) -> Option<Boundaries> {
        self.update();
        self.boundaries_inner()
    }

    /// Selects `[start_key, end_key]` over the merged space: the resolved
    /// keys of the range, the neighbors just outside it, the smallest
    /// neighbor gap across the padded range and a histogram of estimated
    /// gap intervals.
    pub fn select(&mut self, start_key: f64, end_key: f64) -> Selection {
        self.update();
        let len = self.keys.len();
        if len == 0 {
            return Selection::empty(start_key, end_key);
        }
        if let Some(hit) = self
            .selection_cache
            .find(|s| s.start_key == start_key && s.end_key == end_key)
        {
            return hit.clone();
        }

        let start_index = self.index_by_key_inner(start_key);
        let end_index = self.index_by_key_inner(end_key);

        let mut first_index = None;
        let mut pre_first_index = None;
        let mut last_index = None;
        let mut post_last_index = None;
        let mut min_distance = None;

        let first_bound = start_index.map(|v| v.ceil().max(0.0));
        match first_bound {
            Some(first_f) if (first_f as usize) < len => {
                let last_bound = end_index.map(|v| v.floor().min((len - 1) as f64));
                match last_bound {
                    Some(last_f) if last_f >= 0.0 => {
                        let (first, last) = (first_f as usize, last_f as usize);
                        if first <= last {
                            first_index = Some(first);
                            last_index = Some(last);
                            pre_first_index = first.checked_sub(1);
                            post_last_index = (last + 1 < len).then(|| last + 1);
                            let scan_from = pre_first_index.unwrap_or(first);
                            let scan_to = post_last_index.unwrap_or(last);
                            let mut smallest = f64::INFINITY;
                            for i in scan_from..scan_to {
                                let gap = self.keys.key(i + 1) - self.keys.key(i);
                                if gap < smallest {
                                    smallest = gap;
                                }
                            }
                            if smallest.is_finite() {
                                min_distance = Some(smallest);
                            }
                        } else {
                            // empty selection between two neighboring keys
                            pre_first_index = Some(last);
                            post_last_index = Some(first);
                            min_distance = Some(self.keys.key(last + 1) - self.keys.key(last));
                        }
                    }
                    _ => {
                        // the whole range lies before the data
                        post_last_index = Some(0);
                    }
                }
            }
            _ => {
                // the whole range lies beyond the data
                pre_first_index = Some(len - 1);
            }
        }

        let mut intervals = BTreeMap::new();
        if let Some(bounds) = self.boundaries_inner() {
            let clamped_start = start_key.clamp(bounds.aligned_first_key, bounds.aligned_last_key);
            let clamped_end = end_key.clamp(bounds.aligned_first_key, bounds.aligned_last_key);
            let scan_first = self.index_by_key_inner(clamped_start).unwrap_or(f64::NAN);
            let scan_last = self.index_by_key_inner(clamped_end).unwrap_or(f64::NAN);
            // fractional cursor: the loop visits the partial gap before the
            // first full key, then every whole key up to the last one
            let mut i = scan_first;
            while i <= scan_last {
                let mut partial = None;
                if let Some(first) = first_index {
                    if i < first as f64 {
                        let current = self.keys.key(first).clamp(bounds.first_key, bounds.last_key);
                        let previous = clamped_start.clamp(bounds.first_key, bounds.last_key);
                        partial = Some((current, previous));
                        i = first as f64;
                    }
                }
                let (current, previous) = match partial {
                    Some(pair) => pair,
                    None => {
                        if i > 0.0 && i.fract() == 0.0 && (i as usize) < len {
                            let index = i as usize;
                            (self.keys.key(index), self.keys.key(index - 1))
                        } else {
                            (f64::NAN, f64::NAN)
                        }
                    }
                };
                let gap = current - previous;
                if !gap.is_nan() && gap != 0.0 {
                    accumulate_interval(&mut intervals, gap);
                }
                i += 1.0;
            }
            if let Some(last) = last_index {
                if scan_last > last as f64 {
                    let current = clamped_end.clamp(bounds.first_key, bounds.last_key);
                    let previous = self.keys.key(last).clamp(bounds.first_key, bounds.last_key);
                    let gap = current - previous;
                    if !gap.is_nan() && gap != 0.0 {
                        accumulate_interval(&mut intervals, gap);
                    }
                }
            }
        }

        let selection = Selection {
            start_key,
            end_key,
            start_index,
            end_index,
            first_index,
            pre_first_index,
            last_index,
            post_last_index,
            min_distance,
            intervals,
        };
        self.selection_cache.push(selection.clone());
        selection
    }

    /// Iterator over `[first_key, last_key]`, keys translated to indexes.
    pub fn iter_range(&mut self, first_key: f64, last_key: f64) -> RegistryIterator {
        self.update();
        let first_index = self.index_by_key_inner(first_key);
        let last_index = self.index_by_key_inner(last_key);
        self.iter_index_range_inner(first_index, last_index)
    }

    /// Iterator over `[first_index, last_index]` of the merged space; the
    /// first endpoint is ceiled, the last floored. A `None` first endpoint
    /// exhausts the iterator on its first advance, a `None` last endpoint
    /// lets it walk to the end of the keys.
    pub fn iter_index_range(
        &mut self,
        first_index: Option<f64>,
        last_index: Option<f64>,
    ) -> RegistryIterator {
        self.update();
        self.iter_index_range_inner(first_index, last_index)
    }

    fn iter_index_range_inner(
        &self,
        first_index: Option<f64>,
        last_index: Option<f64>,
    ) -> RegistryIterator {
        let len = self.keys.len();
        let first_index = first_index.filter(|v| !v.is_nan());
        let last_index = last_index.filter(|v| !v.is_nan());
        let last_floor = last_index.map(|v| v.floor().max(0.0));
        let last_item = last_floor.and_then(|v| {
            let index = v as usize;
            (index < len).then_some(index)
        });
        let first_ceil = first_index.map(|v| v.ceil().max(0.0));
        let first_item = first_ceil.and_then(|v| {
            let index = v as usize;
            (index < len).then_some(index)
        });
        let rows_count = match (first_ceil, last_floor) {
            (Some(first), Some(last)) => {
                (last as i64).min(len as i64 - 1) - (first as i64).min(len as i64)
            }
            _ => 0,
        };
        RegistryIterator {
            keys: self.keys.clone(),
            pre_first_index: first_ceil.map(|v| v - 1.0),
            first_item,
            stop_item: last_item.and_then(|index| self.keys.next(index)),
            rows_count,
            state: IterState::PreFirst,
            current_key: None,
            current_index: first_ceil.map(|v| v - 1.0),
        }
    }

    fn key_by_index_inner(&mut self, index: f64) -> Option<f64> {
        let len = self.keys.len();
        if len >= 2 && !index.is_nan() {
            if let Some(hit) = self.search_cache.find(|s| s.index == index) {
                return Some(hit.key);
            }
            let mut low = index.floor();
            let mut high = index.ceil();
            if high <= 0.0 {
                low = 0.0;
                high = 1.0;
            } else if low >= (len - 1) as f64 {
                high = (len - 1) as f64;
                low = high - 1.0;
            }
            let key = if low == high {
                self.keys.key(low as usize)
            } else {
                let low_key = self.keys.key(low as usize);
                let high_key = self.keys.key(low as usize + 1);
                round_half_up((high_key - low_key) * (index - low) + low_key)
            };
            self.search_cache.push(KeySearch { key, index });
            Some(key)
        } else if len == 1 {
            (!index.is_nan()).then(|| round_half_up(index + self.keys.key(0)))
        } else {
            None
        }
    }

    fn index_by_key_inner(&mut self, key: f64) -> Option<f64> {
        let len = self.keys.len();
        if len >= 2 && !key.is_nan() {
            if let Some(hit) = self.search_cache.find(|s| s.key == key) {
                return Some(hit.index);
            }
            let index = match self.keys.binary_search(key) {
                Ok(found) => found as f64,
                Err(insert) => {
                    let low = (insert as isize - 1).clamp(0, len as isize - 2) as usize;
                    let low_key = self.keys.key(low);
                    let high_key = self.keys.key(low + 1);
                    (key - low_key) / (high_key - low_key) + low as f64
                }
            };
            self.search_cache.push(KeySearch { key, index });
            Some(index)
        } else if len == 1 {
            (!key.is_nan()).then(|| key - self.keys.key(0))
        } else {
            None
        }
    }

    fn boundaries_inner(&self) -> Option<Boundaries> {
        let len = self.keys.len();
        match len {
            0 => None,
            1 => {
                let key = self.keys.key(0);
                Some(Boundaries {
                    first_key: key - 1.0,
                    last_key: key + 1.0,
                    aligned_first_key: key - 1.0,
                    aligned_last_key: key + 1.0,
                })
            }
            _ => {
                let first = self.keys.key(0);
                let second = self.keys.key(1);
                let last = self.keys.key(len - 1);
                let second_last = self.keys.key(len - 2);
                Some(Boundaries {
                    first_key: first,
                    last_key: last,
                    aligned_first_key: first - (second - first) / 2.0,
                    aligned_last_key: last + (last - second_last) / 2.0,
                })
            }
        }
    }
}

/// Iterator state: before the range, on a key, or past the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    PreFirst,
    Positioned(usize),
    Exhausted,
}

/// Stateful cursor over a key range of the merged space.
///
/// Freshly built (or [`reset`](Self::reset)) it sits one slot before the
/// first key of the range; [`advance`](Self::advance) steps it forward
/// until the range is exhausted. The cursor owns a snapshot of the keys it
/// was built from, so a later registry rebuild does not shift it.
#[derive(Debug, Clone)]
pub struct RegistryIterator {
    keys: KeySlice,
    pre_first_index: Option<f64>,
    first_item: Option<usize>,
    stop_item: Option<usize>,
    rows_count: i64,
    state: IterState,
    current_key: Option<f64>,
    current_index: Option<f64>,
}

impl RegistryIterator {
    /// Moves the cursor back to the pre-first position.
    pub fn reset(&mut self) {
        self.state = IterState::PreFirst;
        self.current_key = None;
        self.current_index = self.pre_first_index;
    }

    /// Steps to the next key; returns false once the range is exhausted.
    pub fn advance(&mut self) -> bool {
        let next = match self.state {
            IterState::Exhausted => return false,
            IterState::PreFirst => self.first_item,
            IterState::Positioned(index) => self.keys.next(index),
        };
        match next {
            Some(index) if Some(index) != self.stop_item => {
                self.state = IterState::Positioned(index);
                self.current_key = Some(self.keys.key(index));
                self.current_index = self.current_index.map(|v| v + 1.0);
                true
            }
            _ => {
                self.state = IterState::Exhausted;
                self.current_key = None;
                self.current_index = None;
                false
            }
        }
    }

    /// Key under the cursor, `None` before the first advance and after the
    /// range is exhausted.
    pub fn current_key(&self) -> Option<f64> {
        self.current_key
    }

    /// Cursor position in merged-space coordinates. At the pre-first
    /// position this is the slot just before the range, kept as a real
    /// number for caller index arithmetic.
    pub fn current_index(&self) -> Option<f64> {
        self.current_index
    }

    /// Distance measure between the resolved endpoints, kept for callers
    /// sizing buffers; negative for degenerate ranges.
    pub fn rows_count(&self) -> i64 {
        self.rows_count
    }
}

/// Half-up rounding toward positive infinity, the rounding of the stock
/// key math (`f64::round` rounds halves away from zero instead).
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

fn accumulate_interval(intervals: &mut BTreeMap<IntervalUnit, IntervalStat>, gap: f64) {
    let estimate = estimate_interval(gap);
    let stat = intervals
        .entry(estimate.unit)
        .or_insert(IntervalStat { count: 0, range: 0.0 });
    stat.count += 1;
    stat.range += gap;
}
