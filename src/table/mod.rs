mod select;
mod storage;

pub use select::{SearchMode, TableSelection};
pub use storage::{RowStorage, TableRow};

use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::RingCache;
use crate::error::TableError;
use select::SearchHit;
use storage::{fill_rows, merge_walk, push_row, PendingRow, RowSlot, RowsCell};

/// Most recent selections kept per table.
const SELECTION_CACHE_SIZE: usize = 4;
/// Most recent key searches kept per table.
const SEARCH_CACHE_SIZE: usize = 2;

/// Naive date-time layouts tried for text keys without an explicit pattern.
const DATE_TIME_FALLBACKS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Plain date layouts tried last for text keys.
const DATE_FALLBACKS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Key column parsing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// strftime pattern tried first for text keys; ISO forms always work.
    pub date_time_pattern: Option<String>,
    /// Hours added to every parsed key.
    pub time_offset_hours: f64,
}

/// Key cell of an ingestion row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyInput {
    /// UTC milliseconds.
    Millis(f64),
    /// Date-time text, parsed with the table's pattern and ISO fallbacks.
    Text(String),
}

/// One ingestion row: a key cell plus numeric value columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub key: KeyInput,
    pub values: Vec<f64>,
}

impl RawRow {
    pub fn new(key: f64, values: Vec<f64>) -> Self {
        Self {
            key: KeyInput::Millis(key),
            values,
        }
    }

    pub fn with_text_key(key: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            key: KeyInput::Text(key.into()),
            values,
        }
    }
}

/// Sortedness of the pending batch, tracked as rows arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pusher {
    First,
    Ascending,
    Descending,
    Assorted,
}

/// How far pending removes disturb the committed arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum RemovesStatus {
    None,
    /// Only a leading run of committed rows is marked.
    Prefix,
    /// Marks may sit anywhere.
    Scattered,
}

/// Time-keyed data table with transactional ingestion.
///
/// Added rows accumulate in a pending batch and become visible to readers
/// only at commit, when they merge into the committed arena shared through
/// [`RowStorage`] handles. Without an explicit transaction every mutation
/// commits on its own.
#[derive(Debug)]
pub struct Table {
    options: TableOptions,
    cell: Arc<RowsCell>,
    pending: Vec<PendingRow>,
    pusher: Pusher,
    /// Removal marks for committed rows, parallel to the arena; empty until
    /// the first remove of a transaction.
    committed_removed: Vec<bool>,
    removes: RemovesStatus,
    in_transaction: bool,
    /// Widest row seen over the table's whole history.
    largest_row_len: usize,
    search_cache: RingCache<SearchHit>,
    selection_cache: RingCache<TableSelection>,
    full_range_ranges: Option<Vec<Option<(f64, f64)>>>,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Self::build(TableOptions::default())
    }

    /// Builds a table with the given parsing options, validating the
    /// date-time pattern up front.
    pub fn with_options(options: TableOptions) -> Result<Self, TableError> {
        if let Some(pattern) = &options.date_time_pattern {
            let invalid = StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error));
            if invalid {
                return Err(TableError::InvalidDateTimePattern(pattern.clone()));
            }
        }
        Ok(Self::build(options))
    }

    fn build(options: TableOptions) -> Self {
        Self {
            options,
            cell: Arc::new(RowsCell::default()),
            pending: Vec::new(),
            pusher: Pusher::First,
            committed_removed: Vec::new(),
            removes: RemovesStatus::None,
            in_transaction: false,
            largest_row_len: 0,
            search_cache: RingCache::new(SEARCH_CACHE_SIZE),
            selection_cache: RingCache::new(SELECTION_CACHE_SIZE),
            full_range_ranges: None,
        }
    }

    /// Handle for registries; always reflects the latest commit.
    pub fn as_source(&self) -> Arc<dyn RowStorage> {
        self.cell.clone()
    }

    /// Snapshot of the committed rows.
    pub fn storage(&self) -> Arc<Vec<TableRow>> {
        self.cell.snapshot()
    }

    /// Committed row count.
    pub fn rows_count(&self) -> usize {
        self.cell.rows_count()
    }

    /// Committed row by arena index.
    pub fn row(&self, index: usize) -> Option<TableRow> {
        self.committed().get(index).cloned()
    }

    /// Number of value columns known to the table (widest row ever seen).
    pub fn known_fields(&self) -> usize {
        self.largest_row_len
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn committed(&self) -> Arc<Vec<TableRow>> {
        self.cell.snapshot()
    }

    /// Enters transaction mode; mutations stop committing on their own
    /// until [`commit`](Self::commit) or [`rollback`](Self::rollback).
    pub fn start_transaction(&mut self) {
        if self.in_transaction {
            warn!("table is already in a transaction");
        }
        self.in_transaction = true;
    }

    /// Merges the pending batch and removal marks into the committed arena
    /// and publishes it to all storage handles.
    pub fn commit(&mut self) {
        self.in_transaction = false;
        if self.pending.is_empty() && self.removes == RemovesStatus::None {
            return;
        }
        let ascending = self.normalize_pending_direction();
        let committed = self.committed();
        let first_pending_key = if self.pending.is_empty() {
            None
        } else if ascending {
            Some(self.pending[0].row.key)
        } else {
            Some(self.pending[self.pending.len() - 1].row.key)
        };
        let batch_to_the_right = match (first_pending_key, committed.last()) {
            (Some(first), Some(last_row)) => first > last_row.key,
            _ => true,
        };

        let mut arena: Vec<TableRow> = Vec::with_capacity(committed.len() + self.pending.len());
        let widest;
        if batch_to_the_right && self.removes < RemovesStatus::Scattered {
            // fast path: drop the removed prefix, then append the batch
            let prefix = self
                .committed_removed
                .iter()
                .take_while(|&&removed| removed)
                .count();
            for row in &committed[prefix..] {
                push_row(&mut arena, row.key, row.values.clone());
            }
            let mut batch_widest = 0;
            let count = self.pending.len();
            for i in 0..count {
                let pending = if ascending {
                    &self.pending[i]
                } else {
                    &self.pending[count - 1 - i]
                };
                if pending.removed {
                    continue;
                }
                batch_widest = batch_widest.max(pending.row.values.len());
                push_row(&mut arena, pending.row.key, pending.row.values.clone());
            }
            widest = batch_widest;
        } else {
            let slots = merge_walk(&committed, &self.pending, ascending, None, None);
            widest = fill_rows(
                &slots,
                &committed,
                &self.committed_removed,
                &self.pending,
                &mut arena,
            );
        }

        self.largest_row_len = self.largest_row_len.max(widest);
        let rows = arena.len();
        self.cell.replace(arena);
        self.pending.clear();
        self.pusher = Pusher::First;
        self.committed_removed.clear();
        self.removes = RemovesStatus::None;
        self.drop_caches();
        debug!(rows, "table storage committed");
    }

    /// Discards the pending batch and removal marks. Leaves the committed
    /// arena and the query caches untouched.
    pub fn rollback(&mut self) {
        self.in_transaction = false;
        self.pending.clear();
        self.pusher = Pusher::First;
        self.committed_removed.clear();
        self.removes = RemovesStatus::None;
    }

    /// Adds rows to the pending batch; returns how many were accepted.
    /// Rows whose key cannot be parsed are dropped.
    pub fn add_rows<I>(&mut self, rows: I) -> usize
    where
        I: IntoIterator<Item = RawRow>,
    {
        let auto = !self.in_transaction;
        if auto {
            self.start_transaction();
        }
        let mut accepted = 0;
        let mut skipped = 0;
        for raw in rows {
            match self.parse_key(&raw.key) {
                Some(key) => {
                    self.push_pending(TableRow::new(key, raw.values));
                    accepted += 1;
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, accepted, "dropped rows with unparseable keys");
        }
        if auto {
            self.commit();
        }
        accepted
    }

    /// Streaming form of [`add_rows`](Self::add_rows): after adding, removes
    /// as many distinct leading keys as rows were accepted, keeping the
    /// storage a sliding window. The removal runs after the addition, so it
    /// can consume rows added by this very call.
    pub fn add_rows_rolling<I>(&mut self, rows: I) -> usize
    where
        I: IntoIterator<Item = RawRow>,
    {
        let auto = !self.in_transaction;
        if auto {
            self.start_transaction();
        }
        let accepted = self.add_rows(rows);
        if accepted > 0 {
            self.remove_first(accepted);
        }
        if auto {
            self.commit();
        }
        accepted
    }

    /// Ingests an array-of-arrays JSON document: the first cell of each row
    /// is the key (milliseconds or date-time text), the rest are values.
    /// Returns how many rows were accepted.
    pub fn add_json(&mut self, json: &str) -> Result<usize, TableError> {
        let data: Vec<Vec<Value>> = serde_json::from_str(json)?;
        let rows = data.into_iter().filter_map(raw_from_cells);
        Ok(self.add_rows(rows))
    }

    /// Marks all rows with keys in `[start_key, end_key]` for removal; a
    /// `None` side is unbounded. Pending rows count too.
    pub fn remove_range(&mut self, start_key: Option<f64>, end_key: Option<f64>) {
        let ascending = self.normalize_pending_direction();
        let committed = self.committed();
        let slots = merge_walk(&committed, &self.pending, ascending, start_key, end_key);
        self.committed_removed.resize(committed.len(), false);
        for slot in slots {
            match slot {
                RowSlot::Committed(i) => self.committed_removed[i] = true,
                RowSlot::Pending(i) => self.pending[i].removed = true,
            }
        }
        self.removes = RemovesStatus::Scattered;
        if !self.in_transaction {
            self.commit();
        }
    }

    /// Marks the first `count` distinct keys for removal, counting committed
    /// rows and pending appends together and skipping already marked rows.
    pub fn remove_first(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let ascending = self.normalize_pending_direction();
        let committed = self.committed();
        let slots = merge_walk(&committed, &self.pending, ascending, None, None);
        self.committed_removed.resize(committed.len(), false);
        let mut remaining = count;
        let mut prev_key = f64::NAN;
        for slot in slots {
            if remaining == 0 {
                break;
            }
            match slot {
                RowSlot::Committed(i) => {
                    if !self.committed_removed[i] {
                        if committed[i].key != prev_key {
                            remaining -= 1;
                        }
                        self.committed_removed[i] = true;
                        prev_key = committed[i].key;
                    }
                }
                RowSlot::Pending(i) => {
                    if !self.pending[i].removed {
                        if self.pending[i].row.key != prev_key {
                            remaining -= 1;
                        }
                        self.pending[i].removed = true;
                        prev_key = self.pending[i].row.key;
                    }
                }
            }
        }
        if self.removes == RemovesStatus::None {
            self.removes = RemovesStatus::Prefix;
        }
        if !self.in_transaction {
            self.commit();
        }
    }

    /// Routes a row into the pending batch, tracking batch sortedness and
    /// replacing the previous row on an equal key.
    fn push_pending(&mut self, row: TableRow) {
        match self.pusher {
            Pusher::First => {
                self.pending.push(PendingRow::new(row));
                self.pusher = Pusher::Ascending;
            }
            Pusher::Ascending => {
                let last = self.pending.len() - 1;
                let last_key = self.pending[last].row.key;
                if last_key < row.key {
                    self.pending.push(PendingRow::new(row));
                } else if last_key > row.key {
                    self.pusher = if self.pending.len() == 1 {
                        Pusher::Descending
                    } else {
                        Pusher::Assorted
                    };
                    self.pending.push(PendingRow::new(row));
                } else {
                    self.pending[last] = PendingRow::new(row);
                }
            }
            Pusher::Descending => {
                let last = self.pending.len() - 1;
                let last_key = self.pending[last].row.key;
                if last_key > row.key {
                    self.pending.push(PendingRow::new(row));
                } else if last_key < row.key {
                    self.pusher = Pusher::Assorted;
                    self.pending.push(PendingRow::new(row));
                } else {
                    self.pending[last] = PendingRow::new(row);
                }
            }
            Pusher::Assorted => {
                self.pending.push(PendingRow::new(row));
            }
        }
    }

    /// Sorts an assorted batch ascending; returns whether the batch reads
    /// ascending afterwards (a descending batch is left as is).
    fn normalize_pending_direction(&mut self) -> bool {
        if self.pusher == Pusher::Assorted {
            self.pending
                .sort_by(|a, b| a.row.key.total_cmp(&b.row.key));
            self.pusher = Pusher::Ascending;
        }
        self.pusher != Pusher::Descending
    }

    fn parse_key(&self, input: &KeyInput) -> Option<f64> {
        let base = match input {
            KeyInput::Millis(ms) => ms.is_finite().then_some(*ms),
            KeyInput::Text(text) => self.parse_date_time(text),
        }?;
        Some(base + self.options.time_offset_hours * 3_600_000.0)
    }

    fn parse_date_time(&self, text: &str) -> Option<f64> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(pattern) = &self.options.date_time_pattern {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
                return Some(dt.and_utc().timestamp_millis() as f64);
            }
            if let Ok(date) = NaiveDate::parse_from_str(text, pattern) {
                return Some(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis() as f64);
            }
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.timestamp_millis() as f64);
        }
        for pattern in DATE_TIME_FALLBACKS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
                return Some(dt.and_utc().timestamp_millis() as f64);
            }
        }
        for pattern in DATE_FALLBACKS {
            if let Ok(date) = NaiveDate::parse_from_str(text, pattern) {
                return Some(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis() as f64);
            }
        }
        None
    }

    fn drop_caches(&mut self) {
        self.full_range_ranges = None;
        self.selection_cache.clear();
        self.search_cache.clear();
    }
}

fn raw_from_cells(cells: Vec<Value>) -> Option<RawRow> {
    let mut cells = cells.into_iter();
    let key = match cells.next()? {
        Value::Number(n) => KeyInput::Millis(n.as_f64()?),
        Value::String(s) => KeyInput::Text(s),
        _ => return None,
    };
    let values = cells.map(|cell| cell_to_number(&cell)).collect();
    Some(RawRow { key, values })
}

fn cell_to_number(cell: &Value) -> f64 {
    match cell {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        _ => f64::NAN,
    }
}
