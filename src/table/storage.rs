use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::keys::KeyedNode;

/// A committed table row: key plus numeric value columns.
///
/// Committed rows live in a dense arena, strictly ascending by key, each
/// row linked to its successor through `next`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    /// Key in UTC milliseconds.
    pub key: f64,
    /// Value columns; rows of one table may differ in width.
    pub values: Vec<f64>,
    /// Arena index of the next row, `None` for the last one.
    pub next: Option<usize>,
}

impl TableRow {
    pub fn new(key: f64, values: Vec<f64>) -> Self {
        Self {
            key,
            values,
            next: None,
        }
    }
}

impl KeyedNode for TableRow {
    fn key(&self) -> f64 {
        self.key
    }

    fn next_index(&self) -> Option<usize> {
        self.next
    }
}

/// Committed-row source consumed by the registry.
///
/// Rows must be strictly ascending by key, duplicate-free and `next`-linked
/// in arena order; the registry relies on this without checking it.
pub trait RowStorage: Send + Sync {
    /// Snapshot of the committed rows.
    fn rows(&self) -> Arc<Vec<TableRow>>;
    /// Committed row count.
    fn rows_count(&self) -> usize;
}

/// Shared handle to a table's committed rows. Commits swap the whole arena,
/// so holders of older snapshots keep a consistent view.
#[derive(Debug, Default)]
pub(crate) struct RowsCell {
    rows: RwLock<Arc<Vec<TableRow>>>,
}

impl RowsCell {
    pub(crate) fn snapshot(&self) -> Arc<Vec<TableRow>> {
        self.rows.read().clone()
    }

    pub(crate) fn replace(&self, rows: Vec<TableRow>) {
        *self.rows.write() = Arc::new(rows);
    }
}

impl RowStorage for RowsCell {
    fn rows(&self) -> Arc<Vec<TableRow>> {
        self.snapshot()
    }

    fn rows_count(&self) -> usize {
        self.rows.read().len()
    }
}

/// A row waiting in the pending batch of an open transaction.
#[derive(Debug, Clone)]
pub(crate) struct PendingRow {
    pub(crate) row: TableRow,
    pub(crate) removed: bool,
}

impl PendingRow {
    pub(crate) fn new(row: TableRow) -> Self {
        Self {
            row,
            removed: false,
        }
    }
}

/// Position of a row in either the committed arena or the pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowSlot {
    Committed(usize),
    Pending(usize),
}

/// Ascending two-way walk over the committed arena and the pending batch,
/// bounded by optional keys on both ends (inclusive). On equal keys the
/// committed slot comes first, so last-wins filling keeps the pending row.
///
/// `pending_asc` tells which direction the batch is sorted in; the walk
/// always yields ascending keys.
pub(crate) fn merge_walk(
    committed: &[TableRow],
    pending: &[PendingRow],
    pending_asc: bool,
    from: Option<f64>,
    to: Option<f64>,
) -> Vec<RowSlot> {
    let mut slots = Vec::with_capacity(committed.len() + pending.len());
    let mut c = match from {
        Some(key) => committed.partition_point(|row| row.key < key),
        None => 0,
    };
    let (mut p, step): (isize, isize) = if pending_asc {
        (0, 1)
    } else {
        (pending.len() as isize - 1, -1)
    };
    let below_from = |key: f64| from.is_some_and(|f| key < f);
    let above_to = |key: f64| to.is_some_and(|t| key > t);
    while p >= 0 && (p as usize) < pending.len() && below_from(pending[p as usize].row.key) {
        p += step;
    }
    loop {
        let c_key = (c < committed.len())
            .then(|| committed[c].key)
            .filter(|&key| !above_to(key));
        let p_key = (p >= 0 && (p as usize) < pending.len())
            .then(|| pending[p as usize].row.key)
            .filter(|&key| !above_to(key));
        match (c_key, p_key) {
            (Some(ck), Some(pk)) if ck <= pk => {
                slots.push(RowSlot::Committed(c));
                c += 1;
            }
            (_, Some(_)) => {
                slots.push(RowSlot::Pending(p as usize));
                p += step;
            }
            (Some(_), None) => {
                slots.push(RowSlot::Committed(c));
                c += 1;
            }
            (None, None) => break,
        }
    }
    slots
}

/// Appends a row to a linked arena, replacing the previous row on an equal
/// key (the last pushed row wins).
pub(crate) fn push_row(arena: &mut Vec<TableRow>, key: f64, values: Vec<f64>) {
    if let Some(last) = arena.last_mut() {
        if last.key == key {
            last.values = values;
            return;
        }
    }
    let index = arena.len();
    if index > 0 {
        arena[index - 1].next = Some(index);
    }
    arena.push(TableRow {
        key,
        values,
        next: None,
    });
}

/// Fills a fresh arena from walk output, skipping removed rows and letting
/// the last row of each duplicated key win. Returns the widest row seen.
pub(crate) fn fill_rows(
    slots: &[RowSlot],
    committed: &[TableRow],
    committed_removed: &[bool],
    pending: &[PendingRow],
    arena: &mut Vec<TableRow>,
) -> usize {
    let mut widest = 0;
    for slot in slots {
        let row = match *slot {
            RowSlot::Committed(i) => {
                if committed_removed.get(i).copied().unwrap_or(false) {
                    continue;
                }
                &committed[i]
            }
            RowSlot::Pending(i) => {
                if pending[i].removed {
                    continue;
                }
                &pending[i].row
            }
        };
        widest = widest.max(row.values.len());
        push_row(arena, row.key, row.values.clone());
    }
    widest
}
