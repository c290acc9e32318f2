/// Fixed-capacity ring of recently computed values, scanned newest first.
///
/// Backs the key translation and selection caches: lookups walk from the
/// most recent entry to the oldest, writes overwrite the oldest slot once
/// the ring is full.
#[derive(Debug, Clone)]
pub(crate) struct RingCache<T> {
    slots: Vec<T>,
    pointer: usize,
    capacity: usize,
}

impl<T> RingCache<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            pointer: 0,
            capacity,
        }
    }

    /// Most recent entry matching `pred`, if any.
    pub(crate) fn find(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        let len = self.slots.len();
        for i in 0..len {
            // walk backwards from the slot written last
            let index = (self.pointer + len - i - 1) % len;
            if pred(&self.slots[index]) {
                return Some(&self.slots[index]);
            }
        }
        None
    }

    pub(crate) fn push(&mut self, value: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            self.pointer = self.slots.len() % self.capacity;
        } else {
            self.slots[self.pointer] = value;
            self.pointer = (self.pointer + 1) % self.capacity;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.pointer = 0;
    }
}
