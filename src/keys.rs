use serde::Serialize;

/// Key and successor view shared by every row type the key merge consumes.
///
/// Implementors hold their elements in a dense arena, strictly ascending by
/// key and duplicate-free, with `next_index` linking each element to its
/// successor in that arena.
pub trait KeyedNode {
    /// Key of this element, UTC milliseconds in the stock stack.
    fn key(&self) -> f64;
    /// Arena index of the successor, `None` for the last element.
    fn next_index(&self) -> Option<usize>;
}

/// One globally distinct key of a merged key space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyItem {
    pub key: f64,
    /// Index of the next item in the owning arena.
    pub next: Option<usize>,
}

impl KeyedNode for KeyItem {
    fn key(&self) -> f64 {
        self.key
    }

    fn next_index(&self) -> Option<usize> {
        self.next
    }
}

/// Merges two ascending sequences into a fresh linked arena, keeping one
/// item per key (a tie advances both sides and emits once).
pub(crate) fn merge_keyed<A: KeyedNode, B: KeyedNode>(left: &[A], right: &[B]) -> Vec<KeyItem> {
    let mut merged = Vec::with_capacity(left.len().max(right.len()));
    let mut a = (!left.is_empty()).then_some(0);
    let mut b = (!right.is_empty()).then_some(0);
    while let (Some(i), Some(j)) = (a, b) {
        let (left_key, right_key) = (left[i].key(), right[j].key());
        push_linked(&mut merged, if left_key <= right_key { left_key } else { right_key });
        if left_key <= right_key {
            a = left[i].next_index();
        }
        if left_key >= right_key {
            b = right[j].next_index();
        }
    }
    while let Some(i) = a {
        push_linked(&mut merged, left[i].key());
        a = left[i].next_index();
    }
    while let Some(j) = b {
        push_linked(&mut merged, right[j].key());
        b = right[j].next_index();
    }
    merged
}

fn push_linked(merged: &mut Vec<KeyItem>, key: f64) {
    let index = merged.len();
    if index > 0 {
        merged[index - 1].next = Some(index);
    }
    merged.push(KeyItem { key, next: None });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(keys: &[f64]) -> Vec<KeyItem> {
        keys.iter()
            .enumerate()
            .map(|(i, &key)| KeyItem {
                key,
                next: (i + 1 < keys.len()).then_some(i + 1),
            })
            .collect()
    }

    fn keys_of(items: &[KeyItem]) -> Vec<f64> {
        items.iter().map(|item| item.key).collect()
    }

    #[test]
    fn test_interleaved_merge() {
        let merged = merge_keyed(&arena(&[1.0, 3.0, 5.0]), &arena(&[2.0, 4.0, 6.0]));
        assert_eq!(keys_of(&merged), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_ties_emit_once() {
        let merged = merge_keyed(&arena(&[1.0, 3.0, 5.0]), &arena(&[2.0, 3.0, 4.0]));
        assert_eq!(keys_of(&merged), [1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_one_side_empty() {
        let merged = merge_keyed(&arena(&[1.0, 2.0]), &arena(&[]));
        assert_eq!(keys_of(&merged), [1.0, 2.0]);
        let merged = merge_keyed(&arena(&[]), &arena(&[7.0]));
        assert_eq!(keys_of(&merged), [7.0]);
        assert!(merge_keyed(&arena(&[]), &arena(&[])).is_empty());
    }

    #[test]
    fn test_remainder_appended() {
        let merged = merge_keyed(&arena(&[10.0]), &arena(&[1.0, 2.0, 3.0]));
        assert_eq!(keys_of(&merged), [1.0, 2.0, 3.0, 10.0]);
    }

    #[test]
    fn test_output_links_are_dense() {
        let merged = merge_keyed(&arena(&[1.0, 3.0]), &arena(&[2.0]));
        for (i, item) in merged.iter().enumerate() {
            let expected = (i + 1 < merged.len()).then_some(i + 1);
            assert_eq!(item.next, expected, "link at {i}");
        }
    }
}
