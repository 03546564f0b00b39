//! Bounded top-`k` aggregator: a streaming max-heap that retains the `k`
//! smallest values seen.
//!
//! `search` calls push candidate `(id, distance)` pairs into one of these
//! per worker, then merge workers sequentially. Complexity is `O(log k)`
//! per push and `O(k log k)` to drain.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One entry held by the heap. `seq` breaks ties between equal `value`s by
/// insertion order — see `SmallestK::push` and `smallest_k`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapItem {
    id: u64,
    value: f32,
    seq: u64,
}

impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // `annix` never pushes NaN distances (squared Euclidean / ADC sums
        // of finite inputs are always finite); partial_cmp is total in
        // practice and we fall back to Equal rather than panic if that
        // assumption is ever violated by a caller.
        self.value
            .partial_cmp(&other.value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Retains the `k` smallest `(id, value)` pairs pushed into it.
///
/// Single-threaded by design: callers that want parallel scans give each
/// worker its own `SmallestK` and merge the results afterward (see
/// `flat::FlatIndex::search` and `pq::PqIndex::search` for the merge
/// pattern).
pub struct SmallestK {
    heap: BinaryHeap<HeapItem>,
    capacity: usize,
    next_seq: u64,
}

impl SmallestK {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Inserts `(id, value)` if there is spare capacity, or if `value` is
    /// strictly less than the current maximum (which is then evicted).
    /// A tie against the current maximum is a no-op: the earlier occupant
    /// keeps its slot.
    pub fn push(&mut self, id: u64, value: f32) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.heap.len() < self.capacity {
            self.heap.push(HeapItem { id, value, seq });
            return;
        }

        if self.capacity == 0 {
            return;
        }

        if let Some(top) = self.heap.peek() {
            if value < top.value {
                self.heap.pop();
                self.heap.push(HeapItem { id, value, seq });
            }
        }
    }

    /// Merges another `SmallestK`'s survivors into this one, in the order
    /// they were originally pushed into `other`. Used to fold per-worker
    /// partial results into one final aggregator in a fixed, chunk-id
    /// order (see `pq::PqIndex::search`).
    pub fn merge(&mut self, other: SmallestK) {
        for (id, value) in other.smallest_k() {
            self.push(id, value);
        }
    }

    /// Returns the current contents in ascending order of `value`. Stable
    /// under equal values: ties are broken by the order in which the
    /// surviving items were originally pushed.
    pub fn smallest_k(&self) -> Vec<(u64, f32)> {
        let mut items: Vec<HeapItem> = self.heap.iter().copied().collect();
        items.sort_by(|a, b| {
            a.value
                .partial_cmp(&b.value)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        items.into_iter().map(|it| (it.id, it.value)).collect()
    }
}
