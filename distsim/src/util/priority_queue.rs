//! Associative priority queue.

use slab::Slab;

/// An associative container optimized for extraction of the value with the
/// lowest key and deletion of arbitrary key-value pairs.
///
/// The queue is a binary heap cross-indexed with a slab arena: each heap item
/// holds the user key and the index of the slab node owning the value, while
/// each slab node holds the value and a back-pointing index into the heap.
/// This makes it possible to delete an arbitrary pair in *O*(log(*N*)) time
/// using the [`InsertKey`] returned at insertion.
///
/// Every insertion is tagged with a unique, monotonically increasing epoch
/// which is used both to pull same-key pairs in FIFO order and to detect stale
/// insertion keys after a slab slot was recycled.
pub(crate) struct PriorityQueue<K, V>
where
    K: Copy + Ord,
{
    heap: Vec<Item<K>>,
    slab: Slab<Node<V>>,
    next_epoch: u64,
}

impl<K: Copy + Ord, V> PriorityQueue<K, V> {
    /// Creates an empty `PriorityQueue`.
    pub(crate) fn new() -> Self {
        Self {
            heap: Vec::new(),
            slab: Slab::new(),
            next_epoch: 0,
        }
    }

    /// Returns the number of key-value pairs in the priority queue.
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if the queue holds no key-value pair.
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Inserts a new key-value pair and returns a unique insertion key.
    pub(crate) fn insert(&mut self, key: K, value: V) -> InsertKey {
        let epoch = self.next_epoch;
        assert_ne!(epoch, u64::MAX);
        self.next_epoch += 1;

        let heap_idx = self.heap.len();
        let slab_idx = self.slab.insert(Node {
            value,
            heap_idx,
            epoch,
        });
        self.heap.push(Item {
            key: UniqueKey { key, epoch },
            slab_idx,
        });
        self.sift_up(heap_idx);

        InsertKey { slab_idx, epoch }
    }

    /// Pulls the value with the lowest key.
    ///
    /// If there are several equal lowest keys, the value which was inserted
    /// first is returned.
    pub(crate) fn pull(&mut self) -> Option<(K, V)> {
        let item = self.take_heap_item(0)?;
        let node = self.slab.remove(item.slab_idx);

        Some((item.key.key, node.value))
    }

    /// Peeks a reference to the lowest key, leaving it in the queue.
    pub(crate) fn peek_key(&self) -> Option<&K> {
        self.heap.first().map(|item| &item.key.key)
    }

    /// Deletes the key-value pair associated to the provided insertion key if
    /// it is still in the queue, returning its value.
    ///
    /// Using an insertion key returned from another `PriorityQueue` is a logic
    /// error and could result in the deletion of an arbitrary key-value pair.
    pub(crate) fn delete(&mut self, insert_key: InsertKey) -> Option<V> {
        let node = self.slab.get(insert_key.slab_idx)?;
        if node.epoch != insert_key.epoch {
            return None;
        }
        let heap_idx = node.heap_idx;
        self.take_heap_item(heap_idx)?;

        Some(self.slab.remove(insert_key.slab_idx).value)
    }

    /// Removes all key-value pairs, dropping the values.
    pub(crate) fn clear(&mut self) {
        self.heap.clear();
        self.slab.clear();
    }

    /// Removes the heap item at `heap_idx` and restores the heap property.
    ///
    /// The associated slab node is left in place.
    fn take_heap_item(&mut self, heap_idx: usize) -> Option<Item<K>> {
        let last_idx = self.heap.len().checked_sub(1)?;
        self.swap_items(heap_idx, last_idx);
        let item = self.heap.pop()?;

        if heap_idx < self.heap.len() {
            let new_idx = self.sift_up(heap_idx);
            if new_idx == heap_idx {
                self.sift_down(heap_idx);
            }
        }

        Some(item)
    }

    /// Moves the item at `heap_idx` up the heap while its parent has a larger
    /// key and returns its final position.
    fn sift_up(&mut self, mut heap_idx: usize) -> usize {
        while heap_idx != 0 {
            let parent_idx = (heap_idx - 1) / 2;
            if self.heap[heap_idx].key >= self.heap[parent_idx].key {
                break;
            }
            self.swap_items(heap_idx, parent_idx);
            heap_idx = parent_idx;
        }

        heap_idx
    }

    /// Moves the item at `heap_idx` down the heap while a child has a smaller
    /// key.
    fn sift_down(&mut self, mut heap_idx: usize) {
        loop {
            let left_idx = 2 * heap_idx + 1;
            if left_idx >= self.heap.len() {
                break;
            }
            let mut child_idx = left_idx;
            if let Some(right) = self.heap.get(left_idx + 1) {
                if right.key < self.heap[left_idx].key {
                    child_idx = left_idx + 1;
                }
            }
            if self.heap[heap_idx].key <= self.heap[child_idx].key {
                break;
            }
            self.swap_items(heap_idx, child_idx);
            heap_idx = child_idx;
        }
    }

    /// Swaps two heap items and updates the back-pointers of their nodes.
    #[inline]
    fn swap_items(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        let slab_a = self.heap[a].slab_idx;
        let slab_b = self.heap[b].slab_idx;
        self.slab[slab_a].heap_idx = a;
        self.slab[slab_b].heap_idx = b;
    }
}

/// A heap entry.
#[derive(Copy, Clone)]
struct Item<K: Copy> {
    key: UniqueKey<K>,
    // Index of the node owning the value.
    slab_idx: usize,
}

/// A slab node owning a value.
struct Node<V> {
    value: V,
    // Current position of the associated item in the heap.
    heap_idx: usize,
    epoch: u64,
}

/// A unique insertion key that can be used for key-value pair deletion.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub(crate) struct InsertKey {
    slab_idx: usize,
    epoch: u64,
}

/// The user-provided key complemented by the insertion epoch.
///
/// The derived ordering is lexicographic, so `key` takes precedence over
/// `epoch`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct UniqueKey<K: Copy> {
    key: K,
    epoch: u64,
}
