//! A thread-safe FIFO-Queue whose Entries can also be removed directly by
//! their Key in O(1)
//!
//! # Structure
//! The Queue combines two Datastructures that always describe the same set
//! of Entries:
//! * A doubly linked List between two Sentinel-Nodes, which stores the
//!   FIFO-Order of the Entries
//! * A Hash-Index from the Key of an Entry to its Node in the List, which
//!   makes the Lookup for `try_remove` and the Duplicate-Check for
//!   `enqueue` O(1)
//!
//! Every public Operation takes one internal Lock for its entire Duration,
//! so each Operation is atomic with respect to all others and the two
//! Datastructures can never be observed out of sync. The critical Sections
//! are all O(1) (except for taking a Snapshot, which is O(n)), so the Lock
//! is only ever held for a very short Time.
//!
//! Retired Nodes are kept on an internal, bounded Free-List and reused by
//! later Insertions to reduce the Allocation-Churn under constant
//! Enqueue/Dequeue Traffic. This is purely an internal Optimization and
//! never visible through the public API.
//!
//! # Example
//! ```rust
//! use keyq::KeyedQueue;
//!
//! let queue = KeyedQueue::new();
//!
//! assert!(queue.enqueue("a", 1));
//! assert!(queue.enqueue("b", 2));
//! // "a" is already present, so this Enqueue is rejected
//! assert!(!queue.enqueue("a", 3));
//!
//! // "b" can be removed directly, without dequeueing "a" first
//! assert_eq!(Some(2), queue.try_remove(&"b"));
//! assert_eq!(Some(1), queue.try_dequeue());
//! assert_eq!(None, queue.try_dequeue());
//! ```

use std::{
    collections::hash_map::RandomState,
    fmt::Debug,
    hash::{BuildHasher, Hash},
    ptr::{self, NonNull},
    sync::{Mutex, MutexGuard, PoisonError},
};

use hashbrown::HashTable;

mod node;
use node::Node;

/// The default maximum Number of retired Nodes that are kept around for
/// Reuse, see [`KeyedQueue::with_pool_limit`]
pub const DEFAULT_POOL_LIMIT: usize = 512;

/// A thread-safe FIFO-Queue with unique Keys and O(1) Removal by Key
///
/// Every Entry is stored under a Key that is unique within the Queue;
/// enqueueing a Key that is already present is rejected and leaves the
/// Queue unchanged. Entries leave the Queue either in FIFO-Order through
/// [`try_dequeue`](Self::try_dequeue) or directly by their Key through
/// [`try_remove`](Self::try_remove), both in O(1).
///
/// The Queue can be shared between Threads (e.g. wrapped in an
/// [`Arc`](std::sync::Arc)) and all Operations are atomic: concurrent
/// Enqueues of the same Key succeed exactly once and a given Entry is only
/// ever handed out to a single Caller, no matter how many Threads race to
/// dequeue or remove it.
pub struct KeyedQueue<K, V, S = RandomState> {
    inner: Mutex<Inner<K, V, S>>,
}

impl<K, V> KeyedQueue<K, V, RandomState> {
    /// Creates a new empty Queue with the default Hasher and the default
    /// Pool-Limit
    pub fn new() -> Self {
        Self::with_capacity_and_hasher(0, RandomState::new())
    }

    /// Creates a new empty Queue whose Index is pre-sized for at least
    /// `capacity` Entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, V, S> KeyedQueue<K, V, S> {
    /// Creates a new empty Queue that hashes its Keys with the given
    /// Hasher
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    /// Creates a new empty Queue with a pre-sized Index and the given
    /// Hasher
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            inner: Mutex::new(Inner::new(capacity, hasher)),
        }
    }

    /// Sets the maximum Number of retired Nodes the Queue keeps around for
    /// Reuse, replacing the Default of [`DEFAULT_POOL_LIMIT`]
    ///
    /// Retired Nodes beyond this Limit are simply deallocated, a Limit of 0
    /// disables the Reuse entirely. The Limit only affects Allocation
    /// Traffic, never the observable Behaviour of the Queue.
    pub fn with_pool_limit(mut self, limit: usize) -> Self {
        self.inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .pool_limit = limit;
        self
    }

    /// The Number of Entries currently in the Queue
    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    /// Checks if the Queue currently contains no Entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locks the internal State
    ///
    /// No user Code ever runs while the Lock is held and every critical
    /// Section leaves the State consistent, so a poisoned Lock (a Thread
    /// that panicked between Operations) is simply recovered
    fn lock(&self) -> MutexGuard<'_, Inner<K, V, S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V, S> KeyedQueue<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Checks if an Entry with the given Key is currently in the Queue
    pub fn contains_key(&self, key: &K) -> bool {
        let inner = self.lock();
        let hash = inner.hasher.hash_one(key);
        inner
            .index
            .find(hash, |n| unsafe { n.as_ref() }.matches(key))
            .is_some()
    }

    /// Appends the Entry at the Back of the Queue
    ///
    /// Returns `false` without modifying the Queue if an Entry with the
    /// same Key is already present; the existing Entry keeps its Value and
    /// its Position in the FIFO-Order. Otherwise the Entry is inserted and
    /// `true` is returned.
    pub fn enqueue(&self, key: K, value: V) -> bool {
        self.lock().enqueue(key, value)
    }

    /// Attempts to dequeue the oldest Entry of the Queue
    ///
    /// Returns `None` if the Queue is currently empty
    pub fn try_dequeue(&self) -> Option<V> {
        self.lock().dequeue()
    }

    /// Attempts to remove the Entry with the given Key, regardless of its
    /// Position in the Queue
    ///
    /// Returns `None` without modifying the Queue if no Entry with this Key
    /// is present. The relative Order of all remaining Entries is
    /// preserved.
    pub fn try_remove(&self, key: &K) -> Option<V> {
        self.lock().remove(key)
    }
}

impl<K, V, S> KeyedQueue<K, V, S>
where
    V: Clone,
{
    /// Returns a Copy of the Value of the oldest Entry without removing it
    ///
    /// Returns `None` if the Queue is currently empty
    pub fn try_peek(&self) -> Option<V> {
        self.lock().peek().cloned()
    }

    /// Takes a Snapshot of all Values currently in the Queue, in
    /// FIFO-Order, and returns an Iterator over that Snapshot
    ///
    /// The Values are copied out while the Lock is held, so the Snapshot is
    /// always a consistent Point-in-Time View: Mutations that happen after
    /// this Call are never visible through the returned Iterator. The
    /// Iterator is a single finite Pass; to observe a newer State, simply
    /// take a new Snapshot.
    pub fn iter(&self) -> Snapshot<V> {
        Snapshot {
            values: self.lock().snapshot().into_iter(),
        }
    }
}

impl<K, V, S> Default for KeyedQueue<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_capacity_and_hasher(0, S::default())
    }
}

impl<K, V, S> Debug for KeyedQueue<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyedQueue ( len = {} )", self.len())
    }
}

// Safety:
// The raw Node-Pointers are only ever dereferenced while holding the Mutex,
// which gives the Lock-Holder exclusive Access to the entire Node-Graph.
// Moving or sharing the Queue between Threads therefore only ever moves the
// Keys, Values and the Hasher across Threads.
unsafe impl<K, V, S> Send for KeyedQueue<K, V, S>
where
    K: Send,
    V: Send,
    S: Send,
{
}
unsafe impl<K, V, S> Sync for KeyedQueue<K, V, S>
where
    K: Send,
    V: Send,
    S: Send,
{
}

/// A Point-in-Time Snapshot of the Values of a [`KeyedQueue`], in
/// FIFO-Order, created by [`KeyedQueue::iter`]
pub struct Snapshot<V> {
    values: std::vec::IntoIter<V>,
}

impl<V> Iterator for Snapshot<V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.values.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.values.size_hint()
    }
}

impl<V> ExactSizeIterator for Snapshot<V> {}

impl<V> Debug for Snapshot<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Snapshot ( remaining = {} )", self.values.len())
    }
}

/// The actual State of the Queue, everything in here is only ever accessed
/// with the Mutex of the owning [`KeyedQueue`] held
struct Inner<K, V, S> {
    /// Maps the Key of every live Entry to its Node in the List
    index: HashTable<NonNull<Node<K, V>>>,
    /// The Sentinel before the oldest Entry
    head: NonNull<Node<K, V>>,
    /// The Sentinel behind the newest Entry
    tail: NonNull<Node<K, V>>,
    /// The Top of the Free-List Stack of retired Nodes, chained through
    /// their `next` Links
    free: *mut Node<K, V>,
    /// The Number of Nodes currently parked on the Free-List
    pooled: usize,
    /// The maximum Number of Nodes the Free-List is allowed to hold
    pool_limit: usize,
    /// The caller-supplied Hashing-Strategy for the Keys
    hasher: S,
}

impl<K, V, S> Inner<K, V, S> {
    fn new(capacity: usize, hasher: S) -> Self {
        // The two Sentinels exist for the entire Lifetime of the Queue, so
        // `head.next` and `tail.prev` are always valid Pointers and none of
        // the List-Operations need to special-case an empty List
        let head = Box::into_raw(Box::new(Node::detached()));
        let tail = Box::into_raw(Box::new(Node::detached()));
        unsafe {
            (*head).next = tail;
            (*tail).prev = head;
        }

        Self {
            index: HashTable::with_capacity(capacity),
            head: unsafe { NonNull::new_unchecked(head) },
            tail: unsafe { NonNull::new_unchecked(tail) },
            free: ptr::null_mut(),
            pooled: 0,
            pool_limit: DEFAULT_POOL_LIMIT,
            hasher,
        }
    }

    /// Takes a Node for a new Entry, either from the Free-List or from the
    /// Allocator
    fn rent(&mut self) -> NonNull<Node<K, V>> {
        if self.free.is_null() {
            let boxed = Box::new(Node::detached());
            // Safety:
            // Box::into_raw never returns a null Pointer
            return unsafe { NonNull::new_unchecked(Box::into_raw(boxed)) };
        }

        let node = self.free;
        // Safety:
        // Every Node on the Free-List was put there by `retire` and is
        // exclusively owned by the Free-List until it is popped here
        unsafe {
            self.free = (*node).next;
            (*node).next = ptr::null_mut();
            self.pooled -= 1;
            NonNull::new_unchecked(node)
        }
    }

    /// Resets a Node that just left the List and either parks it on the
    /// Free-List or deallocates it if the Free-List is already full
    ///
    /// # Safety
    /// The Node must be unlinked from the List and removed from the Index,
    /// so that this Function is its only remaining Owner
    unsafe fn retire(&mut self, mut node: NonNull<Node<K, V>>) {
        // Dropping the Key and Value here means a pooled Node never keeps
        // unrelated Data alive while it waits for its Reuse
        node.as_mut().clear();

        if self.pooled < self.pool_limit {
            node.as_mut().next = self.free;
            self.free = node.as_ptr();
            self.pooled += 1;
        } else {
            drop(Box::from_raw(node.as_ptr()));
        }
    }

    /// Unlinks the Node from its current Position in the List
    ///
    /// # Safety
    /// The Node must currently be linked between the Sentinels, which also
    /// guarantees that both of its Neighbour-Pointers are valid
    unsafe fn unlink(node: NonNull<Node<K, V>>) {
        let node = node.as_ptr();
        let prev = (*node).prev;
        let next = (*node).next;
        (*prev).next = next;
        (*next).prev = prev;
    }

    /// The oldest live Node, or None if the List is empty
    fn oldest(&self) -> Option<NonNull<Node<K, V>>> {
        // Safety:
        // The head Sentinel is alive as long as the Queue is
        let oldest = unsafe { self.head.as_ref() }.next;
        if oldest == self.tail.as_ptr() {
            return None;
        }
        // Safety:
        // `next` of the head Sentinel is always either the tail Sentinel or
        // a live Node, never null
        Some(unsafe { NonNull::new_unchecked(oldest) })
    }

    fn peek(&self) -> Option<&V> {
        let node = self.oldest()?;
        // Safety:
        // The Node is linked in the List and therefore alive
        unsafe { &node.as_ref().value }.as_ref()
    }
}

impl<K, V, S> Inner<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn enqueue(&mut self, key: K, value: V) -> bool {
        let hash = self.hasher.hash_one(&key);
        if self
            .index
            .find(hash, |n| unsafe { n.as_ref() }.matches(&key))
            .is_some()
        {
            return false;
        }

        let mut node = self.rent();
        // Safety:
        // The rented Node is exclusively ours until it is linked in, and
        // the tail Sentinel and its `prev` Neighbour are both alive
        unsafe {
            node.as_mut().fill(key, value);

            // Splice the Node directly in front of the tail Sentinel,
            // making it the newest Entry of the Queue
            let tail = self.tail.as_ptr();
            let prev = (*tail).prev;
            node.as_mut().prev = prev;
            node.as_mut().next = tail;
            (*prev).next = node.as_ptr();
            (*tail).prev = node.as_ptr();
        }

        let hasher = &self.hasher;
        self.index.insert_unique(hash, node, |n| {
            hasher.hash_one(unsafe { n.as_ref() }.key())
        });
        true
    }

    fn dequeue(&mut self) -> Option<V> {
        let mut node = self.oldest()?;

        // Safety:
        // The Node is linked in the List and therefore alive
        let hash = self.hasher.hash_one(unsafe { node.as_ref() }.key());
        if let Ok(entry) = self.index.find_entry(hash, |n| *n == node) {
            entry.remove();
        }

        // Safety:
        // The Node was linked until this Point and is now neither reachable
        // through the List nor through the Index anymore
        unsafe {
            Self::unlink(node);
            let value = node.as_mut().value.take();
            self.retire(node);
            value
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let hash = self.hasher.hash_one(key);
        let entry = self
            .index
            .find_entry(hash, |n| unsafe { n.as_ref() }.matches(key))
            .ok()?;
        let (mut node, _) = entry.remove();

        // Safety:
        // The Index only holds Pointers to Nodes that are linked in the
        // List; after the unlink we are the only remaining Owner
        unsafe {
            Self::unlink(node);
            let value = node.as_mut().value.take();
            self.retire(node);
            value
        }
    }
}

impl<K, V, S> Inner<K, V, S>
where
    V: Clone,
{
    /// Copies the Values of all live Nodes into a Vec, in FIFO-Order
    fn snapshot(&self) -> Vec<V> {
        let mut values = Vec::with_capacity(self.index.len());

        let mut current = unsafe { self.head.as_ref() }.next;
        while current != self.tail.as_ptr() {
            // Safety:
            // Every Node between the two Sentinels is alive
            let node = unsafe { &*current };
            if let Some(value) = node.value.as_ref() {
                values.push(value.clone());
            }
            current = node.next;
        }

        values
    }
}

impl<K, V, S> Drop for Inner<K, V, S> {
    fn drop(&mut self) {
        // Safety:
        // Dropping the Inner State means no one holds the Lock anymore, so
        // all Nodes (live, Sentinel and pooled) are exclusively ours. The
        // List-Walk also frees both Sentinels because `tail.next` is null.
        unsafe {
            let mut current = self.head.as_ptr();
            while !current.is_null() {
                let next = (*current).next;
                drop(Box::from_raw(current));
                current = next;
            }

            let mut current = self.free;
            while !current.is_null() {
                let next = (*current).next;
                drop(Box::from_raw(current));
                current = next;
            }
        }
    }
}
