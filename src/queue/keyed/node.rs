use std::{fmt::Debug, ptr};

/// A single Entry in the Queue
///
/// A Node is always in one of three Places: linked between the two Sentinels
/// (then it carries a Key and a Value), parked on the Free-List (then both
/// are cleared and only `next` is used as the Free-List link) or it is one
/// of the two Sentinels themselves (which never carry Data)
pub(super) struct Node<K, V> {
    /// The Key under which the Entry was inserted, `None` for Sentinels and
    /// retired Nodes
    pub(super) key: Option<K>,
    /// The stored Value, `None` for Sentinels and retired Nodes
    pub(super) value: Option<V>,
    /// The previous Node in the List, null when not linked
    pub(super) prev: *mut Node<K, V>,
    /// The next Node in the List, reused as the Free-List link for
    /// retired Nodes
    pub(super) next: *mut Node<K, V>,
}

impl<K, V> Node<K, V> {
    /// Creates a new Node that carries no Data and is not linked anywhere,
    /// this is the state used for the Sentinels, for freshly allocated
    /// Nodes and for Nodes on the Free-List
    pub fn detached() -> Self {
        Self {
            key: None,
            value: None,
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }

    /// Populates the Node with the given Entry, the links are set by the
    /// caller when the Node is spliced into the List
    pub fn fill(&mut self, key: K, value: V) {
        self.key = Some(key);
        self.value = Some(value);
    }

    /// Resets the Node back to the detached State, dropping the Key and any
    /// Value still stored in it so that a pooled Node never keeps foreign
    /// Data alive
    pub fn clear(&mut self) {
        self.key = None;
        self.value = None;
        self.prev = ptr::null_mut();
        self.next = ptr::null_mut();
    }

    /// The Key of a live Node
    pub fn key(&self) -> &K {
        // A Node is only ever reachable through the Index or the List while
        // it is live, and live Nodes always carry their Key
        self.key.as_ref().unwrap()
    }
}

impl<K, V> Node<K, V>
where
    K: Eq,
{
    /// Checks if this Node stores an Entry for the given Key
    pub fn matches(&self, key: &K) -> bool {
        self.key.as_ref().map_or(false, |k| k == key)
    }
}

impl<K, V> Debug for Node<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node ( live = {} )", self.key.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_then_clear() {
        let mut node: Node<u64, u64> = Node::detached();

        node.fill(13, 15);
        assert_eq!(Some(&13), node.key.as_ref());
        assert_eq!(Some(&15), node.value.as_ref());

        node.clear();
        assert_eq!(None, node.key);
        assert_eq!(None, node.value);
        assert!(node.prev.is_null());
        assert!(node.next.is_null());
    }

    #[test]
    fn matches_key() {
        let mut node: Node<&str, u64> = Node::detached();
        assert!(!node.matches(&"a"));

        node.fill("a", 1);
        assert!(node.matches(&"a"));
        assert!(!node.matches(&"b"));
    }

    #[test]
    fn clear_drops_value() {
        use std::sync::Arc;

        let value = Arc::new(0);
        let mut node: Node<u64, Arc<u64>> = Node::detached();
        node.fill(13, value.clone());
        assert_eq!(2, Arc::strong_count(&value));

        node.clear();
        assert_eq!(1, Arc::strong_count(&value));
    }
}
