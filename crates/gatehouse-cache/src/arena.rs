use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sentinel value indicating "no node" (null pointer equivalent).
pub const NIL: u32 = u32::MAX;

/// A node in the arena-allocated doubly-linked list.
///
/// The node owns a copy of the cached value at insertion time. The
/// expiry instant is absolute: `inserted_at + ttl`, with `Duration::MAX`
/// standing in for "never expires".
pub struct Node<V> {
    pub key: String,
    pub value: Arc<V>,
    pub inserted_at: Instant,
    pub ttl: Duration,
    pub prev: u32,
    pub next: u32,
}

impl<V> Node<V> {
    pub fn new(key: String, value: V, ttl: Duration) -> Self {
        Self {
            key,
            value: Arc::new(value),
            inserted_at: Instant::now(),
            ttl,
            prev: NIL,
            next: NIL,
        }
    }

    /// Whether this entry's TTL has elapsed. `Duration::MAX` never expires.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Arena-allocated doubly-linked list.
///
/// Nodes are stored in a `Vec<Option<Node>>`. Indices (`u32`) serve as
/// pointers. A free-list tracks reclaimed slots for O(1) allocation.
pub struct Arena<V> {
    slots: Vec<Option<Node<V>>>,
    free_list: Vec<u32>,
    pub head: u32,
    pub tail: u32,
    len: usize,
}

impl<V> Arena<V> {
    /// Create a new arena pre-allocated for `capacity` nodes.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(None);
        }
        // All slots start on the free list (in reverse so we pop from the front)
        let free_list: Vec<u32> = (0..capacity as u32).rev().collect();

        Self {
            slots,
            free_list,
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    /// Number of active (occupied) nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get a reference to the node at `index`.
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Node<V>> {
        self.slots.get(index as usize).and_then(|s| s.as_ref())
    }

    /// Allocate a new node and insert it at the head of the list.
    /// Returns the index of the new node, or None if no free slots.
    pub fn push_head(&mut self, node: Node<V>) -> Option<u32> {
        let index = self.free_list.pop()?;

        let slot = &mut self.slots[index as usize];
        *slot = Some(node);

        // Link into list at head
        let node = slot.as_mut().unwrap();
        node.prev = NIL;
        node.next = self.head;

        if self.head != NIL {
            self.slots[self.head as usize].as_mut().unwrap().prev = index;
        }

        self.head = index;

        if self.tail == NIL {
            self.tail = index;
        }

        self.len += 1;
        Some(index)
    }

    /// Remove a node from the list and return it. The slot is reclaimed.
    pub fn remove(&mut self, index: u32) -> Option<Node<V>> {
        let node = self.slots[index as usize].take()?;

        // Unlink from list
        let prev = node.prev;
        let next = node.next;

        if prev != NIL {
            self.slots[prev as usize].as_mut().unwrap().next = next;
        } else {
            // Was head
            self.head = next;
        }

        if next != NIL {
            self.slots[next as usize].as_mut().unwrap().prev = prev;
        } else {
            // Was tail
            self.tail = prev;
        }

        self.free_list.push(index);
        self.len -= 1;
        Some(node)
    }

    /// Move an existing node to the head of the list (promotion on hit).
    pub fn move_to_head(&mut self, index: u32) {
        if self.head == index {
            return; // Already at head
        }

        let node = self.slots[index as usize].as_ref().unwrap();
        let prev = node.prev;
        let next = node.next;

        // Unlink from current position
        if prev != NIL {
            self.slots[prev as usize].as_mut().unwrap().next = next;
        }

        if next != NIL {
            self.slots[next as usize].as_mut().unwrap().prev = prev;
        } else {
            // Was tail
            self.tail = prev;
        }

        // Link at head
        let node = self.slots[index as usize].as_mut().unwrap();
        node.prev = NIL;
        node.next = self.head;

        if self.head != NIL {
            self.slots[self.head as usize].as_mut().unwrap().prev = index;
        }

        self.head = index;
    }

    /// Remove the tail node and return it.
    pub fn pop_tail(&mut self) -> Option<(u32, Node<V>)> {
        if self.tail == NIL {
            return None;
        }
        let index = self.tail;
        let node = self.remove(index)?;
        Some((index, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(key: &str) -> Node<u32> {
        Node::new(key.to_string(), 0, Duration::from_secs(60))
    }

    #[test]
    fn empty_arena() {
        let arena: Arena<u32> = Arena::new(10);
        assert_eq!(arena.len(), 0);
        assert!(arena.is_empty());
        assert_eq!(arena.head, NIL);
        assert_eq!(arena.tail, NIL);
    }

    #[test]
    fn push_single() {
        let mut arena = Arena::new(10);
        let idx = arena.push_head(node("a")).unwrap();
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.head, idx);
        assert_eq!(arena.tail, idx);
        assert_eq!(arena.get(idx).unwrap().key, "a");
    }

    #[test]
    fn push_multiple_maintains_order() {
        let mut arena = Arena::new(10);
        let a = arena.push_head(node("a")).unwrap();
        let b = arena.push_head(node("b")).unwrap();
        let c = arena.push_head(node("c")).unwrap();

        // Order should be: head -> c -> b -> a -> tail
        assert_eq!(arena.head, c);
        assert_eq!(arena.tail, a);
        assert_eq!(arena.get(c).unwrap().next, b);
        assert_eq!(arena.get(b).unwrap().next, a);
        assert_eq!(arena.get(a).unwrap().next, NIL);
    }

    #[test]
    fn remove_middle() {
        let mut arena = Arena::new(10);
        let a = arena.push_head(node("a")).unwrap();
        let b = arena.push_head(node("b")).unwrap();
        let c = arena.push_head(node("c")).unwrap();

        let removed = arena.remove(b).unwrap();
        assert_eq!(removed.key, "b");
        assert_eq!(arena.len(), 2);

        // c -> a
        assert_eq!(arena.get(c).unwrap().next, a);
        assert_eq!(arena.get(a).unwrap().prev, c);
    }

    #[test]
    fn pop_tail_returns_oldest() {
        let mut arena = Arena::new(10);
        arena.push_head(node("a"));
        arena.push_head(node("b"));
        arena.push_head(node("c"));

        let (_, popped) = arena.pop_tail().unwrap();
        assert_eq!(popped.key, "a");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn move_to_head() {
        let mut arena = Arena::new(10);
        let a = arena.push_head(node("a")).unwrap();
        let b = arena.push_head(node("b")).unwrap();
        let c = arena.push_head(node("c")).unwrap();

        // Order: c -> b -> a
        arena.move_to_head(a);
        // Order: a -> c -> b

        assert_eq!(arena.head, a);
        assert_eq!(arena.get(a).unwrap().next, c);
        assert_eq!(arena.get(c).unwrap().next, b);
        assert_eq!(arena.get(b).unwrap().next, NIL);
        assert_eq!(arena.tail, b);
    }

    #[test]
    fn move_head_to_head_is_noop() {
        let mut arena = Arena::new(10);
        let a = arena.push_head(node("a")).unwrap();
        let b = arena.push_head(node("b")).unwrap();

        arena.move_to_head(b);
        assert_eq!(arena.head, b);
        assert_eq!(arena.tail, a);
    }

    #[test]
    fn slot_reclamation() {
        let mut arena = Arena::new(2);
        let a = arena.push_head(node("a")).unwrap();
        let _b = arena.push_head(node("b")).unwrap();

        // Arena is full
        assert!(arena.push_head(node("c")).is_none());

        // Remove one, slot should be reclaimable
        arena.remove(a);
        let c = arena.push_head(node("c")).unwrap();
        assert!(arena.get(c).is_some());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn never_expire_sentinel() {
        let n = Node::new("a".to_string(), 0u32, Duration::MAX);
        assert!(!n.is_expired());
    }
}
